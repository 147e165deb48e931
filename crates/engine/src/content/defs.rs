use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};

use crate::registry::{ProtoKind, Prototype, PrototypePayload, Vnum};
use crate::world::{Direction, RoomVnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateVnum,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

/// A mobile or object definition; which one depends on the element it came
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrototypeDef {
    pub vnum: Vnum,
    pub keywords: String,
    pub short_descr: String,
    pub level: u32,
    pub triggers: Vec<Vnum>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitDef {
    pub direction: Direction,
    /// `None` for an exit that leads nowhere (`to="-1"`).
    pub to_room: Option<RoomVnum>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDef {
    pub vnum: RoomVnum,
    pub name: String,
    pub exits: Vec<ExitDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopDef {
    pub vnum: Vnum,
    pub keeper: Vnum,
    pub products: Vec<Vnum>,
}

/// Everything compiled from the world's `<Defs>` documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefSet {
    pub mobiles: Vec<PrototypeDef>,
    pub objects: Vec<PrototypeDef>,
    pub rooms: Vec<RoomDef>,
    pub shops: Vec<ShopDef>,
}

#[derive(Default)]
struct SeenVnums {
    mobiles: HashSet<Vnum>,
    objects: HashSet<Vnum>,
    rooms: HashSet<Vnum>,
    shops: HashSet<Vnum>,
}

pub fn compile_defs(files: &[PathBuf]) -> Result<DefSet, ContentCompileError> {
    let mut defs = DefSet::default();
    let mut seen = SeenVnums::default();
    for file in files {
        let raw = fs::read_to_string(file).map_err(|source| ContentCompileError {
            code: ContentErrorCode::ReadFile,
            message: format!("failed to read XML file: {source}"),
            file_path: file.clone(),
            location: None,
        })?;
        parse_defs_document(file, &raw, &mut defs, &mut seen)?;
    }
    Ok(defs)
}

fn parse_defs_document(
    file_path: &Path,
    raw: &str,
    defs: &mut DefSet,
    seen: &mut SeenVnums,
) -> Result<(), ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let ctx = Ctx {
        file_path,
        doc: &doc,
    };
    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(ctx.error(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    for child in root.children().filter(|node| node.is_element()) {
        match child.tag_name().name() {
            "MobileDef" => {
                let def = parse_prototype_def(&ctx, child, "MobileDef")?;
                ctx.claim(&mut seen.mobiles, def.vnum, "MobileDef", child)?;
                defs.mobiles.push(def);
            }
            "ObjectDef" => {
                let def = parse_prototype_def(&ctx, child, "ObjectDef")?;
                ctx.claim(&mut seen.objects, def.vnum, "ObjectDef", child)?;
                defs.objects.push(def);
            }
            "RoomDef" => {
                let def = parse_room_def(&ctx, child)?;
                ctx.claim(&mut seen.rooms, def.vnum, "RoomDef", child)?;
                defs.rooms.push(def);
            }
            "ShopDef" => {
                let def = parse_shop_def(&ctx, child)?;
                ctx.claim(&mut seen.shops, def.vnum, "ShopDef", child)?;
                defs.shops.push(def);
            }
            other => {
                return Err(ctx.error(
                    ContentErrorCode::UnknownDefType,
                    format!(
                        "unsupported def type <{other}>; expected MobileDef, ObjectDef, RoomDef or ShopDef"
                    ),
                    child,
                ))
            }
        }
    }
    Ok(())
}

struct Ctx<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl Ctx<'_, '_> {
    fn error(&self, code: ContentErrorCode, message: String, node: Node<'_, '_>) -> ContentCompileError {
        let pos = self.doc.text_pos_at(node.range().start);
        ContentCompileError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }

    fn claim(
        &self,
        seen: &mut HashSet<Vnum>,
        vnum: Vnum,
        def_type: &str,
        node: Node<'_, '_>,
    ) -> Result<(), ContentCompileError> {
        if seen.insert(vnum) {
            return Ok(());
        }
        Err(self.error(
            ContentErrorCode::DuplicateVnum,
            format!("duplicate {def_type} vnum {vnum}"),
            node,
        ))
    }

    fn required_text(&self, node: Node<'_, '_>, field_name: &str) -> Result<String, ContentCompileError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error(
                ContentErrorCode::MissingField,
                format!("field <{field_name}> must not be empty"),
                node,
            ));
        }
        Ok(value)
    }

    fn parse_number<T: std::str::FromStr>(
        &self,
        node: Node<'_, '_>,
        value: &str,
        what: &str,
    ) -> Result<T, ContentCompileError> {
        value.parse::<T>().map_err(|_| {
            self.error(
                ContentErrorCode::InvalidValue,
                format!("{what} '{value}' is not a valid number"),
                node,
            )
        })
    }

    fn vnum_list(&self, node: Node<'_, '_>, what: &str) -> Result<Vec<Vnum>, ContentCompileError> {
        node.text()
            .unwrap_or_default()
            .split_whitespace()
            .map(|token| self.parse_number::<Vnum>(node, token, what))
            .collect()
    }

    fn missing(&self, field: &str, def_type: &str, node: Node<'_, '_>) -> ContentCompileError {
        self.error(
            ContentErrorCode::MissingField,
            format!("missing required field <{field}> in <{def_type}>"),
            node,
        )
    }

    fn check_duplicate(
        &self,
        seen_fields: &mut HashSet<String>,
        field: Node<'_, '_>,
        def_type: &str,
    ) -> Result<(), ContentCompileError> {
        let field_name = field.tag_name().name();
        if seen_fields.insert(field_name.to_string()) {
            return Ok(());
        }
        Err(self.error(
            ContentErrorCode::DuplicateField,
            format!("duplicate field <{field_name}> in <{def_type}>"),
            field,
        ))
    }

    fn unknown_field(&self, field: Node<'_, '_>, def_type: &str) -> ContentCompileError {
        self.error(
            ContentErrorCode::UnknownField,
            format!("unknown field <{}> in <{def_type}>", field.tag_name().name()),
            field,
        )
    }
}

fn parse_prototype_def(
    ctx: &Ctx<'_, '_>,
    node: Node<'_, '_>,
    def_type: &str,
) -> Result<PrototypeDef, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut vnum: Option<Vnum> = None;
    let mut keywords: Option<String> = None;
    let mut short_descr: Option<String> = None;
    let mut level: Option<u32> = None;
    let mut triggers = Vec::new();

    for field in node.children().filter(|child| child.is_element()) {
        ctx.check_duplicate(&mut seen_fields, field, def_type)?;
        match field.tag_name().name() {
            "vnum" => {
                let value = ctx.required_text(field, "vnum")?;
                vnum = Some(parse_vnum(ctx, field, &value)?);
            }
            "keywords" => keywords = Some(ctx.required_text(field, "keywords")?),
            "shortDescr" => short_descr = Some(ctx.required_text(field, "shortDescr")?),
            "level" => {
                let value = ctx.required_text(field, "level")?;
                level = Some(ctx.parse_number(field, &value, "level")?);
            }
            "triggers" => triggers = ctx.vnum_list(field, "trigger vnum")?,
            _ => return Err(ctx.unknown_field(field, def_type)),
        }
    }

    let Some(vnum) = vnum else {
        return Err(ctx.missing("vnum", def_type, node));
    };
    let Some(keywords) = keywords else {
        return Err(ctx.missing("keywords", def_type, node));
    };
    let Some(short_descr) = short_descr else {
        return Err(ctx.missing("shortDescr", def_type, node));
    };

    Ok(PrototypeDef {
        vnum,
        keywords,
        short_descr,
        level: level.unwrap_or(1),
        triggers,
    })
}

fn parse_room_def(ctx: &Ctx<'_, '_>, node: Node<'_, '_>) -> Result<RoomDef, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut vnum: Option<RoomVnum> = None;
    let mut name: Option<String> = None;
    let mut exits = Vec::<ExitDef>::new();

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name();
        if field_name != "exit" {
            ctx.check_duplicate(&mut seen_fields, field, "RoomDef")?;
        }
        match field_name {
            "vnum" => {
                let value = ctx.required_text(field, "vnum")?;
                vnum = Some(parse_vnum(ctx, field, &value)?);
            }
            "name" => name = Some(ctx.required_text(field, "name")?),
            "exit" => {
                let exit = parse_exit(ctx, field)?;
                if exits.iter().any(|existing| existing.direction == exit.direction) {
                    return Err(ctx.error(
                        ContentErrorCode::DuplicateField,
                        format!("duplicate exit '{}' in <RoomDef>", exit.direction.name()),
                        field,
                    ));
                }
                exits.push(exit);
            }
            _ => return Err(ctx.unknown_field(field, "RoomDef")),
        }
    }

    let Some(vnum) = vnum else {
        return Err(ctx.missing("vnum", "RoomDef", node));
    };
    let Some(name) = name else {
        return Err(ctx.missing("name", "RoomDef", node));
    };
    Ok(RoomDef { vnum, name, exits })
}

fn parse_exit(ctx: &Ctx<'_, '_>, node: Node<'_, '_>) -> Result<ExitDef, ContentCompileError> {
    let Some(dir) = node.attribute("dir") else {
        return Err(ctx.error(
            ContentErrorCode::MissingField,
            "<exit> requires a dir attribute".to_string(),
            node,
        ));
    };
    let direction = Direction::from_name(dir).ok_or_else(|| {
        ctx.error(
            ContentErrorCode::InvalidValue,
            format!("invalid exit direction '{dir}'; allowed values: north, east, south, west, up, down"),
            node,
        )
    })?;
    let Some(to) = node.attribute("to") else {
        return Err(ctx.error(
            ContentErrorCode::MissingField,
            "<exit> requires a to attribute".to_string(),
            node,
        ));
    };
    let to = ctx.parse_number::<RoomVnum>(node, to.trim(), "exit destination")?;
    Ok(ExitDef {
        direction,
        to_room: (to >= 0).then_some(to),
    })
}

fn parse_shop_def(ctx: &Ctx<'_, '_>, node: Node<'_, '_>) -> Result<ShopDef, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut vnum: Option<Vnum> = None;
    let mut keeper: Option<Vnum> = None;
    let mut products = Vec::new();

    for field in node.children().filter(|child| child.is_element()) {
        ctx.check_duplicate(&mut seen_fields, field, "ShopDef")?;
        match field.tag_name().name() {
            "vnum" => {
                let value = ctx.required_text(field, "vnum")?;
                vnum = Some(parse_vnum(ctx, field, &value)?);
            }
            "keeper" => {
                let value = ctx.required_text(field, "keeper")?;
                keeper = Some(parse_vnum(ctx, field, &value)?);
            }
            "products" => products = ctx.vnum_list(field, "product vnum")?,
            _ => return Err(ctx.unknown_field(field, "ShopDef")),
        }
    }

    let Some(vnum) = vnum else {
        return Err(ctx.missing("vnum", "ShopDef", node));
    };
    let Some(keeper) = keeper else {
        return Err(ctx.missing("keeper", "ShopDef", node));
    };
    Ok(ShopDef {
        vnum,
        keeper,
        products,
    })
}

fn parse_vnum(ctx: &Ctx<'_, '_>, node: Node<'_, '_>, value: &str) -> Result<Vnum, ContentCompileError> {
    let vnum = ctx.parse_number::<Vnum>(node, value, "vnum")?;
    if vnum < 0 {
        return Err(ctx.error(
            ContentErrorCode::InvalidValue,
            format!("vnum {vnum} must be >= 0"),
            node,
        ));
    }
    Ok(vnum)
}

/// Renders prototypes as a `<Defs>` document that `compile_defs` reads back.
pub fn render_prototype_defs<'a, P: PrototypePayload + 'a>(
    prototypes: impl IntoIterator<Item = &'a Prototype<P>>,
) -> String {
    let element = match P::KIND {
        ProtoKind::Mobile => "MobileDef",
        ProtoKind::Object => "ObjectDef",
    };
    let mut out = String::from("<Defs>\n");
    for proto in prototypes {
        out.push_str(&format!("  <{element}>\n"));
        out.push_str(&format!("    <vnum>{}</vnum>\n", proto.vnum));
        out.push_str(&format!(
            "    <keywords>{}</keywords>\n",
            escape_xml(proto.payload.keywords())
        ));
        out.push_str(&format!(
            "    <shortDescr>{}</shortDescr>\n",
            escape_xml(proto.payload.short_descr())
        ));
        out.push_str(&format!("    <level>{}</level>\n", proto.payload.level()));
        if !proto.triggers.is_empty() {
            let triggers = proto
                .triggers
                .iter()
                .map(|trigger| trigger.0.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            out.push_str(&format!("    <triggers>{triggers}</triggers>\n"));
        }
        out.push_str(&format!("  </{element}>\n"));
    }
    out.push_str("</Defs>\n");
    out
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
