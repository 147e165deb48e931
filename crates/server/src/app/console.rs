use std::collections::HashMap;

use zone_engine::Vnum;

/// A parsed operator line. Operands that need the live tables (vnums to
/// handles, field values) stay raw until the operator runs the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OperatorCommand {
    Help,
    Zones,
    Stat,
    Reset { zone: Vnum },
    ZoneEdit { zone: Vnum },
    ZoneList,
    ZoneInsert { pos: usize, line: String },
    ZoneDelete { pos: usize },
    ZoneSet { pos: usize, field: String, value: String },
    ZoneHeader { field: String, value: String },
    MobileEdit { vnum: Vnum },
    ObjectEdit { vnum: Vnum },
    PrototypeSet { field: String, value: String },
    Purge,
    Commit,
    Discard,
    Save { zone: Vnum },
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandParseError {
    reason: String,
    usage: String,
}

type ParseFn = dyn Fn(&[String]) -> Result<OperatorCommand, CommandParseError> + Send + Sync;

pub(crate) struct CommandSpec {
    name: String,
    help: String,
    arg_schema: String,
    parse: Box<ParseFn>,
}

pub(crate) struct ConsoleCommandRegistry {
    specs: Vec<CommandSpec>,
    lookup_by_lower_name: HashMap<String, usize>,
}

impl ConsoleCommandRegistry {
    pub(crate) fn new() -> Self {
        Self {
            specs: Vec::new(),
            lookup_by_lower_name: HashMap::new(),
        }
    }

    pub(crate) fn with_operator_commands() -> Self {
        let mut registry = Self::new();
        for (name, help, arg_schema, parse) in BUILTINS {
            // Names in BUILTINS are distinct and non-empty.
            let _ = registry.register(*name, *help, *arg_schema, *parse);
        }
        registry
    }

    pub(crate) fn register<F>(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
        arg_schema: impl Into<String>,
        parse: F,
    ) -> Result<(), String>
    where
        F: Fn(&[String]) -> Result<OperatorCommand, CommandParseError> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("command name cannot be empty".to_string());
        }
        let lower = name.to_ascii_lowercase();
        if self.lookup_by_lower_name.contains_key(&lower) {
            return Err(format!("duplicate command registration: {name}"));
        }

        self.specs.push(CommandSpec {
            name,
            help: help.into(),
            arg_schema: arg_schema.into(),
            parse: Box::new(parse),
        });
        self.lookup_by_lower_name.insert(lower, self.specs.len() - 1);
        Ok(())
    }

    pub(crate) fn lookup(&self, input_name: &str) -> Option<&CommandSpec> {
        let lower = input_name.to_ascii_lowercase();
        let index = self.lookup_by_lower_name.get(&lower)?;
        self.specs.get(*index)
    }

    /// Registration order.
    pub(crate) fn help_lines(&self) -> Vec<String> {
        self.specs
            .iter()
            .map(|spec| {
                if spec.arg_schema.is_empty() {
                    format!("{} - {}", spec.name, spec.help)
                } else {
                    format!("{} {} - {}", spec.name, spec.arg_schema, spec.help)
                }
            })
            .collect()
    }

    /// `Ok(None)` for a blank line; `Err` carries the text to show the
    /// operator.
    pub(crate) fn parse_line(&self, raw_line: &str) -> Result<Option<OperatorCommand>, String> {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let tokens = tokenize_line(trimmed).map_err(|reason| format!("error: {reason}. usage: help"))?;
        let Some((command_name, args)) = tokens.split_first() else {
            return Ok(None);
        };
        let Some(spec) = self.lookup(command_name) else {
            return Err(format!("error: unknown command '{command_name}'. try: help"));
        };
        (spec.parse)(args)
            .map(Some)
            .map_err(|error| format!("error: {}. usage: {}", error.reason, error.usage))
    }
}

type BuiltinParse = fn(&[String]) -> Result<OperatorCommand, CommandParseError>;

const BUILTINS: &[(&str, &str, &str, BuiltinParse)] = &[
    ("help", "List commands", "", parse_help),
    ("zones", "List zones with age and reset state", "", parse_zones),
    ("stat", "Print a JSON snapshot of the tables", "", parse_stat),
    ("reset", "Run a zone's reset script now", "<zone:int>", parse_reset),
    ("zedit", "Open an edit session on a zone", "<zone:int>", parse_zedit),
    ("zlist", "List the reset commands being edited", "", parse_zlist),
    ("zins", "Insert a reset line before a position", "<pos:int> <reset line...>", parse_zins),
    ("zdel", "Delete the reset command at a position", "<pos:int>", parse_zdel),
    (
        "zset",
        "Change one operand of a reset command",
        "<pos:int> <if|max|room|proto|container|wear|dir|state|text> <value...>",
        parse_zset,
    ),
    (
        "zheader",
        "Change the zone header",
        "<name|top|lifespan|mode> <value...>",
        parse_zheader,
    ),
    ("medit", "Open an edit session on a mobile", "<vnum:int>", parse_medit),
    ("oedit", "Open an edit session on an object", "<vnum:int>", parse_oedit),
    (
        "pset",
        "Change a field of the prototype being edited",
        "<keywords|short|level|triggers> <value...>",
        parse_pset,
    ),
    ("purge", "Mark the prototype being edited for deletion", "", parse_purge),
    ("commit", "Apply the open session", "", parse_commit),
    ("discard", "Drop the open session", "", parse_discard),
    ("save", "Write a zone and its prototypes to disk", "<zone:int>", parse_save),
    ("quit", "Stop the server", "", parse_quit),
];

fn tokenize_line(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut seen_token_content = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                seen_token_content = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if seen_token_content {
                    tokens.push(std::mem::take(&mut current));
                    seen_token_content = false;
                }
            }
            _ => {
                current.push(ch);
                seen_token_content = true;
            }
        }
    }

    if in_quotes {
        return Err("unterminated quoted string".to_string());
    }
    if seen_token_content {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_help(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    require_no_args(args, "help")?;
    Ok(OperatorCommand::Help)
}

fn parse_zones(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    require_no_args(args, "zones")?;
    Ok(OperatorCommand::Zones)
}

fn parse_stat(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    require_no_args(args, "stat")?;
    Ok(OperatorCommand::Stat)
}

fn parse_reset(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    let zone = single_int(args, "reset <zone>", "zone")?;
    Ok(OperatorCommand::Reset { zone })
}

fn parse_zedit(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    let zone = single_int(args, "zedit <zone>", "zone")?;
    Ok(OperatorCommand::ZoneEdit { zone })
}

fn parse_zlist(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    require_no_args(args, "zlist")?;
    Ok(OperatorCommand::ZoneList)
}

fn parse_zins(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    const USAGE: &str = "zins <pos> <reset line>";
    let Some((pos, line)) = args.split_first().filter(|(_, line)| !line.is_empty()) else {
        return Err(usage_error("expected a position and a reset line", USAGE));
    };
    Ok(OperatorCommand::ZoneInsert {
        pos: parse_pos(pos, USAGE)?,
        line: line.join(" "),
    })
}

fn parse_zdel(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    const USAGE: &str = "zdel <pos>";
    let [pos] = args else {
        return Err(usage_error("expected exactly one argument <pos>", USAGE));
    };
    Ok(OperatorCommand::ZoneDelete {
        pos: parse_pos(pos, USAGE)?,
    })
}

fn parse_zset(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    const USAGE: &str = "zset <pos> <field> <value>";
    let [pos, field, value @ ..] = args else {
        return Err(usage_error("expected <pos> <field> <value>", USAGE));
    };
    if value.is_empty() {
        return Err(usage_error("missing <value>", USAGE));
    }
    Ok(OperatorCommand::ZoneSet {
        pos: parse_pos(pos, USAGE)?,
        field: field.to_ascii_lowercase(),
        value: value.join(" "),
    })
}

fn parse_zheader(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    let (field, value) = field_and_value(args, "zheader <field> <value>")?;
    Ok(OperatorCommand::ZoneHeader { field, value })
}

fn parse_medit(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    let vnum = single_int(args, "medit <vnum>", "vnum")?;
    Ok(OperatorCommand::MobileEdit { vnum })
}

fn parse_oedit(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    let vnum = single_int(args, "oedit <vnum>", "vnum")?;
    Ok(OperatorCommand::ObjectEdit { vnum })
}

fn parse_pset(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    let (field, value) = field_and_value(args, "pset <field> <value>")?;
    Ok(OperatorCommand::PrototypeSet { field, value })
}

fn parse_purge(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    require_no_args(args, "purge")?;
    Ok(OperatorCommand::Purge)
}

fn parse_commit(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    require_no_args(args, "commit")?;
    Ok(OperatorCommand::Commit)
}

fn parse_discard(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    require_no_args(args, "discard")?;
    Ok(OperatorCommand::Discard)
}

fn parse_save(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    let zone = single_int(args, "save <zone>", "zone")?;
    Ok(OperatorCommand::Save { zone })
}

fn parse_quit(args: &[String]) -> Result<OperatorCommand, CommandParseError> {
    require_no_args(args, "quit")?;
    Ok(OperatorCommand::Quit)
}

fn single_int(args: &[String], usage: &str, what: &str) -> Result<Vnum, CommandParseError> {
    let [value] = args else {
        return Err(usage_error(&format!("expected exactly one argument <{what}>"), usage));
    };
    value
        .parse::<Vnum>()
        .map_err(|_| usage_error(&format!("invalid {what} '{value}' (expected int)"), usage))
}

fn parse_pos(value: &str, usage: &str) -> Result<usize, CommandParseError> {
    value
        .parse::<usize>()
        .map_err(|_| usage_error(&format!("invalid position '{value}' (expected int >= 0)"), usage))
}

fn field_and_value(args: &[String], usage: &str) -> Result<(String, String), CommandParseError> {
    let [field, value @ ..] = args else {
        return Err(usage_error("expected <field> <value>", usage));
    };
    if value.is_empty() {
        return Err(usage_error("missing <value>", usage));
    }
    Ok((field.to_ascii_lowercase(), value.join(" ")))
}

fn require_no_args(args: &[String], usage: &str) -> Result<(), CommandParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(usage_error("unexpected extra arguments", usage))
    }
}

fn usage_error(reason: &str, usage: &str) -> CommandParseError {
    CommandParseError {
        reason: reason.to_string(),
        usage: usage.to_string(),
    }
}
