use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::error::OlcError;
use crate::olc::WorldService;
use crate::registry::{
    MobPayload, ObjPayload, ProtoKind, Prototype, PrototypePayload, PrototypeRegistry,
    PrototypeStore, TriggerRef, Vnum,
};
use crate::world::{CommandDispatcher, LiveWorld, QueuedDispatcher, Shop, ShopTable, SimWorld};
use crate::zone::{Opcode, ResetPolicy, ResetScript, Zone, ZoneHeader, ZoneScheduler, ZoneTable};

use super::atomic_io::write_text_atomic;
use super::defs::{compile_defs, render_prototype_defs, ContentCompileError, DefSet, PrototypeDef, ShopDef};
use super::discovery::{discover_world_sources, ZONE_DIR, ZONE_EXTENSION};
use super::records::{command_from_record, record_from_command, RecordError};
use super::zone_file::{decode_zone_file, encode_zone_file, ZoneFile, ZoneFileError, ZoneFileHeader};

/// The service as it runs in the server: the in-memory world and a queued
/// dispatcher for forced commands.
pub type LoadedWorld = WorldService<SimWorld, QueuedDispatcher>;

#[derive(Debug, Error)]
pub enum WorldLoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Defs(#[from] ContentCompileError),
    #[error("{path}: {source}")]
    ZoneFile {
        path: PathBuf,
        #[source]
        source: ZoneFileError,
    },
    #[error("{path}: {source}")]
    Zone {
        path: PathBuf,
        #[source]
        source: OlcError,
    },
    #[error("prototype table: {0}")]
    Prototypes(#[source] OlcError),
}

#[derive(Debug, Error)]
pub enum WorldSaveError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Olc(#[from] OlcError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub zone_file: PathBuf,
    pub commands: usize,
    pub mobiles: usize,
    pub objects: usize,
}

pub fn zone_file_path(world_dir: &Path, number: Vnum) -> PathBuf {
    world_dir
        .join(ZONE_DIR)
        .join(format!("{number}.{ZONE_EXTENSION}"))
}

pub fn prototype_file_path(world_dir: &Path, kind: ProtoKind, number: Vnum) -> PathBuf {
    let dir = match kind {
        ProtoKind::Mobile => "mob",
        ProtoKind::Object => "obj",
    };
    world_dir.join(dir).join(format!("{number}.xml"))
}

/// Reads definitions and zone files from `world_dir` and builds the service.
/// Reset lines that name unknown prototypes are dropped with a warning,
/// together with the give and equip lines that depended on a dropped mobile.
pub fn load_world(world_dir: &Path, pulses_per_minute: u32) -> Result<LoadedWorld, WorldLoadError> {
    let sources = discover_world_sources(world_dir).map_err(|error| WorldLoadError::Read {
        path: error.path,
        source: error.source,
    })?;
    let defs = compile_defs(&sources.def_files)?;

    let registry = build_registry(&defs)?;
    let world = build_world(&defs);
    let shops = build_shops(&registry, &defs.shops);

    let mut zones = ZoneTable::new();
    let mut dropped = 0;
    for path in &sources.zone_files {
        let raw = fs::read_to_string(path).map_err(|source| WorldLoadError::Read {
            path: path.clone(),
            source,
        })?;
        let file = decode_zone_file(&raw).map_err(|source| WorldLoadError::ZoneFile {
            path: path.clone(),
            source,
        })?;
        let (zone, skipped) = build_zone(&registry, file).map_err(|source| WorldLoadError::Zone {
            path: path.clone(),
            source,
        })?;
        dropped += skipped;
        zones.insert(zone).map_err(|source| WorldLoadError::Zone {
            path: path.clone(),
            source,
        })?;
    }

    info!(
        world_dir = %world_dir.display(),
        mobiles = registry.mobs().len(),
        objects = registry.objs().len(),
        rooms = world.rooms().len(),
        shops = shops.len(),
        zones = zones.len(),
        dropped_commands = dropped,
        "world_loaded"
    );

    Ok(WorldService::new(
        registry,
        zones,
        shops,
        world,
        QueuedDispatcher::new(),
        ZoneScheduler::new(pulses_per_minute),
    ))
}

/// Writes the zone file plus the mobile and object definitions whose vnums
/// fall inside the zone, then clears the zone's unsaved mark.
pub fn save_zone<W: LiveWorld, D: CommandDispatcher>(
    world_dir: &Path,
    service: &mut WorldService<W, D>,
    number: Vnum,
) -> Result<SaveReport, WorldSaveError> {
    let zone = service.zones().require(number)?;
    let records = zone
        .script
        .iter()
        .map(|command| record_from_command(service.registry(), command))
        .collect::<Result<Vec<_>, _>>()?;
    let file = ZoneFile {
        header: ZoneFileHeader {
            number,
            name: zone.header.name.clone(),
            top: zone.header.top,
            lifespan: i32::try_from(zone.header.lifespan).unwrap_or(i32::MAX),
            reset_mode: zone.header.reset_policy.code(),
            extra: Vec::new(),
        },
        records,
    };

    let zone_path = zone_file_path(world_dir, number);
    write(&zone_path, &encode_zone_file(&file))?;

    let header = &zone.header;
    let mobiles = save_prototypes(world_dir, service.registry().mobs(), header)?;
    let objects = save_prototypes(world_dir, service.registry().objs(), header)?;
    let commands = file.records.len();

    service.mark_zone_saved(number);
    info!(zone = number, commands, mobiles, objects, path = %zone_path.display(), "zone_saved");
    Ok(SaveReport {
        zone_file: zone_path,
        commands,
        mobiles,
        objects,
    })
}

fn save_prototypes<P: PrototypePayload>(
    world_dir: &Path,
    store: &PrototypeStore<P>,
    header: &ZoneHeader,
) -> Result<usize, WorldSaveError> {
    let path = prototype_file_path(world_dir, P::KIND, header.number);
    let in_zone = store
        .iter()
        .map(|(_, proto)| proto)
        .filter(|proto| header.contains_room(proto.vnum))
        .collect::<Vec<_>>();
    if in_zone.is_empty() && !path.exists() {
        return Ok(0);
    }
    write(&path, &render_prototype_defs(in_zone.iter().copied()))?;
    Ok(in_zone.len())
}

fn write(path: &Path, text: &str) -> Result<(), WorldSaveError> {
    write_text_atomic(path, text).map_err(|source| WorldSaveError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn build_registry(defs: &DefSet) -> Result<PrototypeRegistry, WorldLoadError> {
    let mobs = PrototypeStore::from_prototypes(
        defs.mobiles
            .iter()
            .map(|def| to_prototype(def, |keywords, short_descr, level| MobPayload {
                keywords,
                short_descr,
                level,
            }))
            .collect(),
    )
    .map_err(WorldLoadError::Prototypes)?;
    let objs = PrototypeStore::from_prototypes(
        defs.objects
            .iter()
            .map(|def| to_prototype(def, |keywords, short_descr, level| ObjPayload {
                keywords,
                short_descr,
                level,
            }))
            .collect(),
    )
    .map_err(WorldLoadError::Prototypes)?;
    Ok(PrototypeRegistry::new(mobs, objs))
}

fn to_prototype<P: PrototypePayload>(def: &PrototypeDef, payload: impl FnOnce(String, String, u32) -> P) -> Prototype<P> {
    Prototype::new(
        def.vnum,
        payload(def.keywords.clone(), def.short_descr.clone(), def.level),
    )
    .with_triggers(def.triggers.iter().copied().map(TriggerRef).collect())
}

fn build_world(defs: &DefSet) -> SimWorld {
    let mut world = SimWorld::new();
    for room in &defs.rooms {
        world.add_room(room.vnum, room.name.clone());
    }
    for room in &defs.rooms {
        for exit in &room.exits {
            world.set_exit(room.vnum, exit.direction, exit.to_room);
        }
    }
    world
}

fn build_shops(registry: &PrototypeRegistry, defs: &[ShopDef]) -> ShopTable {
    let shops = defs
        .iter()
        .map(|def| {
            let keeper = registry.handle_for(ProtoKind::Mobile, def.keeper);
            if keeper.is_none() {
                warn!(shop = def.vnum, keeper = def.keeper, "shop_keeper_unknown");
            }
            let products = def
                .products
                .iter()
                .filter_map(|vnum| {
                    let handle = registry.handle_for(ProtoKind::Object, *vnum);
                    if handle.is_none() {
                        warn!(shop = def.vnum, product = *vnum, "shop_product_unknown");
                    }
                    handle
                })
                .collect();
            Shop {
                vnum: def.vnum,
                keeper,
                products,
            }
        })
        .collect();
    ShopTable::from_shops(shops)
}

fn build_zone(registry: &PrototypeRegistry, file: ZoneFile) -> Result<(Zone, usize), OlcError> {
    let header = zone_header(&file.header)?;
    let mut script = ResetScript::new();
    let mut dropped = 0;
    let mut mob_dropped = false;

    for record in &file.records {
        if record.opcode == Opcode::LoadMobile {
            mob_dropped = false;
        }
        let command = match command_from_record(registry, record) {
            Ok(command) => command,
            Err(error) => {
                if record.opcode == Opcode::LoadMobile {
                    mob_dropped = true;
                }
                log_dropped(header.number, record.line, &error);
                dropped += 1;
                continue;
            }
        };
        if mob_dropped && command.op.targets_last_mob() {
            warn!(
                zone = header.number,
                line = record.line,
                "reset_command_dropped_with_mobile"
            );
            dropped += 1;
            continue;
        }
        script.push(command);
    }

    Ok((Zone::new(header, script), dropped))
}

fn zone_header(raw: &ZoneFileHeader) -> Result<ZoneHeader, OlcError> {
    let lifespan = u32::try_from(raw.lifespan).map_err(|_| {
        OlcError::InvalidZoneHeader(format!("lifespan {} must be >= 0", raw.lifespan))
    })?;
    let reset_policy = ResetPolicy::from_code(raw.reset_mode).ok_or_else(|| {
        OlcError::InvalidZoneHeader(format!("reset mode {} must be 0, 1 or 2", raw.reset_mode))
    })?;
    let header = ZoneHeader {
        number: raw.number,
        name: raw.name.clone(),
        top: raw.top,
        lifespan,
        reset_policy,
    };
    header.validate()?;
    Ok(header)
}

fn log_dropped(zone: Vnum, line: u32, error: &RecordError) {
    warn!(zone, line, error = %error, "reset_command_dropped");
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::olc::{CommandField, HeaderField, PrototypeField};
    use crate::world::{Direction, Location};
    use crate::zone::CommandOutcome;

    const DEFS: &str = r#"<Defs>
        <MobileDef><vnum>3005</vnum><keywords>cityguard guard</keywords><shortDescr>a cityguard</shortDescr><level>10</level></MobileDef>
        <ObjectDef><vnum>3020</vnum><keywords>chest</keywords><shortDescr>a wooden chest</shortDescr></ObjectDef>
        <ObjectDef><vnum>3021</vnum><keywords>torch</keywords><shortDescr>a torch</shortDescr></ObjectDef>
        <ObjectDef><vnum>3022</vnum><keywords>sword</keywords><shortDescr>a long sword</shortDescr></ObjectDef>
    </Defs>"#;

    const ROOMS: &str = r#"<Defs>
        <RoomDef><vnum>3001</vnum><name>The Temple</name><exit dir="north" to="3002"/></RoomDef>
        <RoomDef><vnum>3002</vnum><name>The Square</name><exit dir="south" to="3001"/></RoomDef>
        <ShopDef><vnum>3000</vnum><keeper>3005</keeper><products>3021 4444</products></ShopDef>
    </Defs>"#;

    const ZONE: &str = "#30\nMidgaard~\n3099 10 2\n\
M 0 3005 2 3001 \t(a cityguard)\n\
E 1 3022 5 16 \t(a long sword)\n\
O 0 3020 1 3002 \t(a wooden chest)\n\
P 1 3021 3 3020 \t(a torch)\n\
M 0 9999 1 3001 \t(a ghost)\n\
G 1 3021 5 -1 \t(a torch)\n\
D 0 3001 0 1 \t(north door)\n\
S\n$\n";

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    fn seed_world(dir: &Path) {
        write_file(&dir.join("mob").join("30.xml"), DEFS);
        write_file(&dir.join("wld").join("30.xml"), ROOMS);
        write_file(&zone_file_path(dir, 30), ZONE);
    }

    #[test]
    fn load_drops_unknown_mobile_and_its_dependents() {
        let temp = TempDir::new().expect("temp");
        seed_world(temp.path());

        let service = load_world(temp.path(), 60).expect("load");
        let script = &service.zones().get(30).expect("zone 30").script;
        let opcodes = script.iter().map(|cmd| cmd.opcode().code()).collect::<String>();
        assert_eq!(opcodes, "MEOPD");
        assert_eq!(script.get(4).expect("door").source_line, 10);

        let shop = service.shops().get(3000).expect("shop");
        assert!(shop.keeper.is_some());
        assert_eq!(shop.products.len(), 1);
    }

    #[test]
    fn loaded_world_resets_into_live_instances() {
        let temp = TempDir::new().expect("temp");
        seed_world(temp.path());
        let mut service = load_world(temp.path(), 60).expect("load");

        let reports = service.reset_all();
        assert_eq!(reports.len(), 1);
        assert!(reports[0]
            .commands
            .iter()
            .all(|command| command.outcome == CommandOutcome::Executed));

        let square = service.world().find_room(3002).expect("square");
        let chest = service
            .world()
            .find_obj_in_room(square, service.registry().handle_for(ProtoKind::Object, 3020).expect("chest"))
            .expect("chest instance");
        assert_eq!(service.world().contents(Location::Inside(chest)).len(), 1);
        let flags = service
            .world()
            .exit_flags(3001, Direction::North)
            .expect("temple exit");
        assert!(flags.closed);
    }

    #[test]
    fn edits_survive_save_and_reload() {
        let temp = TempDir::new().expect("temp");
        seed_world(temp.path());
        let mut service = load_world(temp.path(), 60).expect("load");

        let session = service.begin_zone_edit(30).expect("edit");
        let editor = service.session_mut(session).expect("session");
        editor
            .replace_field(0, CommandField::Max(4))
            .expect("max");
        editor
            .set_header_field(HeaderField::Name("Midgaard City".to_string()))
            .expect("name");
        editor.delete_command(4).expect("delete door");
        service.commit(session).expect("commit");

        let mob_edit = service.begin_mobile_edit(3050);
        service
            .session_mut(mob_edit)
            .expect("session")
            .set_prototype_field(PrototypeField::ShortDescr("the baker".to_string()))
            .expect("descr");
        service.commit(mob_edit).expect("commit mob");
        assert!(service.zones().is_unsaved(30));

        let report = save_zone(temp.path(), &mut service, 30).expect("save");
        assert_eq!(report.commands, 4);
        assert_eq!(report.mobiles, 2);
        assert!(!service.zones().is_unsaved(30));

        let saved = fs::read_to_string(&report.zone_file).expect("read zone");
        assert!(saved.starts_with("#30\nMidgaard City~\n3099 10 2\nM 0 3005 4 3001 \t(a cityguard)\n"));

        let reloaded = load_world(temp.path(), 60).expect("reload");
        let zone = reloaded.zones().get(30).expect("zone");
        assert_eq!(zone.header.name, "Midgaard City");
        assert_eq!(zone.script.count(), 4);
        assert!(zone
            .script
            .iter()
            .all(|command| command.opcode() != Opcode::SetDoorState));
        assert_eq!(
            reloaded.registry().mobs().get(3050).expect("baker").payload.short_descr,
            "the baker"
        );
    }

    #[test]
    fn bad_zone_file_reports_path() {
        let temp = TempDir::new().expect("temp");
        seed_world(temp.path());
        write_file(&zone_file_path(temp.path(), 31), "#31\nBroken~\n3199 10 2\nM 0 3005 1\nS\n");

        let err = load_world(temp.path(), 60).expect_err("bad zone");
        match err {
            WorldLoadError::ZoneFile { path, source } => {
                assert!(path.ends_with("31.zon"));
                assert_eq!(source.line, 4);
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
