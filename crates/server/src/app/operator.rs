use std::path::PathBuf;

use tracing::info;
use zone_engine::content::{command_from_record, decode_record, encode_record, record_from_command};
use zone_engine::olc::{CommandField, HeaderField, PrototypeField};
use zone_engine::registry::{ProtoHandle, ProtoKind, TriggerRef};
use zone_engine::world::{Direction, DoorState, WearPosition};
use zone_engine::zone::{CommandOutcome, Opcode, ResetPolicy, ResetReport};
use zone_engine::{save_zone, CommitOutcome, LoadedWorld, SessionId, Vnum};

use super::console::{ConsoleCommandRegistry, OperatorCommand};

/// Output of one operator command.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Reply {
    pub(crate) lines: Vec<String>,
    pub(crate) quit: bool,
}

impl Reply {
    fn lines(lines: Vec<String>) -> Self {
        Self { lines, quit: false }
    }
}

type OpResult = Result<Vec<String>, String>;

/// The console operator: at most one open edit session at a time.
pub(crate) struct Operator {
    world_dir: PathBuf,
    session: Option<SessionId>,
}

impl Operator {
    pub(crate) fn new(world_dir: PathBuf) -> Self {
        Self {
            world_dir,
            session: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub(crate) fn execute(
        &mut self,
        service: &mut LoadedWorld,
        registry: &ConsoleCommandRegistry,
        command: OperatorCommand,
    ) -> Reply {
        let result = match command {
            OperatorCommand::Help => Ok(registry.help_lines()),
            OperatorCommand::Zones => Ok(zone_lines(service)),
            OperatorCommand::Stat => service.snapshot().to_json().map(|json| vec![json]).map_err(|e| e.to_string()),
            OperatorCommand::Reset { zone } => service
                .reset_zone(zone)
                .map(|report| reset_lines(&report))
                .map_err(|e| e.to_string()),
            OperatorCommand::ZoneEdit { zone } => self.begin(service, |service| service.begin_zone_edit(zone)),
            OperatorCommand::ZoneList => self.zone_list(service),
            OperatorCommand::ZoneInsert { pos, line } => self.zone_insert(service, pos, &line),
            OperatorCommand::ZoneDelete { pos } => self.zone_delete(service, pos),
            OperatorCommand::ZoneSet { pos, field, value } => self.zone_set(service, pos, &field, &value),
            OperatorCommand::ZoneHeader { field, value } => self.zone_header(service, &field, &value),
            OperatorCommand::MobileEdit { vnum } => {
                self.begin(service, |service| Ok(service.begin_mobile_edit(vnum)))
            }
            OperatorCommand::ObjectEdit { vnum } => {
                self.begin(service, |service| Ok(service.begin_object_edit(vnum)))
            }
            OperatorCommand::PrototypeSet { field, value } => self.prototype_set(service, &field, &value),
            OperatorCommand::Purge => self.purge(service),
            OperatorCommand::Commit => self.commit(service),
            OperatorCommand::Discard => self.discard(service),
            OperatorCommand::Save { zone } => self.save(service, zone),
            OperatorCommand::Quit => {
                self.on_input_closed(service);
                return Reply {
                    lines: vec!["bye".to_string()],
                    quit: true,
                };
            }
        };
        match result {
            Ok(lines) => Reply::lines(lines),
            Err(reason) => Reply::lines(vec![format!("error: {reason}")]),
        }
    }

    /// The operator went away: whatever session was open is dropped.
    pub(crate) fn on_input_closed(&mut self, service: &mut LoadedWorld) {
        if let Some(id) = self.session.take() {
            service.teardown_session(id);
        }
    }

    fn open_session(&self) -> Result<SessionId, String> {
        self.session
            .ok_or_else(|| "no open session; start one with zedit, medit or oedit".to_string())
    }

    fn begin(
        &mut self,
        service: &mut LoadedWorld,
        open: impl FnOnce(&mut LoadedWorld) -> Result<SessionId, zone_engine::OlcError>,
    ) -> OpResult {
        if let Some(id) = self.session {
            return Err(format!("session {id} is still open; commit or discard it first"));
        }
        let id = open(service).map_err(|e| e.to_string())?;
        self.session = Some(id);
        let target = service.session(id).map_err(|e| e.to_string())?.target();
        Ok(vec![format!("session {id} editing {target}")])
    }

    fn zone_list(&self, service: &LoadedWorld) -> OpResult {
        let id = self.open_session()?;
        let script = service
            .session(id)
            .and_then(|session| session.script())
            .map_err(|e| e.to_string())?;
        if script.is_empty() {
            return Ok(vec!["(no reset commands)".to_string()]);
        }
        Ok(script
            .iter()
            .enumerate()
            .map(|(pos, command)| match record_from_command(service.registry(), command) {
                Ok(record) => format!("{pos:>3}) {}", encode_record(&record)),
                Err(error) => format!("{pos:>3}) <{error}>"),
            })
            .collect())
    }

    fn zone_insert(&self, service: &mut LoadedWorld, pos: usize, line: &str) -> OpResult {
        let id = self.open_session()?;
        let record = decode_record(0, line).map_err(|e| e.to_string())?;
        let command = command_from_record(service.registry(), &record).map_err(|e| e.to_string())?;
        service
            .session_mut(id)
            .and_then(|session| session.insert_command(pos, command))
            .map_err(|e| e.to_string())?;
        Ok(vec![format!("inserted at {pos}")])
    }

    fn zone_delete(&self, service: &mut LoadedWorld, pos: usize) -> OpResult {
        let id = self.open_session()?;
        let removed = service
            .session_mut(id)
            .and_then(|session| session.delete_command(pos))
            .map_err(|e| e.to_string())?;
        Ok(vec![format!("deleted {} command at {pos}", removed.opcode().code())])
    }

    fn zone_set(&self, service: &mut LoadedWorld, pos: usize, field: &str, value: &str) -> OpResult {
        let id = self.open_session()?;
        let opcode = service
            .session(id)
            .and_then(|session| session.script())
            .map_err(|e| e.to_string())?
            .get(pos)
            .map(|command| command.opcode())
            .ok_or_else(|| format!("no reset command at {pos}"))?;
        let field = command_field(service, opcode, field, value)?;
        service
            .session_mut(id)
            .and_then(|session| session.replace_field(pos, field))
            .map_err(|e| e.to_string())?;
        Ok(vec![format!("updated command {pos}")])
    }

    fn zone_header(&self, service: &mut LoadedWorld, field: &str, value: &str) -> OpResult {
        let id = self.open_session()?;
        let field = match field {
            "name" => HeaderField::Name(value.to_string()),
            "top" => HeaderField::Top(parse_number(value, "top room")?),
            "lifespan" => HeaderField::Lifespan(parse_number(value, "lifespan")?),
            "mode" => HeaderField::ResetPolicy(parse_policy(value)?),
            other => return Err(format!("unknown header field '{other}' (expected name|top|lifespan|mode)")),
        };
        service
            .session_mut(id)
            .and_then(|session| session.set_header_field(field))
            .map_err(|e| e.to_string())?;
        Ok(vec!["header updated".to_string()])
    }

    fn prototype_set(&self, service: &mut LoadedWorld, field: &str, value: &str) -> OpResult {
        let id = self.open_session()?;
        let field = match field {
            "keywords" => PrototypeField::Keywords(value.to_string()),
            "short" => PrototypeField::ShortDescr(value.to_string()),
            "level" => PrototypeField::Level(parse_number(value, "level")?),
            "triggers" if value.eq_ignore_ascii_case("none") => PrototypeField::Triggers(Vec::new()),
            "triggers" => PrototypeField::Triggers(
                value
                    .split_whitespace()
                    .map(|token| parse_number::<Vnum>(token, "trigger vnum").map(TriggerRef))
                    .collect::<Result<_, _>>()?,
            ),
            other => {
                return Err(format!(
                    "unknown prototype field '{other}' (expected keywords|short|level|triggers)"
                ))
            }
        };
        service
            .session_mut(id)
            .and_then(|session| session.set_prototype_field(field))
            .map_err(|e| e.to_string())?;
        Ok(vec!["prototype field updated".to_string()])
    }

    fn purge(&self, service: &mut LoadedWorld) -> OpResult {
        let id = self.open_session()?;
        service
            .session_mut(id)
            .and_then(|session| session.request_purge())
            .map_err(|e| e.to_string())?;
        Ok(vec!["prototype will be purged on commit".to_string()])
    }

    fn commit(&mut self, service: &mut LoadedWorld) -> OpResult {
        let id = self.open_session()?;
        let outcome = service.commit(id).map_err(|e| format!("{e}; session {id} stays open"))?;
        self.session = None;
        Ok(vec![describe_commit(&outcome)])
    }

    fn discard(&mut self, service: &mut LoadedWorld) -> OpResult {
        let id = self.open_session()?;
        service.discard(id).map_err(|e| e.to_string())?;
        self.session = None;
        Ok(vec![format!("session {id} discarded")])
    }

    fn save(&self, service: &mut LoadedWorld, zone: Vnum) -> OpResult {
        let report = save_zone(&self.world_dir, service, zone).map_err(|e| e.to_string())?;
        info!(zone, path = %report.zone_file.display(), "operator_saved_zone");
        Ok(vec![format!(
            "zone {zone} saved to {} ({} commands, {} mobiles, {} objects)",
            report.zone_file.display(),
            report.commands,
            report.mobiles,
            report.objects
        )])
    }
}

fn zone_lines(service: &LoadedWorld) -> Vec<String> {
    service
        .zones()
        .iter()
        .map(|zone| {
            let mut line = format!(
                "{:>4} {:<24} [{}-{}] age {}/{} {} {} cmds",
                zone.number(),
                zone.header.name,
                zone.header.bottom(),
                zone.header.top,
                zone.age,
                zone.header.lifespan,
                zone.header.reset_policy.label(),
                zone.script.count()
            );
            if service.scheduler().is_queued(zone.number()) {
                line.push_str(" queued");
            }
            if service.zones().is_unsaved(zone.number()) {
                line.push_str(" unsaved");
            }
            line
        })
        .collect()
}

fn reset_lines(report: &ResetReport) -> Vec<String> {
    let mut lines = vec![format!(
        "zone {} reset: {} executed, {} failed, {} skipped",
        report.zone,
        report.executed(),
        report.failed(),
        report.skipped()
    )];
    for command in &report.commands {
        if let CommandOutcome::Failed(failure) = &command.outcome {
            lines.push(format!(
                "  {}) {} line {}: {failure:?}",
                command.position,
                command.opcode.code(),
                command.source_line
            ));
        }
    }
    lines
}

fn describe_commit(outcome: &CommitOutcome) -> String {
    match outcome {
        CommitOutcome::ZoneReplaced { zone, commands } => {
            format!("zone {zone} committed ({commands} commands)")
        }
        CommitOutcome::PrototypeReplaced { handle, refreshed } => {
            format!("{handle} updated; {refreshed} live instance(s) refreshed")
        }
        CommitOutcome::PrototypeInserted { handle, fixup } => format!(
            "inserted as {handle}; {} reference(s) shifted, {} removed",
            fixup.shifted(),
            fixup.removed()
        ),
        CommitOutcome::PrototypePurged {
            kind,
            vnum,
            extracted,
            fixup,
        } => match fixup {
            Some(fixup) => format!(
                "{kind} {vnum} purged; {extracted} instance(s) extracted, {} reference(s) removed",
                fixup.removed()
            ),
            None => format!("{kind} {vnum} was never committed; nothing to purge"),
        },
    }
}

fn command_field(service: &LoadedWorld, opcode: Opcode, field: &str, value: &str) -> Result<CommandField, String> {
    let field = match field {
        "if" => CommandField::Conditional(match value {
            "0" => false,
            "1" => true,
            other => return Err(format!("if-flag must be 0 or 1, found '{other}'")),
        }),
        "max" => CommandField::Max(parse_number(value, "max")?),
        "room" => {
            let room = parse_number::<Vnum>(value, "room vnum")?;
            CommandField::Room((room >= 0).then_some(room))
        }
        "proto" => {
            let kind = match opcode {
                Opcode::LoadMobile | Opcode::ForceMobCommand => ProtoKind::Mobile,
                _ => ProtoKind::Object,
            };
            CommandField::Prototype(handle(service, kind, value)?)
        }
        "container" => CommandField::Container(handle(service, ProtoKind::Object, value)?),
        "wear" => CommandField::Position(
            WearPosition::new(parse_number(value, "wear position")?)
                .ok_or_else(|| format!("wear position {value} is out of range"))?,
        ),
        "dir" => CommandField::Direction(
            Direction::from_name(value)
                .or_else(|| value.parse().ok().and_then(Direction::from_index))
                .ok_or_else(|| format!("unknown direction '{value}'"))?,
        ),
        "state" => CommandField::DoorState(
            DoorState::from_code(parse_number(value, "door state")?)
                .ok_or_else(|| format!("door state {value} is unknown"))?,
        ),
        "text" => CommandField::Text(value.to_string()),
        other => return Err(format!("unknown command field '{other}'")),
    };
    Ok(field)
}

fn handle(service: &LoadedWorld, kind: ProtoKind, value: &str) -> Result<ProtoHandle, String> {
    let vnum = parse_number::<Vnum>(value, "vnum")?;
    service
        .registry()
        .handle_for(kind, vnum)
        .ok_or_else(|| format!("no {kind} with vnum {vnum}"))
}

fn parse_policy(value: &str) -> Result<ResetPolicy, String> {
    [ResetPolicy::Never, ResetPolicy::WhenEmpty, ResetPolicy::Always]
        .into_iter()
        .find(|policy| policy.label() == value)
        .or_else(|| value.parse().ok().and_then(ResetPolicy::from_code))
        .ok_or_else(|| format!("unknown reset mode '{value}' (expected never|when-empty|always)"))
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("invalid {what} '{value}'"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;
    use zone_engine::load_world;
    use zone_engine::world::{LiveWorld, Location};

    use super::*;

    const MOBS: &str = r#"<Defs><MobileDef><vnum>3005</vnum><keywords>cityguard</keywords><shortDescr>a cityguard</shortDescr></MobileDef></Defs>"#;
    const OBJS: &str = r#"<Defs><ObjectDef><vnum>3021</vnum><keywords>torch</keywords><shortDescr>a torch</shortDescr></ObjectDef></Defs>"#;
    const ROOMS: &str = r#"<Defs><RoomDef><vnum>3001</vnum><name>The Temple</name></RoomDef></Defs>"#;

    const ZONE: &str = "#30\nMidgaard~\n3099 10 2\nM 0 3005 2 3001 \t(a cityguard)\nG 1 3021 5 -1 \t(a torch)\nS\n$\n";

    struct Harness {
        _temp: TempDir,
        service: LoadedWorld,
        operator: Operator,
        registry: ConsoleCommandRegistry,
    }

    impl Harness {
        fn new() -> Self {
            let temp = TempDir::new().expect("temp");
            write_file(&temp.path().join("mob").join("30.xml"), MOBS);
            write_file(&temp.path().join("obj").join("30.xml"), OBJS);
            write_file(&temp.path().join("wld").join("30.xml"), ROOMS);
            write_file(&temp.path().join("zon").join("30.zon"), ZONE);
            let service = load_world(temp.path(), 60).expect("load");
            let operator = Operator::new(temp.path().to_path_buf());
            Self {
                _temp: temp,
                service,
                operator,
                registry: ConsoleCommandRegistry::with_operator_commands(),
            }
        }

        fn run(&mut self, line: &str) -> Reply {
            let command = self
                .registry
                .parse_line(line)
                .expect("parse")
                .expect("command");
            self.operator.execute(&mut self.service, &self.registry, command)
        }
    }

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    #[test]
    fn zone_edit_session_inserts_lists_and_commits() {
        let mut harness = Harness::new();
        assert!(harness.run("zedit 30").lines[0].starts_with("session #"));
        harness.run("zins 1 O 0 3021 1 3001");
        harness.run("zset 0 max 4");

        let listing = harness.run("zlist").lines;
        assert_eq!(listing.len(), 3);
        assert_eq!(listing[0], "  0) M 0 3005 4 3001 \t(a cityguard)");
        assert_eq!(listing[1], "  1) O 0 3021 1 3001 \t(a torch)");

        assert_eq!(harness.run("commit").lines, vec!["zone 30 committed (3 commands)"]);
        assert_eq!(harness.operator.session(), None);
        assert_eq!(harness.service.zones().get(30).expect("zone").script.count(), 3);
    }

    #[test]
    fn edit_commands_need_an_open_session() {
        let mut harness = Harness::new();
        let reply = harness.run("zdel 0");
        assert_eq!(
            reply.lines,
            vec!["error: no open session; start one with zedit, medit or oedit"]
        );

        harness.run("medit 3050");
        let reply = harness.run("zedit 30");
        assert!(reply.lines[0].contains("is still open"));
        let reply = harness.run("zlist");
        assert!(reply.lines[0].starts_with("error:"));
    }

    #[test]
    fn purge_extracts_instances_and_drops_reset_lines() {
        let mut harness = Harness::new();
        harness.run("reset 30");
        assert_eq!(harness.service.world().instance_count(), 2);

        harness.run("medit 3005");
        harness.run("purge");
        let reply = harness.run("commit");
        assert!(reply.lines[0].starts_with("mobile 3005 purged; 1 instance(s) extracted"));
        assert!(harness.service.zones().get(30).expect("zone").script.is_empty());

        // The torch the guard carried is dropped in the temple.
        let world = harness.service.world();
        assert_eq!(world.instance_count(), 1);
        let temple = world.find_room(3001).expect("temple");
        assert_eq!(world.contents(Location::Room(temple)).len(), 1);
        let torch = harness
            .service
            .registry()
            .handle_for(ProtoKind::Object, 3021)
            .expect("torch");
        assert_eq!(harness.service.registry().instance_count(torch), Ok(1));
    }

    #[test]
    fn input_close_tears_down_the_session() {
        let mut harness = Harness::new();
        harness.run("zedit 30");
        harness.run("zdel 0");
        assert_eq!(harness.service.sessions().len(), 1);

        harness.operator.on_input_closed(&mut harness.service);
        assert!(harness.service.sessions().is_empty());
        assert_eq!(harness.service.zones().get(30).expect("zone").script.count(), 2);
    }

    #[test]
    fn save_writes_zone_file_and_quit_ends_the_loop() {
        let mut harness = Harness::new();
        harness.run("zedit 30");
        harness.run("zheader name Midgaard Proper");
        harness.run("commit");

        let reply = harness.run("save 30");
        assert!(reply.lines[0].starts_with("zone 30 saved to"));
        let zones = harness.run("zones").lines;
        assert!(zones[0].contains("Midgaard Proper"));
        assert!(!zones[0].ends_with("unsaved"));

        let reply = harness.run("quit");
        assert!(reply.quit);
    }
}
