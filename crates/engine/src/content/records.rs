use thiserror::Error;

use crate::error::OlcError;
use crate::registry::{ProtoHandle, ProtoKind, PrototypeRegistry, Vnum};
use crate::world::{Direction, DoorState, WearPosition};
use crate::zone::{Opcode, ResetCommand, ResetOp};

use super::zone_file::ZoneRecord;

/// Why an on-disk reset line could not become a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{kind} vnum {vnum} is not loaded")]
    UnknownPrototype { kind: ProtoKind, vnum: Vnum },
    #[error("{0}")]
    InvalidValue(String),
}

/// Resolves the vnums of `record` into handles.
pub fn command_from_record(
    registry: &PrototypeRegistry,
    record: &ZoneRecord,
) -> Result<ResetCommand, RecordError> {
    let [a1, a2, a3] = record.args;
    let mob = |vnum| resolve(registry, ProtoKind::Mobile, vnum);
    let obj = |vnum| resolve(registry, ProtoKind::Object, vnum);

    let op = match record.opcode {
        Opcode::LoadMobile => ResetOp::LoadMobile {
            mob: mob(a1)?,
            max: max_count(a2)?,
            room: a3,
        },
        Opcode::LoadObject => ResetOp::LoadObject {
            obj: obj(a1)?,
            max: max_count(a2)?,
            room: (a3 >= 0).then_some(a3),
        },
        Opcode::GiveToMob => ResetOp::GiveToMob {
            obj: obj(a1)?,
            max: max_count(a2)?,
        },
        Opcode::EquipToMob => ResetOp::EquipToMob {
            obj: obj(a1)?,
            max: max_count(a2)?,
            position: WearPosition::new(a3).ok_or_else(|| {
                RecordError::InvalidValue(format!("wear position {a3} is out of range"))
            })?,
        },
        Opcode::PutInContainer => ResetOp::PutInContainer {
            obj: obj(a1)?,
            max: max_count(a2)?,
            container: obj(a3)?,
        },
        Opcode::RemoveFromRoom => ResetOp::RemoveFromRoom {
            room: a1,
            obj: obj(a2)?,
        },
        Opcode::SetDoorState => ResetOp::SetDoorState {
            room: a1,
            direction: Direction::from_index(a2).ok_or_else(|| {
                RecordError::InvalidValue(format!("door direction {a2} is out of range"))
            })?,
            state: DoorState::from_code(a3)
                .ok_or_else(|| RecordError::InvalidValue(format!("door state {a3} is unknown")))?,
        },
        Opcode::ForceMobCommand => ResetOp::ForceMobCommand {
            mob: mob(a1)?,
            command: record
                .text
                .clone()
                .filter(|text| !text.trim().is_empty())
                .ok_or_else(|| RecordError::InvalidValue("forced command is empty".to_string()))?,
        },
    };

    Ok(ResetCommand::new(op, record.conditional).at_line(record.line))
}

/// Turns a command back into vnum operands, commented with the short
/// description of the prototype it loads.
pub fn record_from_command(
    registry: &PrototypeRegistry,
    command: &ResetCommand,
) -> Result<ZoneRecord, OlcError> {
    let vnum = |handle: ProtoHandle| registry.vnum_of(handle);
    let descr = |handle: ProtoHandle| registry.short_descr(handle).map(str::to_string);

    let (args, comment) = match &command.op {
        ResetOp::LoadMobile { mob, max, room } => ([vnum(*mob)?, count_arg(*max), *room], descr(*mob)?),
        ResetOp::LoadObject { obj, max, room } => {
            ([vnum(*obj)?, count_arg(*max), room.unwrap_or(-1)], descr(*obj)?)
        }
        ResetOp::GiveToMob { obj, max } => ([vnum(*obj)?, count_arg(*max), -1], descr(*obj)?),
        ResetOp::EquipToMob { obj, max, position } => (
            [vnum(*obj)?, count_arg(*max), i32::from(position.slot())],
            descr(*obj)?,
        ),
        ResetOp::PutInContainer {
            obj,
            max,
            container,
        } => ([vnum(*obj)?, count_arg(*max), vnum(*container)?], descr(*obj)?),
        ResetOp::RemoveFromRoom { room, obj } => ([*room, vnum(*obj)?, -1], descr(*obj)?),
        ResetOp::SetDoorState {
            room,
            direction,
            state,
        } => (
            [*room, direction.index() as i32, state.code()],
            format!("{} door", direction.name()),
        ),
        ResetOp::ForceMobCommand { mob, command: text } => {
            return Ok(ZoneRecord::force(command.conditional, vnum(*mob)?, text.clone())
                .with_line(command.source_line));
        }
    };

    Ok(ZoneRecord::new(command.opcode(), command.conditional, args)
        .with_comment(comment)
        .with_line(command.source_line))
}

fn resolve(registry: &PrototypeRegistry, kind: ProtoKind, vnum: Vnum) -> Result<ProtoHandle, RecordError> {
    registry
        .handle_for(kind, vnum)
        .ok_or(RecordError::UnknownPrototype { kind, vnum })
}

fn max_count(value: i32) -> Result<u32, RecordError> {
    u32::try_from(value)
        .map_err(|_| RecordError::InvalidValue(format!("population cap {value} must be >= 0")))
}

fn count_arg(max: u32) -> i32 {
    i32::try_from(max).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::zone_file::decode_record;
    use crate::registry::{MobPayload, ObjPayload, Prototype, PrototypeStore};

    fn registry() -> PrototypeRegistry {
        let mobs = PrototypeStore::from_prototypes(vec![Prototype::new(
            3005,
            MobPayload {
                keywords: "cityguard".to_string(),
                short_descr: "a cityguard".to_string(),
                level: 10,
            },
        )])
        .expect("mobs");
        let objs = PrototypeStore::from_prototypes(vec![
            Prototype::new(
                3020,
                ObjPayload {
                    keywords: "chest".to_string(),
                    short_descr: "a wooden chest".to_string(),
                    level: 1,
                },
            ),
            Prototype::new(
                3021,
                ObjPayload {
                    keywords: "torch".to_string(),
                    short_descr: "a torch".to_string(),
                    level: 1,
                },
            ),
        ])
        .expect("objs");
        PrototypeRegistry::new(mobs, objs)
    }

    #[test]
    fn records_resolve_and_encode_back_with_comments() {
        let registry = registry();
        let lines = [
            "M 0 3005 2 3001 \t(a cityguard)",
            "O 0 3020 1 -1 \t(a wooden chest)",
            "P 1 3021 3 3020 \t(a torch)",
            "E 1 3021 1 6 \t(a torch)",
            "R 0 3001 3021 -1 \t(a torch)",
            "D 0 3001 2 1 \t(south door)",
            "F 1 3005 say Halt!",
        ];
        for (index, line) in lines.iter().enumerate() {
            let record = decode_record(index as u32 + 1, line).expect("decode");
            let command = command_from_record(&registry, &record).expect("resolve");
            assert_eq!(command.source_line, index as u32 + 1);
            let back = record_from_command(&registry, &command).expect("encode");
            assert_eq!(back, record, "line {line}");
        }
    }

    #[test]
    fn unknown_prototype_and_bad_values_are_distinguished() {
        let registry = registry();
        let record = decode_record(1, "G 1 9999 5 -1").expect("decode");
        assert_eq!(
            command_from_record(&registry, &record),
            Err(RecordError::UnknownPrototype {
                kind: ProtoKind::Object,
                vnum: 9999
            })
        );

        let record = decode_record(2, "D 0 3001 9 1").expect("decode");
        assert!(matches!(
            command_from_record(&registry, &record),
            Err(RecordError::InvalidValue(_))
        ));

        let record = decode_record(3, "M 0 3005 -2 3001").expect("decode");
        assert!(matches!(
            command_from_record(&registry, &record),
            Err(RecordError::InvalidValue(_))
        ));
    }
}
