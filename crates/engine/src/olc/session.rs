use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::OlcError;
use crate::registry::{
    MobPayload, ObjPayload, ProtoHandle, ProtoKind, Prototype, PrototypePayload, TriggerRef, Vnum,
};
use crate::world::{Direction, DoorState, RoomVnum, WearPosition};
use crate::zone::{ResetCommand, ResetOp, ResetPolicy, ResetScript, ZoneHeader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EditTarget {
    Zone(Vnum),
    Prototype { kind: ProtoKind, vnum: Vnum },
}

impl fmt::Display for EditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zone(number) => write!(f, "zone {number}"),
            Self::Prototype { kind, vnum } => write!(f, "{kind} {vnum}"),
        }
    }
}

/// One operand of a reset command, for `replace_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandField {
    Conditional(bool),
    Max(u32),
    Room(Option<RoomVnum>),
    Prototype(ProtoHandle),
    Container(ProtoHandle),
    Position(WearPosition),
    Direction(Direction),
    DoorState(DoorState),
    Text(String),
}

impl CommandField {
    fn name(&self) -> &'static str {
        match self {
            Self::Conditional(_) => "conditional",
            Self::Max(_) => "max",
            Self::Room(_) => "room",
            Self::Prototype(_) => "prototype",
            Self::Container(_) => "container",
            Self::Position(_) => "position",
            Self::Direction(_) => "direction",
            Self::DoorState(_) => "door state",
            Self::Text(_) => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderField {
    Name(String),
    Top(RoomVnum),
    Lifespan(u32),
    ResetPolicy(ResetPolicy),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrototypeField {
    Keywords(String),
    ShortDescr(String),
    Level(u32),
    Triggers(Vec<TriggerRef>),
}

/// Staged copy of a prototype. Drafts are keyed by vnum and hold no handle,
/// so store shifts never touch them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrototypeDraft<P> {
    pub vnum: Vnum,
    pub payload: P,
    pub triggers: Vec<TriggerRef>,
    /// The vnum was not in the store when the session began.
    pub is_new: bool,
    pub purge: bool,
}

impl<P: PrototypePayload> PrototypeDraft<P> {
    pub fn from_existing(proto: &Prototype<P>) -> Self {
        Self {
            vnum: proto.vnum,
            payload: proto.payload.clone(),
            triggers: proto.triggers.clone(),
            is_new: false,
            purge: false,
        }
    }

    pub fn blank(vnum: Vnum) -> Self {
        let mut payload = P::default();
        payload.set_keywords(format!("{} new", P::KIND.label()));
        payload.set_short_descr(format!("a new {}", P::KIND.label()));
        Self {
            vnum,
            payload,
            triggers: Vec::new(),
            is_new: true,
            purge: false,
        }
    }

    fn apply(&mut self, field: PrototypeField) {
        match field {
            PrototypeField::Keywords(keywords) => self.payload.set_keywords(keywords),
            PrototypeField::ShortDescr(short_descr) => self.payload.set_short_descr(short_descr),
            PrototypeField::Level(level) => self.payload.set_level(level),
            PrototypeField::Triggers(triggers) => self.triggers = triggers,
        }
    }

    pub fn to_prototype(&self) -> Prototype<P> {
        Prototype::new(self.vnum, self.payload.clone()).with_triggers(self.triggers.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scratch {
    Zone {
        header: ZoneHeader,
        script: ResetScript,
    },
    Mobile(PrototypeDraft<MobPayload>),
    Object(PrototypeDraft<ObjPayload>),
}

/// A private staged copy of one zone or prototype. Nothing here is visible
/// to the game until `WorldService::commit`.
#[derive(Debug, Clone)]
pub struct EditSession {
    id: SessionId,
    target: EditTarget,
    scratch: Scratch,
    dirty: bool,
}

impl EditSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn target(&self) -> EditTarget {
        self.target
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn script(&self) -> Result<&ResetScript, OlcError> {
        match &self.scratch {
            Scratch::Zone { script, .. } => Ok(script),
            _ => Err(wrong_kind(self.id, "a zone")),
        }
    }

    pub fn insert_command(&mut self, pos: usize, command: ResetCommand) -> Result<(), OlcError> {
        self.script_mut()?.insert_at(pos, command)?;
        self.dirty = true;
        Ok(())
    }

    pub fn delete_command(&mut self, pos: usize) -> Result<ResetCommand, OlcError> {
        let removed = self.script_mut()?.remove_at(pos)?;
        self.dirty = true;
        Ok(removed)
    }

    pub fn replace_command(&mut self, pos: usize, command: ResetCommand) -> Result<ResetCommand, OlcError> {
        let replaced = self.script_mut()?.replace_at(pos, command)?;
        self.dirty = true;
        Ok(replaced)
    }

    /// Changes one operand of the command at `pos`. Fields the command's
    /// opcode does not carry are rejected.
    pub fn replace_field(&mut self, pos: usize, field: CommandField) -> Result<(), OlcError> {
        let command = self.script_mut()?.get_mut(pos)?;
        set_command_field(command, field)?;
        self.dirty = true;
        Ok(())
    }

    pub fn set_header_field(&mut self, field: HeaderField) -> Result<(), OlcError> {
        let header = match &mut self.scratch {
            Scratch::Zone { header, .. } => header,
            _ => return Err(wrong_kind(self.id, "a zone")),
        };
        match field {
            HeaderField::Name(name) => header.name = name,
            HeaderField::Top(top) => header.top = top,
            HeaderField::Lifespan(lifespan) => header.lifespan = lifespan,
            HeaderField::ResetPolicy(policy) => header.reset_policy = policy,
        }
        self.dirty = true;
        Ok(())
    }

    pub fn set_prototype_field(&mut self, field: PrototypeField) -> Result<(), OlcError> {
        match &mut self.scratch {
            Scratch::Mobile(draft) => draft.apply(field),
            Scratch::Object(draft) => draft.apply(field),
            Scratch::Zone { .. } => return Err(wrong_kind(self.id, "a prototype")),
        }
        self.dirty = true;
        Ok(())
    }

    /// Marks the prototype for removal on commit.
    pub fn request_purge(&mut self) -> Result<(), OlcError> {
        match &mut self.scratch {
            Scratch::Mobile(draft) => draft.purge = true,
            Scratch::Object(draft) => draft.purge = true,
            Scratch::Zone { .. } => return Err(wrong_kind(self.id, "a prototype")),
        }
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn script_mut(&mut self) -> Result<&mut ResetScript, OlcError> {
        match &mut self.scratch {
            Scratch::Zone { script, .. } => Ok(script),
            _ => Err(wrong_kind(self.id, "a zone")),
        }
    }
}

fn wrong_kind(session: SessionId, expected: &'static str) -> OlcError {
    OlcError::WrongSessionKind { session, expected }
}

fn set_command_field(command: &mut ResetCommand, field: CommandField) -> Result<(), OlcError> {
    let opcode = command.opcode().code();
    let not_applicable = |field: &CommandField| OlcError::FieldNotApplicable {
        field: field.name(),
        opcode,
    };

    match (&mut command.op, field) {
        (_, CommandField::Conditional(conditional)) => command.conditional = conditional,
        (
            ResetOp::LoadMobile { max, .. }
            | ResetOp::LoadObject { max, .. }
            | ResetOp::GiveToMob { max, .. }
            | ResetOp::EquipToMob { max, .. }
            | ResetOp::PutInContainer { max, .. },
            CommandField::Max(value),
        ) => *max = value,
        (ResetOp::LoadObject { room, .. }, CommandField::Room(value)) => *room = value,
        (
            ResetOp::LoadMobile { room, .. }
            | ResetOp::RemoveFromRoom { room, .. }
            | ResetOp::SetDoorState { room, .. },
            CommandField::Room(Some(value)),
        ) => *room = value,
        (
            ResetOp::LoadMobile { mob, .. } | ResetOp::ForceMobCommand { mob, .. },
            CommandField::Prototype(handle),
        ) if handle.kind() == ProtoKind::Mobile => *mob = handle,
        (
            ResetOp::LoadObject { obj, .. }
            | ResetOp::GiveToMob { obj, .. }
            | ResetOp::EquipToMob { obj, .. }
            | ResetOp::PutInContainer { obj, .. }
            | ResetOp::RemoveFromRoom { obj, .. },
            CommandField::Prototype(handle),
        ) if handle.kind() == ProtoKind::Object => *obj = handle,
        (ResetOp::PutInContainer { container, .. }, CommandField::Container(handle))
            if handle.kind() == ProtoKind::Object =>
        {
            *container = handle
        }
        (ResetOp::EquipToMob { position, .. }, CommandField::Position(value)) => *position = value,
        (ResetOp::SetDoorState { direction, .. }, CommandField::Direction(value)) => *direction = value,
        (ResetOp::SetDoorState { state, .. }, CommandField::DoorState(value)) => *state = value,
        (ResetOp::ForceMobCommand { command: text, .. }, CommandField::Text(value)) => *text = value,
        (_, other) => return Err(not_applicable(&other)),
    }
    Ok(())
}

/// Open edit sessions. Any number may target the same zone or prototype;
/// the last commit wins.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_id: u32,
    sessions: BTreeMap<SessionId, EditSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: SessionId) -> Result<&EditSession, OlcError> {
        self.sessions.get(&id).ok_or(OlcError::UnknownSession(id))
    }

    pub fn get_mut(&mut self, id: SessionId) -> Result<&mut EditSession, OlcError> {
        self.sessions.get_mut(&id).ok_or(OlcError::UnknownSession(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EditSession> {
        self.sessions.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut EditSession> {
        self.sessions.values_mut()
    }

    pub(crate) fn open(&mut self, target: EditTarget, scratch: Scratch) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.sessions.insert(
            id,
            EditSession {
                id,
                target,
                scratch,
                dirty: false,
            },
        );
        id
    }

    pub(crate) fn take(&mut self, id: SessionId) -> Result<EditSession, OlcError> {
        self.sessions.remove(&id).ok_or(OlcError::UnknownSession(id))
    }
}
