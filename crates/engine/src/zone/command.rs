use serde::Serialize;

use crate::registry::ProtoHandle;
use crate::world::{Direction, DoorState, RoomVnum, WearPosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Opcode {
    LoadMobile,
    LoadObject,
    GiveToMob,
    EquipToMob,
    PutInContainer,
    RemoveFromRoom,
    SetDoorState,
    ForceMobCommand,
}

impl Opcode {
    pub const ALL: [Opcode; 8] = [
        Opcode::LoadMobile,
        Opcode::LoadObject,
        Opcode::GiveToMob,
        Opcode::EquipToMob,
        Opcode::PutInContainer,
        Opcode::RemoveFromRoom,
        Opcode::SetDoorState,
        Opcode::ForceMobCommand,
    ];

    pub fn code(self) -> char {
        match self {
            Self::LoadMobile => 'M',
            Self::LoadObject => 'O',
            Self::GiveToMob => 'G',
            Self::EquipToMob => 'E',
            Self::PutInContainer => 'P',
            Self::RemoveFromRoom => 'R',
            Self::SetDoorState => 'D',
            Self::ForceMobCommand => 'F',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }
}

/// One reset instruction with its operands typed per opcode.
///
/// Prototype operands are handles and get rewritten by fixup; room operands
/// stay vnums and are resolved when the command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOp {
    LoadMobile {
        mob: ProtoHandle,
        max: u32,
        room: RoomVnum,
    },
    LoadObject {
        obj: ProtoHandle,
        max: u32,
        room: Option<RoomVnum>,
    },
    GiveToMob {
        obj: ProtoHandle,
        max: u32,
    },
    EquipToMob {
        obj: ProtoHandle,
        max: u32,
        position: WearPosition,
    },
    PutInContainer {
        obj: ProtoHandle,
        max: u32,
        container: ProtoHandle,
    },
    RemoveFromRoom {
        room: RoomVnum,
        obj: ProtoHandle,
    },
    SetDoorState {
        room: RoomVnum,
        direction: Direction,
        state: DoorState,
    },
    ForceMobCommand {
        mob: ProtoHandle,
        command: String,
    },
}

impl ResetOp {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::LoadMobile { .. } => Opcode::LoadMobile,
            Self::LoadObject { .. } => Opcode::LoadObject,
            Self::GiveToMob { .. } => Opcode::GiveToMob,
            Self::EquipToMob { .. } => Opcode::EquipToMob,
            Self::PutInContainer { .. } => Opcode::PutInContainer,
            Self::RemoveFromRoom { .. } => Opcode::RemoveFromRoom,
            Self::SetDoorState { .. } => Opcode::SetDoorState,
            Self::ForceMobCommand { .. } => Opcode::ForceMobCommand,
        }
    }

    pub fn proto_refs(&self) -> Vec<ProtoHandle> {
        match self {
            Self::LoadMobile { mob, .. } | Self::ForceMobCommand { mob, .. } => vec![*mob],
            Self::LoadObject { obj, .. }
            | Self::GiveToMob { obj, .. }
            | Self::EquipToMob { obj, .. }
            | Self::RemoveFromRoom { obj, .. } => vec![*obj],
            Self::PutInContainer { obj, container, .. } => vec![*obj, *container],
            Self::SetDoorState { .. } => Vec::new(),
        }
    }

    pub(crate) fn proto_refs_mut(&mut self) -> Vec<&mut ProtoHandle> {
        match self {
            Self::LoadMobile { mob, .. } | Self::ForceMobCommand { mob, .. } => vec![mob],
            Self::LoadObject { obj, .. }
            | Self::GiveToMob { obj, .. }
            | Self::EquipToMob { obj, .. }
            | Self::RemoveFromRoom { obj, .. } => vec![obj],
            Self::PutInContainer { obj, container, .. } => vec![obj, container],
            Self::SetDoorState { .. } => Vec::new(),
        }
    }

    pub fn room(&self) -> Option<RoomVnum> {
        match self {
            Self::LoadMobile { room, .. } | Self::SetDoorState { room, .. } => Some(*room),
            Self::LoadObject { room, .. } => *room,
            Self::RemoveFromRoom { room, .. } => (*room >= 0).then_some(*room),
            Self::GiveToMob { .. }
            | Self::EquipToMob { .. }
            | Self::PutInContainer { .. }
            | Self::ForceMobCommand { .. } => None,
        }
    }

    /// Commands that act on whichever mob the script loaded last.
    pub fn targets_last_mob(&self) -> bool {
        matches!(self, Self::GiveToMob { .. } | Self::EquipToMob { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetCommand {
    pub op: ResetOp,
    /// Run only if the last executed command succeeded.
    pub conditional: bool,
    pub source_line: u32,
}

impl ResetCommand {
    pub fn new(op: ResetOp, conditional: bool) -> Self {
        Self {
            op,
            conditional,
            source_line: 0,
        }
    }

    pub fn at_line(mut self, source_line: u32) -> Self {
        self.source_line = source_line;
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.op.opcode()
    }
}
