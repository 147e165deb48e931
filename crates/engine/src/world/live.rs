use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{ProtoHandle, Vnum};

pub type RoomVnum = Vnum;

pub const NUM_WEAR_POSITIONS: u8 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Up,
        Direction::Down,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn reverse(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::West => Self::East,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|dir| dir.name().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorFlags {
    pub closed: bool,
    pub locked: bool,
    pub hidden: bool,
}

/// Door states a reset command can force. Codes match the zone file encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorState {
    Open,
    Closed,
    Locked,
    Hidden,
    HiddenClosedLocked,
    HiddenClosed,
}

impl DoorState {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Open),
            1 => Some(Self::Closed),
            2 => Some(Self::Locked),
            3 => Some(Self::Hidden),
            4 => Some(Self::HiddenClosedLocked),
            5 => Some(Self::HiddenClosed),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Open => 0,
            Self::Closed => 1,
            Self::Locked => 2,
            Self::Hidden => 3,
            Self::HiddenClosedLocked => 4,
            Self::HiddenClosed => 5,
        }
    }

    pub fn flags(self) -> DoorFlags {
        let (closed, locked, hidden) = match self {
            Self::Open => (false, false, false),
            Self::Closed => (true, false, false),
            Self::Locked => (true, true, false),
            Self::Hidden => (false, false, true),
            Self::HiddenClosedLocked => (true, true, true),
            Self::HiddenClosed => (true, false, true),
        };
        DoorFlags {
            closed,
            locked,
            hidden,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WearPosition(u8);

impl WearPosition {
    pub fn new(slot: i32) -> Option<Self> {
        u8::try_from(slot)
            .ok()
            .filter(|slot| *slot < NUM_WEAR_POSITIONS)
            .map(Self)
    }

    pub fn slot(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitId {
    pub room: RoomId,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    Nowhere,
    Room(RoomId),
    CarriedBy(InstanceId),
    WornBy {
        wearer: InstanceId,
        position: WearPosition,
    },
    Inside(InstanceId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("instance {0} is not in the world")]
    MissingInstance(InstanceId),
    #[error("room {0:?} does not exist")]
    MissingRoom(RoomId),
    #[error("wear slot {} on {wearer} is already taken", position.slot())]
    SlotOccupied {
        wearer: InstanceId,
        position: WearPosition,
    },
}

/// What the reset engine and the fixup walk need from the running game.
pub trait LiveWorld {
    fn find_room(&self, vnum: RoomVnum) -> Option<RoomId>;

    fn room_vnum(&self, room: RoomId) -> Option<RoomVnum>;

    fn find_exit(&self, room: RoomId, direction: Direction) -> Option<ExitId>;

    fn exit_destination(&self, exit: ExitId) -> Option<RoomId>;

    fn set_door_state(&mut self, exit: ExitId, state: DoorState);

    fn spawn_mob(&mut self, proto: ProtoHandle, short_descr: &str, room: RoomId) -> InstanceId;

    /// New object instances start nowhere until placed.
    fn spawn_obj(&mut self, proto: ProtoHandle, short_descr: &str) -> InstanceId;

    fn place_obj(&mut self, obj: InstanceId, location: Location) -> Result<(), PlacementError>;

    fn contains(&self, id: InstanceId) -> bool;

    fn find_obj_in_room(&self, room: RoomId, proto: ProtoHandle) -> Option<InstanceId>;

    fn instances_of(&self, proto: ProtoHandle) -> Vec<InstanceId>;

    /// Moves everything held by `id` to where `id` itself is. A worn
    /// container empties into its wearer's inventory. Returns how many
    /// instances moved.
    fn spill_contents(&mut self, id: InstanceId) -> usize;

    /// Removes the instance and everything it carries, wears, or contains.
    /// Returns the prototype of every removed instance so counts can follow.
    fn extract(&mut self, id: InstanceId) -> Vec<ProtoHandle>;

    fn for_each_proto_ref_mut(&mut self, visit: &mut dyn FnMut(InstanceId, &mut ProtoHandle));

    fn refresh_short_descr(&mut self, proto: ProtoHandle, short_descr: &str) -> usize;

    fn has_players_between(&self, low: RoomVnum, high: RoomVnum) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_direction_is_an_involution() {
        for dir in Direction::ALL {
            assert_eq!(dir.reverse().reverse(), dir);
            assert_ne!(dir.reverse(), dir);
        }
        assert_eq!(Direction::from_index(4), Some(Direction::Up));
        assert_eq!(Direction::from_index(6), None);
        assert_eq!(Direction::from_index(-1), None);
    }

    #[test]
    fn door_codes_round_trip_and_reject_unknown() {
        for code in 0..6 {
            let state = DoorState::from_code(code).expect("known code");
            assert_eq!(state.code(), code);
        }
        assert_eq!(DoorState::from_code(6), None);
        assert_eq!(
            DoorState::HiddenClosed.flags(),
            DoorFlags {
                closed: true,
                locked: false,
                hidden: true
            }
        );
    }

    #[test]
    fn wear_position_bounds() {
        assert!(WearPosition::new(0).is_some());
        assert!(WearPosition::new(27).is_some());
        assert!(WearPosition::new(28).is_none());
        assert!(WearPosition::new(-1).is_none());
    }
}
