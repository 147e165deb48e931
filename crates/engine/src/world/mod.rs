mod dispatch;
mod live;
mod shop;
mod sim;

pub use dispatch::{CommandDispatcher, ForcedCommand, QueuedDispatcher};
pub use live::{
    Direction, DoorFlags, DoorState, ExitId, InstanceId, LiveWorld, Location, PlacementError,
    RoomId, RoomVnum, WearPosition, NUM_WEAR_POSITIONS,
};
pub use shop::{Shop, ShopTable};
pub use sim::{InstanceIdAllocator, SimExit, SimInstance, SimRoom, SimWorld};
