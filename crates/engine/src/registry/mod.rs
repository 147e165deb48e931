mod handle;
mod prototype;
mod store;
mod tables;

pub use handle::{ProtoHandle, ProtoKind, Vnum};
pub use prototype::{
    MobPayload, MobPrototype, ObjPayload, ObjPrototype, Prototype, PrototypePayload, TriggerRef,
};
pub use store::{PrototypeStore, Remap, ShiftKind, StoreShift};
pub(crate) use tables::StoreFor;
pub use tables::PrototypeRegistry;
