mod fixup;
mod service;
mod session;

pub use fixup::{FixupCoordinator, FixupReport};
pub use service::{CommitOutcome, SessionSummary, WorldService, WorldSnapshot, ZoneSummary};
pub use session::{
    CommandField, EditSession, EditTarget, HeaderField, PrototypeDraft, PrototypeField, Scratch,
    SessionId, SessionRegistry,
};
