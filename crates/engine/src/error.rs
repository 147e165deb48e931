use thiserror::Error;

use crate::olc::SessionId;
use crate::registry::{ProtoKind, Vnum};

/// Errors surfaced to whoever drives a store, script, or edit session.
///
/// Failures while a reset script runs are not errors; see `CommandFailure`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OlcError {
    #[error("{kind} vnum {vnum} already exists")]
    DuplicateVnum { kind: ProtoKind, vnum: Vnum },
    #[error("{what} {index} is out of range (len {len})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error("stale {kind} handle rnum={rnum} generation={generation}, store is at generation {current}")]
    StaleHandle {
        kind: ProtoKind,
        rnum: u32,
        generation: u32,
        current: u32,
    },
    #[error("{kind} vnum {vnum} still has {count} live instance(s)")]
    InstancesStillLive {
        kind: ProtoKind,
        vnum: Vnum,
        count: u32,
    },
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),
    #[error("no zone numbered {0}")]
    UnknownZone(Vnum),
    #[error("no open edit session {0}")]
    UnknownSession(SessionId),
    #[error("edit session {session} does not edit {expected}")]
    WrongSessionKind {
        session: SessionId,
        expected: &'static str,
    },
    #[error("field {field} does not apply to '{opcode}' commands")]
    FieldNotApplicable { field: &'static str, opcode: char },
    #[error("invalid zone header: {0}")]
    InvalidZoneHeader(String),
}
