use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, author-assigned identifier of a prototype, room, or zone.
pub type Vnum = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtoKind {
    Mobile,
    Object,
}

impl ProtoKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ProtoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Position of a prototype in its store, tagged with the store generation it
/// was taken from.
///
/// A handle is only meaningful while its generation matches the store's. Every
/// insert or remove bumps the store generation; handles held by the world,
/// zone scripts, shops and open edit sessions are rewritten by the fixup walk.
/// Anything else that kept a handle across the change gets `StaleHandle` when
/// it tries to resolve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtoHandle {
    kind: ProtoKind,
    rnum: u32,
    generation: u32,
}

impl ProtoHandle {
    pub(crate) fn new(kind: ProtoKind, rnum: u32, generation: u32) -> Self {
        Self {
            kind,
            rnum,
            generation,
        }
    }

    pub fn kind(self) -> ProtoKind {
        self.kind
    }

    pub fn rnum(self) -> u32 {
        self.rnum
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    pub(crate) fn relocated(self, rnum: u32, generation: u32) -> Self {
        Self {
            kind: self.kind,
            rnum,
            generation,
        }
    }
}

impl fmt::Display for ProtoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@g{}", self.kind, self.rnum, self.generation)
    }
}
