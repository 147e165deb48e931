use serde::{Deserialize, Serialize};

use super::handle::{ProtoKind, Vnum};

/// Opaque reference to a behaviour script attached to a prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerRef(pub Vnum);

/// Game-specific fields carried by a prototype. Only the descriptive fields
/// that the editor and the definition files touch are modelled here.
pub trait PrototypePayload: Clone + Default + std::fmt::Debug {
    const KIND: ProtoKind;

    fn keywords(&self) -> &str;

    fn short_descr(&self) -> &str;

    fn level(&self) -> u32;

    fn set_keywords(&mut self, keywords: String);

    fn set_short_descr(&mut self, short_descr: String);

    fn set_level(&mut self, level: u32);
}

macro_rules! impl_payload {
    ($payload:ty, $kind:expr) => {
        impl PrototypePayload for $payload {
            const KIND: ProtoKind = $kind;

            fn keywords(&self) -> &str {
                &self.keywords
            }

            fn short_descr(&self) -> &str {
                &self.short_descr
            }

            fn level(&self) -> u32 {
                self.level
            }

            fn set_keywords(&mut self, keywords: String) {
                self.keywords = keywords;
            }

            fn set_short_descr(&mut self, short_descr: String) {
                self.short_descr = short_descr;
            }

            fn set_level(&mut self, level: u32) {
                self.level = level;
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MobPayload {
    pub keywords: String,
    pub short_descr: String,
    pub level: u32,
}

impl_payload!(MobPayload, ProtoKind::Mobile);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjPayload {
    pub keywords: String,
    pub short_descr: String,
    pub level: u32,
}

impl_payload!(ObjPayload, ProtoKind::Object);

/// Template for a mobile or an object.
///
/// The rnum is not stored here: it is the entry's position in the store and is
/// handed out as a `ProtoHandle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prototype<P> {
    pub vnum: Vnum,
    pub instance_count: u32,
    pub triggers: Vec<TriggerRef>,
    pub payload: P,
}

impl<P: PrototypePayload> Prototype<P> {
    pub fn new(vnum: Vnum, payload: P) -> Self {
        Self {
            vnum,
            instance_count: 0,
            triggers: Vec::new(),
            payload,
        }
    }

    pub fn with_triggers(mut self, triggers: Vec<TriggerRef>) -> Self {
        self.triggers = triggers;
        self
    }
}

pub type MobPrototype = Prototype<MobPayload>;
pub type ObjPrototype = Prototype<ObjPayload>;
