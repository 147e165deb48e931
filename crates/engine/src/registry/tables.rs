use tracing::warn;

use crate::error::OlcError;

use super::handle::{ProtoHandle, ProtoKind, Vnum};
use super::prototype::{MobPayload, ObjPayload, PrototypePayload};
use super::store::PrototypeStore;

/// The mobile and object stores, addressed together by handle kind.
#[derive(Debug, Clone, Default)]
pub struct PrototypeRegistry {
    mobs: PrototypeStore<MobPayload>,
    objs: PrototypeStore<ObjPayload>,
}

impl PrototypeRegistry {
    pub fn new(mobs: PrototypeStore<MobPayload>, objs: PrototypeStore<ObjPayload>) -> Self {
        Self { mobs, objs }
    }

    pub fn mobs(&self) -> &PrototypeStore<MobPayload> {
        &self.mobs
    }

    pub fn objs(&self) -> &PrototypeStore<ObjPayload> {
        &self.objs
    }

    pub(crate) fn mobs_mut(&mut self) -> &mut PrototypeStore<MobPayload> {
        &mut self.mobs
    }

    pub(crate) fn objs_mut(&mut self) -> &mut PrototypeStore<ObjPayload> {
        &mut self.objs
    }

    pub fn handle_for(&self, kind: ProtoKind, vnum: Vnum) -> Option<ProtoHandle> {
        match kind {
            ProtoKind::Mobile => self.mobs.handle_for_vnum(vnum),
            ProtoKind::Object => self.objs.handle_for_vnum(vnum),
        }
    }

    pub fn vnum_of(&self, handle: ProtoHandle) -> Result<Vnum, OlcError> {
        match handle.kind() {
            ProtoKind::Mobile => self.mobs.resolve(handle).map(|proto| proto.vnum),
            ProtoKind::Object => self.objs.resolve(handle).map(|proto| proto.vnum),
        }
    }

    pub fn short_descr(&self, handle: ProtoHandle) -> Result<&str, OlcError> {
        match handle.kind() {
            ProtoKind::Mobile => self.mobs.resolve(handle).map(|proto| proto.payload.short_descr()),
            ProtoKind::Object => self.objs.resolve(handle).map(|proto| proto.payload.short_descr()),
        }
    }

    pub fn instance_count(&self, handle: ProtoHandle) -> Result<u32, OlcError> {
        match handle.kind() {
            ProtoKind::Mobile => self.mobs.resolve(handle).map(|proto| proto.instance_count),
            ProtoKind::Object => self.objs.resolve(handle).map(|proto| proto.instance_count),
        }
    }

    pub(crate) fn note_spawned(&mut self, handle: ProtoHandle) -> Result<(), OlcError> {
        let count = self.count_mut(handle)?;
        *count = count.saturating_add(1);
        Ok(())
    }

    /// Follows an extraction. Handles that no longer resolve are logged and
    /// skipped.
    pub(crate) fn note_extracted(&mut self, handles: &[ProtoHandle]) {
        for handle in handles {
            match self.count_mut(*handle) {
                Ok(count) => *count = count.saturating_sub(1),
                Err(error) => warn!(handle = %handle, error = %error, "instance_count_not_decremented"),
            }
        }
    }

    fn count_mut(&mut self, handle: ProtoHandle) -> Result<&mut u32, OlcError> {
        match handle.kind() {
            ProtoKind::Mobile => self.mobs.resolve_mut(handle).map(|proto| &mut proto.instance_count),
            ProtoKind::Object => self.objs.resolve_mut(handle).map(|proto| &mut proto.instance_count),
        }
    }
}

/// Picks the store a payload type lives in.
pub(crate) trait StoreFor<P> {
    fn store_mut(&mut self) -> &mut PrototypeStore<P>;
}

impl StoreFor<MobPayload> for PrototypeRegistry {
    fn store_mut(&mut self) -> &mut PrototypeStore<MobPayload> {
        &mut self.mobs
    }
}

impl StoreFor<ObjPayload> for PrototypeRegistry {
    fn store_mut(&mut self) -> &mut PrototypeStore<ObjPayload> {
        &mut self.objs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Prototype;

    #[test]
    fn counts_follow_spawn_and_extract() {
        let mobs = PrototypeStore::from_prototypes(vec![Prototype::new(
            3000,
            MobPayload {
                keywords: "guard".to_string(),
                short_descr: "a guard".to_string(),
                level: 3,
            },
        )])
        .expect("mobs");
        let mut registry = PrototypeRegistry::new(mobs, PrototypeStore::new());
        let guard = registry
            .handle_for(ProtoKind::Mobile, 3000)
            .expect("guard");

        registry.note_spawned(guard).expect("spawn");
        registry.note_spawned(guard).expect("spawn");
        registry.note_extracted(&[guard]);

        assert_eq!(registry.instance_count(guard).expect("count"), 1);
        assert_eq!(registry.short_descr(guard).expect("descr"), "a guard");
        assert_eq!(registry.vnum_of(guard).expect("vnum"), 3000);
        assert!(registry.handle_for(ProtoKind::Object, 3000).is_none());
    }
}
