use crate::error::OlcError;

use super::handle::{ProtoHandle, ProtoKind, Vnum};
use super::prototype::{Prototype, PrototypePayload, TriggerRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    Inserted,
    Removed,
}

/// Record of one structural change to a store, produced after the array shift
/// has completed. The fixup walk replays it against every cached handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreShift {
    pub kind: ProtoKind,
    pub change: ShiftKind,
    /// Inserted: the new entry's rnum (old entries at or above it moved up).
    /// Removed: the rnum the removed entry occupied.
    pub rnum: u32,
    pub vnum: Vnum,
    pub from_generation: u32,
    pub to_generation: u32,
    pub len_after: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remap {
    /// The handle names the other store.
    Untouched,
    /// The handle is valid in the new generation, possibly at a new rnum.
    Rewritten { handle: ProtoHandle, moved: bool },
    /// The handle named the removed entry.
    Removed,
    /// The handle did not belong to the generation the shift started from.
    Stale,
}

impl StoreShift {
    pub fn remap(&self, handle: ProtoHandle) -> Remap {
        if handle.kind() != self.kind {
            return Remap::Untouched;
        }
        if handle.generation() != self.from_generation {
            return Remap::Stale;
        }

        let rnum = handle.rnum();
        let new_rnum = match self.change {
            ShiftKind::Inserted if rnum >= self.rnum => rnum + 1,
            ShiftKind::Inserted => rnum,
            ShiftKind::Removed if rnum == self.rnum => return Remap::Removed,
            ShiftKind::Removed if rnum > self.rnum => rnum - 1,
            ShiftKind::Removed => rnum,
        };
        Remap::Rewritten {
            handle: handle.relocated(new_rnum, self.to_generation),
            moved: new_rnum != rnum,
        }
    }

    pub fn is_in_bounds(&self, handle: ProtoHandle) -> bool {
        (handle.rnum() as usize) < self.len_after
    }
}

/// Dense, vnum-sorted table of prototypes addressed by rnum.
#[derive(Debug, Clone)]
pub struct PrototypeStore<P> {
    entries: Vec<Prototype<P>>,
    generation: u32,
}

impl<P: PrototypePayload> Default for PrototypeStore<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            generation: 0,
        }
    }
}

impl<P: PrototypePayload> PrototypeStore<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_prototypes(mut prototypes: Vec<Prototype<P>>) -> Result<Self, OlcError> {
        prototypes.sort_by_key(|proto| proto.vnum);
        if let Some(pair) = prototypes.windows(2).find(|pair| pair[0].vnum == pair[1].vnum) {
            return Err(OlcError::DuplicateVnum {
                kind: P::KIND,
                vnum: pair[0].vnum,
            });
        }
        Ok(Self {
            entries: prototypes,
            generation: 0,
        })
    }

    pub fn kind(&self) -> ProtoKind {
        P::KIND
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn lookup_by_vnum(&self, vnum: Vnum) -> Option<u32> {
        self.entries
            .binary_search_by_key(&vnum, |proto| proto.vnum)
            .ok()
            .map(|index| index as u32)
    }

    pub fn handle_for_vnum(&self, vnum: Vnum) -> Option<ProtoHandle> {
        self.lookup_by_vnum(vnum)
            .map(|rnum| ProtoHandle::new(P::KIND, rnum, self.generation))
    }

    pub fn handle_at(&self, rnum: u32) -> Result<ProtoHandle, OlcError> {
        self.lookup_by_rnum(rnum)?;
        Ok(ProtoHandle::new(P::KIND, rnum, self.generation))
    }

    pub fn lookup_by_rnum(&self, rnum: u32) -> Result<&Prototype<P>, OlcError> {
        self.entries
            .get(rnum as usize)
            .ok_or(OlcError::OutOfRange {
                what: "rnum",
                index: rnum as usize,
                len: self.entries.len(),
            })
    }

    pub fn get(&self, vnum: Vnum) -> Option<&Prototype<P>> {
        self.lookup_by_vnum(vnum)
            .and_then(|rnum| self.entries.get(rnum as usize))
    }

    pub fn resolve(&self, handle: ProtoHandle) -> Result<&Prototype<P>, OlcError> {
        let index = self.check_handle(handle)?;
        Ok(&self.entries[index])
    }

    pub(crate) fn resolve_mut(&mut self, handle: ProtoHandle) -> Result<&mut Prototype<P>, OlcError> {
        let index = self.check_handle(handle)?;
        Ok(&mut self.entries[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProtoHandle, &Prototype<P>)> {
        let generation = self.generation;
        self.entries
            .iter()
            .enumerate()
            .map(move |(index, proto)| (ProtoHandle::new(P::KIND, index as u32, generation), proto))
    }

    /// Inserts at the sorted position. The returned shift must be handed to
    /// the fixup walk before anything else touches a cached handle.
    pub(crate) fn insert(&mut self, proto: Prototype<P>) -> Result<(ProtoHandle, StoreShift), OlcError> {
        let index = match self
            .entries
            .binary_search_by_key(&proto.vnum, |entry| entry.vnum)
        {
            Ok(_) => {
                return Err(OlcError::DuplicateVnum {
                    kind: P::KIND,
                    vnum: proto.vnum,
                })
            }
            Err(index) => index,
        };

        let vnum = proto.vnum;
        self.entries.insert(index, proto);
        let shift = self.bump(ShiftKind::Inserted, index as u32, vnum);
        Ok((ProtoHandle::new(P::KIND, index as u32, self.generation), shift))
    }

    pub(crate) fn remove(&mut self, rnum: u32) -> Result<(Prototype<P>, StoreShift), OlcError> {
        let entry = self.lookup_by_rnum(rnum)?;
        if entry.instance_count > 0 {
            return Err(OlcError::InstancesStillLive {
                kind: P::KIND,
                vnum: entry.vnum,
                count: entry.instance_count,
            });
        }

        let removed = self.entries.remove(rnum as usize);
        let shift = self.bump(ShiftKind::Removed, rnum, removed.vnum);
        Ok((removed, shift))
    }

    /// Swaps the payload and triggers of an existing entry. Positions do not
    /// move, so no fixup is needed and the generation stays put.
    pub(crate) fn replace_contents(
        &mut self,
        vnum: Vnum,
        payload: P,
        triggers: Vec<TriggerRef>,
    ) -> Result<ProtoHandle, OlcError> {
        let handle = self
            .handle_for_vnum(vnum)
            .ok_or_else(|| OlcError::UnresolvedReference(format!("{} vnum {vnum}", P::KIND)))?;
        let entry = &mut self.entries[handle.rnum() as usize];
        entry.payload = payload;
        entry.triggers = triggers;
        Ok(handle)
    }

    fn bump(&mut self, change: ShiftKind, rnum: u32, vnum: Vnum) -> StoreShift {
        let from_generation = self.generation;
        self.generation = self.generation.wrapping_add(1);
        StoreShift {
            kind: P::KIND,
            change,
            rnum,
            vnum,
            from_generation,
            to_generation: self.generation,
            len_after: self.entries.len(),
        }
    }

    fn check_handle(&self, handle: ProtoHandle) -> Result<usize, OlcError> {
        if handle.kind() != P::KIND {
            return Err(OlcError::OutOfRange {
                what: "handle kind",
                index: handle.rnum() as usize,
                len: self.entries.len(),
            });
        }
        if handle.generation() != self.generation {
            return Err(OlcError::StaleHandle {
                kind: P::KIND,
                rnum: handle.rnum(),
                generation: handle.generation(),
                current: self.generation,
            });
        }
        let index = handle.rnum() as usize;
        if index >= self.entries.len() {
            return Err(OlcError::OutOfRange {
                what: "rnum",
                index,
                len: self.entries.len(),
            });
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::registry::{MobPayload, MobPrototype};

    fn mob(vnum: Vnum) -> MobPrototype {
        Prototype::new(
            vnum,
            MobPayload {
                keywords: format!("mob{vnum}"),
                short_descr: format!("mob {vnum}"),
                level: 1,
            },
        )
    }

    fn store_with(vnums: &[Vnum]) -> PrototypeStore<MobPayload> {
        PrototypeStore::from_prototypes(vnums.iter().copied().map(mob).collect()).expect("store")
    }

    fn assert_sorted(store: &PrototypeStore<MobPayload>) {
        let vnums = store.iter().map(|(_, proto)| proto.vnum).collect::<Vec<_>>();
        assert!(vnums.windows(2).all(|pair| pair[0] < pair[1]), "{vnums:?}");
        for (handle, proto) in store.iter() {
            assert_eq!(store.lookup_by_vnum(proto.vnum), Some(handle.rnum()));
        }
    }

    #[test]
    fn insert_finds_sorted_position_and_reports_shift() {
        let mut store = store_with(&[100, 300]);
        let (handle, shift) = store.insert(mob(200)).expect("insert");

        assert_eq!(handle.rnum(), 1);
        assert_eq!(shift.change, ShiftKind::Inserted);
        assert_eq!(shift.rnum, 1);
        assert_eq!(shift.from_generation, 0);
        assert_eq!(shift.to_generation, 1);
        assert_eq!(shift.len_after, 3);
        assert_eq!(store.lookup_by_vnum(300), Some(2));
        assert_sorted(&store);
    }

    #[test]
    fn duplicate_vnum_is_rejected_without_bumping_generation() {
        let mut store = store_with(&[100]);
        let error = store.insert(mob(100)).expect_err("duplicate");
        assert_eq!(
            error,
            OlcError::DuplicateVnum {
                kind: ProtoKind::Mobile,
                vnum: 100
            }
        );
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn from_prototypes_rejects_duplicates() {
        let error = PrototypeStore::from_prototypes(vec![mob(5), mob(5)]).expect_err("dup");
        assert!(matches!(error, OlcError::DuplicateVnum { vnum: 5, .. }));
    }

    #[test]
    fn remove_requires_no_live_instances() {
        let mut store = store_with(&[100, 200]);
        let handle = store.handle_for_vnum(100).expect("handle");
        store.resolve_mut(handle).expect("resolve").instance_count = 2;

        let error = store.remove(0).expect_err("live");
        assert_eq!(
            error,
            OlcError::InstancesStillLive {
                kind: ProtoKind::Mobile,
                vnum: 100,
                count: 2
            }
        );

        store.resolve_mut(handle).expect("resolve").instance_count = 0;
        let (removed, shift) = store.remove(0).expect("remove");
        assert_eq!(removed.vnum, 100);
        assert_eq!(shift.change, ShiftKind::Removed);
        assert_eq!(store.lookup_by_vnum(200), Some(0));
    }

    #[test]
    fn lookup_by_rnum_rejects_out_of_range() {
        let store = store_with(&[1, 2]);
        let error = store.lookup_by_rnum(2).expect_err("oob");
        assert!(matches!(error, OlcError::OutOfRange { index: 2, len: 2, .. }));
    }

    #[test]
    fn handle_from_old_generation_is_stale() {
        let mut store = store_with(&[10, 20]);
        let old = store.handle_for_vnum(20).expect("handle");
        store.insert(mob(5)).expect("insert");

        let error = store.resolve(old).expect_err("stale");
        assert!(matches!(error, OlcError::StaleHandle { generation: 0, current: 1, .. }));
    }

    #[test]
    fn remap_shifts_and_flags_removed_entry() {
        let mut store = store_with(&[10, 20, 30]);
        let at_10 = store.handle_for_vnum(10).expect("10");
        let at_20 = store.handle_for_vnum(20).expect("20");
        let at_30 = store.handle_for_vnum(30).expect("30");
        let (_, shift) = store.remove(1).expect("remove 20");

        assert_eq!(
            shift.remap(at_10),
            Remap::Rewritten {
                handle: at_10.relocated(0, 1),
                moved: false
            }
        );
        assert_eq!(shift.remap(at_20), Remap::Removed);
        assert_eq!(
            shift.remap(at_30),
            Remap::Rewritten {
                handle: at_30.relocated(1, 1),
                moved: true
            }
        );
        assert_eq!(shift.remap(at_30.relocated(2, 7)), Remap::Stale);
    }

    #[test]
    fn replace_contents_keeps_position_and_count() {
        let mut store = store_with(&[10, 20]);
        let handle = store.handle_for_vnum(20).expect("handle");
        store.resolve_mut(handle).expect("resolve").instance_count = 3;

        let payload = MobPayload {
            keywords: "ogre".to_string(),
            short_descr: "an ogre".to_string(),
            level: 9,
        };
        let replaced = store
            .replace_contents(20, payload, vec![TriggerRef(7)])
            .expect("replace");

        assert_eq!(replaced, handle);
        let proto = store.resolve(handle).expect("resolve");
        assert_eq!(proto.payload.short_descr, "an ogre");
        assert_eq!(proto.instance_count, 3);
        assert_eq!(proto.triggers, vec![TriggerRef(7)]);
    }

    #[derive(Debug, Clone)]
    enum StoreOp {
        Insert(Vnum),
        Remove(usize),
    }

    fn store_op() -> impl Strategy<Value = StoreOp> {
        prop_oneof![
            (0..200i32).prop_map(StoreOp::Insert),
            (0..64usize).prop_map(StoreOp::Remove),
        ]
    }

    proptest! {
        #[test]
        fn store_stays_sorted_under_any_mutation_sequence(ops in prop::collection::vec(store_op(), 0..80)) {
            let mut store = PrototypeStore::<MobPayload>::new();
            for op in ops {
                match op {
                    StoreOp::Insert(vnum) => {
                        let existed = store.lookup_by_vnum(vnum).is_some();
                        let result = store.insert(mob(vnum));
                        prop_assert_eq!(result.is_err(), existed);
                        if let Ok((handle, _)) = result {
                            prop_assert_eq!(store.resolve(handle).expect("fresh handle").vnum, vnum);
                        }
                    }
                    StoreOp::Remove(index) => {
                        if store.is_empty() {
                            prop_assert!(store.remove(0).is_err());
                        } else {
                            let rnum = (index % store.len()) as u32;
                            let vnum = store.lookup_by_rnum(rnum).expect("rnum").vnum;
                            let (removed, _) = store.remove(rnum).expect("remove");
                            prop_assert_eq!(removed.vnum, vnum);
                        }
                    }
                }

                let vnums = store.iter().map(|(_, proto)| proto.vnum).collect::<Vec<_>>();
                prop_assert!(vnums.windows(2).all(|pair| pair[0] < pair[1]));
                for (handle, proto) in store.iter() {
                    prop_assert_eq!(store.lookup_by_vnum(proto.vnum), Some(handle.rnum()));
                    prop_assert_eq!(store.lookup_by_rnum(handle.rnum()).expect("rnum").vnum, proto.vnum);
                }
            }
        }
    }
}
