use serde::Serialize;
use tracing::{debug, info, warn};

use crate::registry::{ProtoHandle, Remap, ShiftKind, StoreShift};
use crate::world::{InstanceId, LiveWorld, ShopTable};
use crate::zone::{ScriptFixup, ZoneTable};

use super::session::SessionRegistry;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixupReport {
    pub instances_shifted: usize,
    pub commands_shifted: usize,
    pub commands_removed: usize,
    pub keepers_shifted: usize,
    pub keepers_cleared: usize,
    pub products_shifted: usize,
    pub products_dropped: usize,
    pub session_commands_shifted: usize,
    pub session_commands_removed: usize,
    /// Stale handles, handles past the end of the store, and live instances
    /// of a removed prototype. Each one was logged and skipped.
    pub anomalies: usize,
}

impl FixupReport {
    pub fn shifted(&self) -> usize {
        self.instances_shifted
            + self.commands_shifted
            + self.keepers_shifted
            + self.products_shifted
            + self.session_commands_shifted
    }

    pub fn removed(&self) -> usize {
        self.commands_removed
            + self.keepers_cleared
            + self.products_dropped
            + self.session_commands_removed
    }
}

/// Rewrites every cached prototype handle after a store insert or remove.
///
/// Runs after the store has shifted. It never fails: anything it cannot fix is
/// logged and counted in `FixupReport::anomalies`.
pub struct FixupCoordinator<'a, W> {
    world: &'a mut W,
    zones: &'a mut ZoneTable,
    shops: &'a mut ShopTable,
    sessions: &'a mut SessionRegistry,
}

impl<'a, W: LiveWorld> FixupCoordinator<'a, W> {
    pub fn new(
        world: &'a mut W,
        zones: &'a mut ZoneTable,
        shops: &'a mut ShopTable,
        sessions: &'a mut SessionRegistry,
    ) -> Self {
        Self {
            world,
            zones,
            shops,
            sessions,
        }
    }

    pub fn on_insert(&mut self, shift: &StoreShift) -> FixupReport {
        if shift.change != ShiftKind::Inserted {
            warn!(kind = %shift.kind, vnum = shift.vnum, "fixup_on_insert_given_removal");
        }
        self.walk(shift)
    }

    pub fn on_remove(&mut self, shift: &StoreShift) -> FixupReport {
        if shift.change != ShiftKind::Removed {
            warn!(kind = %shift.kind, vnum = shift.vnum, "fixup_on_remove_given_insertion");
        }
        self.walk(shift)
    }

    fn walk(&mut self, shift: &StoreShift) -> FixupReport {
        let mut report = FixupReport::default();
        self.fix_instances(shift, &mut report);
        self.fix_zone_scripts(shift, &mut report);
        self.fix_shops(shift, &mut report);
        self.fix_sessions(shift, &mut report);

        info!(
            kind = %shift.kind,
            vnum = shift.vnum,
            rnum = shift.rnum,
            generation = shift.to_generation,
            shifted = report.shifted(),
            removed = report.removed(),
            anomalies = report.anomalies,
            "prototype_fixup"
        );
        report
    }

    fn fix_instances(&mut self, shift: &StoreShift, report: &mut FixupReport) {
        let mut visit = |id: InstanceId, handle: &mut ProtoHandle| match shift.remap(*handle) {
            Remap::Untouched => {}
            Remap::Rewritten {
                handle: rewritten,
                moved,
            } => {
                if !shift.is_in_bounds(rewritten) {
                    warn!(instance = %id, handle = %rewritten, "instance_handle_out_of_bounds");
                    report.anomalies += 1;
                }
                if moved {
                    report.instances_shifted += 1;
                }
                *handle = rewritten;
            }
            Remap::Removed => {
                warn!(instance = %id, vnum = shift.vnum, "live_instance_of_removed_prototype");
                report.anomalies += 1;
            }
            Remap::Stale => {
                warn!(instance = %id, handle = %handle, "instance_handle_stale");
                report.anomalies += 1;
            }
        };
        self.world.for_each_proto_ref_mut(&mut visit);
    }

    fn fix_zone_scripts(&mut self, shift: &StoreShift, report: &mut FixupReport) {
        let mut touched = Vec::new();
        for zone in self.zones.iter_mut() {
            let number = zone.number();
            let fixed = zone.script.apply_shift(shift);
            note_script_fixup(&fixed, report);
            report.commands_shifted += fixed.moved;
            report.commands_removed += fixed.removed.len();
            for (position, command) in &fixed.removed {
                info!(
                    zone = number,
                    position,
                    opcode = %command.opcode().code(),
                    line = command.source_line,
                    "reset_command_removed"
                );
            }
            if !fixed.removed.is_empty() {
                touched.push(number);
            }
        }
        for number in touched {
            self.zones.mark_unsaved(number);
        }
    }

    fn fix_shops(&mut self, shift: &StoreShift, report: &mut FixupReport) {
        self.shops.for_each_keeper_rnum(|shop, keeper| {
            let Some(handle) = *keeper else {
                return;
            };
            match remap_reference(shift, handle, report) {
                Some(Some((rewritten, moved))) => {
                    *keeper = Some(rewritten);
                    if moved {
                        report.keepers_shifted += 1;
                    }
                }
                Some(None) => {
                    info!(shop, vnum = shift.vnum, "shop_keeper_cleared");
                    *keeper = None;
                    report.keepers_cleared += 1;
                }
                None => {}
            }
        });

        self.shops.for_each_product_list(|shop, products| {
            products.retain_mut(|product| match remap_reference(shift, *product, report) {
                Some(Some((rewritten, moved))) => {
                    *product = rewritten;
                    if moved {
                        report.products_shifted += 1;
                    }
                    true
                }
                Some(None) => {
                    debug!(shop, vnum = shift.vnum, "shop_product_dropped");
                    report.products_dropped += 1;
                    false
                }
                None => true,
            });
        });
    }

    fn fix_sessions(&mut self, shift: &StoreShift, report: &mut FixupReport) {
        for session in self.sessions.iter_mut() {
            let id = session.id();
            let Ok(script) = session.script_mut() else {
                continue;
            };
            let fixed = script.apply_shift(shift);
            note_script_fixup(&fixed, report);
            report.session_commands_shifted += fixed.moved;
            report.session_commands_removed += fixed.removed.len();
            if !fixed.removed.is_empty() {
                info!(
                    session = %id,
                    removed = fixed.removed.len(),
                    "session_commands_removed"
                );
            }
        }
    }
}

fn note_script_fixup(fixed: &ScriptFixup, report: &mut FixupReport) {
    if fixed.stale > 0 || fixed.out_of_bounds > 0 {
        warn!(
            stale = fixed.stale,
            out_of_bounds = fixed.out_of_bounds,
            "script_handles_not_fixed"
        );
    }
    report.anomalies += fixed.stale + fixed.out_of_bounds;
}

/// `None`: leave the reference alone. `Some(None)`: it named the removed
/// prototype. `Some(Some(..))`: the rewritten handle and whether it moved.
fn remap_reference(
    shift: &StoreShift,
    handle: ProtoHandle,
    report: &mut FixupReport,
) -> Option<Option<(ProtoHandle, bool)>> {
    match shift.remap(handle) {
        Remap::Untouched => None,
        Remap::Rewritten {
            handle: rewritten,
            moved,
        } => {
            if !shift.is_in_bounds(rewritten) {
                warn!(handle = %rewritten, "shop_handle_out_of_bounds");
                report.anomalies += 1;
            }
            Some(Some((rewritten, moved)))
        }
        Remap::Removed => Some(None),
        Remap::Stale => {
            warn!(handle = %handle, "shop_handle_stale");
            report.anomalies += 1;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::olc::session::{EditTarget, Scratch};
    use crate::registry::{MobPayload, ObjPayload, Prototype, PrototypeStore};
    use crate::world::{LiveWorld, Shop, SimWorld, WearPosition};
    use crate::zone::{ResetCommand, ResetOp, ResetPolicy, ResetScript, Zone, ZoneHeader};

    struct Fixture {
        mobs: PrototypeStore<MobPayload>,
        objs: PrototypeStore<ObjPayload>,
        world: SimWorld,
        zones: ZoneTable,
        shops: ShopTable,
        sessions: SessionRegistry,
    }

    fn header(number: i32) -> ZoneHeader {
        ZoneHeader {
            number,
            name: format!("Zone {number}"),
            top: number * 100 + 99,
            lifespan: 10,
            reset_policy: ResetPolicy::Always,
        }
    }

    fn fixture() -> Fixture {
        let mobs = PrototypeStore::from_prototypes(vec![
            Prototype::new(3000, MobPayload::default()),
            Prototype::new(3010, MobPayload::default()),
            Prototype::new(3020, MobPayload::default()),
        ])
        .expect("mobs");
        let objs = PrototypeStore::from_prototypes(vec![
            Prototype::new(3100, ObjPayload::default()),
            Prototype::new(3110, ObjPayload::default()),
        ])
        .expect("objs");
        let mut world = SimWorld::new();
        world.add_room(3001, "Temple");
        Fixture {
            mobs,
            objs,
            world,
            zones: ZoneTable::new(),
            shops: ShopTable::new(),
            sessions: SessionRegistry::new(),
        }
    }

    impl Fixture {
        fn mob(&self, vnum: i32) -> ProtoHandle {
            self.mobs.handle_for_vnum(vnum).expect("mob")
        }

        fn obj(&self, vnum: i32) -> ProtoHandle {
            self.objs.handle_for_vnum(vnum).expect("obj")
        }

        fn coordinator(&mut self) -> FixupCoordinator<'_, SimWorld> {
            FixupCoordinator::new(
                &mut self.world,
                &mut self.zones,
                &mut self.shops,
                &mut self.sessions,
            )
        }
    }

    fn load(mob: ProtoHandle) -> ResetCommand {
        ResetCommand::new(
            ResetOp::LoadMobile {
                mob,
                max: 1,
                room: 3001,
            },
            false,
        )
    }

    fn equip(obj: ProtoHandle) -> ResetCommand {
        ResetCommand::new(
            ResetOp::EquipToMob {
                obj,
                max: 1,
                position: WearPosition::new(1).expect("slot"),
            },
            true,
        )
    }

    #[test]
    fn insert_below_shifts_instance_command_keeper_and_session() {
        let mut fx = fixture();
        let baker = fx.mob(3010);
        let room = fx.world.find_room(3001).expect("room");
        let instance = fx.world.spawn_mob(baker, "the baker", room);
        fx.zones
            .insert(Zone::new(header(30), ResetScript::from_commands(vec![load(baker)])))
            .expect("zone");
        fx.shops = ShopTable::from_shops(vec![Shop {
            vnum: 1,
            keeper: Some(baker),
            products: vec![fx.obj(3110)],
        }]);
        let session = fx.sessions.open(
            EditTarget::Zone(30),
            Scratch::Zone {
                header: header(30),
                script: ResetScript::from_commands(vec![load(baker)]),
            },
        );

        let (_, shift) = fx
            .mobs
            .insert(Prototype::new(3005, MobPayload::default()))
            .expect("insert");
        let report = fx.coordinator().on_insert(&shift);

        let expected = fx.mob(3010);
        assert_eq!(expected.rnum(), 2);
        assert_eq!(fx.world.instance(instance).expect("instance").proto, expected);
        assert_eq!(fx.zones.get(30).expect("zone").script.commands()[0], load(expected));
        assert_eq!(fx.shops.get(1).expect("shop").keeper, Some(expected));
        assert_eq!(
            fx.sessions.get(session).expect("session").script().expect("script").commands()[0],
            load(expected)
        );
        // Products are objects: untouched by a mobile shift.
        assert_eq!(fx.shops.get(1).expect("shop").products, vec![fx.obj(3110)]);
        assert_eq!(report.instances_shifted, 1);
        assert_eq!(report.commands_shifted, 1);
        assert_eq!(report.keepers_shifted, 1);
        assert_eq!(report.session_commands_shifted, 1);
        assert_eq!(report.anomalies, 0);
        assert!(!fx.zones.is_unsaved(30));
    }

    #[test]
    fn remove_below_shifts_down_and_cascades_dependents() {
        let mut fx = fixture();
        let guard = fx.mob(3000);
        let cook = fx.mob(3020);
        let sword = fx.obj(3100);
        fx.zones
            .insert(Zone::new(
                header(30),
                ResetScript::from_commands(vec![load(guard), equip(sword), load(cook), equip(sword)]),
            ))
            .expect("zone");
        fx.shops = ShopTable::from_shops(vec![
            Shop {
                vnum: 1,
                keeper: Some(guard),
                products: Vec::new(),
            },
            Shop {
                vnum: 2,
                keeper: Some(cook),
                products: Vec::new(),
            },
        ]);
        let room = fx.world.find_room(3001).expect("room");
        let instance = fx.world.spawn_mob(cook, "the cook", room);

        let (_, shift) = fx.mobs.remove(0).expect("remove guard");
        let report = fx.coordinator().on_remove(&shift);

        let cook_now = fx.mob(3020);
        assert_eq!(cook_now.rnum(), 1);
        let live = fx.world.instance(instance).expect("instance").proto;
        assert_eq!(live.rnum(), cook.rnum() - 1);
        assert_eq!(live.generation(), fx.mobs.generation());
        assert_eq!(live, cook_now);
        assert_eq!(report.instances_shifted, 1);
        let script = &fx.zones.get(30).expect("zone").script;
        assert_eq!(script.count(), 2);
        assert_eq!(script.commands()[0], load(cook_now));
        assert_eq!(fx.shops.get(1).expect("shop 1").keeper, None);
        assert_eq!(fx.shops.get(2).expect("shop 2").keeper, Some(cook_now));
        assert_eq!(report.commands_removed, 2);
        assert_eq!(report.keepers_cleared, 1);
        assert!(fx.zones.is_unsaved(30));
    }

    #[test]
    fn removed_product_is_dropped_and_live_orphan_is_an_anomaly() {
        let mut fx = fixture();
        let chest = fx.obj(3100);
        let key = fx.obj(3110);
        fx.world.spawn_obj(chest, "a chest");
        fx.shops = ShopTable::from_shops(vec![Shop {
            vnum: 1,
            keeper: None,
            products: vec![chest, key],
        }]);

        let (_, shift) = fx.objs.remove(0).expect("remove chest");
        let report = fx.coordinator().on_remove(&shift);

        assert_eq!(fx.shops.get(1).expect("shop").products, vec![fx.obj(3110)]);
        assert_eq!(report.products_dropped, 1);
        assert_eq!(report.products_shifted, 1);
        assert_eq!(report.anomalies, 1);
    }
}
