use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::OlcError;
use crate::registry::{
    MobPayload, ObjPayload, ProtoHandle, ProtoKind, Prototype, PrototypePayload, PrototypeRegistry,
    PrototypeStore, ShiftKind, StoreFor, StoreShift, Vnum,
};
use crate::world::{CommandDispatcher, InstanceId, LiveWorld, ShopTable};
use crate::zone::{ResetEngine, ResetReport, ResetScript, ZoneHeader, ZoneScheduler, ZoneTable};

use super::fixup::{FixupCoordinator, FixupReport};
use super::session::{EditSession, EditTarget, PrototypeDraft, Scratch, SessionId, SessionRegistry};

/// What a successful commit changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CommitOutcome {
    ZoneReplaced {
        zone: Vnum,
        commands: usize,
    },
    PrototypeReplaced {
        handle: ProtoHandle,
        refreshed: usize,
    },
    PrototypeInserted {
        handle: ProtoHandle,
        fixup: FixupReport,
    },
    PrototypePurged {
        kind: ProtoKind,
        vnum: Vnum,
        extracted: usize,
        fixup: Option<FixupReport>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneSummary {
    pub number: Vnum,
    pub name: String,
    pub top: Vnum,
    pub lifespan: u32,
    pub age: u32,
    pub reset_policy: &'static str,
    pub commands: usize,
    pub queued: bool,
    pub unsaved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub target: String,
    pub dirty: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorldSnapshot {
    pub mobiles: usize,
    pub objects: usize,
    pub mobile_generation: u32,
    pub object_generation: u32,
    pub live_mobiles: u64,
    pub live_objects: u64,
    pub shops: usize,
    pub zones: Vec<ZoneSummary>,
    pub sessions: Vec<SessionSummary>,
}

impl WorldSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Sole owner of the prototype stores, zone table, shop table, and edit
/// sessions. Every mutation that can move an rnum goes through here, so the
/// fixup walk always runs before any other code sees the new layout.
#[derive(Debug)]
pub struct WorldService<W, D> {
    registry: PrototypeRegistry,
    zones: ZoneTable,
    shops: ShopTable,
    sessions: SessionRegistry,
    scheduler: ZoneScheduler,
    world: W,
    dispatcher: D,
}

impl<W: LiveWorld, D: CommandDispatcher> WorldService<W, D> {
    pub fn new(
        registry: PrototypeRegistry,
        zones: ZoneTable,
        shops: ShopTable,
        world: W,
        dispatcher: D,
        scheduler: ZoneScheduler,
    ) -> Self {
        Self {
            registry,
            zones,
            shops,
            sessions: SessionRegistry::new(),
            scheduler,
            world,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &PrototypeRegistry {
        &self.registry
    }

    pub fn zones(&self) -> &ZoneTable {
        &self.zones
    }

    pub fn shops(&self) -> &ShopTable {
        &self.shops
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn scheduler(&self) -> &ZoneScheduler {
        &self.scheduler
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    /// Game-side extraction of one instance and everything it holds.
    /// Returns how many instances went away.
    pub fn extract_instance(&mut self, id: InstanceId) -> usize {
        let removed = self.world.extract(id);
        self.registry.note_extracted(&removed);
        debug!(instance = %id, removed = removed.len(), "instance_extracted");
        removed.len()
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    pub fn insert_mobile(&mut self, proto: Prototype<MobPayload>) -> Result<(ProtoHandle, FixupReport), OlcError> {
        let (handle, shift) = self.registry.mobs_mut().insert(proto)?;
        let report = self.fixup(&shift);
        Ok((handle, report))
    }

    pub fn insert_object(&mut self, proto: Prototype<ObjPayload>) -> Result<(ProtoHandle, FixupReport), OlcError> {
        let (handle, shift) = self.registry.objs_mut().insert(proto)?;
        let report = self.fixup(&shift);
        Ok((handle, report))
    }

    /// Removes a prototype that has no live instances.
    pub fn remove_prototype(&mut self, kind: ProtoKind, vnum: Vnum) -> Result<FixupReport, OlcError> {
        let handle = self.require_handle(kind, vnum)?;
        let shift = match kind {
            ProtoKind::Mobile => self.registry.mobs_mut().remove(handle.rnum())?.1,
            ProtoKind::Object => self.registry.objs_mut().remove(handle.rnum())?.1,
        };
        Ok(self.fixup(&shift))
    }

    /// Extracts every live instance of the prototype, then removes it.
    /// Whatever those instances held is dropped where they were, not
    /// destroyed. Returns how many instances of the prototype went away.
    pub fn purge_prototype(&mut self, kind: ProtoKind, vnum: Vnum) -> Result<(usize, FixupReport), OlcError> {
        let handle = self.require_handle(kind, vnum)?;
        let mut extracted = 0;
        for id in self.world.instances_of(handle) {
            let spilled = self.world.spill_contents(id);
            if spilled > 0 {
                debug!(instance = %id, spilled, "instance_contents_spilled");
            }
            let removed = self.world.extract(id);
            extracted += removed.len();
            self.registry.note_extracted(&removed);
        }
        let remaining = self.registry.instance_count(handle)?;
        if remaining > 0 {
            // Counts drifted from the world; nothing left to extract.
            warn!(kind = %kind, vnum, remaining, "purge_clearing_stale_instance_count");
            self.reset_instance_count(handle)?;
        }
        let report = self.remove_prototype(kind, vnum)?;
        info!(kind = %kind, vnum, extracted, "prototype_purged");
        Ok((extracted, report))
    }

    pub fn reset_zone(&mut self, number: Vnum) -> Result<ResetReport, OlcError> {
        let report = ResetEngine::new(&mut self.registry, &mut self.world, &mut self.dispatcher)
            .run(&self.zones, number)?;
        self.zones.require_mut(number)?.age = 0;
        Ok(report)
    }

    /// Resets every zone once, in zone order. Used at boot.
    pub fn reset_all(&mut self) -> Vec<ResetReport> {
        let mut reports = Vec::with_capacity(self.zones.len());
        for number in self.zones.numbers() {
            match self.reset_zone(number) {
                Ok(report) => reports.push(report),
                Err(error) => warn!(zone = number, error = %error, "boot_reset_failed"),
            }
        }
        reports
    }

    /// One zone pulse: age zones when a minute has passed and reset at most
    /// one due zone.
    pub fn pulse(&mut self) -> Option<ResetReport> {
        let number = self.scheduler.pulse(&mut self.zones, &self.world)?;
        match self.reset_zone(number) {
            Ok(report) => Some(report),
            Err(error) => {
                warn!(zone = number, error = %error, "scheduled_reset_failed");
                None
            }
        }
    }

    pub fn begin_zone_edit(&mut self, number: Vnum) -> Result<SessionId, OlcError> {
        let zone = self.zones.require(number)?;
        let scratch = Scratch::Zone {
            header: zone.header.clone(),
            script: zone.script.clone(),
        };
        let id = self.sessions.open(EditTarget::Zone(number), scratch);
        info!(session = %id, zone = number, "zone_edit_begun");
        Ok(id)
    }

    pub fn begin_mobile_edit(&mut self, vnum: Vnum) -> SessionId {
        let draft = match self.registry.mobs().get(vnum) {
            Some(proto) => PrototypeDraft::from_existing(proto),
            None => PrototypeDraft::blank(vnum),
        };
        self.open_prototype_session(ProtoKind::Mobile, vnum, Scratch::Mobile(draft))
    }

    pub fn begin_object_edit(&mut self, vnum: Vnum) -> SessionId {
        let draft = match self.registry.objs().get(vnum) {
            Some(proto) => PrototypeDraft::from_existing(proto),
            None => PrototypeDraft::blank(vnum),
        };
        self.open_prototype_session(ProtoKind::Object, vnum, Scratch::Object(draft))
    }

    pub fn session(&self, id: SessionId) -> Result<&EditSession, OlcError> {
        self.sessions.get(id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Result<&mut EditSession, OlcError> {
        self.sessions.get_mut(id)
    }

    /// Applies the session's scratch in one step and closes the session. On
    /// error the live data is untouched and the session stays open.
    pub fn commit(&mut self, id: SessionId) -> Result<CommitOutcome, OlcError> {
        let session = self.sessions.get(id)?;
        match session.scratch() {
            Scratch::Zone { header, script } => self.validate_zone(header, script)?,
            Scratch::Mobile(_) | Scratch::Object(_) => {}
        }

        let scratch = session.scratch().clone();
        let outcome = match scratch {
            Scratch::Zone { header, script } => self.commit_zone(header, script)?,
            Scratch::Mobile(draft) => self.commit_prototype(draft, ProtoKind::Mobile)?,
            Scratch::Object(draft) => self.commit_prototype(draft, ProtoKind::Object)?,
        };
        let session = self.sessions.take(id)?;
        info!(session = %id, target = %session.target(), "session_committed");
        Ok(outcome)
    }

    pub fn discard(&mut self, id: SessionId) -> Result<(), OlcError> {
        let session = self.sessions.take(id)?;
        info!(session = %id, target = %session.target(), dirty = session.is_dirty(), "session_discarded");
        Ok(())
    }

    /// Drops the session of a disconnected editor, if it is still open.
    pub fn teardown_session(&mut self, id: SessionId) {
        match self.sessions.take(id) {
            Ok(session) => info!(session = %id, target = %session.target(), "session_torn_down"),
            Err(_) => debug!(session = %id, "teardown_without_session"),
        }
    }

    pub(crate) fn mark_zone_saved(&mut self, number: Vnum) {
        self.zones.mark_saved(number);
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            mobiles: self.registry.mobs().len(),
            objects: self.registry.objs().len(),
            mobile_generation: self.registry.mobs().generation(),
            object_generation: self.registry.objs().generation(),
            live_mobiles: live_instances(self.registry.mobs()),
            live_objects: live_instances(self.registry.objs()),
            shops: self.shops.len(),
            zones: self
                .zones
                .iter()
                .map(|zone| ZoneSummary {
                    number: zone.number(),
                    name: zone.header.name.clone(),
                    top: zone.header.top,
                    lifespan: zone.header.lifespan,
                    age: zone.age,
                    reset_policy: zone.header.reset_policy.label(),
                    commands: zone.script.count(),
                    queued: self.scheduler.is_queued(zone.number()),
                    unsaved: self.zones.is_unsaved(zone.number()),
                })
                .collect(),
            sessions: self
                .sessions
                .iter()
                .map(|session| SessionSummary {
                    id: session.id(),
                    target: session.target().to_string(),
                    dirty: session.is_dirty(),
                })
                .collect(),
        }
    }

    fn open_prototype_session(&mut self, kind: ProtoKind, vnum: Vnum, scratch: Scratch) -> SessionId {
        let id = self.sessions.open(EditTarget::Prototype { kind, vnum }, scratch);
        info!(session = %id, kind = %kind, vnum, "prototype_edit_begun");
        id
    }

    fn validate_zone(&self, header: &ZoneHeader, script: &ResetScript) -> Result<(), OlcError> {
        header.validate()?;
        self.zones.check_overlap(header)?;
        for room in script.room_refs() {
            if self.world.find_room(room).is_none() {
                return Err(OlcError::UnresolvedReference(format!("room vnum {room}")));
            }
        }
        for command in script {
            for handle in command.op.proto_refs() {
                match handle.kind() {
                    ProtoKind::Mobile => self.registry.mobs().resolve(handle).map(|_| ())?,
                    ProtoKind::Object => self.registry.objs().resolve(handle).map(|_| ())?,
                }
            }
        }
        Ok(())
    }

    fn commit_zone(&mut self, header: ZoneHeader, script: ResetScript) -> Result<CommitOutcome, OlcError> {
        let number = header.number;
        let zone = self.zones.require_mut(number)?;
        let commands = script.count();
        zone.header = header;
        zone.script = script;
        self.zones.mark_unsaved(number);
        Ok(CommitOutcome::ZoneReplaced {
            zone: number,
            commands,
        })
    }

    fn commit_prototype<P: PrototypePayload>(
        &mut self,
        draft: PrototypeDraft<P>,
        kind: ProtoKind,
    ) -> Result<CommitOutcome, OlcError>
    where
        PrototypeRegistry: StoreFor<P>,
    {
        let vnum = draft.vnum;
        let exists = self.registry.handle_for(kind, vnum).is_some();
        let outcome = if draft.purge {
            if exists {
                let (extracted, fixup) = self.purge_prototype(kind, vnum)?;
                CommitOutcome::PrototypePurged {
                    kind,
                    vnum,
                    extracted,
                    fixup: Some(fixup),
                }
            } else {
                CommitOutcome::PrototypePurged {
                    kind,
                    vnum,
                    extracted: 0,
                    fixup: None,
                }
            }
        } else if exists && !draft.is_new {
            let short_descr = draft.payload.short_descr().to_string();
            let handle = StoreFor::<P>::store_mut(&mut self.registry).replace_contents(
                vnum,
                draft.payload,
                draft.triggers,
            )?;
            let refreshed = self.world.refresh_short_descr(handle, &short_descr);
            CommitOutcome::PrototypeReplaced { handle, refreshed }
        } else {
            let (handle, shift) = StoreFor::<P>::store_mut(&mut self.registry).insert(draft.to_prototype())?;
            let fixup = self.fixup(&shift);
            CommitOutcome::PrototypeInserted { handle, fixup }
        };

        match self.zones.zone_for_room(vnum).map(|zone| zone.number()) {
            Some(number) => self.zones.mark_unsaved(number),
            None => warn!(kind = %kind, vnum, "prototype_outside_any_zone"),
        }
        Ok(outcome)
    }

    fn require_handle(&self, kind: ProtoKind, vnum: Vnum) -> Result<ProtoHandle, OlcError> {
        self.registry
            .handle_for(kind, vnum)
            .ok_or_else(|| OlcError::UnresolvedReference(format!("{kind} vnum {vnum}")))
    }

    fn reset_instance_count(&mut self, handle: ProtoHandle) -> Result<(), OlcError> {
        match handle.kind() {
            ProtoKind::Mobile => self.registry.mobs_mut().resolve_mut(handle)?.instance_count = 0,
            ProtoKind::Object => self.registry.objs_mut().resolve_mut(handle)?.instance_count = 0,
        }
        Ok(())
    }

    fn fixup(&mut self, shift: &StoreShift) -> FixupReport {
        let mut coordinator = FixupCoordinator::new(
            &mut self.world,
            &mut self.zones,
            &mut self.shops,
            &mut self.sessions,
        );
        match shift.change {
            ShiftKind::Inserted => coordinator.on_insert(shift),
            ShiftKind::Removed => coordinator.on_remove(shift),
        }
    }
}

fn live_instances<P: PrototypePayload>(store: &PrototypeStore<P>) -> u64 {
    store
        .iter()
        .map(|(_, proto)| u64::from(proto.instance_count))
        .sum()
}
