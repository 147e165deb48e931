use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::OlcError;
use crate::registry::{ProtoHandle, PrototypeRegistry, Vnum};
use crate::world::{
    CommandDispatcher, Direction, DoorState, ExitId, InstanceId, LiveWorld, Location, PlacementError,
    RoomId, RoomVnum, WearPosition,
};

use super::command::{Opcode, ResetCommand, ResetOp};
use super::table::ZoneTable;

/// Why a command did not take effect. These are normal outcomes of a run, not
/// errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CommandFailure {
    PopulationCapReached { count: u32, max: u32 },
    UnresolvedReference(String),
    NoMobLoaded,
    NoRoomLoaded,
    ContainerNotFound(ProtoHandle),
    ObjectNotInRoom { room: RoomVnum },
    ExitMissing { room: RoomVnum, direction: Direction },
    Placement(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CommandOutcome {
    Executed,
    Failed(CommandFailure),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    pub position: usize,
    pub opcode: Opcode,
    pub source_line: u32,
    pub outcome: CommandOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub zone: Vnum,
    pub commands: Vec<CommandReport>,
}

impl ResetReport {
    pub fn executed(&self) -> usize {
        self.count(|outcome| matches!(outcome, CommandOutcome::Executed))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, CommandOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, CommandOutcome::Skipped))
    }

    fn count(&self, predicate: impl Fn(&CommandOutcome) -> bool) -> usize {
        self.commands
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }
}

/// Interpreter state for one run. Starts fresh every time, so a leading
/// conditional command is always skipped.
#[derive(Debug, Default)]
struct RunState {
    last_mob: Option<InstanceId>,
    last_room: Option<RoomId>,
    last_success: bool,
    /// Every instance this run created, oldest first.
    loaded: Vec<(ProtoHandle, InstanceId)>,
}

impl RunState {
    fn most_recent(&self, proto: ProtoHandle, world: &impl LiveWorld) -> Option<InstanceId> {
        self.loaded
            .iter()
            .rev()
            .find(|(loaded_proto, id)| *loaded_proto == proto && world.contains(*id))
            .map(|(_, id)| *id)
    }
}

type StepResult = Result<(), CommandFailure>;

/// Runs reset scripts against the live world.
pub struct ResetEngine<'a, W, D> {
    registry: &'a mut PrototypeRegistry,
    world: &'a mut W,
    dispatcher: &'a mut D,
}

impl<'a, W: LiveWorld, D: CommandDispatcher> ResetEngine<'a, W, D> {
    pub fn new(registry: &'a mut PrototypeRegistry, world: &'a mut W, dispatcher: &'a mut D) -> Self {
        Self {
            registry,
            world,
            dispatcher,
        }
    }

    /// Executes the script of zone `number` once. The caller owns the zone's
    /// age; `WorldService::reset_zone` clears it afterwards.
    pub fn run(&mut self, zones: &ZoneTable, number: Vnum) -> Result<ResetReport, OlcError> {
        let zone = zones.require(number)?;
        let mut state = RunState::default();
        let mut commands = Vec::with_capacity(zone.script.count());

        for (position, command) in zone.script.iter().enumerate() {
            let outcome = if command.conditional && !state.last_success {
                CommandOutcome::Skipped
            } else {
                match self.step(zones, &mut state, command) {
                    Ok(()) => {
                        state.last_success = true;
                        CommandOutcome::Executed
                    }
                    Err(failure) => {
                        state.last_success = false;
                        log_failure(number, position, command, &failure);
                        CommandOutcome::Failed(failure)
                    }
                }
            };
            commands.push(CommandReport {
                position,
                opcode: command.opcode(),
                source_line: command.source_line,
                outcome,
            });
        }

        let report = ResetReport {
            zone: number,
            commands,
        };
        info!(
            zone = number,
            executed = report.executed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "zone_reset"
        );
        Ok(report)
    }

    fn step(&mut self, zones: &ZoneTable, state: &mut RunState, command: &ResetCommand) -> StepResult {
        match &command.op {
            ResetOp::LoadMobile { mob, max, room } => self.load_mobile(state, *mob, *max, *room),
            ResetOp::LoadObject { obj, max, room } => self.load_object(state, *obj, *max, *room),
            ResetOp::GiveToMob { obj, max } => {
                let mob = self.last_mob(state)?;
                self.load_onto(state, *obj, *max, Location::CarriedBy(mob))
            }
            ResetOp::EquipToMob { obj, max, position } => self.equip(state, *obj, *max, *position),
            ResetOp::PutInContainer { obj, max, container } => {
                let target = state
                    .most_recent(*container, &*self.world)
                    .ok_or(CommandFailure::ContainerNotFound(*container))?;
                self.load_onto(state, *obj, *max, Location::Inside(target))
            }
            ResetOp::RemoveFromRoom { room, obj } => self.remove_from_room(state, *room, *obj),
            ResetOp::SetDoorState {
                room,
                direction,
                state: door,
            } => self.set_door(zones, *room, *direction, *door),
            ResetOp::ForceMobCommand { mob, command } => {
                let actor = state
                    .most_recent(*mob, &*self.world)
                    .ok_or(CommandFailure::NoMobLoaded)?;
                self.dispatcher.dispatch(actor, command);
                Ok(())
            }
        }
    }

    fn load_mobile(&mut self, state: &mut RunState, mob: ProtoHandle, max: u32, room: RoomVnum) -> StepResult {
        self.check_cap(mob, max)?;
        let room_id = self.resolve_room(room)?;
        let short_descr = self.short_descr(mob)?;
        let id = self.world.spawn_mob(mob, &short_descr, room_id);
        self.note_spawned(mob)?;
        state.loaded.push((mob, id));
        state.last_mob = Some(id);
        state.last_room = Some(room_id);
        Ok(())
    }

    fn load_object(
        &mut self,
        state: &mut RunState,
        obj: ProtoHandle,
        max: u32,
        room: Option<RoomVnum>,
    ) -> StepResult {
        self.check_cap(obj, max)?;
        let room_id = room.map(|vnum| self.resolve_room(vnum)).transpose()?;
        let id = self.spawn_obj(state, obj)?;
        if let Some(room_id) = room_id {
            self.place(id, Location::Room(room_id))?;
            state.last_room = Some(room_id);
        }
        Ok(())
    }

    fn load_onto(&mut self, state: &mut RunState, obj: ProtoHandle, max: u32, location: Location) -> StepResult {
        self.check_cap(obj, max)?;
        let id = self.spawn_obj(state, obj)?;
        self.place(id, location)
    }

    fn equip(&mut self, state: &mut RunState, obj: ProtoHandle, max: u32, position: WearPosition) -> StepResult {
        let wearer = self.last_mob(state)?;
        self.check_cap(obj, max)?;
        let id = self.spawn_obj(state, obj)?;
        match self.world.place_obj(id, Location::WornBy { wearer, position }) {
            Ok(()) => Ok(()),
            Err(PlacementError::SlotOccupied { .. }) => {
                // The command still counts as done; only the object goes away.
                warn!(
                    wearer = %wearer,
                    slot = position.slot(),
                    proto = %obj,
                    "equip_slot_occupied"
                );
                let removed = self.world.extract(id);
                self.registry.note_extracted(&removed);
                Ok(())
            }
            Err(error) => {
                self.discard(id);
                Err(CommandFailure::Placement(error.to_string()))
            }
        }
    }

    /// A negative room operand means the room the run last loaded into.
    fn remove_from_room(&mut self, state: &RunState, room: RoomVnum, obj: ProtoHandle) -> StepResult {
        let room_id = if room < 0 {
            state.last_room.ok_or(CommandFailure::NoRoomLoaded)?
        } else {
            self.resolve_room(room)?
        };
        let found = self.world.find_obj_in_room(room_id, obj).ok_or_else(|| {
            CommandFailure::ObjectNotInRoom {
                room: self.world.room_vnum(room_id).unwrap_or(room),
            }
        })?;
        let removed = self.world.extract(found);
        self.registry.note_extracted(&removed);
        Ok(())
    }

    fn set_door(&mut self, zones: &ZoneTable, room: RoomVnum, direction: Direction, door: DoorState) -> StepResult {
        let room_id = self.resolve_room(room)?;
        let exit = self
            .world
            .find_exit(room_id, direction)
            .ok_or(CommandFailure::ExitMissing { room, direction })?;
        self.world.set_door_state(exit, door);
        self.sync_far_side(zones, room, exit);
        Ok(())
    }

    /// When a door leads into another zone, that zone's door commands for the
    /// far side run too, so both sides of the door agree.
    fn sync_far_side(&mut self, zones: &ZoneTable, room: RoomVnum, exit: ExitId) {
        let Some(other_id) = self.world.exit_destination(exit) else {
            return;
        };
        let Some(other_vnum) = self.world.room_vnum(other_id) else {
            return;
        };
        let Some(other_zone) = zones.zone_for_room(other_vnum) else {
            return;
        };
        let this_zone = zones.zone_for_room(room).map(|zone| zone.number());
        if this_zone == Some(other_zone.number()) {
            return;
        }

        let reverse = exit.direction.reverse();
        let Some(back) = self.world.find_exit(other_id, reverse) else {
            return;
        };
        if self.world.exit_destination(back) != Some(exit.room) {
            return;
        }

        for command in &other_zone.script {
            if let ResetOp::SetDoorState {
                room: other_room,
                direction,
                state,
            } = command.op
            {
                if other_room == other_vnum && direction == reverse {
                    debug!(
                        zone = other_zone.number(),
                        room = other_vnum,
                        direction = direction.name(),
                        "door_synced_across_zones"
                    );
                    self.world.set_door_state(back, state);
                }
            }
        }
    }

    fn last_mob(&self, state: &RunState) -> Result<InstanceId, CommandFailure> {
        state
            .last_mob
            .filter(|id| self.world.contains(*id))
            .ok_or(CommandFailure::NoMobLoaded)
    }

    fn check_cap(&self, proto: ProtoHandle, max: u32) -> StepResult {
        let count = self.registry.instance_count(proto).map_err(unresolved)?;
        if count >= max {
            return Err(CommandFailure::PopulationCapReached { count, max });
        }
        Ok(())
    }

    fn resolve_room(&self, room: RoomVnum) -> Result<RoomId, CommandFailure> {
        self.world
            .find_room(room)
            .ok_or_else(|| CommandFailure::UnresolvedReference(format!("room vnum {room}")))
    }

    fn short_descr(&self, proto: ProtoHandle) -> Result<String, CommandFailure> {
        self.registry
            .short_descr(proto)
            .map(str::to_string)
            .map_err(unresolved)
    }

    fn spawn_obj(&mut self, state: &mut RunState, obj: ProtoHandle) -> Result<InstanceId, CommandFailure> {
        let short_descr = self.short_descr(obj)?;
        let id = self.world.spawn_obj(obj, &short_descr);
        self.note_spawned(obj)?;
        state.loaded.push((obj, id));
        Ok(id)
    }

    fn note_spawned(&mut self, proto: ProtoHandle) -> StepResult {
        self.registry.note_spawned(proto).map_err(unresolved)
    }

    fn place(&mut self, id: InstanceId, location: Location) -> StepResult {
        self.world.place_obj(id, location).map_err(|error| {
            self.discard(id);
            CommandFailure::Placement(error.to_string())
        })
    }

    fn discard(&mut self, id: InstanceId) {
        let removed = self.world.extract(id);
        self.registry.note_extracted(&removed);
    }
}

fn unresolved(error: OlcError) -> CommandFailure {
    CommandFailure::UnresolvedReference(error.to_string())
}

fn log_failure(zone: Vnum, position: usize, command: &ResetCommand, failure: &CommandFailure) {
    match failure {
        CommandFailure::PopulationCapReached { count, max } => debug!(
            zone,
            position,
            opcode = %command.opcode().code(),
            count,
            max,
            "reset_command_capped"
        ),
        other => warn!(
            zone,
            position,
            opcode = %command.opcode().code(),
            line = command.source_line,
            failure = ?other,
            "reset_command_failed"
        ),
    }
}
