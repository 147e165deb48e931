use std::collections::{BTreeMap, HashMap};

use crate::registry::{ProtoHandle, ProtoKind};

use super::live::{
    Direction, DoorFlags, DoorState, ExitId, InstanceId, LiveWorld, Location, PlacementError,
    RoomId, RoomVnum,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimExit {
    pub to_room: Option<RoomVnum>,
    pub flags: DoorFlags,
}

#[derive(Debug, Clone)]
pub struct SimRoom {
    pub vnum: RoomVnum,
    pub name: String,
    exits: [Option<SimExit>; 6],
}

impl SimRoom {
    pub fn exit(&self, direction: Direction) -> Option<&SimExit> {
        self.exits[direction.index()].as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct SimInstance {
    pub id: InstanceId,
    pub proto: ProtoHandle,
    pub short_descr: String,
    pub location: Location,
}

#[derive(Debug, Default)]
pub struct InstanceIdAllocator {
    next: u64,
}

impl InstanceIdAllocator {
    pub fn allocate(&mut self) -> InstanceId {
        let id = InstanceId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// In-memory live world: rooms with doors, mob and object instances, and the
/// rooms players currently stand in.
#[derive(Debug, Default)]
pub struct SimWorld {
    allocator: InstanceIdAllocator,
    rooms: Vec<SimRoom>,
    room_ids_by_vnum: HashMap<RoomVnum, RoomId>,
    instances: BTreeMap<InstanceId, SimInstance>,
    player_rooms: Vec<RoomId>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_room(&mut self, vnum: RoomVnum, name: impl Into<String>) -> RoomId {
        if let Some(existing) = self.room_ids_by_vnum.get(&vnum) {
            return *existing;
        }
        let id = RoomId(self.rooms.len() as u32);
        self.rooms.push(SimRoom {
            vnum,
            name: name.into(),
            exits: Default::default(),
        });
        self.room_ids_by_vnum.insert(vnum, id);
        id
    }

    /// Adds or replaces an exit. The destination may name a room that is not
    /// loaded yet; it is looked up by vnum when followed.
    pub fn set_exit(
        &mut self,
        from: RoomVnum,
        direction: Direction,
        to_room: Option<RoomVnum>,
    ) -> bool {
        let Some(room) = self.room_mut(from) else {
            return false;
        };
        room.exits[direction.index()] = Some(SimExit {
            to_room,
            flags: DoorFlags::default(),
        });
        true
    }

    pub fn room(&self, vnum: RoomVnum) -> Option<&SimRoom> {
        self.room_ids_by_vnum
            .get(&vnum)
            .and_then(|id| self.rooms.get(id.0 as usize))
    }

    fn room_mut(&mut self, vnum: RoomVnum) -> Option<&mut SimRoom> {
        let id = *self.room_ids_by_vnum.get(&vnum)?;
        self.rooms.get_mut(id.0 as usize)
    }

    pub fn rooms(&self) -> &[SimRoom] {
        &self.rooms
    }

    pub fn exit_flags(&self, room: RoomVnum, direction: Direction) -> Option<DoorFlags> {
        self.room(room)
            .and_then(|room| room.exit(direction))
            .map(|exit| exit.flags)
    }

    pub fn add_player(&mut self, room: RoomId) {
        self.player_rooms.push(room);
    }

    pub fn remove_player(&mut self, room: RoomId) -> bool {
        match self.player_rooms.iter().position(|candidate| *candidate == room) {
            Some(index) => {
                self.player_rooms.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn instance(&self, id: InstanceId) -> Option<&SimInstance> {
        self.instances.get(&id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &SimInstance> {
        self.instances.values()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn contents(&self, location: Location) -> Vec<InstanceId> {
        self.instances
            .values()
            .filter(|instance| instance.location == location)
            .map(|instance| instance.id)
            .collect()
    }

    fn held_by(&self, holder: InstanceId) -> Vec<InstanceId> {
        self.instances
            .values()
            .filter(|instance| match instance.location {
                Location::CarriedBy(id) | Location::Inside(id) => id == holder,
                Location::WornBy { wearer, .. } => wearer == holder,
                Location::Nowhere | Location::Room(_) => false,
            })
            .map(|instance| instance.id)
            .collect()
    }

    fn spawn(&mut self, proto: ProtoHandle, short_descr: &str, location: Location) -> InstanceId {
        let id = self.allocator.allocate();
        self.instances.insert(
            id,
            SimInstance {
                id,
                proto,
                short_descr: short_descr.to_string(),
                location,
            },
        );
        id
    }

    fn is_mobile(&self, id: InstanceId) -> bool {
        self.instances
            .get(&id)
            .is_some_and(|instance| instance.proto.kind() == ProtoKind::Mobile)
    }
}

impl LiveWorld for SimWorld {
    fn find_room(&self, vnum: RoomVnum) -> Option<RoomId> {
        self.room_ids_by_vnum.get(&vnum).copied()
    }

    fn room_vnum(&self, room: RoomId) -> Option<RoomVnum> {
        self.rooms.get(room.0 as usize).map(|room| room.vnum)
    }

    fn find_exit(&self, room: RoomId, direction: Direction) -> Option<ExitId> {
        self.rooms
            .get(room.0 as usize)
            .and_then(|entry| entry.exit(direction))
            .map(|_| ExitId { room, direction })
    }

    fn exit_destination(&self, exit: ExitId) -> Option<RoomId> {
        self.rooms
            .get(exit.room.0 as usize)
            .and_then(|room| room.exit(exit.direction))
            .and_then(|entry| entry.to_room)
            .and_then(|vnum| self.find_room(vnum))
    }

    fn set_door_state(&mut self, exit: ExitId, state: DoorState) {
        if let Some(Some(entry)) = self
            .rooms
            .get_mut(exit.room.0 as usize)
            .map(|room| room.exits[exit.direction.index()].as_mut())
        {
            entry.flags = state.flags();
        }
    }

    fn spawn_mob(&mut self, proto: ProtoHandle, short_descr: &str, room: RoomId) -> InstanceId {
        self.spawn(proto, short_descr, Location::Room(room))
    }

    fn spawn_obj(&mut self, proto: ProtoHandle, short_descr: &str) -> InstanceId {
        self.spawn(proto, short_descr, Location::Nowhere)
    }

    fn place_obj(&mut self, obj: InstanceId, location: Location) -> Result<(), PlacementError> {
        match location {
            Location::Nowhere => {}
            Location::Room(room) => {
                if self.rooms.get(room.0 as usize).is_none() {
                    return Err(PlacementError::MissingRoom(room));
                }
            }
            Location::CarriedBy(holder) | Location::Inside(holder) => {
                if !self.instances.contains_key(&holder) {
                    return Err(PlacementError::MissingInstance(holder));
                }
            }
            Location::WornBy { wearer, position } => {
                if !self.is_mobile(wearer) {
                    return Err(PlacementError::MissingInstance(wearer));
                }
                if !self.contents(location).is_empty() {
                    return Err(PlacementError::SlotOccupied { wearer, position });
                }
            }
        }

        let instance = self
            .instances
            .get_mut(&obj)
            .ok_or(PlacementError::MissingInstance(obj))?;
        instance.location = location;
        Ok(())
    }

    fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    fn find_obj_in_room(&self, room: RoomId, proto: ProtoHandle) -> Option<InstanceId> {
        // Most recently placed first, like a room's content list.
        self.instances
            .values()
            .rev()
            .find(|instance| instance.proto == proto && instance.location == Location::Room(room))
            .map(|instance| instance.id)
    }

    fn instances_of(&self, proto: ProtoHandle) -> Vec<InstanceId> {
        self.instances
            .values()
            .filter(|instance| instance.proto == proto)
            .map(|instance| instance.id)
            .collect()
    }

    fn spill_contents(&mut self, id: InstanceId) -> usize {
        let target = match self.instances.get(&id).map(|instance| instance.location) {
            Some(Location::WornBy { wearer, .. }) => Location::CarriedBy(wearer),
            Some(location) => location,
            None => return 0,
        };
        let held = self.held_by(id);
        for item in &held {
            if let Some(instance) = self.instances.get_mut(item) {
                instance.location = target;
            }
        }
        held.len()
    }

    fn extract(&mut self, id: InstanceId) -> Vec<ProtoHandle> {
        let mut removed = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let Some(instance) = self.instances.remove(&next) else {
                continue;
            };
            removed.push(instance.proto);
            pending.extend(self.held_by(next));
        }
        removed
    }

    fn for_each_proto_ref_mut(&mut self, visit: &mut dyn FnMut(InstanceId, &mut ProtoHandle)) {
        for instance in self.instances.values_mut() {
            visit(instance.id, &mut instance.proto);
        }
    }

    fn refresh_short_descr(&mut self, proto: ProtoHandle, short_descr: &str) -> usize {
        let mut refreshed = 0;
        for instance in self.instances.values_mut() {
            if instance.proto == proto {
                instance.short_descr = short_descr.to_string();
                refreshed += 1;
            }
        }
        refreshed
    }

    fn has_players_between(&self, low: RoomVnum, high: RoomVnum) -> bool {
        self.player_rooms.iter().any(|room| {
            self.room_vnum(*room)
                .is_some_and(|vnum| (low..=high).contains(&vnum))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WearPosition;

    fn mob_handle(rnum: u32) -> ProtoHandle {
        ProtoHandle::new(ProtoKind::Mobile, rnum, 0)
    }

    fn obj_handle(rnum: u32) -> ProtoHandle {
        ProtoHandle::new(ProtoKind::Object, rnum, 0)
    }

    #[test]
    fn exits_resolve_by_vnum_and_doors_take_state_flags() {
        let mut world = SimWorld::new();
        let a = world.add_room(100, "A");
        let b = world.add_room(101, "B");
        assert!(world.set_exit(100, Direction::East, Some(101)));
        assert!(!world.set_exit(999, Direction::East, Some(101)));

        let exit = world.find_exit(a, Direction::East).expect("exit");
        assert_eq!(world.exit_destination(exit), Some(b));
        assert!(world.find_exit(a, Direction::West).is_none());

        world.set_door_state(exit, DoorState::Locked);
        let flags = world.exit_flags(100, Direction::East).expect("flags");
        assert!(flags.closed && flags.locked && !flags.hidden);
    }

    #[test]
    fn extract_removes_everything_held() {
        let mut world = SimWorld::new();
        let room = world.add_room(100, "A");
        let mob = world.spawn_mob(mob_handle(0), "a guard", room);
        let bag = world.spawn_obj(obj_handle(0), "a bag");
        let coin = world.spawn_obj(obj_handle(1), "a coin");
        world
            .place_obj(bag, Location::CarriedBy(mob))
            .expect("carry bag");
        world.place_obj(coin, Location::Inside(bag)).expect("coin in bag");

        let removed = world.extract(mob);
        assert_eq!(removed.len(), 3);
        assert_eq!(world.instance_count(), 0);
    }

    #[test]
    fn spilled_contents_land_where_the_holder_is() {
        let mut world = SimWorld::new();
        let room = world.add_room(100, "A");
        let mob = world.spawn_mob(mob_handle(0), "a guard", room);
        let position = WearPosition::new(9).expect("slot");
        let pack = world.spawn_obj(obj_handle(0), "a backpack");
        let coin = world.spawn_obj(obj_handle(1), "a coin");
        let helm = world.spawn_obj(obj_handle(2), "a helm");
        world
            .place_obj(pack, Location::WornBy { wearer: mob, position })
            .expect("wear pack");
        world.place_obj(coin, Location::Inside(pack)).expect("coin in pack");
        world
            .place_obj(helm, Location::CarriedBy(mob))
            .expect("carry helm");

        // A worn container empties into its wearer's inventory.
        assert_eq!(world.spill_contents(pack), 1);
        assert_eq!(
            world.instance(coin).expect("coin").location,
            Location::CarriedBy(mob)
        );

        assert_eq!(world.spill_contents(mob), 3);
        for id in [pack, coin, helm] {
            assert_eq!(world.instance(id).expect("item").location, Location::Room(room));
        }
        assert_eq!(world.extract(mob), vec![mob_handle(0)]);
        assert_eq!(world.instance_count(), 3);
        assert_eq!(world.spill_contents(mob), 0);
    }

    #[test]
    fn worn_slot_can_only_hold_one_object() {
        let mut world = SimWorld::new();
        let room = world.add_room(100, "A");
        let mob = world.spawn_mob(mob_handle(0), "a guard", room);
        let position = WearPosition::new(5).expect("slot");
        let first = world.spawn_obj(obj_handle(0), "a helm");
        let second = world.spawn_obj(obj_handle(0), "a helm");

        world
            .place_obj(first, Location::WornBy { wearer: mob, position })
            .expect("first");
        let error = world
            .place_obj(second, Location::WornBy { wearer: mob, position })
            .expect_err("occupied");
        assert_eq!(error, PlacementError::SlotOccupied { wearer: mob, position });
    }

    #[test]
    fn players_count_toward_zone_range() {
        let mut world = SimWorld::new();
        let room = world.add_room(3001, "Temple");
        assert!(!world.has_players_between(3000, 3099));
        world.add_player(room);
        assert!(world.has_players_between(3000, 3099));
        assert!(!world.has_players_between(3100, 3199));
        assert!(world.remove_player(room));
        assert!(!world.has_players_between(3000, 3099));
    }
}
