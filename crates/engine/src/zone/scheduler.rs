use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::registry::Vnum;
use crate::world::LiveWorld;

use super::table::{ResetPolicy, ZoneTable};

/// Zone aging and the queue of zones waiting to reset.
#[derive(Debug, Clone)]
pub struct ZoneScheduler {
    pulses_per_minute: u32,
    pulses: u32,
    queue: VecDeque<Vnum>,
}

impl ZoneScheduler {
    pub fn new(pulses_per_minute: u32) -> Self {
        Self {
            pulses_per_minute: pulses_per_minute.max(1),
            pulses: 0,
            queue: VecDeque::new(),
        }
    }

    pub fn queued(&self) -> impl Iterator<Item = Vnum> + '_ {
        self.queue.iter().copied()
    }

    pub fn is_queued(&self, zone: Vnum) -> bool {
        self.queue.contains(&zone)
    }

    /// Advances one zone pulse. Every `pulses_per_minute` pulses the zones
    /// age. Returns the zone that should reset now, if any; at most one per
    /// pulse.
    pub fn pulse(&mut self, zones: &mut ZoneTable, world: &impl LiveWorld) -> Option<Vnum> {
        self.pulses += 1;
        if self.pulses >= self.pulses_per_minute {
            self.pulses = 0;
            self.on_minute(zones);
        }
        self.next_due(zones, world)
    }

    /// Ages every zone that resets at all and enqueues those whose lifespan
    /// has run out.
    pub fn on_minute(&mut self, zones: &mut ZoneTable) {
        for zone in zones.iter_mut() {
            if zone.header.reset_policy == ResetPolicy::Never {
                continue;
            }
            if zone.age < zone.header.lifespan {
                zone.age += 1;
            }
            if zone.age >= zone.header.lifespan && !self.queue.contains(&zone.number()) {
                debug!(zone = zone.number(), age = zone.age, "zone_reset_queued");
                self.queue.push_back(zone.number());
            }
        }
    }

    /// Takes the first queued zone that may reset: policy `Always`, or
    /// `WhenEmpty` with no players inside.
    pub fn next_due(&mut self, zones: &ZoneTable, world: &impl LiveWorld) -> Option<Vnum> {
        let mut index = 0;
        while index < self.queue.len() {
            let number = self.queue[index];
            let Some(zone) = zones.get(number) else {
                warn!(zone = number, "queued_zone_missing");
                self.queue.remove(index);
                continue;
            };
            let ready = match zone.header.reset_policy {
                ResetPolicy::Always => true,
                ResetPolicy::WhenEmpty => {
                    !world.has_players_between(zone.header.bottom(), zone.header.top)
                }
                ResetPolicy::Never => false,
            };
            if ready {
                self.queue.remove(index);
                return Some(number);
            }
            index += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::SimWorld;
    use crate::zone::{ResetScript, Zone, ZoneHeader};

    fn zone(number: Vnum, lifespan: u32, reset_policy: ResetPolicy) -> Zone {
        Zone::new(
            ZoneHeader {
                number,
                name: format!("Zone {number}"),
                top: number * 100 + 99,
                lifespan,
                reset_policy,
            },
            ResetScript::new(),
        )
    }

    fn table(zones: Vec<Zone>) -> ZoneTable {
        let mut table = ZoneTable::new();
        for zone in zones {
            table.insert(zone).expect("zone");
        }
        table
    }

    #[test]
    fn zones_age_per_minute_and_queue_once() {
        let mut zones = table(vec![
            zone(30, 2, ResetPolicy::Always),
            zone(31, 1, ResetPolicy::Never),
        ]);
        let mut scheduler = ZoneScheduler::new(3);

        scheduler.on_minute(&mut zones);
        assert!(!scheduler.is_queued(30));
        scheduler.on_minute(&mut zones);
        scheduler.on_minute(&mut zones);

        assert_eq!(scheduler.queued().collect::<Vec<_>>(), vec![30]);
        assert_eq!(zones.get(30).expect("30").age, 2);
        assert_eq!(zones.get(31).expect("31").age, 0);
    }

    #[test]
    fn occupied_when_empty_zone_waits_behind_always_zone() {
        let mut zones = table(vec![
            zone(30, 1, ResetPolicy::WhenEmpty),
            zone(31, 1, ResetPolicy::Always),
        ]);
        let mut world = SimWorld::new();
        let temple = world.add_room(3001, "Temple");
        world.add_player(temple);
        let mut scheduler = ZoneScheduler::new(1);

        assert_eq!(scheduler.pulse(&mut zones, &world), Some(31));
        assert_eq!(scheduler.next_due(&zones, &world), None);
        assert!(scheduler.is_queued(30));

        world.remove_player(temple);
        assert_eq!(scheduler.next_due(&zones, &world), Some(30));
    }

    #[test]
    fn at_most_one_reset_per_pulse() {
        let mut zones = table(vec![
            zone(30, 0, ResetPolicy::Always),
            zone(31, 0, ResetPolicy::Always),
        ]);
        let world = SimWorld::new();
        let mut scheduler = ZoneScheduler::new(10);

        scheduler.on_minute(&mut zones);
        assert_eq!(scheduler.next_due(&zones, &world), Some(30));
        assert_eq!(scheduler.next_due(&zones, &world), Some(31));
        assert_eq!(scheduler.next_due(&zones, &world), None);
    }
}
