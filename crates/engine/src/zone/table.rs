use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::OlcError;
use crate::registry::Vnum;
use crate::world::RoomVnum;

use super::script::ResetScript;

/// Rooms of zone `n` start at `n * ROOMS_PER_ZONE_BASE`.
pub const ROOMS_PER_ZONE_BASE: Vnum = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResetPolicy {
    Never,
    WhenEmpty,
    Always,
}

impl ResetPolicy {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Never),
            1 => Some(Self::WhenEmpty),
            2 => Some(Self::Always),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Never => 0,
            Self::WhenEmpty => 1,
            Self::Always => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::WhenEmpty => "when-empty",
            Self::Always => "always",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneHeader {
    pub number: Vnum,
    pub name: String,
    pub top: RoomVnum,
    /// Minutes between resets.
    pub lifespan: u32,
    pub reset_policy: ResetPolicy,
}

impl ZoneHeader {
    pub fn bottom(&self) -> RoomVnum {
        self.number.saturating_mul(ROOMS_PER_ZONE_BASE)
    }

    pub fn contains_room(&self, room: RoomVnum) -> bool {
        (self.bottom()..=self.top).contains(&room)
    }

    pub fn validate(&self) -> Result<(), OlcError> {
        if self.number < 0 {
            return Err(OlcError::InvalidZoneHeader(format!(
                "zone number {} is negative",
                self.number
            )));
        }
        if self.top <= self.bottom() {
            return Err(OlcError::InvalidZoneHeader(format!(
                "top room {} must be above {}",
                self.top,
                self.bottom()
            )));
        }
        if self.name.contains('~') {
            return Err(OlcError::InvalidZoneHeader(
                "zone name may not contain '~'".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub header: ZoneHeader,
    /// Minutes since the last reset.
    pub age: u32,
    pub script: ResetScript,
}

impl Zone {
    pub fn new(header: ZoneHeader, script: ResetScript) -> Self {
        Self {
            header,
            age: 0,
            script,
        }
    }

    pub fn number(&self) -> Vnum {
        self.header.number
    }
}

/// Zones sorted by number, plus the set whose committed state has not been
/// written back to disk.
#[derive(Debug, Clone, Default)]
pub struct ZoneTable {
    zones: Vec<Zone>,
    unsaved: BTreeSet<Vnum>,
}

impl ZoneTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Zone> {
        self.zones.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Zone> {
        self.zones.iter_mut()
    }

    pub fn numbers(&self) -> Vec<Vnum> {
        self.zones.iter().map(Zone::number).collect()
    }

    pub fn get(&self, number: Vnum) -> Option<&Zone> {
        self.position(number).map(|index| &self.zones[index])
    }

    pub(crate) fn get_mut(&mut self, number: Vnum) -> Option<&mut Zone> {
        self.position(number).map(move |index| &mut self.zones[index])
    }

    pub fn require(&self, number: Vnum) -> Result<&Zone, OlcError> {
        self.get(number).ok_or(OlcError::UnknownZone(number))
    }

    pub(crate) fn require_mut(&mut self, number: Vnum) -> Result<&mut Zone, OlcError> {
        self.get_mut(number).ok_or(OlcError::UnknownZone(number))
    }

    /// Zone whose room range holds `room`.
    pub fn zone_for_room(&self, room: RoomVnum) -> Option<&Zone> {
        self.zones
            .iter()
            .find(|zone| zone.header.contains_room(room))
    }

    /// Adds a zone, rejecting a duplicate number or a room range that overlaps
    /// an existing zone.
    pub fn insert(&mut self, zone: Zone) -> Result<(), OlcError> {
        zone.header.validate()?;
        let index = match self
            .zones
            .binary_search_by_key(&zone.number(), Zone::number)
        {
            Ok(_) => {
                return Err(OlcError::InvalidZoneHeader(format!(
                    "zone {} already exists",
                    zone.number()
                )))
            }
            Err(index) => index,
        };
        self.check_overlap(&zone.header)?;
        self.zones.insert(index, zone);
        Ok(())
    }

    pub(crate) fn check_overlap(&self, header: &ZoneHeader) -> Result<(), OlcError> {
        let overlapping = self.zones.iter().find(|other| {
            other.number() != header.number
                && other.header.bottom() <= header.top
                && header.bottom() <= other.header.top
        });
        match overlapping {
            Some(other) => Err(OlcError::InvalidZoneHeader(format!(
                "rooms {}..={} overlap zone {}",
                header.bottom(),
                header.top,
                other.number()
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn mark_unsaved(&mut self, number: Vnum) {
        self.unsaved.insert(number);
    }

    pub(crate) fn mark_saved(&mut self, number: Vnum) {
        self.unsaved.remove(&number);
    }

    pub fn is_unsaved(&self, number: Vnum) -> bool {
        self.unsaved.contains(&number)
    }

    pub fn unsaved(&self) -> impl Iterator<Item = Vnum> + '_ {
        self.unsaved.iter().copied()
    }

    fn position(&self, number: Vnum) -> Option<usize> {
        self.zones
            .binary_search_by_key(&number, Zone::number)
            .ok()
    }
}
