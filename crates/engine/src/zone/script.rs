use crate::error::OlcError;
use crate::registry::{Remap, StoreShift};
use crate::world::RoomVnum;

use super::command::{ResetCommand, ResetOp};

/// Ordered reset commands of one zone. Length is explicit; the `S` sentinel
/// only exists in the file encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetScript {
    commands: Vec<ResetCommand>,
}

/// What one fixup pass did to a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptFixup {
    pub moved: usize,
    /// Removed commands with the position they held before the pass.
    pub removed: Vec<(usize, ResetCommand)>,
    pub stale: usize,
    pub out_of_bounds: usize,
}

impl ResetScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_commands(commands: Vec<ResetCommand>) -> Self {
        Self { commands }
    }

    pub fn count(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&ResetCommand> {
        self.commands.get(pos)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResetCommand> {
        self.commands.iter()
    }

    pub fn commands(&self) -> &[ResetCommand] {
        &self.commands
    }

    pub fn push(&mut self, command: ResetCommand) {
        self.commands.push(command);
    }

    /// `pos == count()` appends.
    pub fn insert_at(&mut self, pos: usize, command: ResetCommand) -> Result<(), OlcError> {
        if pos > self.commands.len() {
            return Err(self.out_of_range(pos));
        }
        self.commands.insert(pos, command);
        Ok(())
    }

    pub fn remove_at(&mut self, pos: usize) -> Result<ResetCommand, OlcError> {
        if pos >= self.commands.len() {
            return Err(self.out_of_range(pos));
        }
        Ok(self.commands.remove(pos))
    }

    pub fn replace_at(&mut self, pos: usize, command: ResetCommand) -> Result<ResetCommand, OlcError> {
        let slot = self.get_mut(pos)?;
        Ok(std::mem::replace(slot, command))
    }

    pub(crate) fn get_mut(&mut self, pos: usize) -> Result<&mut ResetCommand, OlcError> {
        let len = self.commands.len();
        self.commands.get_mut(pos).ok_or(OlcError::OutOfRange {
            what: "command position",
            index: pos,
            len,
        })
    }

    pub fn room_refs(&self) -> impl Iterator<Item = RoomVnum> + '_ {
        self.commands.iter().filter_map(|command| command.op.room())
    }

    /// Rewrites every prototype handle for `shift`.
    ///
    /// A command naming a removed prototype is deleted, and so is every
    /// give/equip that followed a deleted mobile load up to the next mobile
    /// load, since those acted on the mob the deleted command produced.
    pub fn apply_shift(&mut self, shift: &StoreShift) -> ScriptFixup {
        let mut report = ScriptFixup::default();
        let mut kept = Vec::with_capacity(self.commands.len());
        let mut mob_chain_orphaned = false;

        for (index, mut command) in std::mem::take(&mut self.commands).into_iter().enumerate() {
            let mut dangling = false;
            for handle in command.op.proto_refs_mut() {
                match shift.remap(*handle) {
                    Remap::Untouched => {}
                    Remap::Rewritten { handle: rewritten, moved } => {
                        if !shift.is_in_bounds(rewritten) {
                            report.out_of_bounds += 1;
                        }
                        if moved {
                            report.moved += 1;
                        }
                        *handle = rewritten;
                    }
                    Remap::Removed => dangling = true,
                    Remap::Stale => report.stale += 1,
                }
            }

            if matches!(command.op, ResetOp::LoadMobile { .. }) {
                mob_chain_orphaned = dangling;
            }
            let orphaned_dependent = mob_chain_orphaned && command.op.targets_last_mob();

            if dangling || orphaned_dependent {
                report.removed.push((index, command));
            } else {
                kept.push(command);
            }
        }

        self.commands = kept;
        report
    }

    fn out_of_range(&self, pos: usize) -> OlcError {
        OlcError::OutOfRange {
            what: "command position",
            index: pos,
            len: self.commands.len(),
        }
    }
}

impl<'a> IntoIterator for &'a ResetScript {
    type Item = &'a ResetCommand;
    type IntoIter = std::slice::Iter<'a, ResetCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}
