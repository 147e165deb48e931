use std::collections::VecDeque;

use tracing::{debug, warn};

use super::live::InstanceId;

const MAX_PENDING_FORCED_COMMANDS: usize = 256;

/// Receives command text a reset script forces a mob to perform.
pub trait CommandDispatcher {
    fn dispatch(&mut self, actor: InstanceId, command: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedCommand {
    pub actor: InstanceId,
    pub command: String,
}

/// Bounded queue of forced commands, drained by the game loop's interpreter.
/// The oldest entry is dropped when the queue is full.
#[derive(Debug, Default)]
pub struct QueuedDispatcher {
    pending: VecDeque<ForcedCommand>,
}

impl QueuedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn drain_into(&mut self, out: &mut Vec<ForcedCommand>) {
        out.extend(self.pending.drain(..));
    }
}

impl CommandDispatcher for QueuedDispatcher {
    fn dispatch(&mut self, actor: InstanceId, command: &str) {
        if self.pending.len() == MAX_PENDING_FORCED_COMMANDS {
            if let Some(dropped) = self.pending.pop_front() {
                warn!(
                    actor = %dropped.actor,
                    command = %dropped.command,
                    "forced_command_queue_full_dropping_oldest"
                );
            }
        }
        debug!(actor = %actor, command, "forced_command_queued");
        self.pending.push_back(ForcedCommand {
            actor,
            command: command.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_keeps_newest_when_full() {
        let mut dispatcher = QueuedDispatcher::new();
        for index in 0..(MAX_PENDING_FORCED_COMMANDS as u64 + 2) {
            dispatcher.dispatch(InstanceId(index), "say hi");
        }
        assert_eq!(dispatcher.len(), MAX_PENDING_FORCED_COMMANDS);

        let mut drained = Vec::new();
        dispatcher.drain_into(&mut drained);
        assert_eq!(drained[0].actor, InstanceId(2));
        assert!(dispatcher.is_empty());
    }
}
