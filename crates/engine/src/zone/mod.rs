mod command;
mod engine;
mod scheduler;
mod script;
mod table;

pub use command::{Opcode, ResetCommand, ResetOp};
pub use engine::{CommandFailure, CommandOutcome, CommandReport, ResetEngine, ResetReport};
pub use scheduler::ZoneScheduler;
pub use script::{ResetScript, ScriptFixup};
pub use table::{ResetPolicy, Zone, ZoneHeader, ZoneTable, ROOMS_PER_ZONE_BASE};
