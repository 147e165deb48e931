use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use zone_engine::world::ForcedCommand;
use zone_engine::{LoadedWorld, Vnum};

use super::bootstrap::AppWiring;
use super::config::ServerConfig;
use super::console::ConsoleCommandRegistry;
use super::operator::Operator;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ConsoleEvent {
    Line(String),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopControl {
    Continue,
    Quit,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct TickReport {
    reset_zone: Option<Vnum>,
    forced_commands: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TickPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

struct ServerLoop {
    config: ServerConfig,
    service: LoadedWorld,
    operator: Operator,
    commands: ConsoleCommandRegistry,
    input_open: bool,
    tick_count: u64,
    forced: Vec<ForcedCommand>,
}

impl ServerLoop {
    fn new(wiring: AppWiring) -> Self {
        Self {
            config: wiring.config,
            service: wiring.service,
            operator: Operator::new(wiring.world_dir),
            commands: ConsoleCommandRegistry::with_operator_commands(),
            input_open: true,
            tick_count: 0,
            forced: Vec::new(),
        }
    }

    fn boot(&mut self) {
        if !self.config.boot_reset {
            info!("boot_reset_skipped");
            return;
        }
        let reports = self.service.reset_all();
        let failed: usize = reports.iter().map(|report| report.failed()).sum();
        info!(zones = reports.len(), failed_commands = failed, "boot_reset_complete");
        self.drain_forced();
    }

    fn handle_event(&mut self, event: ConsoleEvent, out: &mut Vec<String>) -> LoopControl {
        match event {
            ConsoleEvent::Line(line) => match self.commands.parse_line(&line) {
                Ok(None) => LoopControl::Continue,
                Ok(Some(command)) => {
                    let reply = self.operator.execute(&mut self.service, &self.commands, command);
                    out.extend(reply.lines);
                    if reply.quit {
                        LoopControl::Quit
                    } else {
                        LoopControl::Continue
                    }
                }
                Err(message) => {
                    out.push(message);
                    LoopControl::Continue
                }
            },
            ConsoleEvent::Closed => {
                self.input_open = false;
                self.operator.on_input_closed(&mut self.service);
                if self.config.exit_on_input_close {
                    info!("console_closed_shutting_down");
                    LoopControl::Quit
                } else {
                    info!("console_closed_running_headless");
                    LoopControl::Continue
                }
            }
        }
    }

    /// One game tick: a zone pulse every `ticks_per_zone_pulse` ticks, then
    /// hand off whatever the resets forced mobs to do.
    fn tick(&mut self) -> TickReport {
        self.tick_count += 1;
        let mut report = TickReport::default();
        let per_pulse = u64::from(self.config.ticks_per_zone_pulse.max(1));
        if self.tick_count % per_pulse == 0 {
            report.reset_zone = self.service.pulse().map(|reset| reset.zone);
        }
        report.forced_commands = self.drain_forced();
        report
    }

    fn drain_forced(&mut self) -> usize {
        self.service.dispatcher_mut().drain_into(&mut self.forced);
        let count = self.forced.len();
        for forced in self.forced.drain(..) {
            info!(actor = %forced.actor, command = %forced.command, "forced_command");
        }
        count
    }

    fn poll_input(&mut self, input: &Receiver<ConsoleEvent>, out: &mut Vec<String>) -> LoopControl {
        while self.input_open {
            let event = match input.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => ConsoleEvent::Closed,
            };
            if self.handle_event(event, out) == LoopControl::Quit {
                return LoopControl::Quit;
            }
        }
        LoopControl::Continue
    }
}

pub(crate) fn run(wiring: AppWiring) -> ExitCode {
    let mut server = ServerLoop::new(wiring);
    let (sender, input) = mpsc::channel();
    if let Err(err) = spawn_console_reader(sender) {
        error!(error = %err, "console_reader_spawn_failed");
        return ExitCode::FAILURE;
    }

    server.boot();
    let tick = server.config.tick();
    let max_ticks = server.config.max_ticks_per_wake.max(1);
    info!(tick_ms = tick.as_millis() as u64, "server_loop_started");

    let mut accumulator = Duration::ZERO;
    let mut last_wake = Instant::now();
    let mut out = Vec::new();
    loop {
        let now = Instant::now();
        accumulator = accumulator.saturating_add(now.duration_since(last_wake));
        last_wake = now;

        let plan = plan_ticks(accumulator, tick, max_ticks);
        accumulator = plan.remaining_accumulator;
        if !plan.dropped_backlog.is_zero() {
            warn!(
                dropped_ms = plan.dropped_backlog.as_millis() as u64,
                max_ticks,
                "tick_backlog_dropped"
            );
        }

        for _ in 0..plan.ticks_to_run {
            let control = server.poll_input(&input, &mut out);
            for line in out.drain(..) {
                println!("{line}");
            }
            if control == LoopControl::Quit {
                info!(ticks = server.tick_count, "server_loop_stopped");
                return ExitCode::SUCCESS;
            }
            let report = server.tick();
            if report.reset_zone.is_some() || report.forced_commands > 0 {
                debug!(
                    tick = server.tick_count,
                    zone = ?report.reset_zone,
                    forced = report.forced_commands,
                    "tick_activity"
                );
            }
        }

        thread::sleep(tick.saturating_sub(accumulator));
    }
}

fn spawn_console_reader(sender: Sender<ConsoleEvent>) -> io::Result<()> {
    thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if sender.send(ConsoleEvent::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "console_read_failed");
                        break;
                    }
                }
            }
            let _ = sender.send(ConsoleEvent::Closed);
        })
        .map(|_| ())
}

fn plan_ticks(mut accumulator: Duration, tick: Duration, max_ticks_per_wake: u32) -> TickPlan {
    let mut ticks_to_run = 0u32;
    while accumulator >= tick && ticks_to_run < max_ticks_per_wake {
        accumulator = accumulator.saturating_sub(tick);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= tick {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    TickPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}
