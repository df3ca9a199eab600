//! Monitor reporter.
//!
//! Two encodings, chosen by [`MonitorStrategy`]:
//! - per route: same rows as the routing-table reporter, sent from the Mon port;
//! - single message: node uptime and queue sizes plus every direct neighbour,
//!   marked with `RTcount` 0xFFFF.
//!
//! Either way an empty table still yields one report.
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::commands::CommandTable;
use crate::config::MonitorStrategy;
use crate::message::payload::{MonitorReport, MonitorSummary, NeighborEntry};
use crate::message::{AppPayload, AppPort, DataMessage, TransportPort};
use crate::metrics;
use crate::scheduler::{job_channel, JobHandle, JobState, PendingJob, PeriodicJob};
use crate::transport::{TransportError, TransportRouter};

use super::rt::{send_to_broker, snapshot_reports};
use super::{unknown_command, Service};

const CMD_START: u8 = 1;
const CMD_PAUSE: u8 = 2;

pub struct MonCycle {
    router: Arc<TransportRouter>,
    strategy: MonitorStrategy,
    message_id: AtomicU8,
    started: Instant,
}

impl MonCycle {
    fn summary(&self) -> MonitorSummary {
        let mesh = self.router.mesh();
        let queues = mesh.queue_sizes();
        let neighbors = {
            let table = mesh.routing_table().lock();
            table
                .iter()
                .filter(|r| r.is_direct())
                .map(|r| NeighborEntry {
                    neighbor: u32::from(r.address),
                    rx_snr: r.received_snr,
                    srtt: r.srtt,
                })
                .collect()
        };
        MonitorSummary {
            uptime: u32::try_from(self.started.elapsed().as_millis()).unwrap_or(u32::MAX),
            tx_queue: queues.tx,
            rx_queue: queues.rx,
            neighbors,
        }
    }

    pub fn report_now(&self) -> Result<usize, TransportError> {
        let id = self.message_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let reports: Vec<MonitorReport> = match self.strategy {
            MonitorStrategy::PerRoute => snapshot_reports(&**self.router.mesh())
                .into_iter()
                .map(MonitorReport::PerRoute)
                .collect(),
            MonitorStrategy::SingleMessage => vec![MonitorReport::Summary(self.summary())],
        };
        let count = reports.len();
        for report in reports {
            send_to_broker(&self.router, AppPort::Mon, id, AppPayload::Mon(report))?;
        }
        metrics::inc_telemetry_cycle();
        log::debug!("monitor report {} sent ({} messages)", id, count);
        Ok(count)
    }
}

impl PeriodicJob for MonCycle {
    fn name(&self) -> &str {
        "mon-reporter"
    }

    fn run_cycle(&self) -> anyhow::Result<()> {
        self.report_now()?;
        Ok(())
    }
}

pub struct MonitorReporter {
    commands: CommandTable,
    cycle: Arc<MonCycle>,
    job: JobHandle,
    pending: Mutex<Option<PendingJob>>,
}

impl MonitorReporter {
    pub fn new(router: Arc<TransportRouter>, strategy: MonitorStrategy, interval: Duration, autostart: bool) -> Self {
        let cycle = Arc::new(MonCycle {
            router,
            strategy,
            message_id: AtomicU8::new(0),
            started: Instant::now(),
        });
        let (job, runner) = job_channel(if autostart { JobState::Running } else { JobState::Paused });
        let pending = PendingJob {
            runner,
            job: cycle.clone(),
            interval,
        };
        Self {
            commands: CommandTable::new()
                .public("/monStart", CMD_START, "Start sending monitor reports")
                .public("/monPause", CMD_PAUSE, "Pause sending monitor reports"),
            cycle,
            job,
            pending: Mutex::new(Some(pending)),
        }
    }

    pub fn strategy(&self) -> MonitorStrategy {
        self.cycle.strategy
    }

    pub fn cycle(&self) -> &MonCycle {
        &self.cycle
    }

    pub fn job(&self) -> &JobHandle {
        &self.job
    }

    pub fn take_pending_job(&self) -> Option<PendingJob> {
        match self.pending.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl Service for MonitorReporter {
    fn port(&self) -> AppPort {
        AppPort::Mon
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, _args: &str) -> String {
        match command_id {
            CMD_START => {
                self.job.start();
                "Monitor reports started".to_string()
            }
            CMD_PAUSE => {
                self.job.pause();
                "Monitor reports paused".to_string()
            }
            other => unknown_command(self.name(), other),
        }
    }

    fn process_received_message(&self, _transport: TransportPort, message: &DataMessage) {
        log::debug!("monitor report from {:04X} ignored", message.header.addr_src);
    }
}
