//! Metadata reporter.
//!
//! Periodically tells the collector where the node is, how often it reports
//! and how much battery is left. Without a GPS fix the position fields are
//! sent as zeros.
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::commands::CommandTable;
use crate::message::payload::{GpsFix, MetadataPayload};
use crate::message::{AppPayload, AppPort, DataMessage, TransportPort};
use crate::metrics;
use crate::scheduler::{job_channel, JobHandle, JobState, PendingJob, PeriodicJob};
use crate::transport::{TransportError, TransportRouter};

use super::gps::{format_fix, GpsSource};
use super::rt::send_to_broker;
use super::{unknown_command, Service};

const CMD_GET: u8 = 1;
const CMD_START: u8 = 2;
const CMD_PAUSE: u8 = 3;

/// Battery level in percent.
pub trait BatteryGauge: Send + Sync {
    fn percentage(&self) -> f32;
}

/// Constant level for nodes running from mains or without a gauge.
pub struct FixedBattery(pub f32);

impl BatteryGauge for FixedBattery {
    fn percentage(&self) -> f32 {
        self.0
    }
}

pub struct MetadataCycle {
    router: Arc<TransportRouter>,
    gps: Arc<dyn GpsSource>,
    battery: Arc<dyn BatteryGauge>,
    interval: Duration,
    message_id: AtomicU8,
}

impl MetadataCycle {
    pub fn current(&self) -> MetadataPayload {
        MetadataPayload {
            gps: self.gps.fix().unwrap_or_default(),
            send_interval_ms: u32::try_from(self.interval.as_millis()).unwrap_or(u32::MAX),
            battery_percentage: self.battery.percentage(),
        }
    }

    pub fn report_now(&self) -> Result<(), TransportError> {
        let id = self.message_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        send_to_broker(&self.router, AppPort::Metadata, id, AppPayload::Metadata(self.current()))?;
        metrics::inc_telemetry_cycle();
        log::debug!("metadata report {} sent", id);
        Ok(())
    }
}

impl PeriodicJob for MetadataCycle {
    fn name(&self) -> &str {
        "metadata-reporter"
    }

    fn run_cycle(&self) -> anyhow::Result<()> {
        self.report_now()?;
        Ok(())
    }
}

pub struct MetadataReporter {
    commands: CommandTable,
    cycle: Arc<MetadataCycle>,
    job: JobHandle,
    pending: Mutex<Option<PendingJob>>,
}

impl MetadataReporter {
    pub fn new(
        router: Arc<TransportRouter>,
        gps: Arc<dyn GpsSource>,
        battery: Arc<dyn BatteryGauge>,
        interval: Duration,
        autostart: bool,
    ) -> Self {
        let cycle = Arc::new(MetadataCycle {
            router,
            gps,
            battery,
            interval,
            message_id: AtomicU8::new(0),
        });
        let (job, runner) = job_channel(if autostart { JobState::Running } else { JobState::Paused });
        let pending = PendingJob {
            runner,
            job: cycle.clone(),
            interval,
        };
        Self {
            commands: CommandTable::new()
                .public("/getMetadata", CMD_GET, "Get the metadata of the device")
                .public("/metadataStart", CMD_START, "Start sending metadata")
                .public("/metadataPause", CMD_PAUSE, "Pause sending metadata"),
            cycle,
            job,
            pending: Mutex::new(Some(pending)),
        }
    }

    pub fn cycle(&self) -> &MetadataCycle {
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

fn describe(m: &MetadataPayload) -> String {
    let position = if m.gps == GpsFix::default() {
        "GPS not valid".to_string()
    } else {
        format_fix(&m.gps)
    };
    format!(
        "{}\nBattery: {:.1}%\nSend interval: {}s",
        position,
        m.battery_percentage,
        m.send_interval_ms / 1000
    )
}

impl Service for MetadataReporter {
    fn port(&self) -> AppPort {
        AppPort::Metadata
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, _args: &str) -> String {
        match command_id {
            CMD_GET => describe(&self.cycle.current()),
            CMD_START => {
                self.job.start();
                "Metadata reports started".to_string()
            }
            CMD_PAUSE => {
                self.job.pause();
                "Metadata reports paused".to_string()
            }
            other => unknown_command(self.name(), other),
        }
    }

    fn process_received_message(&self, _transport: TransportPort, message: &DataMessage) {
        log::debug!("metadata from {:04X} ignored", message.header.addr_src);
    }
}
