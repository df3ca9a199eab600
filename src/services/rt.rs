//! Routing-table reporter.
//!
//! Every cycle the routing table is copied under its guard, then each row is
//! sent to the broker as its own message with `RTcount` numbering the rows
//! 1..n. An empty table still produces one report with `RTcount` 0 so the
//! collector can tell "no routes" from "node silent".
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::commands::CommandTable;
use crate::mesh::{MeshFacade, RouteNode};
use crate::message::payload::{RouteReport, MONITOR_ONE_MESSAGE};
use crate::message::{AppPayload, AppPort, DataMessage, TransportPort};
use crate::metrics;
use crate::scheduler::{job_channel, JobHandle, JobState, PendingJob, PeriodicJob};
use crate::transport::{TransportError, TransportRouter};

use super::{unknown_command, Service};

const CMD_START: u8 = 1;
const CMD_PAUSE: u8 = 2;

pub(crate) fn route_report(rt_count: u16, node: &RouteNode) -> RouteReport {
    RouteReport {
        rt_count,
        address: node.address,
        via: node.via,
        metric: node.metric,
        received_snr: node.received_snr,
        sent_snr: node.sent_snr,
        srtt: node.srtt,
        rttvar: node.rttvar,
    }
}

/// Numbered reports for every row, or a single empty report. Numbering stops
/// short of the monitor summary marker.
pub(crate) fn snapshot_reports(mesh: &dyn MeshFacade) -> Vec<RouteReport> {
    let table = mesh.routing_table().lock();
    if table.is_empty() {
        return vec![RouteReport::default()];
    }
    table
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let count = u16::try_from(i + 1).unwrap_or(u16::MAX).min(MONITOR_ONE_MESSAGE - 1);
            route_report(count, node)
        })
        .collect()
}

/// Send `payload` from `port` to the broker, addressed to no particular node.
pub(crate) fn send_to_broker(
    router: &TransportRouter,
    port: AppPort,
    message_id: u8,
    payload: AppPayload,
) -> Result<(), TransportError> {
    let msg = DataMessage::new(port, message_id, router.local_address(), 0, payload).with_dst_port(AppPort::Mqtt);
    router.send(TransportPort::Mqtt, msg)
}

pub struct RtCycle {
    router: Arc<TransportRouter>,
    message_id: AtomicU8,
}

impl RtCycle {
    /// Run one report, returning how many messages were sent.
    pub fn report_now(&self) -> Result<usize, TransportError> {
        let id = self.message_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let reports = snapshot_reports(&**self.router.mesh());
        let count = reports.len();
        for report in reports {
            send_to_broker(&self.router, AppPort::Rt, id, AppPayload::Rt(report))?;
        }
        metrics::inc_telemetry_cycle();
        log::debug!("routing table report {} sent ({} messages)", id, count);
        Ok(count)
    }
}

impl PeriodicJob for RtCycle {
    fn name(&self) -> &str {
        "rt-reporter"
    }

    fn run_cycle(&self) -> anyhow::Result<()> {
        self.report_now()?;
        Ok(())
    }
}

pub struct RoutingReporter {
    commands: CommandTable,
    cycle: Arc<RtCycle>,
    job: JobHandle,
    pending: Mutex<Option<PendingJob>>,
}

impl RoutingReporter {
    pub fn new(router: Arc<TransportRouter>, interval: Duration, autostart: bool) -> Self {
        let cycle = Arc::new(RtCycle {
            router,
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
                .public("/rtStart", CMD_START, "Start sending the routing table")
                .public("/rtPause", CMD_PAUSE, "Pause sending the routing table"),
            cycle,
            job,
            pending: Mutex::new(Some(pending)),
        }
    }

    pub fn cycle(&self) -> &RtCycle {
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

impl Service for RoutingReporter {
    fn port(&self) -> AppPort {
        AppPort::Rt
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, _args: &str) -> String {
        match command_id {
            CMD_START => {
                self.job.start();
                "Routing table reports started".to_string()
            }
            CMD_PAUSE => {
                self.job.pause();
                "Routing table reports paused".to_string()
            }
            other => unknown_command(self.name(), other),
        }
    }

    fn process_received_message(&self, _transport: TransportPort, message: &DataMessage) {
        log::debug!("routing report from {:04X} ignored", message.header.addr_src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::sim::SimulatedMesh;

    #[test]
    fn row_numbers_never_reach_the_summary_marker() {
        let mesh = SimulatedMesh::standalone(0x10);
        let rows = (0..usize::from(u16::MAX) + 2)
            .map(|i| RouteNode {
                address: (i % 0xFFFE) as u16 + 1,
                via: 0x20,
                metric: 1,
                ..RouteNode::default()
            })
            .collect();
        mesh.set_routes(rows);
        let reports = snapshot_reports(&*mesh);
        assert_eq!(reports[0].rt_count, 1);
        assert!(reports.iter().all(|r| r.rt_count != MONITOR_ONE_MESSAGE));
        assert_eq!(reports.last().map(|r| r.rt_count), Some(MONITOR_ONE_MESSAGE - 1));
    }
}
