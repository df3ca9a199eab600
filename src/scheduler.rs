//! Periodic job scheduler
//!
//! Every "loop forever with a fixed delay" task on the node (routing-table and
//! monitor reporters, sensor samplers) is a [`PeriodicJob`] driven by one tokio
//! task. The task is either Paused or Running:
//!
//! * Paused: blocks on the command channel, no cycles run.
//! * Running: runs a cycle, then waits for the interval to elapse or for a command.
//!   Commands do not reset the interval deadline.
//! * Start from Paused runs a cycle immediately.
//! * A failed cycle is logged and counted; the loop keeps going.
//!
//! Handles can be created before a runtime exists ([`job_channel`]); commands sent
//! early are buffered until the loop is spawned.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Work run once per cycle.
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn run_cycle(&self) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Paused,
    Running,
}

impl JobState {
    fn as_u8(self) -> u8 {
        match self {
            JobState::Paused => 0,
            JobState::Running => 1,
        }
    }

    fn from_u8(v: u8) -> Self {
        if v == 1 {
            JobState::Running
        } else {
            JobState::Paused
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub cycles: u64,
    pub failures: u64,
}

enum JobCommand {
    Start,
    Pause,
    SetInterval(Duration),
    Snapshot(oneshot::Sender<JobStats>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct JobHandle {
    tx: mpsc::UnboundedSender<JobCommand>,
    state: Arc<AtomicU8>,
}

impl JobHandle {
    pub fn start(&self) {
        self.state.store(JobState::Running.as_u8(), Ordering::SeqCst);
        let _ = self.tx.send(JobCommand::Start);
    }

    pub fn pause(&self) {
        self.state.store(JobState::Paused.as_u8(), Ordering::SeqCst);
        let _ = self.tx.send(JobCommand::Pause);
    }

    pub fn set_interval(&self, interval: Duration) {
        let _ = self.tx.send(JobCommand::SetInterval(interval));
    }

    /// Requested state; the loop follows it on its next wake-up.
    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub async fn snapshot(&self) -> Option<JobStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(JobCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(JobCommand::Shutdown(tx));
        let _ = rx.await;
    }
}

/// Receiving half of a job, waiting to be spawned.
pub struct JobRunner {
    rx: mpsc::UnboundedReceiver<JobCommand>,
    state: Arc<AtomicU8>,
}

/// Create a handle and its not-yet-running loop.
pub fn job_channel(initial: JobState) -> (JobHandle, JobRunner) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(AtomicU8::new(initial.as_u8()));
    (
        JobHandle {
            tx,
            state: state.clone(),
        },
        JobRunner { rx, state },
    )
}

/// Spawn `job` on the current runtime and return its handle.
pub fn spawn_periodic(job: Arc<dyn PeriodicJob>, interval: Duration, initial: JobState) -> JobHandle {
    let (handle, runner) = job_channel(initial);
    runner.spawn(job, interval);
    handle
}

impl JobRunner {
    pub fn spawn(self, job: Arc<dyn PeriodicJob>, interval: Duration) -> JoinHandle<()> {
        let JobRunner { mut rx, state: shared } = self;
        tokio::spawn(async move {
            let mut interval = interval;
            let mut state = JobState::from_u8(shared.load(Ordering::SeqCst));
            let mut stats = JobStats::default();
            let mut due = state == JobState::Running;
            let mut next = Instant::now();
            log::debug!("job {} spawned ({:?}, every {:?})", job.name(), state, interval);
            loop {
                if state == JobState::Running && due {
                    stats.cycles += 1;
                    if let Err(e) = job.run_cycle() {
                        stats.failures += 1;
                        log::warn!("job {} cycle failed: {:#}", job.name(), e);
                    }
                    due = false;
                    next = Instant::now() + interval;
                }
                let cmd = if state == JobState::Running {
                    tokio::select! {
                        cmd = rx.recv() => cmd,
                        _ = tokio::time::sleep_until(next) => {
                            due = true;
                            continue;
                        }
                    }
                } else {
                    rx.recv().await
                };
                match cmd {
                    None => break,
                    Some(JobCommand::Start) => {
                        if state != JobState::Running {
                            log::info!("job {} started", job.name());
                            state = JobState::Running;
                            due = true;
                        }
                    }
                    Some(JobCommand::Pause) => {
                        if state != JobState::Paused {
                            log::info!("job {} paused", job.name());
                        }
                        state = JobState::Paused;
                    }
                    Some(JobCommand::SetInterval(d)) => {
                        log::info!("job {} interval {:?}", job.name(), d);
                        next = next - interval + d;
                        interval = d;
                    }
                    Some(JobCommand::Snapshot(resp)) => {
                        let _ = resp.send(stats.clone());
                    }
                    Some(JobCommand::Shutdown(done)) => {
                        let _ = done.send(());
                        break;
                    }
                }
            }
            log::debug!("job {} stopped after {} cycles", job.name(), stats.cycles);
        })
    }
}

/// A job whose loop is spawned later, once a runtime is available.
pub struct PendingJob {
    pub runner: JobRunner,
    pub job: Arc<dyn PeriodicJob>,
    pub interval: Duration,
}

impl PendingJob {
    pub fn spawn(self) -> JoinHandle<()> {
        self.runner.spawn(self.job, self.interval)
    }
}
