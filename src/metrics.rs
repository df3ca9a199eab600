//! Process-wide counters for the dispatcher, transports and periodic jobs.
//!
//! Counters are plain relaxed atomics; [`snapshot`] copies them into a value the
//! `status` subcommand and tests can inspect.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::message::TransportPort;

static MESSAGES_DISPATCHED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_DROPPED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_FORWARDED: AtomicU64 = AtomicU64::new(0);
static DECODE_FAILURES: AtomicU64 = AtomicU64::new(0);
static COMMANDS_EXECUTED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_NOT_FOUND: AtomicU64 = AtomicU64::new(0);
static GATEWAY_FALLBACKS: AtomicU64 = AtomicU64::new(0);
static SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
static TELEMETRY_CYCLES: AtomicU64 = AtomicU64::new(0);

static SENT_BY_TRANSPORT: OnceLock<Mutex<HashMap<&'static str, u64>>> = OnceLock::new();

pub fn inc_dispatched() {
    MESSAGES_DISPATCHED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_dropped() {
    MESSAGES_DROPPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_forwarded() {
    MESSAGES_FORWARDED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_decode_failure() {
    DECODE_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_command_executed() {
    COMMANDS_EXECUTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_command_not_found() {
    COMMANDS_NOT_FOUND.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_gateway_fallback() {
    GATEWAY_FALLBACKS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_send_failure() {
    SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_telemetry_cycle() {
    TELEMETRY_CYCLES.fetch_add(1, Ordering::Relaxed);
}

fn sent_lock() -> &'static Mutex<HashMap<&'static str, u64>> {
    SENT_BY_TRANSPORT.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn record_sent(port: TransportPort) {
    let mut guard = match sent_lock().lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard.entry(port.name()).or_default() += 1;
}

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub messages_dispatched: u64,
    pub messages_dropped: u64,
    pub messages_forwarded: u64,
    pub decode_failures: u64,
    pub commands_executed: u64,
    pub commands_not_found: u64,
    pub gateway_fallbacks: u64,
    pub send_failures: u64,
    pub telemetry_cycles: u64,
    pub sent_by_transport: HashMap<&'static str, u64>,
}

pub fn snapshot() -> Snapshot {
    let sent = match sent_lock().lock() {
        Ok(g) => g.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    Snapshot {
        messages_dispatched: MESSAGES_DISPATCHED.load(Ordering::Relaxed),
        messages_dropped: MESSAGES_DROPPED.load(Ordering::Relaxed),
        messages_forwarded: MESSAGES_FORWARDED.load(Ordering::Relaxed),
        decode_failures: DECODE_FAILURES.load(Ordering::Relaxed),
        commands_executed: COMMANDS_EXECUTED.load(Ordering::Relaxed),
        commands_not_found: COMMANDS_NOT_FOUND.load(Ordering::Relaxed),
        gateway_fallbacks: GATEWAY_FALLBACKS.load(Ordering::Relaxed),
        send_failures: SEND_FAILURES.load(Ordering::Relaxed),
        telemetry_cycles: TELEMETRY_CYCLES.load(Ordering::Relaxed),
        sent_by_transport: sent,
    }
}
