//! # Application services
//!
//! A service is one addressable application on the node. It owns a port, a
//! command table, and whatever state its application needs. The
//! [`MessageManager`](crate::manager::MessageManager) delivers inbound messages
//! and command lines to it; the service answers through the shared
//! [`TransportRouter`](crate::transport::TransportRouter).
//!
//! | Port | Service |
//! |------|---------|
//! | 1  | [`chat::ChatService`] |
//! | 2  | [`bluetooth::BluetoothService`] |
//! | 3  | [`wifi::WifiService`] |
//! | 4  | [`gps::GpsService`] |
//! | 7  | [`mesh_info::MeshInfoService`] |
//! | 8  | [`mqtt::MqttService`] |
//! | 9, 11 | [`sensor::SensorService`] |
//! | 10 | [`led::LedService`] |
//! | 13 | [`display::DisplayService`] |
//! | 14 | [`metadata::MetadataReporter`] |
//! | 15 | [`rt::RoutingReporter`] |
//! | 16 | [`monitor::MonitorReporter`] |

pub mod bluetooth;
pub mod chat;
pub mod contacts;
pub mod display;
pub mod gps;
pub mod history;
pub mod led;
pub mod mesh_info;
pub mod metadata;
pub mod monitor;
pub mod mqtt;
pub mod rt;
pub mod sensor;
pub mod wifi;

use std::sync::atomic::{AtomicU8, Ordering};

use crate::commands::CommandTable;
use crate::message::{AppPort, DataMessage, TransportPort};

pub trait Service: Send + Sync {
    fn port(&self) -> AppPort;

    fn name(&self) -> &str {
        self.port().name()
    }

    fn commands(&self) -> &CommandTable;

    /// Run command `command_id` with its argument string and return the reply.
    fn execute(&self, command_id: u8, args: &str) -> String;

    /// Handle a message addressed to this service's port.
    fn process_received_message(&self, transport: TransportPort, message: &DataMessage);
}

/// Per-service message id sequence, wrapping at 255.
#[derive(Debug, Default)]
pub struct MessageIdCounter(AtomicU8);

impl MessageIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u8 {
        self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }
}

/// Replies for commands a service does not know. Only reachable through
/// `execute_by_id`.
pub(crate) fn unknown_command(service: &str, id: u8) -> String {
    format!("{}: unknown command id {}", service, id)
}

/// Parse an optional hex address argument. Empty means the local node.
pub(crate) fn target_address(arg: &str, local: u16) -> Result<u16, String> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Ok(local);
    }
    crate::validation::parse_node_address(arg).ok_or_else(|| format!("Invalid address: {}", arg))
}
