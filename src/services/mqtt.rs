//! MQTT service: the node side of the broker bridge.
//!
//! Whatever reaches this port (telemetry routed here by a node without its own
//! uplink, or local producers) is published through the bridge.
use std::sync::Arc;

use crate::commands::CommandTable;
use crate::message::payload::{TextPayload, TEXT_MESSAGE};
use crate::message::{AppPayload, AppPort, DataMessage, TransportPort};
use crate::transport::TransportRouter;

use super::{unknown_command, MessageIdCounter, Service};

const CMD_SEND: u8 = TEXT_MESSAGE;

pub struct MqttService {
    commands: CommandTable,
    router: Arc<TransportRouter>,
    ids: MessageIdCounter,
}

impl MqttService {
    pub fn new(router: Arc<TransportRouter>) -> Self {
        Self {
            commands: CommandTable::new().public("/sendB", CMD_SEND, "Send a message to the mqtt device"),
            router,
            ids: MessageIdCounter::new(),
        }
    }

    pub fn send_text(&self, text: &str) -> String {
        let msg = DataMessage::new(
            AppPort::Mqtt,
            self.ids.next(),
            self.router.local_address(),
            0,
            AppPayload::Text(TextPayload::new(text)),
        );
        match self.router.mqtt().publish_message(&msg) {
            Ok(()) => "Message sent".to_string(),
            Err(e) => {
                log::debug!("mqtt text not sent: {}", e);
                "Device not connected".to_string()
            }
        }
    }
}

impl Service for MqttService {
    fn port(&self) -> AppPort {
        AppPort::Mqtt
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, args: &str) -> String {
        match command_id {
            CMD_SEND => self.send_text(args),
            other => unknown_command(self.name(), other),
        }
    }

    fn process_received_message(&self, _transport: TransportPort, message: &DataMessage) {
        if let Err(e) = self.router.mqtt().publish_message(message) {
            log::warn!(
                "message from {:04X} for the broker dropped: {}",
                message.header.addr_src,
                e
            );
        }
    }
}
