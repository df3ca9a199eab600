//! Bluetooth service: text addressed to this port is shown on the paired console.
use crate::commands::CommandTable;
use crate::logutil::escape_log;
use crate::message::{AppPayload, AppPort, DataMessage, TransportPort};
use crate::transport::ConsoleOutput;

use super::{unknown_command, Service};

pub struct BluetoothService {
    commands: CommandTable,
    console: ConsoleOutput,
}

impl BluetoothService {
    pub fn new(console: ConsoleOutput) -> Self {
        Self {
            commands: CommandTable::new(),
            console,
        }
    }
}

impl Service for BluetoothService {
    fn port(&self) -> AppPort {
        AppPort::Bluetooth
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, _args: &str) -> String {
        unknown_command(self.name(), command_id)
    }

    fn process_received_message(&self, _transport: TransportPort, message: &DataMessage) {
        let text = match &message.payload {
            AppPayload::Text(t) => t.message.clone(),
            AppPayload::Chat(c) => c.text(),
            _ => {
                log::debug!("bluetooth service ignoring body from {:04X}", message.header.addr_src);
                return;
            }
        };
        log::trace!("bluetooth <- {}", escape_log(&text));
        if !self.console.write_line(text) {
            log::debug!("bluetooth console closed");
        }
    }
}
