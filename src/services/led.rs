//! LED service: switch the local LED or a remote node's LED over the mesh.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::commands::CommandTable;
use crate::message::payload::{LedCommand, LedPayload};
use crate::message::{AppPayload, AppPort, DataMessage, TransportPort};
use crate::transport::TransportRouter;

use super::{target_address, unknown_command, MessageIdCounter, Service};

const CMD_OFF: u8 = LedCommand::Off as u8;
const CMD_ON: u8 = LedCommand::On as u8;

pub struct LedService {
    commands: CommandTable,
    router: Arc<TransportRouter>,
    lit: AtomicBool,
    ids: MessageIdCounter,
}

impl LedService {
    pub fn new(router: Arc<TransportRouter>) -> Self {
        Self {
            commands: CommandTable::new()
                .public("/ledOn", CMD_ON, "Set the Led On specifying the destination in hex")
                .public("/ledOff", CMD_OFF, "Set the Led Off specifying the destination in hex"),
            router,
            lit: AtomicBool::new(false),
            ids: MessageIdCounter::new(),
        }
    }

    pub fn is_on(&self) -> bool {
        self.lit.load(Ordering::Relaxed)
    }

    fn set_local(&self, command: LedCommand) -> String {
        let on = command == LedCommand::On;
        self.lit.store(on, Ordering::Relaxed);
        log::info!("LED {}", if on { "on" } else { "off" });
        if on { "Led On" } else { "Led Off" }.to_string()
    }

    pub fn switch(&self, command: LedCommand, args: &str) -> String {
        let local = self.router.local_address();
        let dst = match target_address(args, local) {
            Ok(dst) => dst,
            Err(e) => return e,
        };
        if dst == local {
            return self.set_local(command);
        }
        let msg = DataMessage::new(AppPort::Led, self.ids.next(), local, dst, AppPayload::Led(LedPayload { command }));
        match self.router.send(TransportPort::LoRaMesh, msg) {
            Ok(()) => format!("{} sent to {:04X}", if command == LedCommand::On { "Led On" } else { "Led Off" }, dst),
            Err(e) => format!("Led command not sent: {}", e),
        }
    }
}

impl Service for LedService {
    fn port(&self) -> AppPort {
        AppPort::Led
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, args: &str) -> String {
        match command_id {
            CMD_ON => self.switch(LedCommand::On, args),
            CMD_OFF => self.switch(LedCommand::Off, args),
            other => unknown_command(self.name(), other),
        }
    }

    fn process_received_message(&self, _transport: TransportPort, message: &DataMessage) {
        match &message.payload {
            AppPayload::Led(led) => {
                log::debug!("LED command from {:04X}", message.header.addr_src);
                self.set_local(led.command);
            }
            _ => log::debug!("LED service ignoring body from {:04X}", message.header.addr_src),
        }
    }
}
