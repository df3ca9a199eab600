//! Display service. The screen is modelled as a power flag plus the last few
//! lines shown; commands addressed to another node travel over the mesh.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::commands::{split_command, CommandTable};
use crate::logutil::escape_log;
use crate::message::payload::{DisplayCommand, DisplayPayload};
use crate::message::{AppPayload, AppPort, DataMessage, TransportPort};
use crate::transport::TransportRouter;
use crate::validation::parse_node_address;

use super::{target_address, unknown_command, MessageIdCounter, Service};

const DISPLAY_LOG_LINES: usize = 8;
const LOGO_LINE: &str = "[logo]";
const TEXT_USAGE: &str = "Usage: /displayText <hex addr> <text>";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub powered: bool,
    pub blinks: u32,
    pub lines: VecDeque<String>,
}

pub struct DisplayService {
    commands: CommandTable,
    router: Arc<TransportRouter>,
    state: Mutex<DisplayState>,
    ids: MessageIdCounter,
}

fn label(command: DisplayCommand) -> &'static str {
    match command {
        DisplayCommand::On => "Display On",
        DisplayCommand::Off => "Display Off",
        DisplayCommand::Blink => "Display Blink",
        DisplayCommand::Clear => "Display Clear",
        DisplayCommand::Text => "Display Text",
        DisplayCommand::Logo => "Display Logo",
    }
}

impl DisplayService {
    pub fn new(router: Arc<TransportRouter>) -> Self {
        let commands = CommandTable::new()
            .public("/displayOn", DisplayCommand::On as u8, "Set the Display On specifying the destination in hex")
            .public("/displayOff", DisplayCommand::Off as u8, "Set the Display Off specifying the destination in hex")
            .public("/displayBlink", DisplayCommand::Blink as u8, "Blink the Display specifying the destination in hex")
            .public("/displayClear", DisplayCommand::Clear as u8, "Clear the Display specifying the destination in hex")
            .public("/displayText", DisplayCommand::Text as u8, "Show text, destination in hex then the text")
            .public("/displayLogo", DisplayCommand::Logo as u8, "Show the logo specifying the destination in hex");
        Self {
            commands,
            router,
            state: Mutex::new(DisplayState::default()),
            ids: MessageIdCounter::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn state(&self) -> DisplayState {
        self.lock().clone()
    }

    fn apply(&self, payload: &DisplayPayload) {
        let mut st = self.lock();
        match payload.command {
            DisplayCommand::On => st.powered = true,
            DisplayCommand::Off => st.powered = false,
            DisplayCommand::Blink => st.blinks += 1,
            DisplayCommand::Clear => st.lines.clear(),
            DisplayCommand::Text | DisplayCommand::Logo => {
                let line = if payload.command == DisplayCommand::Logo {
                    LOGO_LINE.to_string()
                } else {
                    payload.text.clone()
                };
                if st.lines.len() == DISPLAY_LOG_LINES {
                    st.lines.pop_front();
                }
                st.lines.push_back(line);
            }
        }
        log::debug!("display {:?} {}", payload.command, escape_log(&payload.text));
    }

    fn send_or_apply(&self, dst: u16, payload: DisplayPayload) -> String {
        let local = self.router.local_address();
        let name = label(payload.command);
        if dst == local {
            self.apply(&payload);
            return name.to_string();
        }
        let msg = DataMessage::new(AppPort::Display, self.ids.next(), local, dst, AppPayload::Display(payload));
        match self.router.send(TransportPort::LoRaMesh, msg) {
            Ok(()) => format!("Send {}", name),
            Err(e) => format!("{} not sent: {}", name, e),
        }
    }

    pub fn command(&self, command: DisplayCommand, args: &str) -> String {
        let local = self.router.local_address();
        if command == DisplayCommand::Text {
            let (first, text) = split_command(args);
            return match parse_node_address(first) {
                Some(dst) if !text.is_empty() => self.send_or_apply(dst, DisplayPayload::text(text)),
                _ => TEXT_USAGE.to_string(),
            };
        }
        match target_address(args, local) {
            Ok(dst) => self.send_or_apply(dst, DisplayPayload::command(command)),
            Err(e) => e,
        }
    }
}

impl Service for DisplayService {
    fn port(&self) -> AppPort {
        AppPort::Display
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, args: &str) -> String {
        match DisplayCommand::try_from(command_id) {
            Ok(command) => self.command(command, args),
            Err(_) => unknown_command(self.name(), command_id),
        }
    }

    fn process_received_message(&self, _transport: TransportPort, message: &DataMessage) {
        match &message.payload {
            AppPayload::Display(d) => self.apply(d),
            _ => log::debug!("display service ignoring body from {:04X}", message.header.addr_src),
        }
    }
}
