//! LoRaChat service: contacts, one-to-one chat sessions and received history.
//!
//! Session lifecycle:
//!
//! ```text
//!   Idle --/chat <known name>--> Active(peer) --/exit--> Idle
//!   Idle --/chat <unknown>-----> Idle (contact list returned)
//! ```
//!
//! While Active, every console line reaches this service first. Plain text is
//! sent to the peer as `chatTo`; nothing is echoed until the peer's ack arrives.
//! Each accepted `chatTo` is acked back to its sender before being shown.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::commands::CommandTable;
use crate::logutil::escape_log;
use crate::message::payload::{ChatKind, ChatPayload, GpsPayload};
use crate::message::{AppPayload, AppPort, DataMessage, MessageHeader, TransportPort};
use crate::transport::TransportRouter;
use crate::validation::{check_chat_len, validate_chat_text, validate_contact_name};

use super::contacts::ContactDirectory;
use super::history::{ChatHistory, PreviousMessage};
use super::{unknown_command, MessageIdCounter, Service};

const CMD_CHANGE_NAME: u8 = ChatKind::ChangeName as u8;
const CMD_GET_NAME: u8 = ChatKind::GetName as u8;
const CMD_GET_CONTACTS: u8 = ChatKind::GetContacts as u8;
const CMD_REQ_CONTACTS: u8 = ChatKind::RequestContactInfo as u8;
const CMD_CHAT: u8 = ChatKind::ChatTo as u8;
const CMD_REQUEST_GPS: u8 = ChatKind::RequestGps as u8;
const CMD_PREVIOUS: u8 = ChatKind::GetPreviousMessages as u8;

/// Peer bound by an active chat session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatPeer {
    pub address: u16,
    pub name: String,
}

pub struct ChatService {
    commands: CommandTable,
    router: Arc<TransportRouter>,
    name: Mutex<String>,
    contacts: ContactDirectory,
    history: Mutex<ChatHistory>,
    peer: Mutex<Option<ChatPeer>>,
    ids: MessageIdCounter,
    started: Instant,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ChatService {
    pub fn new(router: Arc<TransportRouter>, name: &str) -> Self {
        let commands = CommandTable::new()
            .public("/changeName", CMD_CHANGE_NAME, "Change your name")
            .private("/getName", CMD_GET_NAME, "Show your name")
            .public("/getContacts", CMD_GET_CONTACTS, "List known contacts")
            .public("/reqContacts", CMD_REQ_CONTACTS, "Ask every node in the routing table for its name")
            .public("/chat", CMD_CHAT, "Chat with a contact, /exit to leave")
            .public("/requestGPSOf", CMD_REQUEST_GPS, "Ask a contact for its position")
            .public("/previousMessages", CMD_PREVIOUS, "Show received messages");
        Self {
            commands,
            router,
            name: Mutex::new(name.to_string()),
            contacts: ContactDirectory::new(),
            history: Mutex::new(ChatHistory::default()),
            peer: Mutex::new(None),
            ids: MessageIdCounter::new(),
            started: Instant::now(),
        }
    }

    pub fn contacts(&self) -> &ContactDirectory {
        &self.contacts
    }

    pub fn my_name(&self) -> String {
        lock(&self.name).clone()
    }

    pub fn peer(&self) -> Option<ChatPeer> {
        lock(&self.peer).clone()
    }

    /// Bound peer and session command, read together. The cursor only changes
    /// while the peer lock is held.
    pub fn session(&self) -> (Option<ChatPeer>, Option<u8>) {
        let peer = lock(&self.peer);
        (peer.clone(), self.commands.current())
    }

    pub fn history(&self) -> Vec<PreviousMessage> {
        lock(&self.history).ordered()
    }

    fn uptime_ms(&self) -> u32 {
        u32::try_from(self.started.elapsed().as_millis()).unwrap_or(u32::MAX)
    }

    fn display_name(&self, address: u16) -> String {
        self.contacts
            .lookup_by_address(address)
            .unwrap_or_else(|| format!("{:04X}", address))
    }

    fn notify(&self, line: String) {
        if !self.router.console().write_line(line) {
            log::debug!("chat notice dropped, console closed");
        }
    }

    fn outbound(&self, addr_dst: u16, payload: ChatPayload) -> DataMessage {
        DataMessage::new(
            AppPort::LoRaChat,
            self.ids.next(),
            self.router.local_address(),
            addr_dst,
            AppPayload::Chat(payload),
        )
    }

    pub fn change_name(&self, new_name: &str) -> String {
        match validate_contact_name(new_name) {
            Ok(name) => {
                *lock(&self.name) = name.to_string();
                format!("Name changed to: {}", name)
            }
            Err(e) => e.to_string(),
        }
    }

    /// Send a contact request to every node in the routing table.
    pub fn find_contacts(&self) -> String {
        let targets: Vec<u16> = {
            let table = self.router.mesh().routing_table().lock();
            table.iter().map(|r| r.address).collect()
        };
        if targets.is_empty() {
            return "No contacts found".to_string();
        }
        for dst in targets {
            let msg = self.outbound(dst, ChatPayload::empty(ChatKind::RequestContactInfo));
            if let Err(e) = self.router.send(TransportPort::LoRaMesh, msg) {
                log::debug!("contact request to {:04X} not sent: {}", dst, e);
            }
        }
        "Request sent, waiting for response".to_string()
    }

    pub fn request_gps(&self, name: &str) -> String {
        let Some(addr) = self.contacts.lookup_by_name(name) else {
            return "No contact found".to_string();
        };
        let msg = self.outbound(addr, ChatPayload::empty(ChatKind::RequestGps));
        match self.router.send(TransportPort::LoRaMesh, msg) {
            Ok(()) => "Request GPS sent, waiting for response".to_string(),
            Err(e) => format!("Request GPS not sent: {}", e),
        }
    }

    pub fn previous_messages(&self) -> String {
        let entries = self.history();
        if entries.is_empty() {
            return "No messages".to_string();
        }
        let mut out = String::from("--- Previous messages ---\n");
        for m in entries {
            out.push_str(&format!(
                "[{}s] {}: {}\n",
                m.time_ms / 1000,
                self.display_name(m.address),
                m.text
            ));
        }
        out
    }

    /// Idle + `/chat <name>`.
    pub fn start_chat(&self, name: &str) -> String {
        let name = name.trim();
        let Some(address) = self.contacts.lookup_by_name(name).filter(|_| !name.is_empty()) else {
            return self.contacts.render();
        };
        let mut peer = lock(&self.peer);
        if peer.is_none() {
            self.commands.enter_session(CMD_CHAT);
        }
        *peer = Some(ChatPeer {
            address,
            name: name.to_string(),
        });
        drop(peer);
        log::info!("chat session with {} ({:04X})", name, address);
        format!("Chatting with {} ({:04X}). Type /exit to leave.", name, address)
    }

    pub fn exit_chat(&self) -> String {
        let peer = {
            let mut bound = lock(&self.peer);
            let peer = bound.take();
            if peer.is_some() {
                self.commands.exit_session();
            }
            peer
        };
        match peer {
            Some(p) => format!("Chat with {} closed", p.name),
            None => String::new(),
        }
    }

    /// A console line while a session is active.
    fn session_line(&self, line: &str) -> String {
        let line = line.trim();
        if line.eq_ignore_ascii_case("/exit") {
            return self.exit_chat();
        }
        let Some(peer) = self.peer() else {
            return String::new();
        };
        if line.is_empty() {
            return String::new();
        }
        if line.starts_with('/') {
            return format!("Chatting with {}. Type /exit to leave.", peer.name);
        }
        self.send_chat(&peer, line)
    }

    fn send_chat(&self, peer: &ChatPeer, text: &str) -> String {
        if let Err(e) = validate_chat_text(text) {
            return e.to_string();
        }
        let msg = self.outbound(peer.address, ChatPayload::new(ChatKind::ChatTo, text));
        match self.router.send(TransportPort::LoRaMesh, msg) {
            Ok(()) => String::new(),
            Err(e) => format!("Message not sent: {}", e),
        }
    }

    fn reply_transport(transport: TransportPort) -> TransportPort {
        match transport {
            TransportPort::Internal | TransportPort::Bluetooth => TransportPort::LoRaMesh,
            other => other,
        }
    }

    fn reply(&self, transport: TransportPort, request: &DataMessage, payload: ChatPayload) {
        let mut header = request.reply_header();
        header.app_port_src = AppPort::LoRaChat;
        header.addr_src = self.router.local_address();
        let msg = DataMessage {
            header,
            payload: AppPayload::Chat(payload),
        };
        if let Err(e) = self.router.send(Self::reply_transport(transport), msg) {
            log::debug!("chat reply to {:04X} not sent: {}", request.header.addr_src, e);
        }
    }

    fn receive_chat(&self, transport: TransportPort, message: &DataMessage, chat: &ChatPayload) {
        let from = message.header.addr_src;
        let name = self.display_name(from);
        if check_chat_len(chat.content.len()).is_err() {
            log::warn!("chat from {:04X} dropped: {} bytes", from, chat.content.len());
            self.notify(format!("Message from {} too long, dropped", name));
            return;
        }
        self.reply(transport, message, ChatPayload::empty(ChatKind::AckChat));

        let text = chat.text();
        log::debug!("chat from {:04X}: {}", from, escape_log(&text));
        let evicted = lock(&self.history).insert(PreviousMessage {
            address: from,
            time_ms: self.uptime_ms(),
            text: text.clone(),
        });
        if let Some(old) = evicted {
            log::trace!("history full, evicted message from {:04X}", old.address);
        }
        self.notify(format!("{}: {}", name, text));
    }

    /// Hand a position request to the local GPS service as if it came from the requester.
    fn forward_gps_request(&self, message: &DataMessage) {
        let msg = DataMessage {
            header: MessageHeader {
                app_port_dst: AppPort::Gps,
                app_port_src: AppPort::Gps,
                message_id: message.header.message_id,
                addr_src: message.header.addr_src,
                addr_dst: self.router.local_address(),
            },
            payload: AppPayload::Gps(GpsPayload::Request),
        };
        if let Err(e) = self.router.send(TransportPort::Internal, msg) {
            log::warn!("GPS request from {:04X} not forwarded: {}", message.header.addr_src, e);
        }
    }
}

impl Service for ChatService {
    fn port(&self) -> AppPort {
        AppPort::LoRaChat
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, args: &str) -> String {
        match command_id {
            CMD_CHAT if self.commands.current() == Some(CMD_CHAT) => self.session_line(args),
            CMD_CHAT => self.start_chat(args),
            CMD_CHANGE_NAME => self.change_name(args),
            CMD_GET_NAME => format!("Name: {}", self.my_name()),
            CMD_GET_CONTACTS => self.contacts.render(),
            CMD_REQ_CONTACTS => self.find_contacts(),
            CMD_REQUEST_GPS => self.request_gps(args),
            CMD_PREVIOUS => self.previous_messages(),
            other => unknown_command(self.name(), other),
        }
    }

    fn process_received_message(&self, transport: TransportPort, message: &DataMessage) {
        let AppPayload::Chat(chat) = &message.payload else {
            log::debug!("chat service ignoring non-chat body from {:04X}", message.header.addr_src);
            return;
        };
        match chat.kind {
            ChatKind::RequestContactInfo => {
                let name = self.my_name();
                self.reply(transport, message, ChatPayload::contact_info(ChatKind::ResponseContactInfo, &name));
            }
            ChatKind::ResponseContactInfo => {
                self.contacts.upsert(message.header.addr_src, &chat.text());
            }
            ChatKind::ChatTo => self.receive_chat(transport, message, chat),
            ChatKind::AckChat => {
                self.notify(format!("Message received to {}", self.display_name(message.header.addr_src)));
            }
            ChatKind::RequestGps => self.forward_gps_request(message),
            other => log::debug!("chat type {:?} from {:04X} ignored", other, message.header.addr_src),
        }
    }
}
