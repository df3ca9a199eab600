//! # Message manager
//!
//! The node's service registry. It routes inbound wire messages by destination
//! port and console lines by command keyword. It is not a task: every call runs
//! on the caller's task, and services guard their own state.
//!
//! Command routing order:
//! 1. a service holding an active session gets the whole line;
//! 2. `/help` returns the generated help;
//! 3. every service defining the keyword runs it and the replies are joined;
//! 4. otherwise `Command not found` plus the help text.

use std::sync::Arc;

use crate::commands::split_command;
use crate::logutil::{describe_header, escape_log};
use crate::mesh::BROADCAST_ADDR;
use crate::message::{json, wire, AppPort, DataMessage, TransportPort, WireError};
use crate::metrics;
use crate::services::Service;
use crate::transport::TransportRouter;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a service is already registered on port {0}")]
    DuplicatePort(AppPort),
}

pub const HELP_KEYWORD: &str = "/help";

pub struct MessageManager {
    router: Arc<TransportRouter>,
    services: Vec<Arc<dyn Service>>,
}

impl MessageManager {
    pub fn new(router: Arc<TransportRouter>) -> Self {
        Self {
            router,
            services: Vec::new(),
        }
    }

    /// Add a service, keeping the list ordered by port.
    pub fn register(&mut self, service: Arc<dyn Service>) -> Result<(), RegistryError> {
        let port = service.port();
        let pos = match self.services.binary_search_by_key(&port.as_u8(), |s| s.port().as_u8()) {
            Ok(_) => return Err(RegistryError::DuplicatePort(port)),
            Err(pos) => pos,
        };
        for cmd in service.commands().commands() {
            for other in &self.services {
                if other.commands().find(cmd.keyword).is_some() {
                    log::warn!(
                        "keyword {} defined by both {} and {}; both will run",
                        cmd.keyword,
                        other.name(),
                        service.name()
                    );
                }
            }
        }
        log::debug!("registered service {} on port {}", service.name(), port.as_u8());
        self.services.insert(pos, service);
        Ok(())
    }

    pub fn services(&self) -> &[Arc<dyn Service>] {
        &self.services
    }

    pub fn service(&self, port: AppPort) -> Option<&Arc<dyn Service>> {
        self.services
            .binary_search_by_key(&port.as_u8(), |s| s.port().as_u8())
            .ok()
            .map(|i| &self.services[i])
    }

    /// Deliver a message to the service on its destination port.
    pub fn dispatch_message(&self, transport: TransportPort, message: &DataMessage) {
        let header = &message.header;
        let local = self.router.local_address();
        if header.addr_dst != 0 && header.addr_dst != local && header.addr_dst != BROADCAST_ADDR {
            if transport == TransportPort::Mqtt {
                log::debug!("forwarding broker message over the mesh: {}", describe_header(header));
                match self.router.send(TransportPort::LoRaMesh, message.clone()) {
                    Ok(()) => metrics::inc_forwarded(),
                    Err(e) => log::warn!("forward to {:04X} failed: {}", header.addr_dst, e),
                }
            } else {
                log::debug!("not for this node, dropped: {}", describe_header(header));
                metrics::inc_dropped();
            }
            return;
        }
        match self.service(header.app_port_dst) {
            Some(service) => {
                log::trace!("dispatch via {}: {}", transport, describe_header(header));
                metrics::inc_dispatched();
                service.process_received_message(transport, message);
            }
            None => {
                log::info!("no service on port {}, dropped: {}", header.app_port_dst, describe_header(header));
                metrics::inc_dropped();
            }
        }
    }

    /// Decode a mesh frame and dispatch it. Bad frames are logged and dropped.
    pub fn dispatch_frame(&self, frame: &[u8]) {
        match wire::decode(frame) {
            Ok(msg) => self.dispatch_message(TransportPort::LoRaMesh, &msg),
            Err(e) => {
                metrics::inc_decode_failure();
                metrics::inc_dropped();
                log::warn!("undecodable frame ({}): {}", e, crate::logutil::hex_preview(frame, 16));
            }
        }
    }

    /// Run one console line and return the reply text.
    pub fn dispatch_command(&self, line: &str) -> String {
        for service in &self.services {
            if let Some(id) = service.commands().current() {
                metrics::inc_command_executed();
                return service.execute(id, line);
            }
        }

        let (keyword, args) = split_command(line);
        if keyword.is_empty() {
            return String::new();
        }
        if keyword.eq_ignore_ascii_case(HELP_KEYWORD) {
            return self.get_available_commands();
        }

        let mut matched = false;
        let mut replies = Vec::new();
        for service in &self.services {
            if let Some(cmd) = service.commands().find(keyword) {
                matched = true;
                metrics::inc_command_executed();
                let reply = service.execute(cmd.id, args);
                if !reply.is_empty() {
                    replies.push(reply);
                }
            }
        }
        if !matched {
            log::debug!("command not found: {}", escape_log(keyword));
            metrics::inc_command_not_found();
            return format!("Command not found\n{}", self.get_available_commands());
        }
        replies.join("\n")
    }

    /// Help text: one block per service in port order, public commands only.
    pub fn get_available_commands(&self) -> String {
        let mut out = String::new();
        for service in &self.services {
            let help = service.commands().help_text();
            if help.is_empty() {
                continue;
            }
            out.push_str(&format!("Id: {} - {}\n", service.port().as_u8(), service.name()));
            out.push_str(&help);
        }
        out
    }

    /// Run a command by port and id, private commands included.
    pub fn execute_by_id(&self, port: AppPort, command_id: u8, args: &str) -> String {
        let Some(service) = self.service(port) else {
            return format!("No service on port {}", port);
        };
        if service.commands().find_by_id(command_id).is_none() {
            metrics::inc_command_not_found();
            return "Command not found".to_string();
        }
        metrics::inc_command_executed();
        service.execute(command_id, args)
    }

    /// JSON text for `message`, the same document the MQTT bridge publishes.
    pub fn to_json(&self, message: &DataMessage) -> Result<String, WireError> {
        json::to_string(message)
    }

    /// Parse either envelope root.
    pub fn from_json(&self, text: &str) -> Result<DataMessage, WireError> {
        json::from_str(text)
    }
}
