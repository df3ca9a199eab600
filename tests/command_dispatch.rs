//! Console command routing through the registry: keyword matching, generated
//! help, unknown commands and commands that act on another node.
mod common;

use std::sync::Arc;

use common::{config_for, join, settle, standalone};
use lorachat::commands::CommandTable;
use lorachat::manager::{MessageManager, RegistryError};
use lorachat::mesh::sim::SimNetwork;
use lorachat::message::payload::{LedCommand, LedPayload};
use lorachat::message::{wire, AppPayload, AppPort, DataMessage, TransportPort};
use lorachat::services::Service;

struct EchoService {
    port: AppPort,
    commands: CommandTable,
}

impl EchoService {
    fn new(port: AppPort, keyword: &'static str) -> Arc<Self> {
        Arc::new(Self {
            port,
            commands: CommandTable::new().public(keyword, 1, "echo"),
        })
    }
}

impl Service for EchoService {
    fn port(&self) -> AppPort {
        self.port
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, args: &str) -> String {
        format!("{} ran {} with '{}'", self.port.name(), command_id, args)
    }

    fn process_received_message(&self, _transport: TransportPort, _message: &DataMessage) {}
}

#[test]
fn keywords_match_without_case() {
    let node = standalone(&config_for(0x10, "Alice"));
    assert_eq!(node.command("/LEDON"), "Led On");
    assert_eq!(node.command("/ledoff"), "Led Off");
    assert!(!node.node.services().led.is_on());
}

#[test]
fn help_lists_services_in_port_order() {
    let node = standalone(&config_for(0x10, "Alice"));
    let help = node.command("/help");
    assert!(help.starts_with("Id: 1 - LoRaChat\n/changeName (1) - "), "{}", help);
    // Private commands and command-less services stay out of the help.
    assert!(!help.contains("/getName"));
    assert!(!help.contains("Bluetooth"));

    let headings = [
        "Id: 1 -", "Id: 3 -", "Id: 4 -", "Id: 7 -", "Id: 8 -", "Id: 10 -", "Id: 13 -", "Id: 14 -", "Id: 15 -", "Id: 16 -",
    ];
    let order: Vec<usize> = headings
        .iter()
        .map(|h| help.find(h).unwrap_or_else(|| panic!("missing {}", h)))
        .collect();
    let mut sorted = order.clone();
    sorted.sort_unstable();
    assert_eq!(order, sorted);
    assert_eq!(help, node.node.manager().get_available_commands());
}

#[test]
fn unknown_keyword_returns_help() {
    let node = standalone(&config_for(0x10, "Alice"));
    let reply = node.command("/fly away");
    assert!(reply.starts_with("Command not found\n"));
    assert!(reply.ends_with(&node.node.manager().get_available_commands()));
    assert_eq!(node.command("   "), "");
}

#[test]
fn private_commands_run_by_id() {
    let node = standalone(&config_for(0x10, "Alice"));
    let manager = node.node.manager();
    // /getName is private: invisible to keyword dispatch help, reachable by id.
    assert_eq!(manager.execute_by_id(AppPort::LoRaChat, 2, ""), "Name: Alice");
    assert_eq!(manager.execute_by_id(AppPort::LoRaChat, 77, ""), "Command not found");
    assert!(manager.execute_by_id(AppPort::Sos, 1, "").starts_with("No service on port"));
}

#[test]
fn duplicate_port_is_refused() {
    let node = standalone(&config_for(0x10, "Alice"));
    let mut manager = MessageManager::new(node.node.router().clone());
    manager.register(EchoService::new(AppPort::Simulator, "/echo")).unwrap();
    assert_eq!(
        manager.register(EchoService::new(AppPort::Simulator, "/other")),
        Err(RegistryError::DuplicatePort(AppPort::Simulator))
    );
    assert_eq!(manager.services().len(), 1);
}

#[test]
fn shared_keyword_runs_every_owner() {
    let node = standalone(&config_for(0x10, "Alice"));
    let mut manager = MessageManager::new(node.node.router().clone());
    manager.register(EchoService::new(AppPort::Metadata, "/ping")).unwrap();
    manager.register(EchoService::new(AppPort::Simulator, "/ping")).unwrap();
    assert_eq!(
        manager.dispatch_command("/ping now"),
        "Simulator ran 1 with 'now'\nMetadata ran 1 with 'now'"
    );
}

#[test]
fn led_command_reaches_remote_node() {
    let network = SimNetwork::new();
    let mut alice = join(&network, &config_for(0x10, "Alice"), false);
    let mut bob = join(&network, &config_for(0x20, "Bob"), false);
    network.refresh_routes();

    assert_eq!(alice.command("/ledOn 20"), "Led On sent to 0020");
    let frame = &alice.mesh.sent_frames()[0];
    assert_eq!(frame.dst, 0x20);
    let msg = wire::decode(&frame.data).unwrap();
    assert_eq!(msg.payload, AppPayload::Led(LedPayload { command: LedCommand::On }));

    settle(&mut [&mut alice, &mut bob]);
    assert!(bob.node.services().led.is_on());
    assert!(!alice.node.services().led.is_on());

    assert_eq!(alice.command("/ledOn zz"), "Invalid address: zz");
}

#[test]
fn display_text_is_shown_on_remote_node() {
    let network = SimNetwork::new();
    let mut alice = join(&network, &config_for(0x10, "Alice"), false);
    let mut bob = join(&network, &config_for(0x20, "Bob"), false);
    network.refresh_routes();

    assert_eq!(alice.command("/displayOn 20"), "Send Display On");
    assert_eq!(alice.command("/displayText 20 hello mesh"), "Send Display Text");
    settle(&mut [&mut alice, &mut bob]);

    let state = bob.node.services().display.state();
    assert!(state.powered);
    assert_eq!(state.lines.back().map(String::as_str), Some("hello mesh"));
    assert!(!alice.node.services().display.state().powered);

    assert_eq!(alice.command("/displayOff"), "Display Off");
}

#[test]
fn messages_for_other_nodes_are_dropped() {
    let node = standalone(&config_for(0x10, "Alice"));
    let msg = DataMessage::new(
        AppPort::Led,
        1,
        0x20,
        0x30,
        AppPayload::Led(LedPayload { command: LedCommand::On }),
    );
    node.node.manager().dispatch_message(TransportPort::LoRaMesh, &msg);
    assert!(!node.node.services().led.is_on());
    assert!(node.mesh.sent_frames().is_empty());

    let mut for_me = msg.clone();
    for_me.header.addr_dst = 0x10;
    node.node.manager().dispatch_message(TransportPort::LoRaMesh, &for_me);
    assert!(node.node.services().led.is_on());
}
