//! Two nodes on one simulated mesh: contact discovery, a chat session with its
//! acknowledgement, and a position request relayed through the chat service.
mod common;

use common::{config_for, join, settle};
use lorachat::mesh::sim::SimNetwork;

#[test]
fn contact_discovery_then_chat_with_ack() {
    let network = SimNetwork::new();
    let mut alice = join(&network, &config_for(0x10, "Alice"), false);
    let mut bob = join(&network, &config_for(0x20, "Bob"), false);
    network.refresh_routes();

    assert_eq!(alice.command("/reqContacts"), "Request sent, waiting for response");
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(
        alice.command("/getContacts"),
        "--- List of contacts ---\n - 32: Bob\n"
    );

    assert_eq!(
        alice.command("/chat Bob"),
        "Chatting with Bob (0020). Type /exit to leave."
    );
    // Inside the session plain text is the message itself.
    assert_eq!(alice.command("hello"), "");
    settle(&mut [&mut alice, &mut bob]);

    assert_eq!(bob.console_lines(), vec!["0010: hello".to_string()]);
    assert_eq!(alice.console_lines(), vec!["Message received to Bob".to_string()]);

    let bob_history = bob.node.services().chat.history();
    assert_eq!(bob_history.len(), 1);
    assert_eq!(bob_history[0].address, 0x10);
    assert_eq!(bob_history[0].text, "hello");
    assert!(alice.node.services().chat.history().is_empty());

    assert_eq!(alice.command("/exit"), "Chat with Bob closed");
    assert!(alice.node.services().chat.peer().is_none());
    assert!(alice.command("/getContacts").contains("Bob"));
}

#[test]
fn ack_keeps_the_message_id() {
    let network = SimNetwork::new();
    let mut alice = join(&network, &config_for(0x10, "Alice"), false);
    let mut bob = join(&network, &config_for(0x20, "Bob"), false);
    network.refresh_routes();
    alice.node.services().chat.contacts().upsert(0x20, "Bob");

    alice.command("/chat Bob");
    alice.command("ping");
    settle(&mut [&mut alice, &mut bob]);

    let sent = lorachat::message::wire::decode(&alice.mesh.sent_frames()[0].data).unwrap();
    let ack = lorachat::message::wire::decode(&bob.mesh.sent_frames()[0].data).unwrap();
    assert_eq!(ack.header.message_id, sent.header.message_id);
    assert_eq!(ack.header.addr_src, 0x20);
    assert_eq!(ack.header.addr_dst, 0x10);
}

#[test]
fn oversize_chat_is_refused_locally() {
    let network = SimNetwork::new();
    let alice = join(&network, &config_for(0x10, "Alice"), false);
    let _bob = join(&network, &config_for(0x20, "Bob"), false);
    network.refresh_routes();
    alice.node.services().chat.contacts().upsert(0x20, "Bob");

    alice.command("/chat Bob");
    let reply = alice.command(&"x".repeat(101));
    assert!(!reply.is_empty());
    assert!(alice.mesh.sent_frames().is_empty());
    // The session survives a refused line.
    assert!(alice.node.services().chat.peer().is_some());
}

#[test]
fn session_is_exclusive_until_exit() {
    let network = SimNetwork::new();
    let alice = join(&network, &config_for(0x10, "Alice"), false);
    alice.node.services().chat.contacts().upsert(0x20, "Bob");

    alice.command("/chat Bob");
    // Commands of other services are not reachable while chatting.
    assert_eq!(alice.command("/ledOn"), "Chatting with Bob. Type /exit to leave.");
    assert!(!alice.node.services().led.is_on());
    alice.command("/exit");
    assert_eq!(alice.command("/ledOn"), "Led On");
}

#[test]
fn unknown_chat_partner_lists_contacts() {
    let network = SimNetwork::new();
    let alice = join(&network, &config_for(0x10, "Alice"), false);
    assert_eq!(alice.command("/chat Carol"), "--- List of contacts ---\nEmpty List\n");
    assert!(alice.node.services().chat.peer().is_none());
}

#[test]
fn position_request_is_answered_by_the_peer_gps() {
    let network = SimNetwork::new();
    let mut alice = join(&network, &config_for(0x10, "Alice"), false);
    let mut bob = join(&network, &config_for(0x20, "Bob"), false);
    network.refresh_routes();

    assert_eq!(alice.command("/requestGPSOf Bob"), "No contact found");
    alice.node.services().chat.contacts().upsert(0x20, "Bob");
    assert_eq!(
        alice.command("/requestGPSOf Bob"),
        "Request GPS sent, waiting for response"
    );
    settle(&mut [&mut alice, &mut bob]);

    let lines = alice.console_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("Position of 0020: ("), "got {}", lines[0]);
    assert!(lines[0].contains("Lat: 41.3874000"));
}

#[test]
fn previous_messages_lists_received_chats() {
    let network = SimNetwork::new();
    let mut alice = join(&network, &config_for(0x10, "Alice"), false);
    let mut bob = join(&network, &config_for(0x20, "Bob"), false);
    network.refresh_routes();
    alice.node.services().chat.contacts().upsert(0x20, "Bob");
    bob.node.services().chat.contacts().upsert(0x10, "Alice");

    assert_eq!(bob.command("/previousMessages"), "No messages");
    alice.command("/chat Bob");
    alice.command("first");
    alice.command("second");
    settle(&mut [&mut alice, &mut bob]);

    let listing = bob.command("/previousMessages");
    assert!(listing.starts_with("--- Previous messages ---\n"));
    let first = listing.find("Alice: first").unwrap();
    let second = listing.find("Alice: second").unwrap();
    assert!(first < second);
}
