//! MQTT bridge rules: outbound topics, destination recovery from the inbound
//! topic, forwarding of broker traffic into the mesh and the node run loop.
mod common;

use std::time::Duration;

use common::{config_for, join, settle, standalone, TestNode};
use lorachat::mesh::sim::SimNetwork;
use lorachat::message::payload::{LedCommand, LedPayload, TextPayload};
use lorachat::message::{json, AppPayload, AppPort, DataMessage};
use lorachat::node::NodeInputs;
use lorachat::transport::MqttPublish;
use tokio::sync::{mpsc, oneshot};

fn led_on_json(addr_src: u16, addr_dst: u16) -> String {
    let msg = DataMessage::new(
        AppPort::Led,
        9,
        addr_src,
        addr_dst,
        AppPayload::Led(LedPayload { command: LedCommand::On }),
    );
    json::to_string(&msg).unwrap()
}

fn gateway_config(address: u16, name: &str) -> lorachat::config::Config {
    let mut config = config_for(address, name);
    config.mqtt.enabled = true;
    config
}

#[test]
fn send_b_publishes_on_the_node_topic() {
    let mut node = standalone(&gateway_config(0x10, "Alice"));
    assert_eq!(node.command("/sendB hello broker"), "Message sent");
    let publish = node.channels.mqtt_publish_rx.try_recv().unwrap();
    assert_eq!(publish.topic, "to-server/16");
    let msg = json::from_str(&publish.payload).unwrap();
    assert_eq!(msg.header.app_port_src, AppPort::Mqtt);
    assert_eq!(msg.payload, AppPayload::Text(TextPayload::new("hello broker")));

    node.node.router().mqtt().set_connected(false);
    assert_eq!(node.command("/sendB again"), "Device not connected");
}

#[test]
fn inbound_destination_comes_from_the_topic() {
    let node = standalone(&gateway_config(0x10, "Alice"));
    let bridge = node.node.router().mqtt();
    let msg = bridge.parse_inbound("from-server/16", &led_on_json(0, 0)).unwrap();
    assert_eq!(msg.header.addr_dst, 16);
    // An explicit destination wins over the topic.
    let msg = bridge.parse_inbound("from-server/16", &led_on_json(0, 0x20)).unwrap();
    assert_eq!(msg.header.addr_dst, 0x20);
    assert!(bridge.parse_inbound("from-server/16", "{\"data\":{}}").is_err());
}

#[test]
fn broker_traffic_for_another_node_is_forwarded_over_the_mesh() {
    let network = SimNetwork::new();
    let mut gateway = join(&network, &gateway_config(0x10, "Gate"), true);
    let mut bob = join(&network, &config_for(0x20, "Bob"), false);
    network.refresh_routes();

    let msg = gateway
        .node
        .router()
        .mqtt()
        .parse_inbound("from-server/32", &led_on_json(0, 0))
        .unwrap();
    gateway
        .node
        .manager()
        .dispatch_message(lorachat::message::TransportPort::Mqtt, &msg);
    assert!(!gateway.node.services().led.is_on());
    assert_eq!(gateway.mesh.sent_frames()[0].dst, 0x20);

    settle(&mut [&mut gateway, &mut bob]);
    assert!(bob.node.services().led.is_on());
}

#[test]
fn mesh_traffic_for_another_node_is_not_relayed() {
    let network = SimNetwork::new();
    let gateway = join(&network, &gateway_config(0x10, "Gate"), true);
    let _bob = join(&network, &config_for(0x20, "Bob"), false);
    network.refresh_routes();

    let msg = json::from_str(&led_on_json(0x30, 0x20)).unwrap();
    gateway
        .node
        .manager()
        .dispatch_message(lorachat::message::TransportPort::LoRaMesh, &msg);
    assert!(gateway.mesh.sent_frames().is_empty());
}

#[test]
fn manager_json_bridge_accepts_both_roots() {
    let mut node = standalone(&gateway_config(0x10, "Alice"));

    let led = json::from_str(&led_on_json(0x20, 0x10)).unwrap();
    let text = node.node.manager().to_json(&led).unwrap();
    assert!(text.starts_with("{\"data\":"));
    assert_eq!(node.node.manager().from_json(&text).unwrap(), led);

    node.node.services().rt.cycle().report_now().unwrap();
    let published = node.channels.mqtt_publish_rx.try_recv().unwrap();
    assert!(published.payload.starts_with("{\"RT\":"));
    let rt = node.node.manager().from_json(&published.payload).unwrap();
    assert_eq!(rt.header.app_port_src, AppPort::Rt);
    // Manager and bridge produce the same document.
    assert_eq!(node.node.manager().to_json(&rt).unwrap(), published.payload);
    assert!(node.node.manager().from_json("not json").is_err());
}

#[tokio::test]
async fn run_loop_handles_every_input() {
    let TestNode {
        node,
        mesh: _mesh,
        mut channels,
        frames,
    } = standalone(&gateway_config(0x10, "Alice"));

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (mqtt_tx, mqtt_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();

    mqtt_tx
        .send(MqttPublish {
            topic: "from-server/16".to_string(),
            payload: led_on_json(0, 0),
        })
        .unwrap();
    mqtt_tx
        .send(MqttPublish {
            topic: "from-server/16".to_string(),
            payload: "garbage".to_string(),
        })
        .unwrap();
    command_tx.send("/displayOn".to_string()).unwrap();
    // A GPS request from this node loops back through the internal queue.
    node.router()
        .send(
            lorachat::message::TransportPort::Internal,
            DataMessage::new(
                AppPort::Gps,
                1,
                0x10,
                0x10,
                AppPayload::Gps(lorachat::message::payload::GpsPayload::Request),
            ),
        )
        .unwrap();

    let inputs = NodeInputs {
        mesh_rx: frames,
        internal_rx: channels.internal_rx,
        command_rx,
        mqtt_inbound_rx: mqtt_rx,
    };
    let driver = async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = stop_tx.send(());
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(node.run(inputs, stop_rx), driver)
    })
    .await
    .expect("run loop stopped");

    assert!(node.services().led.is_on());
    assert!(node.services().display.state().powered);

    let mut lines = Vec::new();
    while let Ok(line) = channels.console_rx.try_recv() {
        lines.push(line);
    }
    assert!(lines.contains(&"Display On".to_string()), "{:?}", lines);
    assert!(lines.iter().any(|l| l.starts_with("( ")), "{:?}", lines);
}
