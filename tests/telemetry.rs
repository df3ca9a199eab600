//! Routing-table, monitor and metadata reporters: report contents, the MQTT
//! path and the gateway fallback, and the periodic loops behind the start
//! commands.
mod common;

use std::time::Duration;

use common::{config_for, join, settle, standalone};
use lorachat::config::MonitorStrategy;
use lorachat::mesh::sim::SimNetwork;
use lorachat::mesh::QueueSizes;
use lorachat::message::payload::{MonitorReport, MONITOR_ONE_MESSAGE};
use lorachat::message::{json, AppPayload, AppPort};
use lorachat::transport::TransportError;
use serde_json::Value;

fn connected(address: u16, name: &str) -> lorachat::config::Config {
    let mut config = config_for(address, name);
    config.mqtt.enabled = true;
    config
}

#[test]
fn empty_table_still_reports_once() {
    let mut node = standalone(&connected(0x10, "Alice"));
    assert_eq!(node.node.services().rt.cycle().report_now().unwrap(), 1);

    let publish = node.channels.mqtt_publish_rx.try_recv().unwrap();
    assert_eq!(publish.topic, "to-server/16");
    let doc: Value = serde_json::from_str(&publish.payload).unwrap();
    let row = &doc["RT"];
    assert_eq!(row["RTcount"], 0);
    assert_eq!(row["appPortSrc"], AppPort::Rt.as_u8());
    assert_eq!(row["appPortDst"], AppPort::Mqtt.as_u8());
    assert_eq!(row["addrDst"], 0);
    assert!(node.channels.mqtt_publish_rx.try_recv().is_err());
}

#[test]
fn every_route_gets_a_numbered_report() {
    let network = SimNetwork::new();
    let mut alice = join(&network, &connected(0x10, "Alice"), false);
    let _bob = join(&network, &config_for(0x20, "Bob"), false);
    let _carol = join(&network, &config_for(0x30, "Carol"), false);
    network.refresh_routes();

    assert_eq!(alice.node.services().rt.cycle().report_now().unwrap(), 2);
    let mut rows = Vec::new();
    while let Ok(p) = alice.channels.mqtt_publish_rx.try_recv() {
        let msg = json::from_str(&p.payload).unwrap();
        match msg.payload {
            AppPayload::Rt(row) => rows.push((row.rt_count, row.address)),
            other => panic!("unexpected body {:?}", other),
        }
    }
    assert_eq!(rows, vec![(1, 0x20), (2, 0x30)]);
}

#[test]
fn single_message_monitor_lists_neighbours() {
    let network = SimNetwork::new();
    let mut config = connected(0x10, "Alice");
    config.telemetry.monitor_strategy = MonitorStrategy::SingleMessage;
    let mut alice = join(&network, &config, false);
    let _bob = join(&network, &config_for(0x20, "Bob"), false);
    network.refresh_routes();
    alice.mesh.set_queue_sizes(QueueSizes { tx: 3, rx: 1 });

    let monitor = &alice.node.services().monitor;
    assert_eq!(monitor.strategy(), MonitorStrategy::SingleMessage);
    assert_eq!(monitor.cycle().report_now().unwrap(), 1);

    let publish = alice.channels.mqtt_publish_rx.try_recv().unwrap();
    let doc: Value = serde_json::from_str(&publish.payload).unwrap();
    assert_eq!(doc["RT"]["RTcount"], MONITOR_ONE_MESSAGE);
    assert_eq!(doc["RT"]["TxQ"], 3);
    assert_eq!(doc["RT"]["rt"][0]["neighbor"], 0x20);

    let msg = json::from_str(&publish.payload).unwrap();
    let AppPayload::Mon(MonitorReport::Summary(summary)) = msg.payload else {
        panic!("expected a monitor summary");
    };
    assert_eq!(summary.neighbors.len(), 1);
    assert_eq!(summary.rx_queue, 1);
}

#[test]
fn per_route_monitor_uses_routing_rows() {
    let mut config = connected(0x10, "Alice");
    config.telemetry.monitor_strategy = MonitorStrategy::PerRoute;
    let mut node = standalone(&config);
    assert_eq!(node.node.services().monitor.cycle().report_now().unwrap(), 1);
    let msg = json::from_str(&node.channels.mqtt_publish_rx.try_recv().unwrap().payload).unwrap();
    assert_eq!(msg.header.app_port_src, AppPort::Mon);
    assert!(matches!(msg.payload, AppPayload::Mon(MonitorReport::PerRoute(row)) if row.rt_count == 0));
}

#[test]
fn without_broker_or_gateway_the_report_fails() {
    let node = standalone(&config_for(0x10, "Alice"));
    assert!(matches!(
        node.node.services().rt.cycle().report_now(),
        Err(TransportError::NoGateway)
    ));
}

#[test]
fn reports_travel_to_the_closest_gateway() {
    let network = SimNetwork::new();
    let mut alice = join(&network, &config_for(0x10, "Alice"), false);
    let mut gateway = join(&network, &connected(0x30, "Gate"), true);
    network.refresh_routes();

    assert_eq!(alice.node.services().rt.cycle().report_now().unwrap(), 1);
    let frame = &alice.mesh.sent_frames()[0];
    assert_eq!(frame.dst, 0x30);

    settle(&mut [&mut alice, &mut gateway]);
    let publish = gateway.channels.mqtt_publish_rx.try_recv().unwrap();
    // Published under the reporting node's address, not the gateway's.
    assert_eq!(publish.topic, "to-server/16");
    let msg = json::from_str(&publish.payload).unwrap();
    assert_eq!(msg.header.app_port_src, AppPort::Rt);
    assert!(matches!(msg.payload, AppPayload::Rt(row) if row.rt_count == 1 && row.address == 0x30));
    assert!(lorachat::metrics::snapshot().gateway_fallbacks >= 1);
}

#[tokio::test(start_paused = true)]
async fn rt_start_drives_the_periodic_loop() {
    let mut config = connected(0x10, "Alice");
    config.telemetry.rt_interval_secs = 60;
    let mut node = standalone(&config);
    let _jobs = node.node.start_jobs();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(node.channels.mqtt_publish_rx.try_recv().is_err(), "paused reporter published");

    assert_eq!(node.command("/rtStart"), "Routing table reports started");
    let first = tokio::time::timeout(Duration::from_secs(1), node.channels.mqtt_publish_rx.recv())
        .await
        .expect("first report")
        .expect("bridge open");
    assert_eq!(first.topic, "to-server/16");

    let second = tokio::time::timeout(Duration::from_secs(61), node.channels.mqtt_publish_rx.recv())
        .await
        .expect("second report")
        .expect("bridge open");
    assert!(second.payload.contains("\"RT\""));

    assert_eq!(node.command("/rtPause"), "Routing table reports paused");
    tokio::time::sleep(Duration::from_millis(10)).await;
    while node.channels.mqtt_publish_rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(node.channels.mqtt_publish_rx.try_recv().is_err());

    let stats = node.node.services().rt.job().snapshot().await.unwrap();
    assert!(stats.cycles >= 2);
    assert_eq!(stats.failures, 0);
    node.node.stop_jobs().await;
}

#[tokio::test(start_paused = true)]
async fn metadata_reports_position_interval_and_battery() {
    let mut config = connected(0x10, "Alice");
    config.telemetry.metadata_interval_secs = 30;
    config.sensors.battery_percentage = 55.0;
    let mut node = standalone(&config);
    let _jobs = node.node.start_jobs();

    let summary = node.command("/getMetadata");
    assert!(summary.contains("Battery: 55.0%"), "{}", summary);
    assert!(summary.ends_with("Send interval: 30s"), "{}", summary);
    assert!(node.channels.mqtt_publish_rx.try_recv().is_err());

    assert_eq!(node.command("/metadataStart"), "Metadata reports started");
    let publish = tokio::time::timeout(Duration::from_secs(1), node.channels.mqtt_publish_rx.recv())
        .await
        .expect("metadata report")
        .expect("bridge open");
    assert_eq!(publish.topic, "to-server/16");
    let doc: Value = serde_json::from_str(&publish.payload).unwrap();
    let data = &doc["data"];
    assert_eq!(data["appPortSrc"], AppPort::Metadata.as_u8());
    assert_eq!(data["message_type"], "metadata");
    assert_eq!(data["metadata_send_time_interval"], 30_000);
    assert_eq!(data["battery_percentage"], 55.0);
    assert_eq!(data["latitude"], config.gps.latitude);

    assert_eq!(node.command("/metadataPause"), "Metadata reports paused");
    node.node.stop_jobs().await;
}
