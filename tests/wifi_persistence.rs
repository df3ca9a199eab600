//! WiFi credentials survive a restart through the key/value store.
use std::sync::Arc;

use lorachat::config::Config;
use lorachat::mesh::sim::SimulatedMesh;
use lorachat::node::NodeContext;
use lorachat::storage::{KvStore, KEY_WIFI_PASSWORD, KEY_WIFI_SSID};

fn boot(dir: &std::path::Path) -> NodeContext {
    let config = Config::default();
    let store = Arc::new(KvStore::open(dir).unwrap());
    let (node, _channels) =
        NodeContext::new(&config, SimulatedMesh::standalone(config.node.address), store).unwrap();
    node
}

#[test]
fn saved_credentials_reconnect_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let node = boot(dir.path());
    let manager = node.manager();
    assert_eq!(manager.dispatch_command("/getIP"), "No IP");
    assert_eq!(manager.dispatch_command("/addSSID meshlab"), "SSID added");
    assert_eq!(manager.dispatch_command("/addPassword hunter22"), "Password added");
    assert_eq!(manager.dispatch_command("/connectWiFi"), "Connected");
    assert_eq!(manager.dispatch_command("/saveWiFi"), "WiFi data saved");
    drop(node);

    let store = KvStore::open(dir.path()).unwrap();
    assert_eq!(store.get(KEY_WIFI_SSID).as_deref(), Some("meshlab"));
    assert_eq!(store.get(KEY_WIFI_PASSWORD).as_deref(), Some("hunter22"));

    let node = boot(dir.path());
    assert!(node.router().wifi().is_connected());
    assert_ne!(node.manager().dispatch_command("/getIP"), "No IP");
}

#[test]
fn reset_forgets_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let node = boot(dir.path());
    node.manager().dispatch_command("/addSSID meshlab");
    node.manager().dispatch_command("/saveWiFi");
    assert_eq!(node.manager().dispatch_command("/resetWiFiData"), "WiFi data reset");
    assert_eq!(node.manager().dispatch_command("/getIP"), "No IP");
    drop(node);

    let node = boot(dir.path());
    assert!(!node.router().wifi().is_connected());
    assert_eq!(node.services().wifi.credentials().ssid, "");
}

#[test]
fn unsaved_credentials_are_lost() {
    let dir = tempfile::tempdir().unwrap();
    let node = boot(dir.path());
    node.manager().dispatch_command("/addSSID meshlab");
    drop(node);
    let node = boot(dir.path());
    assert_eq!(node.services().wifi.credentials().ssid, "");
}
