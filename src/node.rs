//! # Node context
//!
//! Wires one node together: transports, the router, every service and the
//! [`MessageManager`]. The binary builds one context for the local node and one
//! per simulated peer; tests do the same over a [`SimNetwork`](crate::mesh::sim::SimNetwork).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lorachat::config::Config;
//! use lorachat::mesh::sim::SimulatedMesh;
//! use lorachat::node::NodeContext;
//! use lorachat::storage::KvStore;
//!
//! # fn demo() -> anyhow::Result<()> {
//! let config = Config::default();
//! let mesh = SimulatedMesh::standalone(config.node.address);
//! let (node, _channels) = NodeContext::new(&config, mesh, Arc::new(KvStore::in_memory()))?;
//! println!("{}", node.manager().dispatch_command("/help"));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::logutil::escape_log;
use crate::manager::MessageManager;
use crate::mesh::{MeshFacade, MeshFrame};
use crate::message::payload::SensorType;
use crate::message::{DataMessage, TransportPort};
use crate::services::bluetooth::BluetoothService;
use crate::services::chat::ChatService;
use crate::services::display::DisplayService;
use crate::services::gps::{FixedGpsSource, GpsService, GpsSource};
use crate::services::led::LedService;
use crate::services::mesh_info::MeshInfoService;
use crate::services::metadata::{FixedBattery, MetadataReporter};
use crate::services::monitor::MonitorReporter;
use crate::services::mqtt::MqttService;
use crate::services::rt::RoutingReporter;
use crate::services::sensor::{SensorService, SimulatedSensor};
use crate::services::wifi::WifiService;
use crate::services::Service;
use crate::storage::KvStore;
use crate::transport::{ConsoleOutput, MqttBridge, MqttPublish, TransportRouter, WifiLink};

/// Receivers created by [`NodeContext::new`].
pub struct NodeChannels {
    /// Messages a service sent over the Internal transport.
    pub internal_rx: mpsc::UnboundedReceiver<DataMessage>,
    /// Lines for the interactive console.
    pub console_rx: mpsc::UnboundedReceiver<String>,
    /// Publications waiting for the broker client.
    pub mqtt_publish_rx: mpsc::UnboundedReceiver<MqttPublish>,
}

/// Everything [`NodeContext::run`] reads from.
pub struct NodeInputs {
    pub mesh_rx: mpsc::UnboundedReceiver<MeshFrame>,
    pub internal_rx: mpsc::UnboundedReceiver<DataMessage>,
    pub command_rx: mpsc::UnboundedReceiver<String>,
    pub mqtt_inbound_rx: mpsc::UnboundedReceiver<MqttPublish>,
}

/// Typed handles on the registered services.
pub struct NodeServices {
    pub chat: Arc<ChatService>,
    pub bluetooth: Arc<BluetoothService>,
    pub wifi: Arc<WifiService>,
    pub gps: Arc<GpsService>,
    pub mesh_info: Arc<MeshInfoService>,
    pub mqtt: Arc<MqttService>,
    pub temperature: Arc<SensorService>,
    pub led: Arc<LedService>,
    pub dht22: Arc<SensorService>,
    pub display: Arc<DisplayService>,
    pub metadata: Arc<MetadataReporter>,
    pub rt: Arc<RoutingReporter>,
    pub monitor: Arc<MonitorReporter>,
}

impl NodeServices {
    fn all(&self) -> Vec<Arc<dyn Service>> {
        vec![
            self.chat.clone(),
            self.bluetooth.clone(),
            self.wifi.clone(),
            self.gps.clone(),
            self.mesh_info.clone(),
            self.mqtt.clone(),
            self.temperature.clone(),
            self.led.clone(),
            self.dht22.clone(),
            self.display.clone(),
            self.metadata.clone(),
            self.rt.clone(),
            self.monitor.clone(),
        ]
    }
}

pub struct NodeContext {
    router: Arc<TransportRouter>,
    manager: MessageManager,
    services: NodeServices,
}

impl NodeContext {
    pub fn new(config: &Config, mesh: Arc<dyn MeshFacade>, store: Arc<KvStore>) -> anyhow::Result<(Self, NodeChannels)> {
        if mesh.local_address() != config.node.address {
            log::warn!(
                "mesh address {:04X} differs from configured {:04X}; using the mesh address",
                mesh.local_address(),
                config.node.address
            );
        }
        let (console, console_rx) = ConsoleOutput::channel();
        let (mqtt, mqtt_publish_rx) = MqttBridge::new(&config.mqtt);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let router = Arc::new(TransportRouter::new(
            mesh.clone(),
            Arc::new(mqtt),
            Arc::new(WifiLink::new()),
            console.clone(),
            internal_tx,
        ));

        let telemetry = &config.telemetry;
        let sensors = &config.sensors;
        let gps_source: Arc<dyn GpsSource> = Arc::new(FixedGpsSource::new(&config.gps));
        let services = NodeServices {
            chat: Arc::new(ChatService::new(router.clone(), &config.node.name)),
            bluetooth: Arc::new(BluetoothService::new(console)),
            wifi: Arc::new(WifiService::new(router.clone(), store)),
            gps: Arc::new(GpsService::new(router.clone(), gps_source.clone())),
            mesh_info: Arc::new(MeshInfoService::new(mesh)),
            mqtt: Arc::new(MqttService::new(router.clone())),
            temperature: Arc::new(SensorService::new(
                SensorType::Temperature,
                router.clone(),
                Arc::new(SimulatedSensor::new(SensorType::Temperature)),
                Duration::from_secs(sensors.temperature_interval_secs),
                sensors.autostart,
            )),
            led: Arc::new(LedService::new(router.clone())),
            dht22: Arc::new(SensorService::new(
                SensorType::Dht22,
                router.clone(),
                Arc::new(SimulatedSensor::new(SensorType::Dht22)),
                Duration::from_secs(sensors.dht22_interval_secs),
                sensors.autostart,
            )),
            display: Arc::new(DisplayService::new(router.clone())),
            metadata: Arc::new(MetadataReporter::new(
                router.clone(),
                gps_source,
                Arc::new(FixedBattery(sensors.battery_percentage)),
                Duration::from_secs(telemetry.metadata_interval_secs),
                telemetry.metadata_autostart,
            )),
            rt: Arc::new(RoutingReporter::new(
                router.clone(),
                Duration::from_secs(telemetry.rt_interval_secs),
                telemetry.rt_autostart,
            )),
            monitor: Arc::new(MonitorReporter::new(
                router.clone(),
                telemetry.monitor_strategy,
                Duration::from_secs(telemetry.mon_interval_secs),
                telemetry.mon_autostart,
            )),
        };

        let mut manager = MessageManager::new(router.clone());
        for service in services.all() {
            let name = service.name().to_string();
            manager
                .register(service)
                .map_err(|e| anyhow!("registering {}: {}", name, e))?;
        }

        if !services.wifi.credentials().ssid.is_empty() && services.wifi.connect() {
            log::info!("WiFi associated at boot");
        }

        log::info!(
            "node {:04X} ready with {} services",
            router.local_address(),
            manager.services().len()
        );
        Ok((
            Self {
                router,
                manager,
                services,
            },
            NodeChannels {
                internal_rx,
                console_rx,
                mqtt_publish_rx,
            },
        ))
    }

    pub fn router(&self) -> &Arc<TransportRouter> {
        &self.router
    }

    pub fn manager(&self) -> &MessageManager {
        &self.manager
    }

    pub fn services(&self) -> &NodeServices {
        &self.services
    }

    pub fn local_address(&self) -> u16 {
        self.router.local_address()
    }

    /// Spawn the reporter and sampler loops. Only the first call spawns anything.
    pub fn start_jobs(&self) -> Vec<JoinHandle<()>> {
        let pending = [
            self.services.rt.take_pending_job(),
            self.services.monitor.take_pending_job(),
            self.services.metadata.take_pending_job(),
            self.services.temperature.take_pending_job(),
            self.services.dht22.take_pending_job(),
        ];
        pending.into_iter().flatten().map(|job| job.spawn()).collect()
    }

    /// Stop every periodic loop.
    pub async fn stop_jobs(&self) {
        // Unspawned loops would never answer the shutdown request.
        drop(self.services.rt.take_pending_job());
        drop(self.services.monitor.take_pending_job());
        drop(self.services.temperature.take_pending_job());
        drop(self.services.dht22.take_pending_job());
        drop(self.services.metadata.take_pending_job());
        self.services.rt.job().shutdown().await;
        self.services.monitor.job().shutdown().await;
        self.services.temperature.job().shutdown().await;
        self.services.dht22.job().shutdown().await;
        self.services.metadata.job().shutdown().await;
    }

    /// Run one console line and surface the reply.
    pub fn handle_command_line(&self, line: &str) {
        let reply = self.manager.dispatch_command(line);
        if !reply.is_empty() {
            self.router.console().write_line(reply.trim_end());
        }
    }

    fn handle_mqtt_inbound(&self, publish: &MqttPublish) {
        match self.router.mqtt().parse_inbound(&publish.topic, &publish.payload) {
            Ok(msg) => self.manager.dispatch_message(TransportPort::Mqtt, &msg),
            Err(e) => {
                crate::metrics::inc_decode_failure();
                log::warn!(
                    "bad MQTT payload on {} ({}): {}",
                    escape_log(&publish.topic),
                    e,
                    escape_log(&publish.payload)
                );
            }
        }
    }

    /// Receive loop. Ends on `shutdown` or once every input has closed.
    pub async fn run(&self, inputs: NodeInputs, mut shutdown: oneshot::Receiver<()>) {
        let NodeInputs {
            mut mesh_rx,
            mut internal_rx,
            mut command_rx,
            mut mqtt_inbound_rx,
        } = inputs;
        log::debug!("node {:04X} receive loop started", self.local_address());
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("node {:04X} shutting down", self.local_address());
                    break;
                }
                Some(line) = command_rx.recv() => self.handle_command_line(&line),
                Some(frame) = mesh_rx.recv() => {
                    log::trace!("frame {:04X} -> {:04X} ({} bytes)", frame.src, frame.dst, frame.data.len());
                    self.manager.dispatch_frame(&frame.data);
                }
                Some(msg) = internal_rx.recv() => self.manager.dispatch_message(TransportPort::Internal, &msg),
                Some(publish) = mqtt_inbound_rx.recv() => self.handle_mqtt_inbound(&publish),
                else => break,
            }
        }
    }
}
