//! # Transports
//!
//! [`TransportRouter`] is the single outbound switch: services hand it a
//! message and a [`TransportPort`], it picks the back-end.
//!
//! | Port       | Back-end                                                   |
//! |------------|------------------------------------------------------------|
//! | LoRaMesh   | encoded frame, reliable unicast to `addrDst`               |
//! | Bluetooth  | text line on the interactive console                       |
//! | WiFi       | broker uplink when associated, else closest mesh gateway   |
//! | Mqtt       | JSON publish when connected, else closest mesh gateway     |
//! | Internal   | loopback into this node's own inbound queue                |
//!
//! Sends have no timeout or retry here; reliability belongs to the mesh.

pub mod console;
pub mod mqtt;
pub mod wifi;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::logutil::{describe_header, escape_log};
use crate::mesh::{MeshError, MeshFacade};
use crate::message::payload::AppPayload;
use crate::message::{json, wire, DataMessage, TransportPort, WireError};
use crate::metrics;

pub use console::ConsoleOutput;
pub use mqtt::{MqttBridge, MqttPublish};
pub use wifi::WifiLink;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{0} transport not connected")]
    Unavailable(TransportPort),

    #[error("no gateway reachable through the mesh")]
    NoGateway,

    #[error("{0} channel closed")]
    ChannelClosed(TransportPort),

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Wire(#[from] WireError),
}

pub struct TransportRouter {
    mesh: Arc<dyn MeshFacade>,
    mqtt: Arc<MqttBridge>,
    wifi: Arc<WifiLink>,
    console: ConsoleOutput,
    internal: mpsc::UnboundedSender<DataMessage>,
}

impl TransportRouter {
    pub fn new(
        mesh: Arc<dyn MeshFacade>,
        mqtt: Arc<MqttBridge>,
        wifi: Arc<WifiLink>,
        console: ConsoleOutput,
        internal: mpsc::UnboundedSender<DataMessage>,
    ) -> Self {
        Self {
            mesh,
            mqtt,
            wifi,
            console,
            internal,
        }
    }

    pub fn local_address(&self) -> u16 {
        self.mesh.local_address()
    }

    pub fn mesh(&self) -> &Arc<dyn MeshFacade> {
        &self.mesh
    }

    pub fn mqtt(&self) -> &Arc<MqttBridge> {
        &self.mqtt
    }

    pub fn wifi(&self) -> &Arc<WifiLink> {
        &self.wifi
    }

    pub fn console(&self) -> &ConsoleOutput {
        &self.console
    }

    pub fn send(&self, port: TransportPort, msg: DataMessage) -> Result<(), TransportError> {
        log::debug!("send via {}: {}", port, describe_header(&msg.header));
        let result = match port {
            TransportPort::LoRaMesh => self.send_mesh(&msg),
            TransportPort::Bluetooth => self.send_console(&msg),
            TransportPort::WiFi => {
                if self.wifi.is_connected() && self.mqtt.is_connected() {
                    self.mqtt.publish_message(&msg)
                } else {
                    log::warn!("WiFi not connected, routing through closest gateway");
                    self.send_closest_gateway(msg)
                }
            }
            TransportPort::Mqtt => match self.mqtt.publish_message(&msg) {
                Err(TransportError::Unavailable(_)) => {
                    log::info!("MQTT not connected, routing through closest gateway");
                    self.send_closest_gateway(msg)
                }
                other => other,
            },
            TransportPort::Internal => self
                .internal
                .send(msg)
                .map_err(|_| TransportError::ChannelClosed(TransportPort::Internal)),
        };
        match &result {
            Ok(()) => metrics::record_sent(port),
            Err(e) => {
                metrics::inc_send_failure();
                log::warn!("send via {} failed: {}", port, e);
            }
        }
        result
    }

    fn send_mesh(&self, msg: &DataMessage) -> Result<(), TransportError> {
        let frame = wire::encode(msg)?;
        log::trace!("mesh frame {}", crate::logutil::hex_preview(&frame, 24));
        self.mesh.send_reliable(msg.header.addr_dst, frame)?;
        Ok(())
    }

    /// Re-address the message to the nearest gateway and send it over the mesh.
    fn send_closest_gateway(&self, mut msg: DataMessage) -> Result<(), TransportError> {
        let gateway = self.mesh.closest_gateway().ok_or(TransportError::NoGateway)?;
        metrics::inc_gateway_fallback();
        log::debug!("forwarding to gateway {:04X}", gateway);
        msg.header.addr_dst = gateway;
        self.send_mesh(&msg)
    }

    fn send_console(&self, msg: &DataMessage) -> Result<(), TransportError> {
        let line = match &msg.payload {
            AppPayload::Text(t) => t.message.clone(),
            AppPayload::Chat(c) => c.text(),
            _ => json::to_string(msg)?,
        };
        log::trace!("console <- {}", escape_log(&line));
        if self.console.write_line(line) {
            Ok(())
        } else {
            Err(TransportError::ChannelClosed(TransportPort::Bluetooth))
        }
    }
}
