//! MQTT bridge rules.
//!
//! Outbound messages are published on `<topic_prefix><addrSrc>` with the JSON
//! envelope as payload. Inbound publications arrive on the subscribed topic;
//! when the payload leaves `addrDst` at zero, the destination is taken from the
//! last path segment of the topic (`from-server/32` targets node 32).
//!
//! The broker connection itself is outside this crate: publications are queued
//! on a channel that a network client drains.
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use super::TransportError;
use crate::config::MqttConfig;
use crate::message::{json, DataMessage, TransportPort, WireError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttPublish {
    pub topic: String,
    pub payload: String,
}

pub struct MqttBridge {
    topic_prefix: String,
    subscribe_topic: String,
    connected: AtomicBool,
    outbound: mpsc::UnboundedSender<MqttPublish>,
}

impl MqttBridge {
    pub fn new(cfg: &MqttConfig) -> (Self, mpsc::UnboundedReceiver<MqttPublish>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                topic_prefix: cfg.topic_prefix.clone(),
                subscribe_topic: cfg.subscribe_topic.clone(),
                connected: AtomicBool::new(cfg.enabled),
                outbound: tx,
            },
            rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::Relaxed);
        if was != connected {
            log::info!("MQTT bridge {}", if connected { "connected" } else { "disconnected" });
        }
    }

    pub fn subscribe_topic(&self) -> &str {
        &self.subscribe_topic
    }

    pub fn topic_for(&self, addr_src: u16) -> String {
        format!("{}{}", self.topic_prefix, addr_src)
    }

    pub fn publish_message(&self, msg: &DataMessage) -> Result<(), TransportError> {
        let payload = json::to_string(msg)?;
        self.publish(self.topic_for(msg.header.addr_src), payload)
    }

    /// Publish free text on the node's own topic.
    pub fn publish_text(&self, addr_src: u16, text: &str) -> Result<(), TransportError> {
        self.publish(self.topic_for(addr_src), text.to_string())
    }

    fn publish(&self, topic: String, payload: String) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Unavailable(TransportPort::Mqtt));
        }
        log::debug!("mqtt publish {} ({} bytes)", topic, payload.len());
        self.outbound
            .send(MqttPublish { topic, payload })
            .map_err(|_| TransportError::ChannelClosed(TransportPort::Mqtt))
    }

    /// Turn an inbound publication into a message.
    pub fn parse_inbound(&self, topic: &str, payload: &str) -> Result<DataMessage, WireError> {
        let mut msg = json::from_str(payload)?;
        if msg.header.addr_dst == 0 {
            if let Some(addr) = address_from_topic(topic) {
                msg.header.addr_dst = addr;
            }
        }
        Ok(msg)
    }
}

/// Decimal address in the last path segment of `topic`.
pub fn address_from_topic(topic: &str) -> Option<u16> {
    topic.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_segment_parsing() {
        assert_eq!(address_from_topic("from-server/32"), Some(32));
        assert_eq!(address_from_topic("from-server/a/b/7"), Some(7));
        assert_eq!(address_from_topic("from-server/"), None);
        assert_eq!(address_from_topic("from-server/x"), None);
        assert_eq!(address_from_topic("99"), Some(99));
    }

    #[test]
    fn publishing_requires_connection() {
        let cfg = MqttConfig {
            enabled: false,
            ..MqttConfig::default()
        };
        let (bridge, mut rx) = MqttBridge::new(&cfg);
        assert!(matches!(
            bridge.publish_text(1, "x"),
            Err(TransportError::Unavailable(TransportPort::Mqtt))
        ));
        bridge.set_connected(true);
        bridge.publish_text(0x10, "hello").unwrap();
        let p = rx.try_recv().unwrap();
        assert_eq!(p.topic, "to-server/16");
        assert_eq!(p.payload, "hello");
    }
}
