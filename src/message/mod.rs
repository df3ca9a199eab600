//! # Wire messages
//!
//! Every exchange between nodes, and between a node and its bridges, is a
//! [`DataMessage`]: a fixed header naming source and destination addresses and
//! application ports, followed by a body whose layout belongs to the source
//! application.
//!
//! - [`wire`] - packed little-endian binary form used on the mesh
//! - [`json`] - named-field JSON form used by the MQTT bridge
//! - [`payload`] - typed bodies for each application
//! - [`ports`] - append-only application and transport port enumerations

pub mod error;
pub mod json;
pub mod payload;
pub mod ports;
pub mod wire;

pub use error::WireError;
pub use payload::AppPayload;
pub use ports::{AppPort, TransportPort};

/// Addressing part of a message. The body length is not stored: it is always
/// derived from the payload when encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub app_port_dst: AppPort,
    pub app_port_src: AppPort,
    pub message_id: u8,
    pub addr_src: u16,
    pub addr_dst: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataMessage {
    pub header: MessageHeader,
    pub payload: AppPayload,
}

impl DataMessage {
    /// Message whose source and destination application are the same port.
    pub fn new(port: AppPort, message_id: u8, addr_src: u16, addr_dst: u16, payload: AppPayload) -> Self {
        Self {
            header: MessageHeader {
                app_port_dst: port,
                app_port_src: port,
                message_id,
                addr_src,
                addr_dst,
            },
            payload,
        }
    }

    pub fn with_dst_port(mut self, port: AppPort) -> Self {
        self.header.app_port_dst = port;
        self
    }

    /// Body length in bytes, the value carried as `messageSize`.
    pub fn message_size(&self) -> usize {
        self.payload.encoded_len()
    }

    /// Reply skeleton: addresses and ports swapped, message id kept.
    pub fn reply_header(&self) -> MessageHeader {
        MessageHeader {
            app_port_dst: self.header.app_port_src,
            app_port_src: self.header.app_port_dst,
            message_id: self.header.message_id,
            addr_src: self.header.addr_dst,
            addr_dst: self.header.addr_src,
        }
    }
}
