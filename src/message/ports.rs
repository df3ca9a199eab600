//! Port enumerations shared by every node in a deployment.
//!
//! Both sets are append-only. A value, once assigned, is never reused or
//! renumbered: deployed nodes decode these bytes without any version handshake.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::WireError;

/// Logical application address carried in every wire header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum AppPort {
    LoRaChat = 1,
    Bluetooth = 2,
    WiFi = 3,
    Gps = 4,
    Sos = 5,
    Command = 6,
    LoRaMesher = 7,
    Mqtt = 8,
    TemperatureSensor = 9,
    Led = 10,
    Dht22Sensor = 11,
    Simulator = 12,
    Display = 13,
    Metadata = 14,
    Rt = 15,
    Mon = 16,
}

impl AppPort {
    pub const ALL: [AppPort; 16] = [
        AppPort::LoRaChat,
        AppPort::Bluetooth,
        AppPort::WiFi,
        AppPort::Gps,
        AppPort::Sos,
        AppPort::Command,
        AppPort::LoRaMesher,
        AppPort::Mqtt,
        AppPort::TemperatureSensor,
        AppPort::Led,
        AppPort::Dht22Sensor,
        AppPort::Simulator,
        AppPort::Display,
        AppPort::Metadata,
        AppPort::Rt,
        AppPort::Mon,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            AppPort::LoRaChat => "LoRaChat",
            AppPort::Bluetooth => "Bluetooth",
            AppPort::WiFi => "WiFi",
            AppPort::Gps => "GPS",
            AppPort::Sos => "SOS",
            AppPort::Command => "Command",
            AppPort::LoRaMesher => "LoRaMesher",
            AppPort::Mqtt => "MQTT",
            AppPort::TemperatureSensor => "Temperature",
            AppPort::Led => "LED",
            AppPort::Dht22Sensor => "DHT22",
            AppPort::Simulator => "Simulator",
            AppPort::Display => "Display",
            AppPort::Metadata => "Metadata",
            AppPort::Rt => "RoutingTable",
            AppPort::Mon => "Monitor",
        }
    }
}

impl From<AppPort> for u8 {
    fn from(port: AppPort) -> u8 {
        port as u8
    }
}

impl TryFrom<u8> for AppPort {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        AppPort::ALL
            .iter()
            .copied()
            .find(|p| p.as_u8() == value)
            .ok_or(WireError::UnknownPort(value))
    }
}

impl fmt::Display for AppPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.as_u8())
    }
}

/// Physical or logical channel a message enters or leaves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransportPort {
    LoRaMesh = 1,
    Bluetooth = 2,
    WiFi = 3,
    Mqtt = 4,
    /// Loopback into the local dispatcher.
    Internal = 5,
}

impl TransportPort {
    pub fn name(self) -> &'static str {
        match self {
            TransportPort::LoRaMesh => "mesh",
            TransportPort::Bluetooth => "bluetooth",
            TransportPort::WiFi => "wifi",
            TransportPort::Mqtt => "mqtt",
            TransportPort::Internal => "internal",
        }
    }
}

impl TryFrom<u8> for TransportPort {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TransportPort::LoRaMesh),
            2 => Ok(TransportPort::Bluetooth),
            3 => Ok(TransportPort::WiFi),
            4 => Ok(TransportPort::Mqtt),
            5 => Ok(TransportPort::Internal),
            other => Err(other),
        }
    }
}

impl fmt::Display for TransportPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
