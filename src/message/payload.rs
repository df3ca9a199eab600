//! Typed message bodies.
//!
//! Every body starts with its subtype discriminant where the layout has one,
//! followed by fixed little-endian fields and, for text carrying messages, a
//! trailing byte run whose length is implied by the header's `messageSize`.
//! The layout is chosen by the *source* application port: a routing-table row
//! addressed to the MQTT bridge still carries the routing-table layout.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use super::error::WireError;
use super::ports::AppPort;
use super::wire::MAX_BODY_SIZE;

/// Contact names travel as a fixed, NUL padded field of this many bytes.
pub const MAX_NAME_LEN: usize = 10;
/// Longest text a display message may carry.
pub const MAX_DISPLAY_TEXT: usize = 32;
/// `RTcount` marker for the aggregated monitor layout.
pub const MONITOR_ONE_MESSAGE: u16 = 0xFFFF;
/// Encoded size of one routing-table row.
pub const ROUTE_REPORT_SIZE: usize = 17;
/// Encoded size of one neighbour entry in the aggregated monitor layout.
pub const NEIGHBOR_ENTRY_SIZE: usize = 9;

const GPS_FIX_SIZE: usize = 8 * 3 + 1 + 5 + 2;
/// Fix, send interval and battery level.
const METADATA_SIZE: usize = GPS_FIX_SIZE + 4 + 4;
const MONITOR_SUMMARY_HEAD: usize = 2 + 4 + 2 + 2 + 4;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "u8", try_from = "u8")]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value),+
        }

        impl From<$name> for u8 {
            fn from(v: $name) -> u8 {
                v as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = String;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(format!("unknown {} value {}", stringify!($name), other)),
                }
            }
        }
    };
}

wire_enum! {
    /// Chat message subtype.
    ChatKind {
        ChangeName = 1,
        GetName = 2,
        GetContacts = 3,
        GetAddrByName = 4,
        RequestContactInfo = 5,
        ResponseContactInfo = 6,
        MyContact = 7,
        ChatTo = 8,
        AckChat = 9,
        RequestGps = 10,
        ResponseGps = 11,
        GetPreviousMessages = 12,
    }
}

wire_enum! {
    GpsKind {
        Request = 1,
        Response = 2,
    }
}

wire_enum! {
    LedCommand {
        Off = 0,
        On = 1,
    }
}

wire_enum! {
    DisplayCommand {
        On = 0,
        Off = 1,
        Blink = 2,
        Clear = 3,
        Text = 4,
        Logo = 5,
    }
}

wire_enum! {
    SensorType {
        Temperature = 0,
        Dht22 = 1,
    }
}

wire_enum! {
    SensorMessageType {
        Start = 0,
        Pause = 1,
        SetInterval = 2,
        GetValue = 3,
        Value = 4,
    }
}

/// Subtype byte used by the MQTT and Bluetooth text bodies.
pub const TEXT_MESSAGE: u8 = 1;

fn subtype<T: TryFrom<u8>>(port: AppPort, value: u8) -> Result<T, WireError> {
    T::try_from(value).map_err(|_| WireError::UnknownSubtype { port, value })
}

fn need(buf: &[u8], n: usize, port: AppPort, reason: &'static str) -> Result<(), WireError> {
    if buf.remaining() < n {
        return Err(WireError::MalformedBody { port, reason });
    }
    Ok(())
}

/// Text carried in a body must be UTF-8; nothing is repaired on the way through.
pub(crate) fn utf8<'a>(port: AppPort, bytes: &'a [u8], reason: &'static str) -> Result<&'a str, WireError> {
    std::str::from_utf8(bytes).map_err(|_| WireError::MalformedBody { port, reason })
}

/// Chat body: subtype then raw content bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatPayload {
    pub kind: ChatKind,
    pub content: Vec<u8>,
}

impl ChatPayload {
    pub fn new(kind: ChatKind, text: &str) -> Self {
        Self {
            kind,
            content: text.as_bytes().to_vec(),
        }
    }

    pub fn empty(kind: ChatKind) -> Self {
        Self {
            kind,
            content: Vec::new(),
        }
    }

    /// Contact info carries the name in a fixed width, NUL padded field.
    pub fn contact_info(kind: ChatKind, name: &str) -> Self {
        let mut content = vec![0u8; MAX_NAME_LEN];
        let bytes = crate::validation::truncate_utf8(name, MAX_NAME_LEN).as_bytes();
        content[..bytes.len()].copy_from_slice(bytes);
        Self { kind, content }
    }

    /// Content as text with any NUL padding removed.
    pub fn text(&self) -> String {
        let end = self
            .content
            .iter()
            .rposition(|b| *b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        String::from_utf8_lossy(&self.content[..end]).into_owned()
    }
}

/// Position fix as reported by a GPS response.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub satellites: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GpsPayload {
    Request,
    Response(GpsFix),
}

impl GpsPayload {
    pub fn kind(&self) -> GpsKind {
        match self {
            GpsPayload::Request => GpsKind::Request,
            GpsPayload::Response(_) => GpsKind::Response,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedPayload {
    #[serde(rename = "ledCommand")]
    pub command: LedCommand,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayPayload {
    pub command: DisplayCommand,
    /// Only meaningful for [`DisplayCommand::Text`].
    pub text: String,
}

impl DisplayPayload {
    pub fn command(command: DisplayCommand) -> Self {
        Self {
            command,
            text: String::new(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            command: DisplayCommand::Text,
            text: crate::validation::truncate_utf8(text, MAX_DISPLAY_TEXT).to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SensorReading {
    Temperature {
        temperature: f32,
    },
    Dht22 {
        temperature: f32,
        humidity: f32,
        pression: f32,
    },
}

impl SensorReading {
    pub fn sensor_type(&self) -> SensorType {
        match self {
            SensorReading::Temperature { .. } => SensorType::Temperature,
            SensorReading::Dht22 { .. } => SensorType::Dht22,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SensorBody {
    Start,
    Pause,
    /// Sampling interval in milliseconds.
    SetInterval(u32),
    GetValue,
    Value(SensorReading),
}

impl SensorBody {
    pub fn message_type(&self) -> SensorMessageType {
        match self {
            SensorBody::Start => SensorMessageType::Start,
            SensorBody::Pause => SensorMessageType::Pause,
            SensorBody::SetInterval(_) => SensorMessageType::SetInterval,
            SensorBody::GetValue => SensorMessageType::GetValue,
            SensorBody::Value(_) => SensorMessageType::Value,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorPayload {
    pub sensor_type: SensorType,
    pub body: SensorBody,
}

/// One routing-table row as reported to the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteReport {
    #[serde(rename = "RTcount")]
    pub rt_count: u16,
    pub address: u16,
    pub via: u16,
    pub metric: u8,
    #[serde(rename = "receivedSNR")]
    pub received_snr: i8,
    #[serde(rename = "sentSNR")]
    pub sent_snr: i8,
    #[serde(rename = "SRTT")]
    pub srtt: u32,
    #[serde(rename = "RTTVAR")]
    pub rttvar: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub neighbor: u32,
    #[serde(rename = "RxSNR")]
    pub rx_snr: i8,
    #[serde(rename = "SRTT")]
    pub srtt: u32,
}

/// Aggregated monitor report: node counters plus every direct neighbour.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MonitorSummary {
    pub uptime: u32,
    pub tx_queue: u16,
    pub rx_queue: u16,
    pub neighbors: Vec<NeighborEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorReport {
    PerRoute(RouteReport),
    Summary(MonitorSummary),
}

/// Periodic node description sent to the collector.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct MetadataPayload {
    pub gps: GpsFix,
    /// Reporting period in milliseconds.
    pub send_interval_ms: u32,
    pub battery_percentage: f32,
}

/// Free text body used by the MQTT and Bluetooth applications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPayload {
    #[serde(rename = "type")]
    pub kind: u8,
    pub message: String,
}

impl TextPayload {
    pub fn new(message: &str) -> Self {
        Self {
            kind: TEXT_MESSAGE,
            message: message.to_string(),
        }
    }
}

/// Body of a wire message, one variant per layout.
#[derive(Clone, Debug, PartialEq)]
pub enum AppPayload {
    Chat(ChatPayload),
    Gps(GpsPayload),
    Led(LedPayload),
    Display(DisplayPayload),
    Sensor(SensorPayload),
    Rt(RouteReport),
    Mon(MonitorReport),
    Text(TextPayload),
    Metadata(MetadataPayload),
    /// Known port without a typed layout; the body is carried untouched.
    Raw(Vec<u8>),
}

impl AppPayload {
    /// Whether this layout is the one `port` produces.
    pub fn matches_port(&self, port: AppPort) -> bool {
        matches!(
            (self, port),
            (AppPayload::Chat(_), AppPort::LoRaChat)
                | (AppPayload::Gps(_), AppPort::Gps)
                | (AppPayload::Led(_), AppPort::Led)
                | (AppPayload::Display(_), AppPort::Display)
                | (AppPayload::Sensor(_), AppPort::TemperatureSensor)
                | (AppPayload::Sensor(_), AppPort::Dht22Sensor)
                | (AppPayload::Rt(_), AppPort::Rt)
                | (AppPayload::Mon(_), AppPort::Mon)
                | (AppPayload::Text(_), AppPort::Mqtt)
                | (AppPayload::Text(_), AppPort::Bluetooth)
                | (AppPayload::Metadata(_), AppPort::Metadata)
                | (
                    AppPayload::Raw(_),
                    AppPort::WiFi
                        | AppPort::Sos
                        | AppPort::Command
                        | AppPort::LoRaMesher
                        | AppPort::Simulator
                )
        )
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            AppPayload::Chat(c) => 1 + c.content.len(),
            AppPayload::Gps(GpsPayload::Request) => 1,
            AppPayload::Gps(GpsPayload::Response(_)) => 1 + GPS_FIX_SIZE,
            AppPayload::Led(_) => 1,
            AppPayload::Display(d) => {
                if d.command == DisplayCommand::Text {
                    1 + d.text.len()
                } else {
                    1
                }
            }
            AppPayload::Sensor(s) => {
                2 + match s.body {
                    SensorBody::SetInterval(_) => 4,
                    SensorBody::Value(SensorReading::Temperature { .. }) => 4,
                    SensorBody::Value(SensorReading::Dht22 { .. }) => 12,
                    _ => 0,
                }
            }
            AppPayload::Rt(_) | AppPayload::Mon(MonitorReport::PerRoute(_)) => ROUTE_REPORT_SIZE,
            AppPayload::Mon(MonitorReport::Summary(s)) => {
                MONITOR_SUMMARY_HEAD + s.neighbors.len() * NEIGHBOR_ENTRY_SIZE
            }
            AppPayload::Text(t) => 1 + t.message.len(),
            AppPayload::Metadata(_) => METADATA_SIZE,
            AppPayload::Raw(b) => b.len(),
        }
    }

    /// Refuse any body produced by `port` that [`AppPayload::decode`] would not
    /// read back unchanged.
    pub fn validate(&self, port: AppPort) -> Result<(), WireError> {
        if !self.matches_port(port) {
            return Err(WireError::LayoutMismatch { port });
        }
        let size = self.encoded_len();
        if size > MAX_BODY_SIZE {
            return Err(WireError::Oversize {
                size,
                max: MAX_BODY_SIZE,
            });
        }
        match self {
            AppPayload::Chat(c) => {
                utf8(port, &c.content, "chat content is not UTF-8")?;
            }
            AppPayload::Display(d) if d.command == DisplayCommand::Text => {
                if d.text.len() > MAX_DISPLAY_TEXT {
                    return Err(WireError::MalformedBody {
                        port,
                        reason: "display text too long",
                    });
                }
            }
            AppPayload::Display(d) if !d.text.is_empty() => {
                return Err(WireError::MalformedBody {
                    port,
                    reason: "display text without the Text command",
                });
            }
            AppPayload::Mon(MonitorReport::PerRoute(r)) if r.rt_count == MONITOR_ONE_MESSAGE => {
                return Err(WireError::MalformedBody {
                    port,
                    reason: "RTcount 0xFFFF is reserved for the monitor summary",
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Append the body to `buf`. Writes exactly [`AppPayload::encoded_len`] bytes.
    pub fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            AppPayload::Chat(c) => {
                buf.put_u8(c.kind.into());
                buf.put_slice(&c.content);
            }
            AppPayload::Gps(GpsPayload::Request) => buf.put_u8(GpsKind::Request.into()),
            AppPayload::Gps(GpsPayload::Response(fix)) => {
                buf.put_u8(GpsKind::Response.into());
                put_fix(buf, fix);
            }
            AppPayload::Led(l) => buf.put_u8(l.command.into()),
            AppPayload::Display(d) => {
                buf.put_u8(d.command.into());
                if d.command == DisplayCommand::Text {
                    buf.put_slice(d.text.as_bytes());
                }
            }
            AppPayload::Sensor(s) => {
                buf.put_u8(s.sensor_type.into());
                buf.put_u8(s.body.message_type().into());
                match s.body {
                    SensorBody::SetInterval(ms) => buf.put_u32_le(ms),
                    SensorBody::Value(SensorReading::Temperature { temperature }) => {
                        buf.put_f32_le(temperature)
                    }
                    SensorBody::Value(SensorReading::Dht22 {
                        temperature,
                        humidity,
                        pression,
                    }) => {
                        buf.put_f32_le(temperature);
                        buf.put_f32_le(humidity);
                        buf.put_f32_le(pression);
                    }
                    _ => {}
                }
            }
            AppPayload::Rt(r) | AppPayload::Mon(MonitorReport::PerRoute(r)) => put_route(buf, r),
            AppPayload::Mon(MonitorReport::Summary(s)) => {
                buf.put_u16_le(MONITOR_ONE_MESSAGE);
                buf.put_u32_le(s.uptime);
                buf.put_u16_le(s.tx_queue);
                buf.put_u16_le(s.rx_queue);
                buf.put_u32_le(s.neighbors.len() as u32);
                for n in &s.neighbors {
                    buf.put_u32_le(n.neighbor);
                    buf.put_i8(n.rx_snr);
                    buf.put_u32_le(n.srtt);
                }
            }
            AppPayload::Text(t) => {
                buf.put_u8(t.kind);
                buf.put_slice(t.message.as_bytes());
            }
            AppPayload::Metadata(m) => {
                put_fix(buf, &m.gps);
                buf.put_u32_le(m.send_interval_ms);
                buf.put_f32_le(m.battery_percentage);
            }
            AppPayload::Raw(b) => buf.put_slice(b),
        }
    }

    /// Decode a complete body produced by `port`.
    pub fn decode(port: AppPort, body: &[u8]) -> Result<Self, WireError> {
        let mut buf = body;
        match port {
            AppPort::LoRaChat => {
                need(buf, 1, port, "missing chat type")?;
                let kind = subtype(port, buf.get_u8())?;
                utf8(port, buf, "chat content is not UTF-8")?;
                Ok(AppPayload::Chat(ChatPayload {
                    kind,
                    content: buf.to_vec(),
                }))
            }
            AppPort::Gps => {
                need(buf, 1, port, "missing gps type")?;
                match subtype::<GpsKind>(port, buf.get_u8())? {
                    GpsKind::Request => Ok(AppPayload::Gps(GpsPayload::Request)),
                    GpsKind::Response => {
                        need(buf, GPS_FIX_SIZE, port, "short gps fix")?;
                        Ok(AppPayload::Gps(GpsPayload::Response(get_fix(&mut buf))))
                    }
                }
            }
            AppPort::Led => {
                need(buf, 1, port, "missing led command")?;
                Ok(AppPayload::Led(LedPayload {
                    command: subtype(port, buf.get_u8())?,
                }))
            }
            AppPort::Display => {
                need(buf, 1, port, "missing display command")?;
                let command: DisplayCommand = subtype(port, buf.get_u8())?;
                let text = if command == DisplayCommand::Text {
                    if buf.len() > MAX_DISPLAY_TEXT {
                        return Err(WireError::MalformedBody {
                            port,
                            reason: "display text too long",
                        });
                    }
                    utf8(port, buf, "display text is not UTF-8")?.to_string()
                } else {
                    String::new()
                };
                Ok(AppPayload::Display(DisplayPayload { command, text }))
            }
            AppPort::TemperatureSensor | AppPort::Dht22Sensor => {
                need(buf, 2, port, "missing sensor header")?;
                let sensor_type: SensorType = subtype(port, buf.get_u8())?;
                let body = match subtype::<SensorMessageType>(port, buf.get_u8())? {
                    SensorMessageType::Start => SensorBody::Start,
                    SensorMessageType::Pause => SensorBody::Pause,
                    SensorMessageType::GetValue => SensorBody::GetValue,
                    SensorMessageType::SetInterval => {
                        need(buf, 4, port, "missing interval")?;
                        SensorBody::SetInterval(buf.get_u32_le())
                    }
                    SensorMessageType::Value => match sensor_type {
                        SensorType::Temperature => {
                            need(buf, 4, port, "short temperature value")?;
                            SensorBody::Value(SensorReading::Temperature {
                                temperature: buf.get_f32_le(),
                            })
                        }
                        SensorType::Dht22 => {
                            need(buf, 12, port, "short dht22 value")?;
                            SensorBody::Value(SensorReading::Dht22 {
                                temperature: buf.get_f32_le(),
                                humidity: buf.get_f32_le(),
                                pression: buf.get_f32_le(),
                            })
                        }
                    },
                };
                Ok(AppPayload::Sensor(SensorPayload { sensor_type, body }))
            }
            AppPort::Rt => {
                need(buf, ROUTE_REPORT_SIZE, port, "short routing row")?;
                Ok(AppPayload::Rt(get_route(&mut buf)))
            }
            AppPort::Mon => {
                need(buf, 2, port, "missing RTcount")?;
                let marker = u16::from_le_bytes([buf[0], buf[1]]);
                if marker != MONITOR_ONE_MESSAGE && buf.len() == ROUTE_REPORT_SIZE {
                    return Ok(AppPayload::Mon(MonitorReport::PerRoute(get_route(&mut buf))));
                }
                need(buf, MONITOR_SUMMARY_HEAD, port, "short monitor summary")?;
                buf.advance(2);
                let uptime = buf.get_u32_le();
                let tx_queue = buf.get_u16_le();
                let rx_queue = buf.get_u16_le();
                let count = buf.get_u32_le() as usize;
                if buf.len() != count.saturating_mul(NEIGHBOR_ENTRY_SIZE) {
                    return Err(WireError::MalformedBody {
                        port,
                        reason: "neighbour count does not match body size",
                    });
                }
                let mut neighbors = Vec::with_capacity(count);
                for _ in 0..count {
                    neighbors.push(NeighborEntry {
                        neighbor: buf.get_u32_le(),
                        rx_snr: buf.get_i8(),
                        srtt: buf.get_u32_le(),
                    });
                }
                Ok(AppPayload::Mon(MonitorReport::Summary(MonitorSummary {
                    uptime,
                    tx_queue,
                    rx_queue,
                    neighbors,
                })))
            }
            AppPort::Mqtt | AppPort::Bluetooth => {
                need(buf, 1, port, "missing text type")?;
                let kind = buf.get_u8();
                Ok(AppPayload::Text(TextPayload {
                    kind,
                    message: utf8(port, buf, "text is not UTF-8")?.to_string(),
                }))
            }
            AppPort::Metadata => {
                need(buf, METADATA_SIZE, port, "short metadata")?;
                Ok(AppPayload::Metadata(MetadataPayload {
                    gps: get_fix(&mut buf),
                    send_interval_ms: buf.get_u32_le(),
                    battery_percentage: buf.get_f32_le(),
                }))
            }
            AppPort::WiFi
            | AppPort::Sos
            | AppPort::Command
            | AppPort::LoRaMesher
            | AppPort::Simulator => Ok(AppPayload::Raw(buf.to_vec())),
        }
    }
}

fn put_fix(buf: &mut BytesMut, fix: &GpsFix) {
    buf.put_f64_le(fix.latitude);
    buf.put_f64_le(fix.longitude);
    buf.put_f64_le(fix.altitude);
    buf.put_u8(fix.satellites);
    buf.put_u8(fix.hour);
    buf.put_u8(fix.minute);
    buf.put_u8(fix.second);
    buf.put_u8(fix.day);
    buf.put_u8(fix.month);
    buf.put_u16_le(fix.year);
}

fn get_fix(buf: &mut &[u8]) -> GpsFix {
    GpsFix {
        latitude: buf.get_f64_le(),
        longitude: buf.get_f64_le(),
        altitude: buf.get_f64_le(),
        satellites: buf.get_u8(),
        hour: buf.get_u8(),
        minute: buf.get_u8(),
        second: buf.get_u8(),
        day: buf.get_u8(),
        month: buf.get_u8(),
        year: buf.get_u16_le(),
    }
}

fn put_route(buf: &mut BytesMut, r: &RouteReport) {
    buf.put_u16_le(r.rt_count);
    buf.put_u16_le(r.address);
    buf.put_u16_le(r.via);
    buf.put_u8(r.metric);
    buf.put_i8(r.received_snr);
    buf.put_i8(r.sent_snr);
    buf.put_u32_le(r.srtt);
    buf.put_u32_le(r.rttvar);
}

fn get_route(buf: &mut &[u8]) -> RouteReport {
    RouteReport {
        rt_count: buf.get_u16_le(),
        address: buf.get_u16_le(),
        via: buf.get_u16_le(),
        metric: buf.get_u8(),
        received_snr: buf.get_i8(),
        sent_snr: buf.get_i8(),
        srtt: buf.get_u32_le(),
        rttvar: buf.get_u32_le(),
    }
}
