//! JSON form of [`DataMessage`] for text transports.
//!
//! Key names are the contract with the collectors on the MQTT side and must not
//! change. Header fields sit next to the body fields in one flat object, wrapped
//! under a root key:
//!
//! ```json
//! {"data": {"appPortDst": 10, "appPortSrc": 10, "messageId": 3,
//!           "addrSrc": 16, "addrDst": 32, "messageSize": 1, "ledCommand": 1}}
//! ```
//!
//! Routing-table and monitor reports use the root key `"RT"` instead of `"data"`.
//! A body the binary codec would refuse is refused here as well, so both forms
//! describe the same set of messages.
use serde_json::{json, Map, Value};

use super::error::WireError;
use super::payload::{
    utf8, AppPayload, ChatPayload, DisplayCommand, DisplayPayload, GpsFix, GpsKind, GpsPayload,
    LedPayload, MetadataPayload, MonitorReport, MonitorSummary, NeighborEntry, RouteReport,
    SensorBody, SensorMessageType, SensorPayload, SensorReading, SensorType, TextPayload,
    MAX_DISPLAY_TEXT, MONITOR_ONE_MESSAGE,
};
use super::ports::AppPort;
use super::{DataMessage, MessageHeader};

pub const DATA_ROOT: &str = "data";
pub const RT_ROOT: &str = "RT";
/// `message_type` value of metadata reports.
pub const METADATA_TYPE: &str = "metadata";

/// Root key used when wrapping messages produced by `port`.
pub fn root_key(port: AppPort) -> &'static str {
    match port {
        AppPort::Rt | AppPort::Mon => RT_ROOT,
        _ => DATA_ROOT,
    }
}

/// Wrap the flat object under its root key.
pub fn to_envelope(msg: &DataMessage) -> Result<Value, WireError> {
    let mut root = Map::new();
    root.insert(root_key(msg.header.app_port_src).to_string(), to_value(msg)?);
    Ok(Value::Object(root))
}

pub fn to_string(msg: &DataMessage) -> Result<String, WireError> {
    Ok(serde_json::to_string(&to_envelope(msg)?)?)
}

/// Parse an envelope produced by [`to_envelope`]. Either root key is accepted.
pub fn from_envelope(doc: &Value) -> Result<DataMessage, WireError> {
    let inner = doc
        .get(DATA_ROOT)
        .or_else(|| doc.get(RT_ROOT))
        .ok_or(WireError::MissingField(DATA_ROOT))?;
    from_value(inner)
}

pub fn from_str(text: &str) -> Result<DataMessage, WireError> {
    let doc: Value = serde_json::from_str(text)?;
    from_envelope(&doc)
}

/// Flat object: header keys followed by body keys.
pub fn to_value(msg: &DataMessage) -> Result<Value, WireError> {
    msg.payload.validate(msg.header.app_port_src)?;
    let h = &msg.header;
    let mut obj = Map::new();
    obj.insert("appPortDst".into(), json!(h.app_port_dst.as_u8()));
    obj.insert("appPortSrc".into(), json!(h.app_port_src.as_u8()));
    obj.insert("messageId".into(), json!(h.message_id));
    obj.insert("addrSrc".into(), json!(h.addr_src));
    obj.insert("addrDst".into(), json!(h.addr_dst));
    obj.insert("messageSize".into(), json!(msg.message_size()));

    match &msg.payload {
        AppPayload::Chat(c) => {
            obj.insert("type".into(), json!(u8::from(c.kind)));
            let text = utf8(h.app_port_src, &c.content, "chat content is not UTF-8")?;
            obj.insert("message".into(), json!(text));
        }
        AppPayload::Gps(g) => {
            obj.insert("type".into(), json!(u8::from(g.kind())));
            if let GpsPayload::Response(fix) = g {
                merge(&mut obj, serde_json::to_value(fix)?);
            }
        }
        AppPayload::Led(l) => merge(&mut obj, serde_json::to_value(l)?),
        AppPayload::Display(d) => {
            obj.insert("displayCommand".into(), json!(u8::from(d.command)));
            if d.command == DisplayCommand::Text {
                obj.insert("displayText".into(), json!(d.text));
            }
        }
        AppPayload::Sensor(s) => sensor_to_json(&mut obj, s),
        AppPayload::Rt(r) | AppPayload::Mon(MonitorReport::PerRoute(r)) => {
            merge(&mut obj, serde_json::to_value(r)?)
        }
        AppPayload::Mon(MonitorReport::Summary(s)) => {
            obj.insert("RTcount".into(), json!(MONITOR_ONE_MESSAGE));
            obj.insert("uptime".into(), json!(s.uptime));
            obj.insert("TxQ".into(), json!(s.tx_queue));
            obj.insert("RxQ".into(), json!(s.rx_queue));
            obj.insert("number_of_neighbors".into(), json!(s.neighbors.len()));
            obj.insert("rt".into(), serde_json::to_value(&s.neighbors)?);
        }
        AppPayload::Text(t) => merge(&mut obj, serde_json::to_value(t)?),
        AppPayload::Metadata(m) => {
            merge(&mut obj, serde_json::to_value(m.gps)?);
            obj.insert("message_type".into(), json!(METADATA_TYPE));
            obj.insert("metadata_send_time_interval".into(), json!(m.send_interval_ms));
            obj.insert("battery_percentage".into(), json!(m.battery_percentage));
            obj.insert("message".into(), json!([]));
        }
        AppPayload::Raw(b) => {
            obj.insert("payload".into(), json!(to_hex(b)));
        }
    }
    Ok(Value::Object(obj))
}

/// Parse a flat object. `messageSize` is informational only; the size is
/// recomputed from the body.
pub fn from_value(v: &Value) -> Result<DataMessage, WireError> {
    let obj = v
        .as_object()
        .ok_or(WireError::InvalidField {
            field: DATA_ROOT,
            reason: "not an object".into(),
        })?;
    let header = MessageHeader {
        app_port_dst: AppPort::try_from(get_u8(obj, "appPortDst")?)?,
        app_port_src: AppPort::try_from(get_u8(obj, "appPortSrc")?)?,
        message_id: get_u8(obj, "messageId")?,
        addr_src: get_u16(obj, "addrSrc")?,
        addr_dst: get_u16(obj, "addrDst")?,
    };
    let port = header.app_port_src;
    let payload = match port {
        AppPort::LoRaChat => AppPayload::Chat(ChatPayload {
            kind: subtype(port, get_u8(obj, "type")?)?,
            content: get_str(obj, "message")?.as_bytes().to_vec(),
        }),
        AppPort::Gps => match subtype::<GpsKind>(port, get_u8(obj, "type")?)? {
            GpsKind::Request => AppPayload::Gps(GpsPayload::Request),
            GpsKind::Response => {
                let fix: GpsFix = serde_json::from_value(v.clone())?;
                AppPayload::Gps(GpsPayload::Response(fix))
            }
        },
        AppPort::Led => {
            let led: LedPayload = serde_json::from_value(v.clone())?;
            AppPayload::Led(led)
        }
        AppPort::Display => {
            let command: DisplayCommand = subtype(port, get_u8(obj, "displayCommand")?)?;
            if command == DisplayCommand::Text {
                let text = obj.get("displayText").and_then(Value::as_str).unwrap_or("");
                if text.len() > MAX_DISPLAY_TEXT {
                    return Err(WireError::InvalidField {
                        field: "displayText",
                        reason: format!("longer than {} bytes", MAX_DISPLAY_TEXT),
                    });
                }
                AppPayload::Display(DisplayPayload {
                    command,
                    text: text.to_string(),
                })
            } else {
                AppPayload::Display(DisplayPayload::command(command))
            }
        }
        AppPort::TemperatureSensor | AppPort::Dht22Sensor => {
            AppPayload::Sensor(sensor_from_json(obj, port)?)
        }
        AppPort::Rt => {
            let row: RouteReport = serde_json::from_value(v.clone())?;
            AppPayload::Rt(row)
        }
        AppPort::Mon => {
            if get_u64(obj, "RTcount")? == MONITOR_ONE_MESSAGE as u64 {
                let neighbors: Vec<NeighborEntry> = match obj.get("rt") {
                    Some(rt) => serde_json::from_value(rt.clone())?,
                    None => Vec::new(),
                };
                AppPayload::Mon(MonitorReport::Summary(MonitorSummary {
                    uptime: get_u32(obj, "uptime")?,
                    tx_queue: get_u16(obj, "TxQ")?,
                    rx_queue: get_u16(obj, "RxQ")?,
                    neighbors,
                }))
            } else {
                let row: RouteReport = serde_json::from_value(v.clone())?;
                AppPayload::Mon(MonitorReport::PerRoute(row))
            }
        }
        AppPort::Mqtt | AppPort::Bluetooth => {
            let text: TextPayload = serde_json::from_value(v.clone())?;
            AppPayload::Text(text)
        }
        AppPort::Metadata => {
            let gps: GpsFix = serde_json::from_value(v.clone())?;
            AppPayload::Metadata(MetadataPayload {
                gps,
                send_interval_ms: get_u32(obj, "metadata_send_time_interval")?,
                battery_percentage: get_f32(obj, "battery_percentage")?,
            })
        }
        AppPort::WiFi
        | AppPort::Sos
        | AppPort::Command
        | AppPort::LoRaMesher
        | AppPort::Simulator => {
            let hex = obj.get("payload").and_then(Value::as_str).unwrap_or("");
            AppPayload::Raw(from_hex(hex).ok_or(WireError::InvalidField {
                field: "payload",
                reason: "not a hex string".into(),
            })?)
        }
    };
    Ok(DataMessage { header, payload })
}

fn sensor_to_json(obj: &mut Map<String, Value>, s: &SensorPayload) {
    obj.insert("sensorType".into(), json!(u8::from(s.sensor_type)));
    obj.insert("messageType".into(), json!(u8::from(s.body.message_type())));
    match s.body {
        SensorBody::SetInterval(ms) => {
            obj.insert("interval".into(), json!(ms));
        }
        SensorBody::Value(SensorReading::Temperature { temperature }) => {
            obj.insert("temperature".into(), json!(temperature));
        }
        SensorBody::Value(SensorReading::Dht22 {
            temperature,
            humidity,
            pression,
        }) => {
            obj.insert("temperature".into(), json!(temperature));
            obj.insert("humidity".into(), json!(humidity));
            obj.insert("pression".into(), json!(pression));
        }
        SensorBody::Start | SensorBody::Pause | SensorBody::GetValue => {}
    }
}

fn sensor_from_json(obj: &Map<String, Value>, port: AppPort) -> Result<SensorPayload, WireError> {
    let sensor_type: SensorType = subtype(port, get_u8(obj, "sensorType")?)?;
    let body = match subtype::<SensorMessageType>(port, get_u8(obj, "messageType")?)? {
        SensorMessageType::Start => SensorBody::Start,
        SensorMessageType::Pause => SensorBody::Pause,
        SensorMessageType::GetValue => SensorBody::GetValue,
        SensorMessageType::SetInterval => SensorBody::SetInterval(get_u32(obj, "interval")?),
        SensorMessageType::Value => SensorBody::Value(match sensor_type {
            SensorType::Temperature => SensorReading::Temperature {
                temperature: get_f32(obj, "temperature")?,
            },
            SensorType::Dht22 => SensorReading::Dht22 {
                temperature: get_f32(obj, "temperature")?,
                humidity: get_f32(obj, "humidity")?,
                pression: get_f32(obj, "pression")?,
            },
        }),
    };
    Ok(SensorPayload { sensor_type, body })
}

fn merge(obj: &mut Map<String, Value>, extra: Value) {
    if let Value::Object(fields) = extra {
        obj.extend(fields);
    }
}

fn subtype<T: TryFrom<u8>>(port: AppPort, value: u8) -> Result<T, WireError> {
    T::try_from(value).map_err(|_| WireError::UnknownSubtype { port, value })
}

fn get_u64(obj: &Map<String, Value>, key: &'static str) -> Result<u64, WireError> {
    obj.get(key)
        .ok_or(WireError::MissingField(key))?
        .as_u64()
        .ok_or_else(|| WireError::InvalidField {
            field: key,
            reason: "expected an unsigned integer".into(),
        })
}

fn get_ranged<T: TryFrom<u64>>(obj: &Map<String, Value>, key: &'static str) -> Result<T, WireError> {
    let raw = get_u64(obj, key)?;
    T::try_from(raw).map_err(|_| WireError::InvalidField {
        field: key,
        reason: format!("{} out of range", raw),
    })
}

fn get_u8(obj: &Map<String, Value>, key: &'static str) -> Result<u8, WireError> {
    get_ranged(obj, key)
}

fn get_u16(obj: &Map<String, Value>, key: &'static str) -> Result<u16, WireError> {
    get_ranged(obj, key)
}

fn get_u32(obj: &Map<String, Value>, key: &'static str) -> Result<u32, WireError> {
    get_ranged(obj, key)
}

fn get_f32(obj: &Map<String, Value>, key: &'static str) -> Result<f32, WireError> {
    obj.get(key)
        .ok_or(WireError::MissingField(key))?
        .as_f64()
        .map(|f| f as f32)
        .ok_or_else(|| WireError::InvalidField {
            field: key,
            reason: "expected a number".into(),
        })
}

fn get_str<'a>(obj: &'a Map<String, Value>, key: &'static str) -> Result<&'a str, WireError> {
    obj.get(key)
        .ok_or(WireError::MissingField(key))?
        .as_str()
        .ok_or_else(|| WireError::InvalidField {
            field: key,
            reason: "expected a string".into(),
        })
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}
