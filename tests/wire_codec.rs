//! Wire format properties seen from outside the codec: sizes, layouts chosen
//! by the source port, and agreement between the binary and JSON forms.
use lorachat::message::payload::{
    ChatKind, ChatPayload, DisplayCommand, DisplayPayload, GpsFix, GpsPayload, LedCommand, LedPayload,
    MetadataPayload, MonitorReport, MonitorSummary, NeighborEntry, RouteReport, SensorBody, SensorPayload,
    SensorReading, SensorType, TextPayload, MONITOR_ONE_MESSAGE, NEIGHBOR_ENTRY_SIZE, ROUTE_REPORT_SIZE,
};
use lorachat::message::wire::{self, FrameDecoder, HEADER_SIZE};
use lorachat::message::{json, AppPayload, AppPort, DataMessage, WireError};

fn fix() -> GpsFix {
    GpsFix {
        latitude: 41.3874,
        longitude: 2.1686,
        altitude: 12.5,
        satellites: 7,
        hour: 10,
        minute: 5,
        second: 59,
        day: 18,
        month: 10,
        year: 2026,
    }
}

fn sensor(port: AppPort, sensor_type: SensorType, body: SensorBody) -> (AppPort, AppPayload) {
    (port, AppPayload::Sensor(SensorPayload { sensor_type, body }))
}

fn route_row() -> DataMessage {
    DataMessage::new(
        AppPort::Rt,
        4,
        0x10,
        0,
        AppPayload::Rt(RouteReport {
            rt_count: 1,
            address: 0x20,
            via: 0x20,
            metric: 1,
            received_snr: -3,
            sent_snr: 5,
            srtt: 120,
            rttvar: 30,
        }),
    )
    .with_dst_port(AppPort::Mqtt)
}

#[test]
fn size_field_always_matches_the_body() {
    let msg = route_row();
    let frame = wire::encode(&msg).unwrap();
    assert_eq!(frame.len(), HEADER_SIZE + ROUTE_REPORT_SIZE);
    assert_eq!(&frame[7..11], &(ROUTE_REPORT_SIZE as u32).to_le_bytes());
    assert_eq!(msg.message_size(), ROUTE_REPORT_SIZE);
}

#[test]
fn layout_follows_the_source_port() {
    // Rt row addressed to the MQTT application still decodes as an Rt row.
    let msg = route_row();
    let decoded = wire::decode(&wire::encode(&msg).unwrap()).unwrap();
    assert_eq!(decoded.header.app_port_dst, AppPort::Mqtt);
    assert_eq!(decoded, msg);
    assert_eq!(json::from_str(&json::to_string(&msg).unwrap()).unwrap(), msg);
}

#[test]
fn monitor_summary_carries_its_marker() {
    let msg = DataMessage::new(
        AppPort::Mon,
        2,
        0x10,
        0,
        AppPayload::Mon(MonitorReport::Summary(MonitorSummary {
            uptime: 61_000,
            tx_queue: 2,
            rx_queue: 0,
            neighbors: vec![
                NeighborEntry { neighbor: 0x20, rx_snr: 7, srtt: 90 },
                NeighborEntry { neighbor: 0x30, rx_snr: -1, srtt: 300 },
            ],
        })),
    );
    let frame = wire::encode(&msg).unwrap();
    assert_eq!(&frame[HEADER_SIZE..HEADER_SIZE + 2], &MONITOR_ONE_MESSAGE.to_le_bytes());
    assert_eq!(frame.len(), HEADER_SIZE + 14 + 2 * NEIGHBOR_ENTRY_SIZE);
    assert_eq!(wire::decode(&frame).unwrap(), msg);

    let text = json::to_string(&msg).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(doc["RT"]["number_of_neighbors"], 2);
    assert_eq!(json::from_str(&text).unwrap(), msg);
}

#[test]
fn binary_and_json_agree_on_gps_and_sensor_bodies() {
    let gps = DataMessage::new(
        AppPort::Gps,
        3,
        0x20,
        0x10,
        AppPayload::Gps(GpsPayload::Response(GpsFix {
            latitude: 41.3874,
            longitude: 2.1686,
            altitude: 12.5,
            satellites: 7,
            hour: 10,
            minute: 5,
            second: 59,
            day: 18,
            month: 10,
            year: 2026,
        })),
    );
    let dht = DataMessage::new(
        AppPort::Dht22Sensor,
        8,
        0x20,
        0,
        AppPayload::Sensor(SensorPayload {
            sensor_type: SensorType::Dht22,
            body: SensorBody::Value(SensorReading::Dht22 {
                temperature: 22.5,
                humidity: 40.25,
                pression: 1013.5,
            }),
        }),
    );
    for msg in [gps, dht] {
        let via_wire = wire::decode(&wire::encode(&msg).unwrap()).unwrap();
        let via_json = json::from_str(&json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(via_wire, via_json);
        assert_eq!(via_wire, msg);
    }
}

#[test]
fn every_layout_survives_both_codecs() {
    let bodies = vec![
        (AppPort::LoRaChat, AppPayload::Chat(ChatPayload::new(ChatKind::ChatTo, "hola, qué tal"))),
        (AppPort::LoRaChat, AppPayload::Chat(ChatPayload::contact_info(ChatKind::ResponseContactInfo, "Bob"))),
        (AppPort::LoRaChat, AppPayload::Chat(ChatPayload::empty(ChatKind::GetContacts))),
        (AppPort::Gps, AppPayload::Gps(GpsPayload::Request)),
        (AppPort::Gps, AppPayload::Gps(GpsPayload::Response(fix()))),
        (AppPort::Led, AppPayload::Led(LedPayload { command: LedCommand::On })),
        (AppPort::Display, AppPayload::Display(DisplayPayload::text("Hello mesh"))),
        (AppPort::Display, AppPayload::Display(DisplayPayload::command(DisplayCommand::Blink))),
        (AppPort::Display, AppPayload::Display(DisplayPayload::command(DisplayCommand::Logo))),
        sensor(AppPort::TemperatureSensor, SensorType::Temperature, SensorBody::Start),
        sensor(AppPort::TemperatureSensor, SensorType::Temperature, SensorBody::Pause),
        sensor(AppPort::TemperatureSensor, SensorType::Temperature, SensorBody::SetInterval(30_000)),
        sensor(AppPort::TemperatureSensor, SensorType::Temperature, SensorBody::GetValue),
        sensor(
            AppPort::TemperatureSensor,
            SensorType::Temperature,
            SensorBody::Value(SensorReading::Temperature { temperature: 21.5 }),
        ),
        sensor(
            AppPort::Dht22Sensor,
            SensorType::Dht22,
            SensorBody::Value(SensorReading::Dht22 {
                temperature: 22.5,
                humidity: 40.25,
                pression: 1013.5,
            }),
        ),
        (AppPort::Rt, route_row().payload),
        (
            AppPort::Mon,
            AppPayload::Mon(MonitorReport::PerRoute(RouteReport {
                rt_count: 3,
                address: 0x30,
                via: 0x20,
                metric: 2,
                received_snr: -7,
                sent_snr: 4,
                srtt: 250,
                rttvar: 60,
            })),
        ),
        (
            AppPort::Mon,
            AppPayload::Mon(MonitorReport::Summary(MonitorSummary {
                uptime: 5_000,
                ..MonitorSummary::default()
            })),
        ),
        (AppPort::Mqtt, AppPayload::Text(TextPayload::new("from the broker"))),
        (AppPort::Bluetooth, AppPayload::Text(TextPayload::new(""))),
        (
            AppPort::Metadata,
            AppPayload::Metadata(MetadataPayload {
                gps: fix(),
                send_interval_ms: 60_000,
                battery_percentage: 87.5,
            }),
        ),
        (AppPort::WiFi, AppPayload::Raw(vec![0x00, 0xFF, 0x10])),
        (AppPort::Sos, AppPayload::Raw(Vec::new())),
    ];

    for (i, (port, payload)) in bodies.into_iter().enumerate() {
        let msg = DataMessage::new(port, i as u8, 0x20, 0x10, payload);
        let frame = wire::encode(&msg).unwrap_or_else(|e| panic!("{:?}: encode failed: {}", msg, e));
        assert_eq!(frame.len(), HEADER_SIZE + msg.message_size(), "{:?}", msg);
        assert_eq!(wire::decode(&frame).unwrap(), msg, "binary {:?}", port);

        let text = json::to_string(&msg).unwrap_or_else(|e| panic!("{:?}: to_json failed: {}", msg, e));
        assert_eq!(json::from_str(&text).unwrap(), msg, "json {:?}: {}", port, text);
    }
}

#[test]
fn unknown_source_port_is_rejected() {
    let mut frame = wire::encode(&route_row()).unwrap().to_vec();
    frame[1] = 200;
    assert!(matches!(wire::decode(&frame), Err(WireError::UnknownPort(200))));
}

#[test]
fn stream_decoder_splits_back_to_back_frames() {
    let mut stream = Vec::new();
    for id in 1..=3u8 {
        let mut msg = route_row();
        msg.header.message_id = id;
        stream.extend_from_slice(&wire::encode(&msg).unwrap());
    }
    let mut decoder = FrameDecoder::new();
    let mut ids = Vec::new();
    for chunk in stream.chunks(7) {
        decoder.push(chunk);
        while let Some(msg) = decoder.next_message().unwrap() {
            ids.push(msg.header.message_id);
        }
    }
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(decoder.buffered(), 0);
}
