//! Sensor services (temperature sensor and DHT22).
//!
//! Each sensor has a periodic sampler that sends a Value report toward the
//! MQTT bridge. Samplers start paused unless `[sensors].autostart` is set; they
//! can be driven from the console or by Start/Pause/SetInterval messages.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::commands::CommandTable;
use crate::message::payload::{SensorBody, SensorMessageType, SensorPayload, SensorReading, SensorType};
use crate::message::{AppPayload, AppPort, DataMessage, TransportPort};
use crate::scheduler::{job_channel, JobHandle, JobState, PendingJob, PeriodicJob};
use crate::transport::TransportRouter;

use super::{unknown_command, MessageIdCounter, Service};

const CMD_START: u8 = SensorMessageType::Start as u8;
const CMD_PAUSE: u8 = SensorMessageType::Pause as u8;
const CMD_GET: u8 = SensorMessageType::GetValue as u8;

/// A sensor driver.
pub trait SensorReader: Send + Sync {
    fn read(&self) -> anyhow::Result<SensorReading>;
}

/// Slowly drifting values for nodes without the hardware attached.
pub struct SimulatedSensor {
    sensor_type: SensorType,
    samples: AtomicU32,
}

impl SimulatedSensor {
    pub fn new(sensor_type: SensorType) -> Self {
        Self {
            sensor_type,
            samples: AtomicU32::new(0),
        }
    }
}

impl SensorReader for SimulatedSensor {
    fn read(&self) -> anyhow::Result<SensorReading> {
        let n = self.samples.fetch_add(1, Ordering::Relaxed) % 20;
        let drift = n as f32 * 0.1;
        Ok(match self.sensor_type {
            SensorType::Temperature => SensorReading::Temperature {
                temperature: 21.0 + drift,
            },
            SensorType::Dht22 => SensorReading::Dht22 {
                temperature: 22.0 + drift,
                humidity: 45.0 + drift,
                pression: 1013.0 + drift,
            },
        })
    }
}

pub fn format_reading(reading: &SensorReading) -> String {
    match reading {
        SensorReading::Temperature { temperature } => format!("Temperature: {:.2} C", temperature),
        SensorReading::Dht22 {
            temperature,
            humidity,
            pression,
        } => format!(
            "Temperature: {:.2} C Humidity: {:.2} % Pression: {:.2} hPa",
            temperature, humidity, pression
        ),
    }
}

struct Keywords {
    start: &'static str,
    pause: &'static str,
    get: &'static str,
}

fn keywords(sensor_type: SensorType) -> Keywords {
    match sensor_type {
        SensorType::Temperature => Keywords {
            start: "/tempStart",
            pause: "/tempPause",
            get: "/tempGet",
        },
        SensorType::Dht22 => Keywords {
            start: "/dhtStart",
            pause: "/dhtPause",
            get: "/dhtGet",
        },
    }
}

fn sensor_port(sensor_type: SensorType) -> AppPort {
    match sensor_type {
        SensorType::Temperature => AppPort::TemperatureSensor,
        SensorType::Dht22 => AppPort::Dht22Sensor,
    }
}

/// One sampling cycle: read and report to the broker.
struct Sampler {
    port: AppPort,
    router: Arc<TransportRouter>,
    reader: Arc<dyn SensorReader>,
    ids: Arc<MessageIdCounter>,
}

impl Sampler {
    fn report(&self) -> anyhow::Result<SensorReading> {
        let reading = self.reader.read()?;
        let msg = DataMessage::new(
            self.port,
            self.ids.next(),
            self.router.local_address(),
            0,
            AppPayload::Sensor(SensorPayload {
                sensor_type: reading.sensor_type(),
                body: SensorBody::Value(reading),
            }),
        )
        .with_dst_port(AppPort::Mqtt);
        self.router.send(TransportPort::Mqtt, msg)?;
        Ok(reading)
    }
}

impl PeriodicJob for Sampler {
    fn name(&self) -> &str {
        self.port.name()
    }

    fn run_cycle(&self) -> anyhow::Result<()> {
        let reading = self.report()?;
        log::debug!("{} sample sent: {}", self.port.name(), format_reading(&reading));
        Ok(())
    }
}

pub struct SensorService {
    sensor_type: SensorType,
    commands: CommandTable,
    router: Arc<TransportRouter>,
    sampler: Arc<Sampler>,
    job: JobHandle,
    pending: Mutex<Option<PendingJob>>,
}

impl SensorService {
    pub fn new(
        sensor_type: SensorType,
        router: Arc<TransportRouter>,
        reader: Arc<dyn SensorReader>,
        interval: Duration,
        autostart: bool,
    ) -> Self {
        let port = sensor_port(sensor_type);
        let kw = keywords(sensor_type);
        let commands = CommandTable::new()
            .public(kw.start, CMD_START, "Start sending sensor values")
            .public(kw.pause, CMD_PAUSE, "Pause sending sensor values")
            .public(kw.get, CMD_GET, "Read the sensor now");
        let sampler = Arc::new(Sampler {
            port,
            router: router.clone(),
            reader,
            ids: Arc::new(MessageIdCounter::new()),
        });
        let initial = if autostart { JobState::Running } else { JobState::Paused };
        let (job, runner) = job_channel(initial);
        let pending = PendingJob {
            runner,
            job: sampler.clone(),
            interval,
        };
        Self {
            sensor_type,
            commands,
            router,
            sampler,
            job,
            pending: Mutex::new(Some(pending)),
        }
    }

    pub fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    pub fn job(&self) -> &JobHandle {
        &self.job
    }

    /// The sampler loop, handed out once for spawning.
    pub fn take_pending_job(&self) -> Option<PendingJob> {
        match self.pending.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub fn read_now(&self) -> String {
        match self.sampler.reader.read() {
            Ok(reading) => format_reading(&reading),
            Err(e) => format!("Sensor read failed: {}", e),
        }
    }

    fn answer_get_value(&self, transport: TransportPort, request: &DataMessage) {
        let reading = match self.sampler.reader.read() {
            Ok(r) => r,
            Err(e) => {
                log::warn!("{} read failed: {:#}", self.name(), e);
                return;
            }
        };
        let mut header = request.reply_header();
        header.app_port_src = self.port();
        header.addr_src = self.router.local_address();
        let msg = DataMessage {
            header,
            payload: AppPayload::Sensor(SensorPayload {
                sensor_type: self.sensor_type,
                body: SensorBody::Value(reading),
            }),
        };
        let via = match transport {
            TransportPort::Internal | TransportPort::Bluetooth => TransportPort::LoRaMesh,
            other => other,
        };
        if let Err(e) = self.router.send(via, msg) {
            log::warn!("{} value to {:04X} not sent: {}", self.name(), request.header.addr_src, e);
        }
    }
}

impl Service for SensorService {
    fn port(&self) -> AppPort {
        sensor_port(self.sensor_type)
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, _args: &str) -> String {
        match command_id {
            CMD_START => {
                self.job.start();
                format!("{} started", self.name())
            }
            CMD_PAUSE => {
                self.job.pause();
                format!("{} paused", self.name())
            }
            CMD_GET => self.read_now(),
            other => unknown_command(self.name(), other),
        }
    }

    fn process_received_message(&self, transport: TransportPort, message: &DataMessage) {
        let AppPayload::Sensor(sensor) = &message.payload else {
            log::debug!("{} ignoring body from {:04X}", self.name(), message.header.addr_src);
            return;
        };
        match sensor.body {
            SensorBody::Start => self.job.start(),
            SensorBody::Pause => self.job.pause(),
            SensorBody::SetInterval(ms) => self.job.set_interval(Duration::from_millis(u64::from(ms.max(1)))),
            SensorBody::GetValue => self.answer_get_value(transport, message),
            SensorBody::Value(reading) => {
                self.router.console().write_line(format!(
                    "{} from {:04X}: {}",
                    self.name(),
                    message.header.addr_src,
                    format_reading(&reading)
                ));
            }
        }
    }
}
