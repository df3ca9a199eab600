//! GPS service: answers position requests and shows positions received from peers.
use std::sync::Arc;

use chrono::{Datelike, Timelike, Utc};

use crate::commands::CommandTable;
use crate::config::GpsConfig;
use crate::message::payload::{GpsFix, GpsKind, GpsPayload};
use crate::message::{AppPayload, AppPort, DataMessage, TransportPort};
use crate::transport::TransportRouter;

use super::{unknown_command, Service};

const CMD_GET_GPS: u8 = GpsKind::Response as u8;

/// Where positions come from. A receiver driver would implement this.
pub trait GpsSource: Send + Sync {
    /// Current fix, or `None` while no valid position is known.
    fn fix(&self) -> Option<GpsFix>;
}

/// Reports a configured position stamped with the current UTC time.
pub struct FixedGpsSource {
    latitude: f64,
    longitude: f64,
    altitude: f64,
}

impl FixedGpsSource {
    pub fn new(cfg: &GpsConfig) -> Self {
        Self {
            latitude: cfg.latitude,
            longitude: cfg.longitude,
            altitude: cfg.altitude,
        }
    }
}

impl GpsSource for FixedGpsSource {
    fn fix(&self) -> Option<GpsFix> {
        // 0,0 is what an unlocked receiver reports
        if self.latitude == 0.0 && self.longitude == 0.0 {
            return None;
        }
        let now = Utc::now();
        Some(GpsFix {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            satellites: 0,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
            day: now.day() as u8,
            month: now.month() as u8,
            year: u16::try_from(now.year()).unwrap_or(0),
        })
    }
}

/// `( dd/mm/yyyy - hh:mm:ss ) GPS: Lat: .. Lon: .. Alt: .. N. SAT: n`
pub fn format_fix(fix: &GpsFix) -> String {
    format!(
        "( {:02}/{:02}/{} - {:02}:{:02}:{:02} ) GPS: Lat: {:.7} Lon: {:.7} Alt: {:.2} N. SAT: {}",
        fix.day, fix.month, fix.year, fix.hour, fix.minute, fix.second, fix.latitude, fix.longitude, fix.altitude, fix.satellites
    )
}

const NO_FIX: &str = "GPS not valid, try again later";

pub struct GpsService {
    commands: CommandTable,
    router: Arc<TransportRouter>,
    source: Arc<dyn GpsSource>,
}

impl GpsService {
    pub fn new(router: Arc<TransportRouter>, source: Arc<dyn GpsSource>) -> Self {
        Self {
            commands: CommandTable::new().public("/getGPS", CMD_GET_GPS, "Get the GPS position of this device"),
            router,
            source,
        }
    }

    pub fn position_string(&self) -> String {
        match self.source.fix() {
            Some(fix) => format_fix(&fix),
            None => NO_FIX.to_string(),
        }
    }

    fn respond(&self, transport: TransportPort, request: &DataMessage) {
        let Some(fix) = self.source.fix() else {
            log::info!("GPS request from {:04X} unanswered: no fix", request.header.addr_src);
            return;
        };
        let mut header = request.reply_header();
        header.app_port_src = AppPort::Gps;
        header.addr_src = self.router.local_address();
        let msg = DataMessage {
            header,
            payload: AppPayload::Gps(GpsPayload::Response(fix)),
        };
        let via = match transport {
            TransportPort::Internal | TransportPort::Bluetooth => TransportPort::LoRaMesh,
            other => other,
        };
        if let Err(e) = self.router.send(via, msg) {
            log::warn!("GPS response to {:04X} not sent: {}", request.header.addr_src, e);
        }
    }
}

impl Service for GpsService {
    fn port(&self) -> AppPort {
        AppPort::Gps
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, _args: &str) -> String {
        match command_id {
            CMD_GET_GPS => self.position_string(),
            other => unknown_command(self.name(), other),
        }
    }

    fn process_received_message(&self, transport: TransportPort, message: &DataMessage) {
        match &message.payload {
            AppPayload::Gps(GpsPayload::Request) => {
                if message.header.addr_src == self.router.local_address() {
                    self.router.console().write_line(self.position_string());
                } else {
                    self.respond(transport, message);
                }
            }
            AppPayload::Gps(GpsPayload::Response(fix)) => {
                self.router
                    .console()
                    .write_line(format!("Position of {:04X}: {}", message.header.addr_src, format_fix(fix)));
            }
            _ => log::debug!("GPS service ignoring body from {:04X}", message.header.addr_src),
        }
    }
}
