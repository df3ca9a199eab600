//! WiFi service: credential management and the uplink connection.
//!
//! `/addSSID` and `/addPassword` only stage values; `/saveWiFi` persists them
//! under `WiFiSSid` / `WiFiPsw`. Stored credentials are loaded at boot.
use std::sync::{Arc, Mutex, MutexGuard};

use crate::commands::CommandTable;
use crate::message::{AppPort, DataMessage, TransportPort};
use crate::storage::{KvStore, KEY_WIFI_PASSWORD, KEY_WIFI_SSID};
use crate::transport::TransportRouter;

use super::{unknown_command, Service};

const CMD_ADD_SSID: u8 = 1;
const CMD_ADD_PASSWORD: u8 = 2;
const CMD_CONNECT: u8 = 3;
const CMD_GET_IP: u8 = 4;
const CMD_RESET: u8 = 5;
const CMD_SAVE: u8 = 6;
const CMD_DISCONNECT: u8 = 7;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

pub struct WifiService {
    commands: CommandTable,
    router: Arc<TransportRouter>,
    store: Arc<KvStore>,
    credentials: Mutex<WifiCredentials>,
}

impl WifiService {
    pub fn new(router: Arc<TransportRouter>, store: Arc<KvStore>) -> Self {
        let credentials = WifiCredentials {
            ssid: store.get_or(KEY_WIFI_SSID, ""),
            password: store.get_or(KEY_WIFI_PASSWORD, ""),
        };
        if !credentials.ssid.is_empty() {
            log::info!("WiFi credentials loaded for '{}'", credentials.ssid);
        }
        let commands = CommandTable::new()
            .public("/addSSID", CMD_ADD_SSID, "Add WiFi SSID")
            .public("/addPassword", CMD_ADD_PASSWORD, "Add WiFi Password")
            .public("/saveWiFi", CMD_SAVE, "Save WiFi data")
            .public("/connectWiFi", CMD_CONNECT, "Connect WiFi")
            .public("/disconnectWiFi", CMD_DISCONNECT, "Disconnect WiFi")
            .public("/getIP", CMD_GET_IP, "Get IP of the device")
            .public("/resetWiFiData", CMD_RESET, "Reset WiFi Data");
        Self {
            commands,
            router,
            store,
            credentials: Mutex::new(credentials),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WifiCredentials> {
        match self.credentials.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn credentials(&self) -> WifiCredentials {
        self.lock().clone()
    }

    pub fn add_ssid(&self, ssid: &str) -> String {
        let ssid = ssid.trim();
        if ssid.is_empty() {
            return "No SSID added".to_string();
        }
        self.lock().ssid = ssid.to_string();
        "SSID added".to_string()
    }

    pub fn add_password(&self, password: &str) -> String {
        self.lock().password = password.trim().to_string();
        "Password added".to_string()
    }

    pub fn save(&self) -> String {
        let creds = self.credentials();
        let result = self
            .store
            .set(KEY_WIFI_SSID, &creds.ssid)
            .and_then(|_| self.store.set(KEY_WIFI_PASSWORD, &creds.password));
        match result {
            Ok(()) => "WiFi data saved".to_string(),
            Err(e) => {
                log::error!("saving WiFi data: {}", e);
                format!("Failed to save WiFi data: {}", e)
            }
        }
    }

    pub fn reset(&self) -> String {
        *self.lock() = WifiCredentials::default();
        self.router.wifi().disconnect();
        let result = self
            .store
            .remove(KEY_WIFI_SSID)
            .and_then(|_| self.store.remove(KEY_WIFI_PASSWORD));
        match result {
            Ok(()) => "WiFi data reset".to_string(),
            Err(e) => {
                log::error!("resetting WiFi data: {}", e);
                format!("Failed to reset WiFi data: {}", e)
            }
        }
    }

    pub fn connect(&self) -> bool {
        let ssid = self.lock().ssid.clone();
        self.router.wifi().connect(&ssid, self.router.local_address())
    }
}

impl Service for WifiService {
    fn port(&self) -> AppPort {
        AppPort::WiFi
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, args: &str) -> String {
        match command_id {
            CMD_ADD_SSID => self.add_ssid(args),
            CMD_ADD_PASSWORD => self.add_password(args),
            CMD_SAVE => self.save(),
            CMD_RESET => self.reset(),
            CMD_CONNECT => {
                if self.connect() {
                    "Connected".to_string()
                } else {
                    "Failed to connect".to_string()
                }
            }
            CMD_DISCONNECT => {
                self.router.wifi().disconnect();
                "Disconnected".to_string()
            }
            CMD_GET_IP => self.router.wifi().ip().unwrap_or_else(|| "No IP".to_string()),
            other => unknown_command(self.name(), other),
        }
    }

    fn process_received_message(&self, _transport: TransportPort, message: &DataMessage) {
        log::debug!("WiFi service ignoring message from {:04X}", message.header.addr_src);
    }
}
