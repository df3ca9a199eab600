//! WiFi link state.
//!
//! Radio association is not modelled: connecting succeeds whenever an SSID is
//! configured and the node is given a deterministic address in 10.0.0.0/16.
use std::sync::Mutex;

#[derive(Debug, Default, Clone)]
struct LinkState {
    ssid: Option<String>,
    ip: Option<String>,
}

#[derive(Debug, Default)]
pub struct WifiLink {
    state: Mutex<LinkState>,
}

impl WifiLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LinkState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().ip.is_some()
    }

    /// Associate with `ssid`. Returns whether the link is up afterwards.
    pub fn connect(&self, ssid: &str, local_address: u16) -> bool {
        let mut st = self.lock();
        if ssid.trim().is_empty() {
            st.ssid = None;
            st.ip = None;
            return false;
        }
        let ip = format!("10.0.{}.{}", local_address >> 8, local_address & 0xFF);
        log::info!("WiFi associated with '{}' as {}", ssid, ip);
        st.ssid = Some(ssid.to_string());
        st.ip = Some(ip);
        true
    }

    pub fn disconnect(&self) {
        let mut st = self.lock();
        if st.ip.take().is_some() {
            log::info!("WiFi disconnected");
        }
        st.ssid = None;
    }

    pub fn ip(&self) -> Option<String> {
        self.lock().ip.clone()
    }

    pub fn ssid(&self) -> Option<String> {
        self.lock().ssid.clone()
    }
}
