//! Contact directory: address to name, one entry per address.
use std::sync::Mutex;

use crate::message::payload::MAX_NAME_LEN;
use crate::validation::truncate_utf8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub address: u16,
    pub name: String,
}

/// Unordered contact list. Lookups are linear; networks are tens of nodes.
#[derive(Debug, Default)]
pub struct ContactDirectory {
    contacts: Mutex<Vec<Contact>>,
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Contact>> {
        match self.contacts.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Insert or rename. Address 0 is never stored.
    pub fn upsert(&self, address: u16, name: &str) -> bool {
        if address == 0 {
            log::warn!("contact with address 0 ignored");
            return false;
        }
        let name = truncate_utf8(name.trim(), MAX_NAME_LEN).to_string();
        let mut contacts = self.lock();
        match contacts.iter_mut().find(|c| c.address == address) {
            Some(existing) => {
                if existing.name != name {
                    log::debug!("contact {:04X} renamed {} -> {}", address, existing.name, name);
                    existing.name = name;
                }
            }
            None => {
                log::debug!("contact {:04X} added as {}", address, name);
                contacts.push(Contact { address, name });
            }
        }
        true
    }

    pub fn lookup_by_address(&self, address: u16) -> Option<String> {
        self.lock()
            .iter()
            .find(|c| c.address == address)
            .map(|c| c.name.clone())
    }

    /// First contact whose name matches exactly.
    pub fn lookup_by_name(&self, name: &str) -> Option<u16> {
        let name = name.trim();
        self.lock()
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.address)
    }

    pub fn list(&self) -> Vec<Contact> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// User facing listing.
    pub fn render(&self) -> String {
        let contacts = self.lock();
        let mut out = String::from("--- List of contacts ---\n");
        if contacts.is_empty() {
            out.push_str("Empty List\n");
        }
        for c in contacts.iter() {
            out.push_str(&format!(" - {}: {}\n", c.address, c.name));
        }
        out
    }
}
