//! In-memory implementations of the platform traits, for unit tests
//! and host-side simulation.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use http::StatusCode;

use crate::request::WebRequest;
use crate::store::ConfigStore;

/// RAM-backed [`ConfigStore`]. Contents survive close/reopen cycles
/// within the same instance, which is all the round-trip and
/// default-fallback tests need. Region misuse (touching bytes while no
/// region is open, or past the opened size) panics instead of
/// corrupting silently.
pub struct MemoryStore {
    data: Vec<u8>,
    region: Option<usize>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0xFF; capacity],
            region: None,
        }
    }

    /// Snapshot for test verification.
    pub fn contents(&self, offset: usize, len: usize) -> Vec<u8> {
        self.data[offset..offset + len].to_vec()
    }

    /// Overwrite raw bytes, e.g. to simulate a stale version tag.
    pub fn inject(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn check(&self, offset: usize) {
        let size = self.region.expect("no region open");
        assert!(offset < size, "offset {} outside open region of {} bytes", offset, size);
    }
}

impl ConfigStore for MemoryStore {
    fn open_region(&mut self, total_bytes: usize) {
        assert!(
            total_bytes <= self.data.len(),
            "region of {} bytes exceeds store capacity {}",
            total_bytes,
            self.data.len()
        );
        self.region = Some(total_bytes);
    }

    fn read_byte(&mut self, offset: usize) -> u8 {
        self.check(offset);
        self.data[offset]
    }

    fn write_byte(&mut self, offset: usize, value: u8) {
        self.check(offset);
        self.data[offset] = value;
    }

    fn close_region(&mut self) {
        self.region = None;
    }
}

/// Scripted [`WebRequest`] that records everything the controller
/// emits.
pub struct MockRequest {
    fields: HashMap<String, String>,
    host: String,
    uri: String,
    local_ip: Ipv4Addr,
    authorized: bool,
    pub auth_requested: bool,
    pub headers: Vec<(String, String)>,
    pub status: Option<StatusCode>,
    pub content_type: String,
    pub body: String,
    pub stopped: bool,
}

impl MockRequest {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
            host: "192.168.4.1".to_string(),
            uri: "/".to_string(),
            local_ip: Ipv4Addr::new(192, 168, 4, 1),
            authorized: true,
            auth_requested: false,
            headers: Vec::new(),
            status: None,
            content_type: String::new(),
            body: String::new(),
            stopped: false,
        }
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uri = uri.to_string();
        self
    }

    pub fn with_authorized(mut self, authorized: bool) -> Self {
        self.authorized = authorized;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl Default for MockRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl WebRequest for MockRequest {
    fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn field_value(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    fn host_header(&self) -> String {
        self.host.clone()
    }

    fn uri(&self) -> String {
        self.uri.clone()
    }

    fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    fn authenticate(&mut self, _username: &str, _password: &str) -> bool {
        self.authorized
    }

    fn request_authentication(&mut self) {
        self.auth_requested = true;
    }

    fn send_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn send(&mut self, status: StatusCode, content_type: &str, body: &str) -> anyhow::Result<()> {
        self.status = Some(status);
        self.content_type = content_type.to_string();
        self.body.push_str(body);
        Ok(())
    }

    fn send_content(&mut self, chunk: &str) -> anyhow::Result<()> {
        self.body.push_str(chunk);
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_bytes() {
        let mut store = MemoryStore::new(64);
        store.open_region(16);
        for i in 0..16 {
            store.write_byte(i, i as u8);
        }
        store.close_region();

        store.open_region(16);
        for i in 0..16 {
            assert_eq!(store.read_byte(i), i as u8);
        }
        store.close_region();
    }

    #[test]
    #[should_panic(expected = "no region open")]
    fn memory_store_rejects_access_without_region() {
        let mut store = MemoryStore::new(64);
        store.read_byte(0);
    }

    #[test]
    #[should_panic(expected = "outside open region")]
    fn memory_store_rejects_access_past_region() {
        let mut store = MemoryStore::new(64);
        store.open_region(8);
        store.read_byte(8);
    }
}
