// src/host/mod.rs
//
// Capability seams the host framework offers to adapters. Everything here
// is best-effort: an absent capability and a failed lookup both surface as
// `None`, and the adapter omits the corresponding payload field.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Host-resolved price floor for one ad unit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Floor {
    pub floor: f64,
    pub currency: String,
}

pub trait FloorResolver: Send + Sync {
    fn floor_for(&self, ad_unit_code: &str, size: Option<[u32; 2]>) -> Option<Floor>;
}

/// Rendered dimensions of the slot element matching an ad-unit code, plus
/// its CSS max sizes when set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SlotRect {
    pub width: f64,
    pub height: f64,
    #[serde(rename = "maxWidth", skip_serializing_if = "Option::is_none")]
    pub max_width: Option<String>,
    #[serde(rename = "maxHeight", skip_serializing_if = "Option::is_none")]
    pub max_height: Option<String>,
}

pub trait SlotGeometry: Send + Sync {
    fn bounding_rect(&self, ad_unit_code: &str) -> Option<SlotRect>;
}

/// Page-level lookups: URL query parameters and the page's root domain.
pub trait PageInfo: Send + Sync {
    fn query_param(&self, name: &str) -> Option<String>;
    fn root_domain(&self) -> Option<String>;
}

/// Client capability flags resolved from the browser environment.
pub trait DeviceInfo: Send + Sync {
    fn autoplay_enabled(&self) -> Option<bool>;
    fn downlink_mbps(&self) -> Option<f64>;
}

/// Browser-local persistence: local storage plus cookies.
pub trait HostStorage: Send + Sync {
    fn local_storage_enabled(&self) -> bool;
    fn get_local(&self, key: &str) -> Option<String>;
    fn set_local(&self, key: &str, value: &str);
    fn get_cookie(&self, name: &str) -> Option<String>;
    fn set_cookie(&self, name: &str, value: &str, expires: DateTime<Utc>);
}

/// Fire-and-forget event delivery (the host's beacon utility).
pub trait BeaconSender: Send + Sync {
    fn send(&self, url: &str, body: String);
}

/// Bundle of host capabilities handed to adapters. Storage and beacon are
/// always present; the rest are optional per page.
#[derive(Clone)]
pub struct HostContext {
    pub storage: Arc<dyn HostStorage>,
    pub beacon: Arc<dyn BeaconSender>,
    pub floors: Option<Arc<dyn FloorResolver>>,
    pub geometry: Option<Arc<dyn SlotGeometry>>,
    pub page: Option<Arc<dyn PageInfo>>,
    pub device: Option<Arc<dyn DeviceInfo>>,
}

impl HostContext {
    pub fn new(storage: Arc<dyn HostStorage>, beacon: Arc<dyn BeaconSender>) -> Self {
        Self {
            storage,
            beacon,
            floors: None,
            geometry: None,
            page: None,
            device: None,
        }
    }

    pub fn floor_for(&self, ad_unit_code: &str, size: Option<[u32; 2]>) -> Option<Floor> {
        self.floors.as_ref()?.floor_for(ad_unit_code, size)
    }

    pub fn bounding_rect(&self, ad_unit_code: &str) -> Option<SlotRect> {
        self.geometry.as_ref()?.bounding_rect(ad_unit_code)
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.page.as_ref()?.query_param(name)
    }

    pub fn root_domain(&self) -> Option<String> {
        self.page.as_ref()?.root_domain()
    }

    pub fn autoplay_enabled(&self) -> Option<bool> {
        self.device.as_ref()?.autoplay_enabled()
    }

    pub fn downlink_mbps(&self) -> Option<f64> {
        self.device.as_ref()?.downlink_mbps()
    }
}

/// In-memory stand-in for browser storage, used by the harness and tests.
/// Cookies keep their expiry so tests can assert on it; expired cookies are
/// treated as absent on read.
pub struct MemoryStorage {
    enabled: bool,
    cells: Mutex<HashMap<String, String>>,
    cookies: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            enabled: true,
            cells: Mutex::new(HashMap::new()),
            cookies: Mutex::new(HashMap::new()),
        }
    }

    /// Storage with local storage switched off, for consent-denied pages.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn cookie_expiry(&self, name: &str) -> Option<DateTime<Utc>> {
        self.cookies.lock().ok()?.get(name).map(|(_, exp)| *exp)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl HostStorage for MemoryStorage {
    fn local_storage_enabled(&self) -> bool {
        self.enabled
    }

    fn get_local(&self, key: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        self.cells.lock().ok()?.get(key).cloned()
    }

    fn set_local(&self, key: &str, value: &str) {
        if !self.enabled {
            debug!(key, "local storage disabled, value dropped");
            return;
        }
        if let Ok(mut cells) = self.cells.lock() {
            cells.insert(key.to_string(), value.to_string());
        }
    }

    fn get_cookie(&self, name: &str) -> Option<String> {
        let cookies = self.cookies.lock().ok()?;
        let (value, expires) = cookies.get(name)?;
        if *expires <= Utc::now() {
            return None;
        }
        Some(value.clone())
    }

    fn set_cookie(&self, name: &str, value: &str, expires: DateTime<Utc>) {
        if let Ok(mut cookies) = self.cookies.lock() {
            cookies.insert(name.to_string(), (value.to_string(), expires));
        }
    }
}

/// Fixed page environment: a parsed query string and a root domain.
#[derive(Default)]
pub struct StaticPage {
    query: HashMap<String, String>,
    domain: Option<String>,
}

impl StaticPage {
    pub fn new(domain: Option<&str>) -> Self {
        Self {
            query: HashMap::new(),
            domain: domain.map(str::to_string),
        }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }
}

impl PageInfo for StaticPage {
    fn query_param(&self, name: &str) -> Option<String> {
        self.query.get(name).cloned()
    }

    fn root_domain(&self) -> Option<String> {
        self.domain.clone()
    }
}

/// Constant device capabilities for the harness.
pub struct FixedDevice {
    pub autoplay: Option<bool>,
    pub downlink: Option<f64>,
}

impl DeviceInfo for FixedDevice {
    fn autoplay_enabled(&self) -> Option<bool> {
        self.autoplay
    }

    fn downlink_mbps(&self) -> Option<f64> {
        self.downlink
    }
}

/// Beacon sink that drops everything. Default for tests.
pub struct NullBeacon;

impl BeaconSender for NullBeacon {
    fn send(&self, _url: &str, _body: String) {}
}

/// Beacon sender backed by reqwest: fire-and-forget POST on a spawned task,
/// delivery failures only logged.
pub struct HttpBeacon {
    client: reqwest::Client,
}

impl HttpBeacon {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl BeaconSender for HttpBeacon {
    fn send(&self, url: &str, body: String) {
        let client = self.client.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            if let Err(err) = client.post(&url).body(body).send().await {
                debug!(%url, %err, "beacon delivery failed");
            }
        });
    }
}
