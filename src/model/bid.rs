// src/model/bid.rs

use serde::{Deserialize, Serialize};

/// Outbound HTTP request descriptor. Adapters only describe the call; the
/// host's transport layer performs it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Serialized request body, empty for GET.
    #[serde(default)]
    pub body: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
}

impl ServerRequest {
    pub fn post(url: impl Into<String>, body: String) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: String::new(),
        }
    }
}

/// Normalized bid result handed back to the host. The host owns it after
/// interpretation; nothing here refers back into the adapter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Bid {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub cpm: f64,
    pub currency: String,
    pub width: u32,
    pub height: u32,
    /// Creative markup.
    pub ad: String,
    #[serde(rename = "creativeId", skip_serializing_if = "Option::is_none")]
    pub creative_id: Option<String>,
    #[serde(rename = "ttl")]
    pub ttl_seconds: u64,
    #[serde(rename = "netRevenue")]
    pub net_revenue: bool,
    #[serde(rename = "dealId", skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    #[serde(rename = "advertiserDomains", default, skip_serializing_if = "Vec::is_empty")]
    pub advertiser_domains: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    #[serde(rename = "pixelEnabled", default)]
    pub pixel_enabled: bool,
    #[serde(rename = "iframeEnabled", default)]
    pub iframe_enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Image,
    Iframe,
}

/// Post-auction user-sync descriptor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserSync {
    #[serde(rename = "type")]
    pub kind: SyncKind,
    pub url: String,
}
