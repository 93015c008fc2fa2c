// src/logging/auction_log.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Structured record of one auction cycle, aggregated across all vendor
/// calls and written through the runtime logger.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuctionLog {
    pub timestamp: String,
    pub log_type: String,
    pub page_view_id: String,
    pub auction_id: String,
    pub calls_made: usize,
    pub status: String,
    pub winning_vendor: Option<String>,
    pub winning_cpm: f64,
    pub vendor_calls: Vec<VendorCallLog>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VendorCallLog {
    pub vendor: String,
    pub url: String,
    pub status: String,
    pub bid_count: usize,
    pub elapsed_ms: u128,
}

impl AuctionLog {
    pub fn new(page_view_id: &str, auction_id: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            log_type: "auction_cycle".to_string(),
            page_view_id: page_view_id.to_string(),
            auction_id: auction_id.to_string(),
            calls_made: 0,
            // Assume no fill until a winner is recorded.
            status: "no_fill".to_string(),
            winning_vendor: None,
            winning_cpm: 0.0,
            vendor_calls: Vec::new(),
        }
    }

    pub fn add_call(
        &mut self,
        vendor: &str,
        url: &str,
        status: &str,
        bid_count: usize,
        elapsed_ms: u128,
    ) {
        self.vendor_calls.push(VendorCallLog {
            vendor: vendor.to_string(),
            url: url.to_string(),
            status: status.to_string(),
            bid_count,
            elapsed_ms,
        });
        self.calls_made += 1;
    }

    pub fn set_winner(&mut self, vendor: &str, cpm: f64) {
        self.status = "filled".to_string();
        self.winning_vendor = Some(vendor.to_string());
        self.winning_cpm = cpm;
    }
}
