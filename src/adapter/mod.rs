// src/adapter/mod.rs

pub mod cwire;

use std::collections::HashMap;
use std::sync::Arc;

use crate::host::HostContext;
use crate::model::bid::{Bid, ServerRequest, SyncOptions, UserSync};
use crate::model::context::SessionContext;
use crate::model::request::{BidRequest, BidderRequest, GdprConsent};

/// One vendor's bid adapter: a pure translator between the host's auction
/// objects and the vendor's proprietary wire format. Implementations never
/// perform I/O; they produce request descriptors and parse bodies the host
/// hands back.
pub trait BidderAdapter: Send + Sync {
    /// Vendor code the host registers and queries this adapter under.
    fn code(&self) -> &'static str;

    /// Whether a bid request carries the vendor-mandated parameters.
    /// Invalid bids are excluded from the batch, never retried.
    fn is_valid(&self, bid: &BidRequest) -> bool;

    /// Turns the validated batch into outbound request descriptors. May
    /// return one batched descriptor, one per bid, or none at all when the
    /// vendor has withdrawn for this page session.
    fn build_requests(
        &self,
        bids: &[BidRequest],
        request: &BidderRequest,
        host: &HostContext,
        session: &mut SessionContext,
    ) -> Vec<ServerRequest>;

    /// Parses a vendor response body into normalized bids, correlated back
    /// to the originating batch. Malformed bodies yield an empty list.
    fn interpret_response(
        &self,
        body: &[u8],
        bids: &[BidRequest],
        host: &HostContext,
        session: &mut SessionContext,
    ) -> Vec<Bid>;

    /// Post-auction user syncs, gated on consent.
    fn user_syncs(
        &self,
        options: &SyncOptions,
        gdpr: Option<&GdprConsent>,
        usp: Option<&str>,
    ) -> Vec<UserSync>;

    fn on_bid_won(&self, _bid: &Bid, _host: &HostContext) {}

    fn on_bidder_error(&self, _error: &str, _host: &HostContext) {}

    fn on_timeout(&self, _bids: &[BidRequest], _host: &HostContext) {}
}

/// Registry the host queries by vendor code.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<&'static str, Arc<dyn BidderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn BidderAdapter>) {
        self.adapters.insert(adapter.code(), adapter);
    }

    pub fn get(&self, code: &str) -> Option<&Arc<dyn BidderAdapter>> {
        self.adapters.get(code)
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn BidderAdapter>> {
        self.adapters.values()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
