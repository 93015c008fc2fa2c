// src/bidding/engine.rs

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::adapter::AdapterRegistry;
use crate::bidding::vendor_client::{CallOutcome, VendorCall, VendorClient};
use crate::host::HostContext;
use crate::identity::merkle::{IdDirective, MerkleId, MerkleIdSystem};
use crate::logging::auction_log::AuctionLog;
use crate::logging::runtime_logger::RuntimeLogger;
use crate::model::bid::{Bid, SyncOptions, UserSync};
use crate::model::context::SessionContext;
use crate::model::request::{BidRequest, BidderRequest};

const DEFAULT_TIMEOUT_MS: u64 = 250;
const IDENTITY_TIMEOUT_MS: u64 = 1000;

pub struct AuctionOutcome {
    pub bids: Vec<Bid>,
    pub user_id: Option<MerkleId>,
    pub syncs: Vec<UserSync>,
}

/// One host-orchestrated auction cycle: identity maintenance, then per
/// registered adapter validate -> build -> dispatch -> interpret, then the
/// bid-won notification and the user-sync collection.
pub async fn run_auction_cycle(
    registry: &AdapterRegistry,
    identity: Option<&MerkleIdSystem>,
    bids: &[BidRequest],
    bidder_request: &BidderRequest,
    sync_options: &SyncOptions,
    host: &HostContext,
    session: &mut SessionContext,
    client: &VendorClient,
    logger: &Arc<RuntimeLogger>,
) -> AuctionOutcome {
    let user_id = match identity {
        Some(system) => maintain_identity(system, bidder_request, host, client).await,
        None => None,
    };

    let timeout_ms = bidder_request.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
    let mut cycle_log = AuctionLog::new(session.page_view_id(), &bidder_request.auction_id);
    let mut collected: Vec<(String, Bid)> = Vec::new();

    for adapter in registry.adapters() {
        let offered = bids.iter().filter(|bid| bid.bidder == adapter.code());
        let batch: Vec<BidRequest> = offered
            .filter(|bid| {
                let valid = adapter.is_valid(bid);
                if !valid {
                    debug!(vendor = adapter.code(), bid_id = %bid.bid_id, "invalid bid excluded");
                }
                valid
            })
            .cloned()
            .collect();
        if batch.is_empty() {
            continue;
        }

        let requests = adapter.build_requests(&batch, bidder_request, host, session);
        if requests.is_empty() {
            info!(vendor = adapter.code(), "adapter produced no request this cycle");
            continue;
        }

        let calls: Vec<VendorCall> = requests
            .into_iter()
            .map(|request| VendorCall {
                code: adapter.code().to_string(),
                request,
            })
            .collect();

        for reply in client.dispatch(calls, timeout_ms).await {
            let status = reply.outcome.status();
            match reply.outcome {
                CallOutcome::Body(body) => {
                    let vendor_bids = adapter.interpret_response(&body, &batch, host, session);
                    cycle_log.add_call(&reply.code, &reply.url, status, vendor_bids.len(), reply.elapsed_ms);
                    collected.extend(
                        vendor_bids
                            .into_iter()
                            .map(|bid| (adapter.code().to_string(), bid)),
                    );
                }
                CallOutcome::Timeout => {
                    adapter.on_timeout(&batch, host);
                    cycle_log.add_call(&reply.code, &reply.url, status, 0, reply.elapsed_ms);
                }
                CallOutcome::TransportError(err) => {
                    adapter.on_bidder_error(&err, host);
                    cycle_log.add_call(&reply.code, &reply.url, status, 0, reply.elapsed_ms);
                }
            }
        }
    }

    // Highest-cpm bid wins the cycle; notify its adapter.
    let winner = collected
        .iter()
        .max_by(|a, b| a.1.cpm.partial_cmp(&b.1.cpm).unwrap_or(Ordering::Equal));
    if let Some((code, bid)) = winner {
        cycle_log.set_winner(code, bid.cpm);
        if let Some(adapter) = registry.get(code) {
            adapter.on_bid_won(bid, host);
        }
    }

    match serde_json::to_string(&cycle_log) {
        Ok(line) => logger.log("INFO", &line).await,
        Err(err) => debug!(%err, "cycle log not serializable"),
    }

    let mut syncs = Vec::new();
    for adapter in registry.adapters() {
        syncs.extend(adapter.user_syncs(
            sync_options,
            bidder_request.gdpr_consent.as_ref(),
            bidder_request.usp_consent.as_deref(),
        ));
    }

    AuctionOutcome {
        bids: collected.into_iter().map(|(_, bid)| bid).collect(),
        user_id,
        syncs,
    }
}

/// Reads the cached identity record and refreshes it through the vendor
/// endpoint when the submodule asks for it. Every failure path degrades to
/// "no identity this cycle".
async fn maintain_identity(
    system: &MerkleIdSystem,
    bidder_request: &BidderRequest,
    host: &HostContext,
    client: &VendorClient,
) -> Option<MerkleId> {
    let consent = bidder_request.gdpr_consent.as_ref();
    let page = host.page.as_deref();
    let storage = &*host.storage;

    let directive = match system.read(storage) {
        Some(stored) => system.extend_id(consent, page, storage, stored, Utc::now())?,
        None => system.get_id(consent, page, storage)?,
    };

    let record = match directive {
        IdDirective::Cached(record) => record,
        IdDirective::Fetch(request) => {
            let body = client.fetch_one(&request, IDENTITY_TIMEOUT_MS).await?;
            system.handle_response(&body, storage, Utc::now())?
        }
    };
    MerkleIdSystem::decode(&record)
}
