// src/api/handlers.rs

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::bidding::engine::run_auction_cycle;
use crate::identity::merkle::MerkleId;
use crate::model::bid::{Bid, SyncOptions, UserSync};
use crate::model::request::{BidRequest, BidderRequest};
use crate::AppState;

/// One auction cycle as the host hands it over: the per-vendor bid requests
/// plus the shared auction context.
#[derive(Deserialize)]
pub struct AuctionPayload {
    pub bids: Vec<BidRequest>,
    #[serde(rename = "bidderRequest")]
    pub bidder_request: BidderRequest,
    #[serde(rename = "syncOptions", default)]
    pub sync_options: SyncOptions,
}

#[derive(Serialize)]
pub struct AuctionReply {
    pub bids: Vec<Bid>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<MerkleId>,
    pub syncs: Vec<UserSync>,
}

pub async fn handle_auction(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AuctionPayload>,
) -> (StatusCode, Json<AuctionReply>) {
    let mut session = state.session.lock().await;
    let outcome = run_auction_cycle(
        &state.registry,
        state.merkle.as_deref(),
        &payload.bids,
        &payload.bidder_request,
        &payload.sync_options,
        &state.host,
        &mut session,
        &state.client,
        &state.runtime_logger,
    )
    .await;

    let status = if outcome.bids.is_empty() {
        state
            .runtime_logger
            .log(
                "WARN",
                &format!(
                    r#"{{ "auction_id": "{}", "hb_log": "auction_no_fill" }}"#,
                    payload.bidder_request.auction_id
                ),
            )
            .await;
        // No fill for this cycle.
        StatusCode::NO_CONTENT
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(AuctionReply {
            bids: outcome.bids,
            user_id: outcome.user_id,
            syncs: outcome.syncs,
        }),
    )
}
