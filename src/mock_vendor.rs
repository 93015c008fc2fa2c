// src/mock_vendor.rs

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::Rng;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};
use tracing::info;
use uuid::Uuid;

/// Simulated vendor bid endpoint. Echoes every slot's bid id back as a line
/// item with a randomized price, and issues a cwid when the payload carries
/// none.
async fn handle_vendor_bid(Json(payload): Json<Value>) -> Json<Value> {
    let slot_count = payload["slots"].as_array().map(Vec::len).unwrap_or(0);
    info!(
        page_view_id = payload["pageViewId"].as_str().unwrap_or(""),
        slot_count, "mock vendor received bid payload"
    );

    // Simulated vendor-side latency (10 ~ 80 ms).
    let delay_ms = rand::thread_rng().gen_range(10..80);
    sleep(Duration::from_millis(delay_ms)).await;

    let mut bids = Vec::new();
    if let Some(slots) = payload["slots"].as_array() {
        for slot in slots {
            let Some(bid_id) = slot["bidId"].as_str() else {
                continue;
            };
            let width = slot["sizes"][0][0].as_u64().unwrap_or(300);
            let height = slot["sizes"][0][1].as_u64().unwrap_or(250);
            let floor = slot["params"]["floor"]["floor"].as_f64().unwrap_or(1.0);
            let multiplier = if width == 300 && height == 250 {
                rand::thread_rng().gen_range(1.0..3.0)
            } else if width == 728 && height == 90 {
                rand::thread_rng().gen_range(0.8..1.2)
            } else {
                rand::thread_rng().gen_range(1.0..2.0)
            };

            bids.push(json!({
                "requestId": bid_id,
                "cpm": floor * multiplier,
                "currency": "USD",
                "width": width,
                "height": height,
                "html": format!(
                    "<div id=\"cw-{bid_id}\">mock creative<img src=\"http://vendor-tracker.local/impression?bid={bid_id}\" style=\"display:none;\" /></div>"
                ),
                "creativeId": format!("cr-{bid_id}"),
                "ttl": 300,
                "adomain": ["advertiser.example"],
            }));
        }
    }

    let mut body = json!({ "bids": bids });
    if payload.get("cwid").is_none() {
        body["cwid"] = json!(Uuid::new_v4().to_string());
    }
    // Occasionally cap the page session at a generous cycle count.
    if rand::thread_rng().gen_ratio(1, 10) {
        body["cycleCap"] = json!(50);
    }
    Json(body)
}

/// Simulated identity endpoint: a fresh pam id plus an embedded session
/// cookie value.
async fn handle_identity() -> Json<Value> {
    Json(json!({
        "pam_id": { "id": Uuid::new_v4().to_string(), "keyID": 1 },
        "c": { "value": Uuid::new_v4().to_string() },
    }))
}

/// Beacon sink for BID_WON / BID_ERROR / TIMEOUT events.
async fn handle_event(body: String) -> StatusCode {
    info!(%body, "mock vendor received event beacon");
    StatusCode::NO_CONTENT
}

pub async fn start_mock_vendor_server(port: u16) {
    let app = Router::new()
        .route("/v1/bid", post(handle_vendor_bid))
        .route("/identity", get(handle_identity))
        .route("/v1/event", post(handle_event));

    let addr = format!("0.0.0.0:{}", port);
    info!("Mock vendor running at http://{}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .expect("mock vendor port unavailable");
    axum::serve(listener, app)
        .await
        .expect("mock vendor server failed");
}
