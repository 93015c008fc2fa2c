// src/bidding/vendor_client.rs

use std::time::Instant;

use futures::future::join_all;
use reqwest::Client;
use tokio::time::{timeout, Duration};

use crate::model::bid::{HttpMethod, ServerRequest};

/// One outbound call: which adapter described it, and the descriptor itself.
pub struct VendorCall {
    pub code: String,
    pub request: ServerRequest,
}

#[derive(Debug)]
pub enum CallOutcome {
    Body(Vec<u8>),
    TransportError(String),
    Timeout,
}

impl CallOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            CallOutcome::Body(_) => "success",
            CallOutcome::TransportError(_) => "transport_error",
            CallOutcome::Timeout => "timeout",
        }
    }
}

pub struct VendorReply {
    pub code: String,
    pub url: String,
    pub outcome: CallOutcome,
    pub elapsed_ms: u128,
}

/// Executes adapter-built request descriptors. This is the host's transport
/// layer: adapters never see it, they only consume the returned bodies.
pub struct VendorClient {
    client: Client,
}

impl VendorClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Fires all calls concurrently with a shared per-call deadline and
    /// returns whatever came back. Transport failures become outcomes, not
    /// errors.
    pub async fn dispatch(&self, calls: Vec<VendorCall>, timeout_ms: u64) -> Vec<VendorReply> {
        let deadline = Duration::from_millis(timeout_ms);
        let tasks: Vec<_> = calls
            .into_iter()
            .map(|call| {
                let client = self.client.clone();
                tokio::spawn(async move {
                    let start = Instant::now();
                    let builder = match call.request.method {
                        HttpMethod::Get => client.get(&call.request.url),
                        HttpMethod::Post => client
                            .post(&call.request.url)
                            .header("Content-Type", "application/json")
                            .body(call.request.body.clone()),
                    };
                    let outcome = match timeout(deadline, builder.send()).await {
                        Ok(Ok(response)) => match response.bytes().await {
                            Ok(bytes) => CallOutcome::Body(bytes.to_vec()),
                            Err(err) => CallOutcome::TransportError(err.to_string()),
                        },
                        Ok(Err(err)) => CallOutcome::TransportError(err.to_string()),
                        Err(_) => CallOutcome::Timeout,
                    };
                    VendorReply {
                        code: call.code,
                        url: call.request.url,
                        outcome,
                        elapsed_ms: start.elapsed().as_millis(),
                    }
                })
            })
            .collect();

        join_all(tasks)
            .await
            .into_iter()
            .filter_map(|task| task.ok())
            .collect()
    }

    /// Single call, body on success, `None` on any transport failure or
    /// timeout. Used for identity fetches.
    pub async fn fetch_one(&self, request: &ServerRequest, timeout_ms: u64) -> Option<Vec<u8>> {
        let call = VendorCall {
            code: String::new(),
            request: request.clone(),
        };
        let mut replies = self.dispatch(vec![call], timeout_ms).await;
        match replies.pop()?.outcome {
            CallOutcome::Body(body) => Some(body),
            _ => None,
        }
    }
}

impl Default for VendorClient {
    fn default() -> Self {
        Self::new()
    }
}
