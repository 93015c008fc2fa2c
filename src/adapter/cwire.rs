// src/adapter/cwire.rs

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::adapter::BidderAdapter;
use crate::host::{Floor, HostContext};
use crate::model::bid::{Bid, ServerRequest, SyncKind, SyncOptions, UserSync};
use crate::model::context::SessionContext;
use crate::model::request::{has_purpose1_consent, BidRequest, BidderRequest, GdprConsent};

pub const BID_ENDPOINT: &str = "https://prebid.cwi.re/v1/bid";
pub const EVENT_ENDPOINT: &str = "https://prebid.cwi.re/v1/event";
const SYNC_ENDPOINT: &str = "https://ib.adnxs.com/getuid?https://prebid.cwi.re/v1/cookiesync";

const CWID_KEY: &str = "cw_cwid";
const DEFAULT_TTL_SECONDS: u64 = 300;

/// Whether the vendor gets one batched POST per cycle or one per bid.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    Batched,
    PerBid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CwireConfig {
    #[serde(default = "default_bid_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_event_endpoint")]
    pub event_endpoint: String,
    #[serde(default = "default_request_mode")]
    pub request_mode: RequestMode,
}

fn default_bid_endpoint() -> String {
    BID_ENDPOINT.to_string()
}

fn default_event_endpoint() -> String {
    EVENT_ENDPOINT.to_string()
}

fn default_request_mode() -> RequestMode {
    RequestMode::Batched
}

impl Default for CwireConfig {
    fn default() -> Self {
        Self {
            endpoint: default_bid_endpoint(),
            event_endpoint: default_event_endpoint(),
            request_mode: default_request_mode(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SlotDimensions {
    pub width: f64,
    pub height: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SlotStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CwExt {
    pub dimensions: SlotDimensions,
    pub style: SlotStyle,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct SlotParams {
    #[serde(flatten)]
    pub base: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor: Option<Floor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoplay: Option<bool>,
}

/// One ad slot of the outbound payload. The identifying ids are flattened
/// next to `params` because the vendor endpoint reads them top-level.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Slot {
    pub bid_id: String,
    pub auction_id: String,
    pub ad_unit_code: String,
    #[serde(default)]
    pub sizes: Vec<[u32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_id: Option<f64>,
    pub params: SlotParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cw_ext: Option<CwExt>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct SdkInfo {
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BidPayload {
    pub slots: Vec<Slot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_ref: Option<String>,
    pub page_view_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_bandwidth: Option<String>,
    pub sdk: SdkInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refgroups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwcreative: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    #[serde(default, skip_serializing_if = "crate::model::request::ConsentSnapshot::is_empty")]
    pub consent: crate::model::request::ConsentSnapshot,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CwireBid {
    pub request_id: String,
    pub cpm: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub width: u32,
    pub height: u32,
    /// Creative markup; renamed to `ad` on the host side.
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creative_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adomain: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_revenue: Option<bool>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CwireResponse {
    pub bids: Option<Vec<CwireBid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_cap: Option<u32>,
}

pub struct CwireAdapter {
    config: CwireConfig,
}

impl CwireAdapter {
    pub fn new(config: CwireConfig) -> Self {
        Self { config }
    }

    fn read_cwid(host: &HostContext) -> Option<String> {
        if !host.storage.local_storage_enabled() {
            return None;
        }
        host.storage.get_local(CWID_KEY)
    }

    fn store_cwid(host: &HostContext, cwid: &str) {
        if host.storage.local_storage_enabled() {
            host.storage.set_local(CWID_KEY, cwid);
        } else {
            info!(cwid, "local storage unavailable, cwid not persisted");
        }
    }

    /// Comma-separated page query parameter, e.g. `?cwfeatures=a,b`.
    fn list_param(host: &HostContext, name: &str) -> Vec<String> {
        host.query_param(name)
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn build_slot(&self, bid: &BidRequest, host: &HostContext) -> Slot {
        let cw_ext = host.bounding_rect(&bid.ad_unit_code).map(|rect| {
            debug!(ad_unit = %bid.ad_unit_code, rect.width, rect.height, "slot element found");
            CwExt {
                dimensions: SlotDimensions {
                    width: rect.width,
                    height: rect.height,
                },
                style: SlotStyle {
                    max_width: rect.max_width,
                    max_height: rect.max_height,
                },
            }
        });

        Slot {
            bid_id: bid.bid_id.clone(),
            auction_id: bid.auction_id.clone(),
            ad_unit_code: bid.ad_unit_code.clone(),
            sizes: bid.sizes.clone(),
            page_id: bid.numeric_param("pageId"),
            domain_id: bid.numeric_param("domainId"),
            placement_id: bid.numeric_param("placementId"),
            params: SlotParams {
                base: bid.params.clone(),
                floor: host.floor_for(&bid.ad_unit_code, bid.sizes.first().copied()),
                autoplay: host.autoplay_enabled(),
            },
            cw_ext,
        }
    }

    fn build_payload(
        &self,
        slots: Vec<Slot>,
        request: &BidderRequest,
        host: &HostContext,
        session: &SessionContext,
    ) -> BidPayload {
        // Truthy presence of ?cwdebug enables vendor-side debugging.
        let debug_flag = host
            .query_param("cwdebug")
            .filter(|v| !v.is_empty())
            .map(|_| true);

        BidPayload {
            slots,
            http_ref: request.page().map(str::to_string),
            page_view_id: session.page_view_id().to_string(),
            network_bandwidth: host
                .downlink_mbps()
                .filter(|d| *d >= 0.0)
                .map(|d| d.to_string()),
            sdk: SdkInfo {
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            cwid: Self::read_cwid(host),
            refgroups: Self::list_param(host, "cwgroups"),
            feature_flags: Self::list_param(host, "cwfeatures"),
            cwcreative: host.query_param("cwcreative"),
            debug: debug_flag,
            consent: request.consent().clone(),
        }
    }

    fn event(&self, host: &HostContext, event: Value) {
        match serde_json::to_string(&event) {
            Ok(body) => host.beacon.send(&self.config.event_endpoint, body),
            Err(err) => debug!(%err, "event not serializable"),
        }
    }
}

impl BidderAdapter for CwireAdapter {
    fn code(&self) -> &'static str {
        "cwire"
    }

    /// A bid is addressable either by a numeric `domainId` alone or by the
    /// numeric `placementId`/`pageId` pair.
    fn is_valid(&self, bid: &BidRequest) -> bool {
        if bid.numeric_param("domainId").is_some() {
            return true;
        }
        if bid.numeric_param("placementId").is_none() {
            error!(bid_id = %bid.bid_id, "placementId not provided or not a number");
            return false;
        }
        if bid.numeric_param("pageId").is_none() {
            error!(bid_id = %bid.bid_id, "pageId not provided or not a number");
            return false;
        }
        true
    }

    fn build_requests(
        &self,
        bids: &[BidRequest],
        request: &BidderRequest,
        host: &HostContext,
        session: &mut SessionContext,
    ) -> Vec<ServerRequest> {
        if bids.is_empty() {
            return Vec::new();
        }
        if !session.begin_cycle() {
            info!(
                cycles = session.cycles_started(),
                "cycle cap reached, withdrawing from bidding for this page view"
            );
            return Vec::new();
        }

        let slots: Vec<Slot> = bids.iter().map(|bid| self.build_slot(bid, host)).collect();

        let payloads = match self.config.request_mode {
            RequestMode::Batched => vec![self.build_payload(slots, request, host, session)],
            RequestMode::PerBid => slots
                .into_iter()
                .map(|slot| self.build_payload(vec![slot], request, host, session))
                .collect(),
        };

        payloads
            .into_iter()
            .filter_map(|payload| match serde_json::to_string(&payload) {
                Ok(body) => Some(ServerRequest::post(&self.config.endpoint, body)),
                Err(err) => {
                    error!(%err, "payload serialization failed, request dropped");
                    None
                }
            })
            .collect()
    }

    fn interpret_response(
        &self,
        body: &[u8],
        bids: &[BidRequest],
        host: &HostContext,
        session: &mut SessionContext,
    ) -> Vec<Bid> {
        let mut buf = body.to_vec();
        let response: CwireResponse = match simd_json::serde::from_slice(&mut buf) {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "malformed vendor response, no bids this cycle");
                return Vec::new();
            }
        };

        if let Some(cap) = response.cycle_cap {
            session.record_cycle_cap(cap);
        }

        if Self::read_cwid(host).is_none() {
            if let Some(cwid) = response.cwid.as_deref() {
                Self::store_cwid(host, cwid);
            }
        }

        let Some(line_items) = response.bids else {
            return Vec::new();
        };

        line_items
            .into_iter()
            .filter_map(|item| {
                if !bids.iter().any(|bid| bid.bid_id == item.request_id) {
                    debug!(request_id = %item.request_id, "unmatched line item dropped");
                    return None;
                }
                Some(Bid {
                    request_id: item.request_id,
                    cpm: item.cpm,
                    currency: item.currency,
                    width: item.width,
                    height: item.height,
                    ad: item.html,
                    creative_id: item.creative_id,
                    ttl_seconds: item.ttl.unwrap_or(DEFAULT_TTL_SECONDS),
                    net_revenue: item.net_revenue.unwrap_or(true),
                    deal_id: item.deal_id,
                    advertiser_domains: item.adomain,
                })
            })
            .collect()
    }

    fn user_syncs(
        &self,
        options: &SyncOptions,
        gdpr: Option<&GdprConsent>,
        _usp: Option<&str>,
    ) -> Vec<UserSync> {
        let mut syncs = Vec::new();
        let Some(gdpr) = gdpr else { return syncs };
        let Some(consent_string) = gdpr.consent_string.as_deref().filter(|s| !s.is_empty()) else {
            return syncs;
        };
        if !has_purpose1_consent(Some(gdpr)) {
            return syncs;
        }

        let kind = if options.pixel_enabled {
            Some(SyncKind::Image)
        } else if options.iframe_enabled {
            Some(SyncKind::Iframe)
        } else {
            None
        };
        if let Some(kind) = kind {
            let gdpr_flag = u8::from(gdpr.gdpr_applies == Some(true));
            syncs.push(UserSync {
                kind,
                url: format!(
                    "{SYNC_ENDPOINT}?xandrId=$UID&gdpr={gdpr_flag}&gdpr_consent={consent_string}"
                ),
            });
        }
        syncs
    }

    fn on_bid_won(&self, bid: &Bid, host: &HostContext) {
        info!(request_id = %bid.request_id, cpm = bid.cpm, "bid won");
        self.event(host, json!({ "type": "BID_WON", "payload": { "bid": bid } }));
    }

    fn on_bidder_error(&self, error: &str, host: &HostContext) {
        info!(error, "bidder error");
        self.event(host, json!({ "type": "BID_ERROR", "payload": { "error": error } }));
    }

    fn on_timeout(&self, bids: &[BidRequest], host: &HostContext) {
        let bid_ids: Vec<&str> = bids.iter().map(|b| b.bid_id.as_str()).collect();
        self.event(host, json!({ "type": "TIMEOUT", "payload": { "bidIds": bid_ids } }));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::host::{
        FixedDevice, FloorResolver, MemoryStorage, NullBeacon, SlotGeometry, SlotRect, StaticPage,
    };
    use crate::model::request::{PurposeData, VendorData};

    fn bid(bid_id: &str, ad_unit_code: &str, params: Value) -> BidRequest {
        serde_json::from_value(serde_json::json!({
            "bidder": "cwire",
            "bidId": bid_id,
            "auctionId": "auction-1",
            "adUnitCode": ad_unit_code,
            "sizes": [[300, 250]],
            "params": params,
        }))
        .unwrap()
    }

    fn host() -> HostContext {
        HostContext::new(Arc::new(MemoryStorage::new()), Arc::new(NullBeacon))
    }

    fn adapter() -> CwireAdapter {
        CwireAdapter::new(CwireConfig::default())
    }

    fn parse_payload(request: &ServerRequest) -> Value {
        serde_json::from_str(&request.body).unwrap()
    }

    struct FixedFloor(f64);

    impl FloorResolver for FixedFloor {
        fn floor_for(&self, _ad_unit_code: &str, _size: Option<[u32; 2]>) -> Option<Floor> {
            Some(Floor {
                floor: self.0,
                currency: "USD".to_string(),
            })
        }
    }

    struct FixedRect;

    impl SlotGeometry for FixedRect {
        fn bounding_rect(&self, _ad_unit_code: &str) -> Option<SlotRect> {
            Some(SlotRect {
                width: 320.0,
                height: 280.0,
                max_width: Some("320px".to_string()),
                max_height: None,
            })
        }
    }

    fn gdpr_with_purpose1(consent_string: &str) -> GdprConsent {
        let mut consents = HashMap::new();
        consents.insert("1".to_string(), true);
        GdprConsent {
            gdpr_applies: Some(true),
            consent_string: Some(consent_string.to_string()),
            vendor_data: Some(VendorData {
                purpose: Some(PurposeData { consents }),
            }),
        }
    }

    #[test]
    fn domain_id_alone_is_valid() {
        let a = adapter();
        assert!(a.is_valid(&bid("b1", "adunit-code", serde_json::json!({"domainId": 1}))));
    }

    #[test]
    fn placement_and_page_pair_is_valid() {
        let a = adapter();
        assert!(a.is_valid(&bid(
            "b1",
            "adunit-code",
            serde_json::json!({"placementId": 4, "pageId": 9})
        )));
        assert!(!a.is_valid(&bid("b1", "adunit-code", serde_json::json!({"pageId": 9}))));
        assert!(!a.is_valid(&bid("b1", "adunit-code", serde_json::json!({"placementId": 4}))));
    }

    #[test]
    fn non_numeric_ids_are_invalid() {
        let a = adapter();
        assert!(!a.is_valid(&bid("b1", "adunit-code", serde_json::json!({"domainId": "1"}))));
        assert!(!a.is_valid(&bid(
            "b1",
            "adunit-code",
            serde_json::json!({"placementId": "4", "pageId": 9})
        )));
        assert!(!a.is_valid(&bid("b1", "adunit-code", serde_json::json!({}))));
    }

    #[test]
    fn batched_build_emits_one_slot_per_bid() {
        let a = adapter();
        let bids = vec![
            bid("b1", "adunit-1", serde_json::json!({"domainId": 1})),
            bid("b2", "adunit-2", serde_json::json!({"placementId": 4, "pageId": 9})),
        ];
        let mut session = SessionContext::new();
        let requests = a.build_requests(&bids, &BidderRequest::new("auction-1"), &host(), &mut session);
        assert_eq!(requests.len(), 1);

        let payload = parse_payload(&requests[0]);
        let slots = payload["slots"].as_array().unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0]["adUnitCode"], "adunit-1");
        assert_eq!(slots[1]["adUnitCode"], "adunit-2");
        assert_eq!(slots[1]["placementId"], 4.0);
        assert_eq!(slots[1]["pageId"], 9.0);
        assert_eq!(payload["pageViewId"], session.page_view_id());
    }

    #[test]
    fn per_bid_mode_emits_one_request_per_bid() {
        let a = CwireAdapter::new(CwireConfig {
            request_mode: RequestMode::PerBid,
            ..Default::default()
        });
        let bids = vec![
            bid("b1", "adunit-1", serde_json::json!({"domainId": 1})),
            bid("b2", "adunit-2", serde_json::json!({"domainId": 1})),
        ];
        let requests = a.build_requests(
            &bids,
            &BidderRequest::new("auction-1"),
            &host(),
            &mut SessionContext::new(),
        );
        assert_eq!(requests.len(), 2);
        for (request, expected) in requests.iter().zip(["b1", "b2"]) {
            let payload = parse_payload(request);
            let slots = payload["slots"].as_array().unwrap();
            assert_eq!(slots.len(), 1);
            assert_eq!(slots[0]["bidId"], expected);
        }
    }

    // Slot with only a siteId-style param and no floor capability: sizes and
    // ad-unit code pass through, no floor field appears.
    #[test]
    fn missing_floor_capability_omits_floor_field() {
        let a = adapter();
        let bids = vec![bid("b1", "adunit-code", serde_json::json!({"siteId": 2}))];
        let requests = a.build_requests(
            &bids,
            &BidderRequest::new("auction-1"),
            &host(),
            &mut SessionContext::new(),
        );
        let payload = parse_payload(&requests[0]);
        let slot = &payload["slots"][0];
        assert_eq!(slot["sizes"], serde_json::json!([[300, 250]]));
        assert_eq!(slot["adUnitCode"], "adunit-code");
        assert!(slot["params"].get("floor").is_none());
        assert!(slot.get("cwExt").is_none());
    }

    #[test]
    fn floor_and_geometry_capabilities_enrich_the_slot() {
        let a = adapter();
        let mut host = host();
        host.floors = Some(Arc::new(FixedFloor(1.25)));
        host.geometry = Some(Arc::new(FixedRect));
        host.device = Some(Arc::new(FixedDevice {
            autoplay: Some(true),
            downlink: Some(9.6),
        }));

        let bids = vec![bid("b1", "adunit-code", serde_json::json!({"domainId": 1}))];
        let requests = a.build_requests(
            &bids,
            &BidderRequest::new("auction-1"),
            &host,
            &mut SessionContext::new(),
        );
        let payload = parse_payload(&requests[0]);
        let slot = &payload["slots"][0];
        assert_eq!(slot["params"]["floor"]["floor"], 1.25);
        assert_eq!(slot["params"]["autoplay"], true);
        assert_eq!(slot["cwExt"]["dimensions"]["width"], 320.0);
        assert_eq!(slot["cwExt"]["style"]["maxWidth"], "320px");
        assert_eq!(payload["networkBandwidth"], "9.6");
    }

    #[test]
    fn page_params_and_cached_cwid_land_in_the_extension() {
        let a = adapter();
        let mut host = host();
        host.storage.set_local(CWID_KEY, "cw-123");
        host.page = Some(Arc::new(
            StaticPage::new(Some("example.com"))
                .with_param("cwgroups", "g1,g2")
                .with_param("cwfeatures", "ff1")
                .with_param("cwcreative", "creative-9")
                .with_param("cwdebug", "true"),
        ));

        let bids = vec![bid("b1", "adunit-code", serde_json::json!({"domainId": 1}))];
        let requests = a.build_requests(
            &bids,
            &BidderRequest::new("auction-1"),
            &host,
            &mut SessionContext::new(),
        );
        let payload = parse_payload(&requests[0]);
        assert_eq!(payload["cwid"], "cw-123");
        assert_eq!(payload["refgroups"], serde_json::json!(["g1", "g2"]));
        assert_eq!(payload["featureFlags"], serde_json::json!(["ff1"]));
        assert_eq!(payload["cwcreative"], "creative-9");
        assert_eq!(payload["debug"], true);
    }

    #[test]
    fn top_level_consent_is_attached_verbatim() {
        let a = adapter();
        let mut request = BidderRequest::new("auction-1");
        request.gdpr_consent = Some(gdpr_with_purpose1("CP_STRING"));
        request.usp_consent = Some("1YNN".to_string());
        request.referer_info = Some(crate::model::request::RefererInfo {
            page: Some("https://example.com/article".to_string()),
            domain: Some("example.com".to_string()),
        });

        let bids = vec![bid("b1", "adunit-code", serde_json::json!({"domainId": 1}))];
        let requests = a.build_requests(&bids, &request, &host(), &mut SessionContext::new());
        let payload = parse_payload(&requests[0]);
        assert_eq!(payload["consent"]["gdprApplies"], true);
        assert_eq!(payload["consent"]["consentString"], "CP_STRING");
        assert_eq!(payload["consent"]["usPrivacy"], "1YNN");
        assert_eq!(payload["httpRef"], "https://example.com/article");
    }

    #[test]
    fn matched_line_item_round_trips() {
        let a = adapter();
        let bids = vec![
            bid("b1", "adunit-1", serde_json::json!({"domainId": 1})),
            bid("b2", "adunit-2", serde_json::json!({"domainId": 1})),
        ];
        let body = serde_json::json!({
            "bids": [
                {"requestId": "b1", "cpm": 2.5, "width": 300, "height": 250,
                 "html": "<div>ad</div>", "creativeId": "cr-1", "ttl": 120,
                 "adomain": ["brand.example"]},
                {"requestId": "unknown", "cpm": 9.0, "width": 728, "height": 90,
                 "html": "<div>stray</div>"}
            ]
        })
        .to_string();

        let out = a.interpret_response(
            body.as_bytes(),
            &bids,
            &host(),
            &mut SessionContext::new(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].request_id, "b1");
        assert_eq!(out[0].ad, "<div>ad</div>");
        assert_eq!(out[0].ttl_seconds, 120);
        assert_eq!(out[0].advertiser_domains, vec!["brand.example"]);
    }

    #[test]
    fn malformed_body_yields_no_bids() {
        let a = adapter();
        let bids = vec![bid("b1", "adunit-1", serde_json::json!({"domainId": 1}))];
        let mut session = SessionContext::new();
        assert!(a
            .interpret_response(b"not json", &bids, &host(), &mut session)
            .is_empty());
        assert!(a
            .interpret_response(b"{\"unrelated\":true}", &bids, &host(), &mut session)
            .is_empty());
    }

    #[test]
    fn cwid_is_persisted_only_when_absent() {
        let a = adapter();
        let host = host();
        let bids = vec![bid("b1", "adunit-1", serde_json::json!({"domainId": 1}))];
        let mut session = SessionContext::new();

        let body = serde_json::json!({"bids": [], "cwid": "fresh"}).to_string();
        a.interpret_response(body.as_bytes(), &bids, &host, &mut session);
        assert_eq!(host.storage.get_local(CWID_KEY).as_deref(), Some("fresh"));

        let body = serde_json::json!({"bids": [], "cwid": "other"}).to_string();
        a.interpret_response(body.as_bytes(), &bids, &host, &mut session);
        assert_eq!(host.storage.get_local(CWID_KEY).as_deref(), Some("fresh"));
    }

    #[test]
    fn vendor_cycle_cap_withdraws_further_requests() {
        let a = adapter();
        let host = host();
        let request = BidderRequest::new("auction-1");
        let bids = vec![bid("b1", "adunit-1", serde_json::json!({"domainId": 1}))];
        let mut session = SessionContext::new();

        assert_eq!(a.build_requests(&bids, &request, &host, &mut session).len(), 1);

        let body = serde_json::json!({"bids": [], "cycleCap": 2}).to_string();
        a.interpret_response(body.as_bytes(), &bids, &host, &mut session);

        // Second cycle still runs, then the cap bites.
        assert_eq!(a.build_requests(&bids, &request, &host, &mut session).len(), 1);
        assert!(a.build_requests(&bids, &request, &host, &mut session).is_empty());
        assert!(a.build_requests(&bids, &request, &host, &mut session).is_empty());

        session.reset();
        assert_eq!(a.build_requests(&bids, &request, &host, &mut session).len(), 1);
    }

    #[test]
    fn syncs_require_purpose1_consent_and_string() {
        let a = adapter();
        let opts = SyncOptions {
            pixel_enabled: true,
            iframe_enabled: true,
        };

        assert!(a.user_syncs(&opts, None, None).is_empty());

        let silent = GdprConsent {
            gdpr_applies: Some(true),
            consent_string: Some("CP_STRING".to_string()),
            vendor_data: None,
        };
        assert!(a.user_syncs(&opts, Some(&silent), None).is_empty());

        let granted = gdpr_with_purpose1("CP_STRING");
        let syncs = a.user_syncs(&opts, Some(&granted), None);
        assert_eq!(syncs.len(), 1);
        assert_eq!(syncs[0].kind, SyncKind::Image);
        assert!(syncs[0].url.contains("gdpr=1"));
        assert!(syncs[0].url.contains("gdpr_consent=CP_STRING"));
    }

    #[test]
    fn iframe_sync_only_when_pixel_disabled() {
        let a = adapter();
        let granted = gdpr_with_purpose1("CP_STRING");

        let iframe_only = SyncOptions {
            pixel_enabled: false,
            iframe_enabled: true,
        };
        let syncs = a.user_syncs(&iframe_only, Some(&granted), None);
        assert_eq!(syncs[0].kind, SyncKind::Iframe);

        let neither = SyncOptions::default();
        assert!(a.user_syncs(&neither, Some(&granted), None).is_empty());
    }

    #[test]
    fn syncs_are_idempotent() {
        let a = adapter();
        let opts = SyncOptions {
            pixel_enabled: true,
            iframe_enabled: false,
        };
        let granted = gdpr_with_purpose1("CP_STRING");
        let first = a.user_syncs(&opts, Some(&granted), None);
        let second = a.user_syncs(&opts, Some(&granted), None);
        assert_eq!(first, second);
    }

    fn arb_valid_bid() -> impl Strategy<Value = BidRequest> {
        (
            "[a-z0-9]{4,12}",
            "[a-z\\-]{4,16}",
            1u32..10_000,
            prop::collection::vec((1u32..2000, 1u32..2000), 1..4),
        )
            .prop_map(|(bid_id, ad_unit, domain_id, sizes)| {
                let mut bid = bid(
                    &bid_id,
                    &ad_unit,
                    serde_json::json!({ "domainId": domain_id }),
                );
                bid.sizes = sizes.into_iter().map(|(w, h)| [w, h]).collect();
                bid
            })
    }

    proptest! {
        // Every valid input bid appears exactly once in the batched payload,
        // traceable by its ad-unit code and bid id.
        #[test]
        fn payload_traces_every_valid_bid(bids in prop::collection::vec(arb_valid_bid(), 1..8)) {
            let a = adapter();
            let requests = a.build_requests(
                &bids,
                &BidderRequest::new("auction-1"),
                &host(),
                &mut SessionContext::new(),
            );
            prop_assert_eq!(requests.len(), 1);
            let payload = parse_payload(&requests[0]);
            let slots = payload["slots"].as_array().unwrap();
            prop_assert_eq!(slots.len(), bids.len());
            for (slot, bid) in slots.iter().zip(&bids) {
                prop_assert_eq!(slot["bidId"].as_str().unwrap(), bid.bid_id.as_str());
                prop_assert_eq!(slot["adUnitCode"].as_str().unwrap(), bid.ad_unit_code.as_str());
            }
        }
    }
}
