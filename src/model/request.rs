// src/model/request.rs

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use simd_json::prelude::*;
use simd_json::OwnedValue;

/// One host-supplied bid request. Owned by the host, read-only to adapters;
/// `params` is the publisher-configured vendor parameter block and stays a
/// free-form JSON map so adapters can apply their own typing rules.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BidRequest {
    pub bidder: String,
    #[serde(rename = "bidId")]
    pub bid_id: String,
    #[serde(rename = "auctionId")]
    pub auction_id: String,
    #[serde(rename = "adUnitCode")]
    pub ad_unit_code: String,
    #[serde(default)]
    pub sizes: Vec<[u32; 2]>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl BidRequest {
    /// Vendor parameter, but only when it is an actual JSON number.
    /// A string `"2"` does not count.
    pub fn numeric_param(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(Value::as_f64)
    }

    pub fn string_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RefererInfo {
    pub page: Option<String>,
    #[serde(rename = "domain")]
    pub domain: Option<String>,
}

/// TCF purpose consents keyed by purpose number ("1" = device storage/access).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PurposeData {
    #[serde(default)]
    pub consents: HashMap<String, bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct VendorData {
    pub purpose: Option<PurposeData>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GdprConsent {
    #[serde(rename = "gdprApplies")]
    pub gdpr_applies: Option<bool>,
    #[serde(rename = "consentString")]
    pub consent_string: Option<String>,
    #[serde(rename = "vendorData")]
    pub vendor_data: Option<VendorData>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GppConsent {
    #[serde(rename = "gppString")]
    pub gpp_string: Option<String>,
    #[serde(rename = "applicableSections", default)]
    pub applicable_sections: Vec<i32>,
}

/// True when GDPR does not apply, or applies and purpose-1 consent was
/// affirmatively given.
pub fn has_purpose1_consent(gdpr: Option<&GdprConsent>) -> bool {
    let Some(gdpr) = gdpr else { return true };
    if gdpr.gdpr_applies != Some(true) {
        return true;
    }
    gdpr.vendor_data
        .as_ref()
        .and_then(|vd| vd.purpose.as_ref())
        .and_then(|p| p.consents.get("1").copied())
        .unwrap_or(false)
}

/// Consent fields as an adapter attaches them to an outbound payload,
/// resolved once per bidder request.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ConsentSnapshot {
    #[serde(rename = "gdprApplies", skip_serializing_if = "Option::is_none")]
    pub gdpr_applies: Option<bool>,
    #[serde(rename = "consentString", skip_serializing_if = "Option::is_none")]
    pub consent_string: Option<String>,
    #[serde(rename = "usPrivacy", skip_serializing_if = "Option::is_none")]
    pub us_privacy: Option<String>,
    #[serde(rename = "gppString", skip_serializing_if = "Option::is_none")]
    pub gpp_string: Option<String>,
    #[serde(rename = "gppSid", default, skip_serializing_if = "Vec::is_empty")]
    pub gpp_sid: Vec<i32>,
}

impl ConsentSnapshot {
    pub fn is_empty(&self) -> bool {
        self.gdpr_applies.is_none()
            && self.consent_string.is_none()
            && self.us_privacy.is_none()
            && self.gpp_string.is_none()
            && self.gpp_sid.is_empty()
    }
}

/// Shared auction-level context handed to every adapter in a cycle.
///
/// `ortb2` is generic auction metadata the host passes through untouched.
/// It is stored as a lazily inspected `OwnedValue` and only walked when the
/// top-level consent objects are missing; the resolved snapshot is cached in
/// a `OnceCell` so repeated payload builds do not re-walk the blob.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BidderRequest {
    #[serde(rename = "auctionId")]
    pub auction_id: String,
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
    #[serde(rename = "refererInfo")]
    pub referer_info: Option<RefererInfo>,
    #[serde(rename = "gdprConsent")]
    pub gdpr_consent: Option<GdprConsent>,
    #[serde(rename = "uspConsent")]
    pub usp_consent: Option<String>,
    #[serde(rename = "gppConsent")]
    pub gpp_consent: Option<GppConsent>,
    pub ortb2: Option<Box<OwnedValue>>,
    #[serde(skip)]
    consent_cache: OnceCell<ConsentSnapshot>,
}

impl BidderRequest {
    pub fn new(auction_id: &str) -> Self {
        Self {
            auction_id: auction_id.to_string(),
            timeout_ms: None,
            referer_info: None,
            gdpr_consent: None,
            usp_consent: None,
            gpp_consent: None,
            ortb2: None,
            consent_cache: OnceCell::new(),
        }
    }

    pub fn page(&self) -> Option<&str> {
        self.referer_info.as_ref().and_then(|r| r.page.as_deref())
    }

    /// Resolved consent, preferring the top-level objects over anything
    /// nested in `ortb2`.
    pub fn consent(&self) -> &ConsentSnapshot {
        self.consent_cache.get_or_init(|| {
            let nested = self.nested_consent();
            ConsentSnapshot {
                gdpr_applies: self
                    .gdpr_consent
                    .as_ref()
                    .and_then(|g| g.gdpr_applies)
                    .or(nested.gdpr_applies),
                consent_string: self
                    .gdpr_consent
                    .as_ref()
                    .and_then(|g| g.consent_string.clone())
                    .or(nested.consent_string),
                us_privacy: self.usp_consent.clone().or(nested.us_privacy),
                gpp_string: self
                    .gpp_consent
                    .as_ref()
                    .and_then(|g| g.gpp_string.clone())
                    .or(nested.gpp_string),
                gpp_sid: self
                    .gpp_consent
                    .as_ref()
                    .map(|g| g.applicable_sections.clone())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(nested.gpp_sid),
            }
        })
    }

    /// Consent signals nested in the ortb2 blob: `regs.ext.gdpr`,
    /// `regs.ext.us_privacy`, `regs.gpp`, `regs.gpp_sid`, `user.ext.consent`.
    fn nested_consent(&self) -> ConsentSnapshot {
        let Some(ortb2) = self.ortb2.as_deref() else {
            return ConsentSnapshot::default();
        };
        let regs = ortb2.get("regs");
        let regs_ext = regs.and_then(|r| r.get("ext"));
        ConsentSnapshot {
            gdpr_applies: regs_ext
                .and_then(|e| e.get("gdpr"))
                .and_then(|v| v.as_u64())
                .map(|v| v == 1),
            consent_string: ortb2
                .get("user")
                .and_then(|u| u.get("ext"))
                .and_then(|e| e.get("consent"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            us_privacy: regs_ext
                .and_then(|e| e.get("us_privacy"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            gpp_string: regs
                .and_then(|r| r.get("gpp"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            gpp_sid: regs
                .and_then(|r| r.get("gpp_sid"))
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_i64()).map(|v| v as i32).collect())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ortb2_blob(json: &str) -> Box<OwnedValue> {
        let mut bytes = json.as_bytes().to_vec();
        Box::new(simd_json::to_owned_value(&mut bytes).unwrap())
    }

    #[test]
    fn numeric_param_rejects_strings() {
        let bid: BidRequest = serde_json::from_value(serde_json::json!({
            "bidder": "cwire",
            "bidId": "b1",
            "auctionId": "a1",
            "adUnitCode": "adunit-code",
            "params": {"domainId": "2", "placementId": 7}
        }))
        .unwrap();
        assert_eq!(bid.numeric_param("domainId"), None);
        assert_eq!(bid.numeric_param("placementId"), Some(7.0));
        assert_eq!(bid.numeric_param("missing"), None);
    }

    #[test]
    fn purpose1_consent_rules() {
        assert!(has_purpose1_consent(None));

        let not_applying = GdprConsent {
            gdpr_applies: Some(false),
            ..Default::default()
        };
        assert!(has_purpose1_consent(Some(&not_applying)));

        let mut consents = HashMap::new();
        consents.insert("1".to_string(), true);
        let granted = GdprConsent {
            gdpr_applies: Some(true),
            consent_string: Some("CP_CONSENT".to_string()),
            vendor_data: Some(VendorData {
                purpose: Some(PurposeData { consents }),
            }),
        };
        assert!(has_purpose1_consent(Some(&granted)));

        let silent = GdprConsent {
            gdpr_applies: Some(true),
            ..Default::default()
        };
        assert!(!has_purpose1_consent(Some(&silent)));
    }

    #[test]
    fn top_level_consent_wins_over_ortb2() {
        let mut request = BidderRequest::new("a1");
        request.gdpr_consent = Some(GdprConsent {
            gdpr_applies: Some(true),
            consent_string: Some("TOP".to_string()),
            vendor_data: None,
        });
        request.ortb2 = Some(ortb2_blob(
            r#"{"regs":{"ext":{"gdpr":0}},"user":{"ext":{"consent":"NESTED"}}}"#,
        ));
        let consent = request.consent();
        assert_eq!(consent.gdpr_applies, Some(true));
        assert_eq!(consent.consent_string.as_deref(), Some("TOP"));
    }

    #[test]
    fn nested_consent_fills_missing_fields() {
        let mut request = BidderRequest::new("a1");
        request.ortb2 = Some(ortb2_blob(
            r#"{"regs":{"gpp":"GPP_STR","gpp_sid":[7,8],"ext":{"gdpr":1,"us_privacy":"1YNN"}},"user":{"ext":{"consent":"NESTED"}}}"#,
        ));
        let consent = request.consent();
        assert_eq!(consent.gdpr_applies, Some(true));
        assert_eq!(consent.consent_string.as_deref(), Some("NESTED"));
        assert_eq!(consent.us_privacy.as_deref(), Some("1YNN"));
        assert_eq!(consent.gpp_string.as_deref(), Some("GPP_STR"));
        assert_eq!(consent.gpp_sid, vec![7, 8]);
    }
}
