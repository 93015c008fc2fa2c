// src/identity/merkle.rs
//
// merkleId user-identity submodule: keeps a vendor-issued identity record in
// local storage and refreshes it over a vendor endpoint once it ages past a
// TTL. The host owns the actual HTTP call; this module only produces the
// fetch descriptor and digests the response body.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::host::{HostStorage, PageInfo};
use crate::model::bid::ServerRequest;
use crate::model::request::GdprConsent;

pub const MODULE_NAME: &str = "merkleId";
pub const ID_ENDPOINT: &str = "https://id2.sv.rkdms.com/identity/";
pub const DEFAULT_REFRESH_SECONDS: u64 = 7 * 3600;
const SESSION_COOKIE_NAME: &str = "_svsid";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MerkleParams {
    pub vendor: Option<String>,
    pub sv_cid: Option<String>,
    pub sv_pubid: Option<String>,
    pub sv_domain: Option<String>,
    pub sv_session: Option<String>,
    #[serde(rename = "refreshInSeconds")]
    pub refresh_in_seconds: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MerkleStorage {
    /// Local-storage key the record lives under.
    #[serde(default = "default_storage_name")]
    pub name: String,
    /// When set together with `params.refreshInSeconds`, refresh authority
    /// stays with the host's own TTL bookkeeping.
    #[serde(rename = "refreshInSeconds")]
    pub refresh_in_seconds: Option<u64>,
    /// Session-cookie lifetime in minutes.
    #[serde(rename = "expires", default = "default_expires_minutes")]
    pub expires_minutes: i64,
}

fn default_storage_name() -> String {
    MODULE_NAME.to_string()
}

fn default_expires_minutes() -> i64 {
    30 * 24 * 60
}

impl Default for MerkleStorage {
    fn default() -> Self {
        Self {
            name: default_storage_name(),
            refresh_in_seconds: None,
            expires_minutes: default_expires_minutes(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MerkleConfig {
    #[serde(default = "default_id_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub params: MerkleParams,
    #[serde(default)]
    pub storage: MerkleStorage,
}

fn default_id_endpoint() -> String {
    ID_ENDPOINT.to_string()
}

impl Default for MerkleConfig {
    fn default() -> Self {
        Self {
            endpoint: default_id_endpoint(),
            params: MerkleParams::default(),
            storage: MerkleStorage::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PamId {
    pub id: String,
    #[serde(rename = "keyID", skip_serializing_if = "Option::is_none")]
    pub key_id: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionToken {
    pub value: String,
}

/// The persisted identity record: vendor id, optional embedded session
/// cookie payload, and the RFC3339 issue date stamped at fetch time.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct IdentityRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pam_id: Option<PamId>,
    #[serde(rename = "c", skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl IdentityRecord {
    pub fn issue_date(&self) -> Option<DateTime<Utc>> {
        let raw = self.date.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }
}

/// Decoded value handed to bid requests.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MerkleId {
    #[serde(rename = "merkleId")]
    pub merkle_id: String,
}

/// What the host should do for this identity cycle: reuse the cached record
/// or perform the described fetch and feed the body to `handle_response`.
#[derive(Debug, Clone)]
pub enum IdDirective {
    Cached(IdentityRecord),
    Fetch(ServerRequest),
}

pub struct MerkleIdSystem {
    config: MerkleConfig,
}

impl MerkleIdSystem {
    pub fn new(config: MerkleConfig) -> Self {
        Self { config }
    }

    pub fn name(&self) -> &'static str {
        MODULE_NAME
    }

    fn storage_key(&self) -> &str {
        &self.config.storage.name
    }

    /// Cached record from local storage, if present and parseable.
    pub fn read(&self, storage: &dyn HostStorage) -> Option<IdentityRecord> {
        if !storage.local_storage_enabled() {
            return None;
        }
        let raw = storage.get_local(self.storage_key())?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(%err, "stored identity record unreadable, treated as absent");
                None
            }
        }
    }

    fn write(&self, storage: &dyn HostStorage, record: &IdentityRecord) {
        match serde_json::to_string(record) {
            Ok(raw) => storage.set_local(self.storage_key(), &raw),
            Err(err) => warn!(%err, "identity record not serializable"),
        }
    }

    /// True iff the record has aged past the TTL. Records without a usable
    /// issue date are never refreshed on age alone.
    pub fn refresh_needed(record: &IdentityRecord, ttl_seconds: u64, now: DateTime<Utc>) -> bool {
        match record.issue_date() {
            Some(issued) => now - issued > Duration::seconds(ttl_seconds as i64),
            None => false,
        }
    }

    /// Prior session token: explicit config param, else the session cookie.
    fn session(&self, storage: &dyn HostStorage) -> Option<String> {
        self.config
            .params
            .sv_session
            .clone()
            .or_else(|| storage.get_cookie(SESSION_COOKIE_NAME))
    }

    fn fetch_request(
        &self,
        page: Option<&dyn PageInfo>,
        storage: &dyn HostStorage,
    ) -> Option<ServerRequest> {
        let params = &self.config.params;
        let vendor = params.vendor.as_deref()?;
        let sv_cid = params.sv_cid.as_deref()?;
        let sv_pubid = params.sv_pubid.as_deref()?;
        let sv_domain = params
            .sv_domain
            .clone()
            .or_else(|| page.and_then(PageInfo::root_domain))
            .unwrap_or_default();

        let mut url = format!(
            "{}?vendor={vendor}&sv_cid={sv_cid}&sv_domain={sv_domain}&sv_pubid={sv_pubid}",
            self.config.endpoint
        );
        if let Some(session) = self.session(storage) {
            url.push_str("&sv_session=");
            url.push_str(&session);
        }
        info!(%url, "merkleId fetch url");
        Some(ServerRequest::get(url))
    }

    fn gdpr_blocks(consent: Option<&GdprConsent>) -> bool {
        if consent.map_or(false, |c| c.gdpr_applies == Some(true)) {
            error!("merkleId submodule does not currently handle consent strings");
            return true;
        }
        false
    }

    /// First-time id acquisition. Returns a fetch directive, or `None` when
    /// config is incomplete or GDPR applies.
    pub fn get_id(
        &self,
        consent: Option<&GdprConsent>,
        page: Option<&dyn PageInfo>,
        storage: &dyn HostStorage,
    ) -> Option<IdDirective> {
        let params = &self.config.params;
        if params.vendor.as_deref().is_none() {
            error!("merkleId submodule requires a valid vendor to be defined");
            return None;
        }
        if params.sv_cid.as_deref().is_none() {
            error!("merkleId submodule requires a valid sv_cid string to be defined");
            return None;
        }
        if params.sv_pubid.as_deref().is_none() {
            error!("merkleId submodule requires a valid sv_pubid string to be defined");
            return None;
        }
        if Self::gdpr_blocks(consent) {
            return None;
        }
        Some(IdDirective::Fetch(self.fetch_request(page, storage)?))
    }

    /// Decides whether a stored record is still good. Defers entirely to the
    /// host's TTL bookkeeping when both config layers carry an explicit
    /// `refreshInSeconds`; otherwise refreshes once the record has aged past
    /// the TTL.
    pub fn extend_id(
        &self,
        consent: Option<&GdprConsent>,
        page: Option<&dyn PageInfo>,
        storage: &dyn HostStorage,
        stored: IdentityRecord,
        now: DateTime<Utc>,
    ) -> Option<IdDirective> {
        if Self::gdpr_blocks(consent) {
            return None;
        }
        if self.config.storage.refresh_in_seconds.is_some()
            && self.config.params.refresh_in_seconds.is_some()
        {
            return Some(IdDirective::Cached(stored));
        }

        let ttl = self
            .config
            .params
            .refresh_in_seconds
            .unwrap_or(DEFAULT_REFRESH_SECONDS);
        if Self::refresh_needed(&stored, ttl, now) {
            info!("merkleId needs refreshing");
            return Some(IdDirective::Fetch(self.fetch_request(page, storage)?));
        }
        Some(IdDirective::Cached(stored))
    }

    /// Digests a fetched identity body: stamps the issue date, persists the
    /// embedded session cookie and the record itself. Transport or parse
    /// failures mean "no identity this cycle", never a fatal condition.
    pub fn handle_response(
        &self,
        body: &[u8],
        storage: &dyn HostStorage,
        now: DateTime<Utc>,
    ) -> Option<IdentityRecord> {
        let mut record: IdentityRecord = match serde_json::from_slice(body) {
            Ok(record) => record,
            Err(err) => {
                error!(%err, "merkleId fetch returned an unreadable body");
                return None;
            }
        };

        if let Some(token) = record.session.as_ref().filter(|t| !t.value.is_empty()) {
            info!("merkleId setting session");
            let expires = now + Duration::minutes(self.config.storage.expires_minutes);
            storage.set_cookie(SESSION_COOKIE_NAME, &token.value, expires);
        }

        record.date = Some(now.to_rfc3339());
        self.write(storage, &record);
        Some(record)
    }

    /// Exposes the stored id for bid requests.
    pub fn decode(record: &IdentityRecord) -> Option<MerkleId> {
        record.pam_id.as_ref().map(|pam| MerkleId {
            merkle_id: pam.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryStorage, StaticPage};

    fn config() -> MerkleConfig {
        MerkleConfig {
            params: MerkleParams {
                vendor: Some("sdhd7".to_string()),
                sv_cid: Some("8712".to_string()),
                sv_pubid: Some("pub-1".to_string()),
                sv_domain: Some("example.com".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn record_aged(seconds: i64) -> IdentityRecord {
        IdentityRecord {
            pam_id: Some(PamId {
                id: "pam-1".to_string(),
                key_id: Some(4),
            }),
            session: None,
            date: Some((Utc::now() - Duration::seconds(seconds)).to_rfc3339()),
        }
    }

    #[test]
    fn refresh_needed_after_ttl() {
        let now = Utc::now();
        assert!(MerkleIdSystem::refresh_needed(&record_aged(10_000), 7200, now));
        assert!(!MerkleIdSystem::refresh_needed(&record_aged(3600), 7200, now));
    }

    #[test]
    fn unusable_issue_date_never_refreshes() {
        let now = Utc::now();
        let undated = IdentityRecord::default();
        assert!(!MerkleIdSystem::refresh_needed(&undated, 1, now));

        let garbled = IdentityRecord {
            date: Some("not-a-date".to_string()),
            ..Default::default()
        };
        assert!(!MerkleIdSystem::refresh_needed(&garbled, 1, now));
    }

    #[test]
    fn get_id_requires_vendor_params() {
        let storage = MemoryStorage::new();
        let mut cfg = config();
        cfg.params.sv_cid = None;
        let system = MerkleIdSystem::new(cfg);
        assert!(system.get_id(None, None, &storage).is_none());

        let system = MerkleIdSystem::new(config());
        assert!(matches!(
            system.get_id(None, None, &storage),
            Some(IdDirective::Fetch(_))
        ));
    }

    #[test]
    fn get_id_refuses_when_gdpr_applies() {
        let storage = MemoryStorage::new();
        let system = MerkleIdSystem::new(config());
        let gdpr = GdprConsent {
            gdpr_applies: Some(true),
            ..Default::default()
        };
        assert!(system.get_id(Some(&gdpr), None, &storage).is_none());
    }

    #[test]
    fn fetch_url_carries_params_and_session_cookie() {
        let storage = MemoryStorage::new();
        storage.set_cookie(SESSION_COOKIE_NAME, "sess-9", Utc::now() + Duration::hours(1));
        let system = MerkleIdSystem::new(config());
        let Some(IdDirective::Fetch(request)) = system.get_id(None, None, &storage) else {
            panic!("expected fetch directive");
        };
        assert!(request.url.starts_with(ID_ENDPOINT));
        assert!(request.url.contains("vendor=sdhd7"));
        assert!(request.url.contains("sv_cid=8712"));
        assert!(request.url.contains("sv_domain=example.com"));
        assert!(request.url.contains("sv_pubid=pub-1"));
        assert!(request.url.contains("sv_session=sess-9"));
    }

    #[test]
    fn domain_defaults_to_page_root_domain() {
        let storage = MemoryStorage::new();
        let mut cfg = config();
        cfg.params.sv_domain = None;
        let system = MerkleIdSystem::new(cfg);
        let page = StaticPage::new(Some("publisher.example"));
        let Some(IdDirective::Fetch(request)) = system.get_id(None, Some(&page), &storage) else {
            panic!("expected fetch directive");
        };
        assert!(request.url.contains("sv_domain=publisher.example"));
    }

    #[test]
    fn extend_defers_to_host_ttl_bookkeeping() {
        let storage = MemoryStorage::new();
        let mut cfg = config();
        cfg.params.refresh_in_seconds = Some(7200);
        cfg.storage.refresh_in_seconds = Some(7200);
        let system = MerkleIdSystem::new(cfg);

        // Stale by any measure, but both config layers carry an explicit
        // refreshInSeconds, so the stored id is kept.
        let directive = system.extend_id(None, None, &storage, record_aged(100_000), Utc::now());
        assert!(matches!(directive, Some(IdDirective::Cached(_))));
    }

    #[test]
    fn extend_refreshes_stale_records_only() {
        let storage = MemoryStorage::new();
        let system = MerkleIdSystem::new(config());

        let stale = system.extend_id(None, None, &storage, record_aged(30_000), Utc::now());
        assert!(matches!(stale, Some(IdDirective::Fetch(_))));

        let fresh = system.extend_id(None, None, &storage, record_aged(60), Utc::now());
        assert!(matches!(fresh, Some(IdDirective::Cached(_))));
    }

    #[test]
    fn handle_response_persists_record_and_session_cookie() {
        let storage = MemoryStorage::new();
        let system = MerkleIdSystem::new(config());
        let now = Utc::now();
        let body = serde_json::json!({
            "pam_id": {"id": "pam-77", "keyID": 2},
            "c": {"value": "sess-77"}
        })
        .to_string();

        let record = system
            .handle_response(body.as_bytes(), &storage, now)
            .expect("record");
        assert_eq!(record.pam_id.as_ref().unwrap().id, "pam-77");
        assert_eq!(record.date.as_deref(), Some(now.to_rfc3339().as_str()));

        assert_eq!(storage.get_cookie(SESSION_COOKIE_NAME).as_deref(), Some("sess-77"));
        let stored = system.read(&storage).expect("stored record");
        assert_eq!(stored.pam_id, record.pam_id);
    }

    #[test]
    fn handle_response_failure_yields_none() {
        let storage = MemoryStorage::new();
        let system = MerkleIdSystem::new(config());
        assert!(system
            .handle_response(b"<html>503</html>", &storage, Utc::now())
            .is_none());
        assert!(system.read(&storage).is_none());
    }

    #[test]
    fn decode_exposes_the_pam_id() {
        assert_eq!(
            MerkleIdSystem::decode(&record_aged(0)),
            Some(MerkleId {
                merkle_id: "pam-1".to_string()
            })
        );
        assert_eq!(MerkleIdSystem::decode(&IdentityRecord::default()), None);
    }
}
