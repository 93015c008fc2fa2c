// src/model/context.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-page-view mutable state shared across auction cycles.
///
/// Owned by the caller and passed explicitly into the adapter so tests can
/// reset it; counters live for the page session only and are never
/// persisted. The page-view id correlates every request sent during one
/// page load.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionContext {
    #[serde(rename = "pageViewId")]
    page_view_id: String,
    #[serde(rename = "cyclesStarted")]
    cycles_started: u32,
    #[serde(rename = "cycleCap")]
    cycle_cap: Option<u32>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            page_view_id: Uuid::new_v4().to_string(),
            cycles_started: 0,
            cycle_cap: None,
        }
    }

    pub fn page_view_id(&self) -> &str {
        &self.page_view_id
    }

    /// Vendor-reported cap on auction cycles for this page view. Once the
    /// started-cycle count reaches it the vendor is withdrawn from bidding
    /// until the page reloads.
    pub fn record_cycle_cap(&mut self, cap: u32) {
        self.cycle_cap = Some(cap);
    }

    pub fn withdrawn(&self) -> bool {
        matches!(self.cycle_cap, Some(cap) if self.cycles_started >= cap)
    }

    /// Counts a new auction cycle. Returns false when the vendor is capped
    /// out, in which case the cycle must produce no request.
    pub fn begin_cycle(&mut self) -> bool {
        if self.withdrawn() {
            return false;
        }
        self.cycles_started += 1;
        true
    }

    pub fn cycles_started(&self) -> u32 {
        self.cycles_started
    }

    /// Models a page reload: fresh page-view id, counters cleared.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_withdraws_after_reached_cycles() {
        let mut session = SessionContext::new();
        assert!(session.begin_cycle());
        session.record_cycle_cap(3);
        assert!(session.begin_cycle());
        assert!(session.begin_cycle());
        // Three cycles started, cap of three: withdrawn from here on.
        assert!(!session.begin_cycle());
        assert!(!session.begin_cycle());
        assert!(session.withdrawn());
    }

    #[test]
    fn reset_models_page_reload() {
        let mut session = SessionContext::new();
        session.record_cycle_cap(0);
        assert!(!session.begin_cycle());
        let old_page_view = session.page_view_id().to_string();

        session.reset();
        assert!(session.begin_cycle());
        assert_ne!(session.page_view_id(), old_page_view);
    }
}
