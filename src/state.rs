//!
//! src/state.rs  Andrew Belles  Oct 19th, 2026
//!
//! Presentation state: what is searched, shown and exporting. Every
//! method is a plain transition; the controller is the only writer.
//!

use std::collections::VecDeque;

use uuid::Uuid;

use crate::errors::{SearchError, SonicError};
use crate::simulator::Completed;
use crate::types::{Provenance, SearchOutcome, StampedTrack, Tier, TrackRecord};

pub const RECENT_CAPACITY: usize = 5;

/// The export currently running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveExport {
    pub session_id: Uuid,
    pub target: StampedTrack,
}

#[derive(Debug, Default)]
pub struct PresentationState {
    query: String,
    records: Vec<TrackRecord>,
    sources: Vec<Provenance>,
    tier: Tier,
    loading: bool,
    last_failure: Option<SearchError>,
    active: Option<ActiveExport>,
    recent: VecDeque<StampedTrack>,
}

impl PresentationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str { &self.query }
    pub fn tier(&self) -> Tier { self.tier }
    pub fn is_loading(&self) -> bool { self.loading }
    pub fn sources(&self) -> &[Provenance] { &self.sources }
    pub fn last_failure(&self) -> Option<&SearchError> { self.last_failure.as_ref() }
    pub fn active(&self) -> Option<&ActiveExport> { self.active.as_ref() }
    pub fn result_count(&self) -> usize { self.records.len() }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
    }

    pub fn set_tier(&mut self, tier: Tier) {
        self.tier = tier;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Replaces the whole result set
    pub fn apply_results(&mut self, outcome: SearchOutcome) {
        self.records = outcome.records;
        self.sources = outcome.sources;
        self.last_failure = None;
    }

    /// A failed search shows nothing, but remembers why
    pub fn apply_failure(&mut self, failure: SearchError) {
        self.records.clear();
        self.sources.clear();
        self.last_failure = Some(failure);
    }

    pub fn record(&self, index: usize) -> Option<&TrackRecord> {
        self.records.get(index)
    }

    /// Records as shown, each stamped with the selected tier
    pub fn displayed(&self) -> Vec<StampedTrack> {
        self.records.iter()
            .map(|r| StampedTrack::new(r.clone(), self.tier))
            .collect()
    }

    /// Pins the record at `index` with the current tier. One export at a
    /// time.
    pub fn begin_export(&mut self, index: usize, session_id: Uuid) ->
        Result<StampedTrack, SonicError> {

        if let Some(active) = &self.active {
            return Err(SonicError::Busy(active.session_id));
        }
        let record = self.records.get(index)
            .ok_or_else(|| SonicError::NotFound(format!("no result at position {}", index + 1)))?;

        let target = StampedTrack::new(record.clone(), self.tier);
        self.active = Some(ActiveExport { session_id, target: target.clone() });
        Ok(target)
    }

    /// Records a finished session at the front of recent completions
    pub fn complete_export(&mut self, completed: &Completed) -> Result<(), SonicError> {
        match &self.active {
            Some(active) if active.session_id == completed.session_id => {}
            _ => return Err(SonicError::NoActiveExport),
        }
        self.active = None;
        self.recent.push_front(completed.target.clone());
        self.recent.truncate(RECENT_CAPACITY);
        Ok(())
    }

    /// Drops the active export without touching history
    pub fn dismiss_export(&mut self) -> Option<ActiveExport> {
        self.active.take()
    }

    /// Most recent first
    pub fn recent(&self) -> impl Iterator<Item = &StampedTrack> {
        self.recent.iter()
    }
}
