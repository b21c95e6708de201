//! Batches trial records across a session and shapes the final payload.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use spr_core::record::TAG_READING;
use spr_core::{SessionPayload, SessionRecord};
use spr_timing::ns_to_ms;
use tracing::{info, warn};

/// Draws a six-digit participant id.
pub fn assign_participant<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.random_range(100_000..=999_999)
}

/// Honors `requested` when it names a list, otherwise draws one uniformly.
pub fn assign_list<R: Rng + ?Sized>(requested: Option<u8>, list_count: u8, rng: &mut R) -> u8 {
    let list_count = list_count.max(1);
    match requested {
        Some(id) if (1..=list_count).contains(&id) => id,
        Some(id) => {
            warn!(id, list_count, "requested list out of range, assigning randomly");
            rng.random_range(1..=list_count)
        }
        None => rng.random_range(1..=list_count),
    }
}

/// Host details reported with the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayInfo {
    pub platform: String,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Session {
    participant_id: u32,
    list_id: u8,
    started_ns: u64,
    records: Vec<SessionRecord>,
    background_ms: Option<u64>,
    aborted: bool,
}

impl Session {
    pub fn new(participant_id: u32, list_id: u8, started_ns: u64) -> Self {
        info!(participant_id, list_id, "session started");
        Self {
            participant_id,
            list_id,
            started_ns,
            records: Vec::new(),
            background_ms: None,
            aborted: false,
        }
    }

    pub fn push(&mut self, record: SessionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[SessionRecord] {
        &self.records
    }

    pub fn participant_id(&self) -> u32 {
        self.participant_id
    }

    pub fn list_id(&self) -> u8 {
        self.list_id
    }

    pub fn set_background_reading_time(&mut self, ms: u64) {
        self.background_ms = Some(ms);
    }

    pub fn background_reading_time(&self) -> Option<u64> {
        self.background_ms
    }

    pub fn mark_aborted(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Number of batched records carrying `trial_type`.
    pub fn count(&self, trial_type: &str) -> usize {
        self.records
            .iter()
            .filter(|r| r.trial_type() == trial_type)
            .count()
    }

    /// Shapes the session into the document sent downstream.
    ///
    /// Practice readings stay in the batch but are not part of the payload.
    pub fn to_payload(&self, ended_ns: u64, display: &DisplayInfo, now: DateTime<Utc>) -> SessionPayload {
        let mut payload = SessionPayload {
            data_type: SessionPayload::COMPLETE.to_string(),
            participant_id: self.participant_id,
            list_id: self.list_id,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            total_duration: ns_to_ms(ended_ns.saturating_sub(self.started_ns)),
            background_reading_time: self.background_ms,
            platform: display.platform.clone(),
            screen_width: display.screen_width,
            screen_height: display.screen_height,
            spr_data: Vec::new(),
            rating_data: Vec::new(),
            recall_data: None,
            mc_data: Vec::new(),
        };
        for record in &self.records {
            match record {
                SessionRecord::Reading(r) if r.trial_type == TAG_READING => {
                    payload.spr_data.push(r.clone())
                }
                SessionRecord::Reading(_) => {}
                SessionRecord::Rating(r) => payload.rating_data.push(r.clone()),
                SessionRecord::ManipulationCheck(r) => payload.mc_data.push(r.clone()),
                SessionRecord::Recall(r) => payload.recall_data = Some(r.clone()),
            }
        }
        info!(
            spr = payload.spr_data.len(),
            rating = payload.rating_data.len(),
            mc = payload.mc_data.len(),
            "session payload prepared"
        );
        payload
    }
}
