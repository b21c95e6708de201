//! Records a session hands to its downstream logger.
//!
//! Every record carries a `trial_type` tag; loggers route on that tag alone.

use serde::{Deserialize, Serialize};

use crate::{RatingResult, TrialResult};

pub const TAG_READING: &str = "spr_main";
pub const TAG_PRACTICE: &str = "spr_practice";
pub const TAG_RATING: &str = "plausibility_rating";
pub const TAG_RECALL: &str = "free_recall";
pub const TAG_MANIPULATION_CHECK: &str = "manipulation_check";
pub const TAG_SESSION: &str = "session_metadata";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub trial_type: String,
    pub trial_index: Option<usize>,
    #[serde(flatten)]
    pub result: TrialResult,
}

impl ReadingRecord {
    pub fn main(trial_index: usize, result: TrialResult) -> Self {
        Self {
            trial_type: TAG_READING.to_string(),
            trial_index: Some(trial_index),
            result,
        }
    }

    pub fn practice(result: TrialResult) -> Self {
        Self {
            trial_type: TAG_PRACTICE.to_string(),
            trial_index: None,
            result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub trial_type: String,
    pub item_id: String,
    pub base: String,
    pub emotion: String,
    pub plausibility: String,
    pub stimulus_text: String,
    pub rating: u8,
    pub rt: u64,
}

impl From<RatingResult> for RatingRecord {
    fn from(r: RatingResult) -> Self {
        let field = |k: &str| r.metadata.get_str(k).unwrap_or_default();
        Self {
            trial_type: TAG_RATING.to_string(),
            item_id: field("item_id"),
            base: field("base"),
            emotion: field("emotion"),
            plausibility: field("plausibility"),
            stimulus_text: r.prompt.clone(),
            rating: r.rating,
            rt: r.rt_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManipulationCheckRecord {
    pub trial_type: String,
    pub modifier_text: String,
    pub modifier_category: String,
    pub rating: u8,
    pub rt: u64,
}

impl From<RatingResult> for ManipulationCheckRecord {
    fn from(r: RatingResult) -> Self {
        Self {
            trial_type: TAG_MANIPULATION_CHECK.to_string(),
            modifier_text: r.metadata.get_str("modifier_text").unwrap_or(r.prompt),
            modifier_category: r.metadata.get_str("modifier_category").unwrap_or_default(),
            rating: r.rating,
            rt: r.rt_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallRecord {
    pub trial_type: String,
    pub text: String,
}

impl RecallRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            trial_type: TAG_RECALL.to_string(),
            text: text.into(),
        }
    }
}

/// One batched entry of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionRecord {
    Reading(ReadingRecord),
    Rating(RatingRecord),
    ManipulationCheck(ManipulationCheckRecord),
    Recall(RecallRecord),
}

impl SessionRecord {
    pub fn trial_type(&self) -> &str {
        match self {
            SessionRecord::Reading(r) => &r.trial_type,
            SessionRecord::Rating(r) => &r.trial_type,
            SessionRecord::ManipulationCheck(r) => &r.trial_type,
            SessionRecord::Recall(r) => &r.trial_type,
        }
    }
}

/// The complete session document sent to the results backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(rename = "dataType")]
    pub data_type: String,
    pub participant_id: u32,
    pub list_id: u8,
    pub timestamp: String,
    pub total_duration: u64,
    /// Milliseconds the background passage stayed on screen.
    pub background_reading_time: Option<u64>,
    pub platform: String,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub spr_data: Vec<ReadingRecord>,
    pub rating_data: Vec<RatingRecord>,
    pub recall_data: Option<RecallRecord>,
    pub mc_data: Vec<ManipulationCheckRecord>,
}

impl SessionPayload {
    pub const COMPLETE: &'static str = "complete";
}
