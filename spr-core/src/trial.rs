use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-supplied key/value data carried through a trial untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialMetadata(Map<String, Value>);

impl TrialMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String view of a field; numbers and booleans are rendered as text.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for TrialMetadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Where a trial sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialStatus {
    /// Region `i` is current.
    Displaying(usize),
    Completed,
    Aborted,
}

impl TrialStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TrialStatus::Displaying(_))
    }
}

/// Record emitted once when the last region of a sentence is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub metadata: TrialMetadata,
    pub sentence: String,
    pub region_texts: Vec<String>,
    pub region_reading_times: Vec<u64>,
    pub total_regions: usize,
    pub total_reading_time: u64,
}

impl TrialResult {
    /// Builds the result from paired region texts and reading times (ms).
    ///
    /// Both sequences must have the same length; the engine guarantees it.
    pub fn new(
        metadata: TrialMetadata,
        sentence: String,
        region_texts: Vec<String>,
        region_reading_times: Vec<u64>,
    ) -> Self {
        debug_assert_eq!(region_texts.len(), region_reading_times.len());
        let total_regions = region_texts.len();
        let total_reading_time = region_reading_times
            .iter()
            .fold(0u64, |acc, &t| acc.saturating_add(t));
        Self {
            metadata,
            sentence,
            region_texts,
            region_reading_times,
            total_regions,
            total_reading_time,
        }
    }
}

/// Response recorded by a single-screen rating trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingResult {
    pub metadata: TrialMetadata,
    pub prompt: String,
    pub rating: u8,
    pub rt_ms: u64,
}

/// What a key event did to a trial.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome<R> {
    /// No state change.
    Ignored,
    /// Moved on to region `index`.
    Advanced { index: usize },
    /// The trial finished with this event.
    Completed(R),
}

impl<R> KeyOutcome<R> {
    pub fn is_ignored(&self) -> bool {
        matches!(self, KeyOutcome::Ignored)
    }

    pub fn completed(self) -> Option<R> {
        match self {
            KeyOutcome::Completed(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_totals() {
        let result = TrialResult::new(
            TrialMetadata::new().with("item_id", "H01"),
            "A B C".into(),
            vec!["A".into(), "B".into(), "C".into()],
            vec![100, 250, 80],
        );
        assert_eq!(result.total_regions, 3);
        assert_eq!(result.total_reading_time, 430);
    }

    #[test]
    fn test_metadata_is_kept_apart_from_engine_fields() {
        let metadata = TrialMetadata::new()
            .with("total_regions", "caller value")
            .with("is_filler", 1);
        let result = TrialResult::new(metadata, "x".into(), vec!["x".into()], vec![5]);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["total_regions"], json!(1));
        assert_eq!(value["metadata"]["total_regions"], json!("caller value"));
        assert_eq!(value["metadata"]["is_filler"], json!(1));
    }

    #[test]
    fn test_metadata_get_str() {
        let metadata = TrialMetadata::new()
            .with("version", 2)
            .with("emotion", "H")
            .with("missing", Value::Null);
        assert_eq!(metadata.get_str("version").as_deref(), Some("2"));
        assert_eq!(metadata.get_str("emotion").as_deref(), Some("H"));
        assert_eq!(metadata.get_str("missing"), None);
        assert_eq!(metadata.get_str("absent"), None);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TrialStatus::Displaying(0).is_terminal());
        assert!(TrialStatus::Completed.is_terminal());
        assert!(TrialStatus::Aborted.is_terminal());
    }
}
