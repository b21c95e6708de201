use serde_json::Value;
use spr_core::record::{
    TAG_MANIPULATION_CHECK, TAG_RATING, TAG_READING, TAG_RECALL, TAG_SESSION,
};

/// Result family a record belongs to, keyed by its `trial_type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCategory {
    Reading,
    Rating,
    Recall,
    ManipulationCheck,
    SessionMetadata,
}

const READING_HEADER: &[&str] = &[
    "Timestamp",
    "Participant_ID",
    "List_ID",
    "Trial_Index",
    "Item_ID",
    "Base",
    "Emotion",
    "Plausibility",
    "Version",
    "Is_Filler",
    "Sentence_Text",
    "Total_Regions",
    "Total_Reading_Time_ms",
    "Regions",
    "Region_RTs",
];

const RATING_HEADER: &[&str] = &[
    "Timestamp",
    "Participant_ID",
    "List_ID",
    "Item_ID",
    "Base",
    "Emotion",
    "Plausibility",
    "Stimulus_Text",
    "Rating",
    "RT_ms",
];

const RECALL_HEADER: &[&str] = &["Timestamp", "Participant_ID", "List_ID", "Recall_Text"];

const MANIPULATION_HEADER: &[&str] = &[
    "Timestamp",
    "Participant_ID",
    "List_ID",
    "Modifier_Text",
    "Modifier_Category",
    "Negativity_Rating",
    "RT_ms",
];

const METADATA_HEADER: &[&str] = &[
    "Timestamp",
    "Participant_ID",
    "List_ID",
    "Background_Reading_Time_ms",
    "Total_Experiment_Duration_ms",
    "Platform",
    "Screen_Width",
    "Screen_Height",
];

impl ResultCategory {
    pub const ALL: [ResultCategory; 5] = [
        Self::Reading,
        Self::Rating,
        Self::Recall,
        Self::ManipulationCheck,
        Self::SessionMetadata,
    ];

    /// Unknown or missing tags have no category.
    pub fn from_tag(tag: Option<&str>) -> Option<Self> {
        match tag? {
            TAG_READING | "spr" => Some(Self::Reading),
            TAG_RATING => Some(Self::Rating),
            TAG_RECALL => Some(Self::Recall),
            TAG_MANIPULATION_CHECK => Some(Self::ManipulationCheck),
            TAG_SESSION => Some(Self::SessionMetadata),
            _ => None,
        }
    }

    /// Routes a JSON record by its `trial_type` field.
    pub fn of_value(record: &Value) -> Option<Self> {
        Self::from_tag(record.get("trial_type").and_then(Value::as_str))
    }

    pub fn sheet_name(self) -> &'static str {
        match self {
            Self::Reading => "SPR_Data",
            Self::Rating => "Rating_Data",
            Self::Recall => "Recall_Data",
            Self::ManipulationCheck => "Manipulation_Check",
            Self::SessionMetadata => "Metadata",
        }
    }

    pub fn header(self) -> &'static [&'static str] {
        match self {
            Self::Reading => READING_HEADER,
            Self::Rating => RATING_HEADER,
            Self::Recall => RECALL_HEADER,
            Self::ManipulationCheck => MANIPULATION_HEADER,
            Self::SessionMetadata => METADATA_HEADER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spr_core::record::TAG_PRACTICE;

    #[test]
    fn test_known_tags() {
        assert_eq!(
            ResultCategory::from_tag(Some("spr_main")),
            Some(ResultCategory::Reading)
        );
        assert_eq!(
            ResultCategory::from_tag(Some("spr")),
            Some(ResultCategory::Reading)
        );
        assert_eq!(
            ResultCategory::from_tag(Some("plausibility_rating")),
            Some(ResultCategory::Rating)
        );
        assert_eq!(
            ResultCategory::from_tag(Some("free_recall")),
            Some(ResultCategory::Recall)
        );
        assert_eq!(
            ResultCategory::from_tag(Some("manipulation_check")),
            Some(ResultCategory::ManipulationCheck)
        );
        assert_eq!(
            ResultCategory::from_tag(Some("session_metadata")),
            Some(ResultCategory::SessionMetadata)
        );
    }

    #[test]
    fn test_unknown_and_missing_tags() {
        assert_eq!(ResultCategory::from_tag(None), None);
        assert_eq!(ResultCategory::from_tag(Some("")), None);
        assert_eq!(ResultCategory::from_tag(Some(TAG_PRACTICE)), None);
        assert_eq!(ResultCategory::from_tag(Some("SPR_MAIN")), None);

        assert_eq!(ResultCategory::of_value(&json!({"rating": 3})), None);
        assert_eq!(ResultCategory::of_value(&json!({"trial_type": 7})), None);
        assert_eq!(ResultCategory::of_value(&json!("spr_main")), None);
        assert_eq!(
            ResultCategory::of_value(&json!({"trial_type": "free_recall"})),
            Some(ResultCategory::Recall)
        );
    }

    #[test]
    fn test_headers_start_with_row_prefix() {
        for category in ResultCategory::ALL {
            assert_eq!(
                &category.header()[..3],
                &["Timestamp", "Participant_ID", "List_ID"]
            );
        }
    }
}
