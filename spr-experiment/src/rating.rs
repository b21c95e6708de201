//! One-screen Likert rating driven by digit keys.

use spr_core::{KeyEvent, KeyOutcome, RatingResult, SprError, TrialMetadata, TrialStatus};
use spr_timing::ns_to_ms;
use tracing::debug;

use crate::spr::RegionDisplay;

#[derive(Debug, Clone)]
pub struct LikertParams {
    /// Text being rated (a sentence or a single modifier).
    pub stimulus: String,
    /// Question shown above the scale.
    pub question: String,
    pub metadata: TrialMetadata,
    pub scale: u8,
}

impl LikertParams {
    pub fn new(stimulus: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            stimulus: stimulus.into(),
            question: question.into(),
            metadata: TrialMetadata::new(),
            scale: 5,
        }
    }

    pub fn metadata(mut self, metadata: TrialMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn scale(mut self, scale: u8) -> Self {
        self.scale = scale;
        self
    }
}

pub struct LikertTrial<D: RegionDisplay> {
    params: LikertParams,
    status: TrialStatus,
    shown_at_ns: Option<u64>,
    display: D,
}

impl<D: RegionDisplay> LikertTrial<D> {
    pub fn start(params: LikertParams, mut display: D) -> Result<Self, SprError> {
        if !(2..=9).contains(&params.scale) {
            return Err(SprError::InvalidScale(params.scale));
        }
        if params.stimulus.trim().is_empty() {
            return Err(SprError::EmptySentence);
        }
        let shown_at_ns = display.show_region(0, &params.stimulus);
        Ok(Self {
            params,
            status: TrialStatus::Displaying(0),
            shown_at_ns,
            display,
        })
    }

    /// Arms the response timer once; redraws are ignored.
    pub fn displayed(&mut self, timestamp_ns: u64) -> bool {
        if self.status.is_terminal() || self.shown_at_ns.is_some() {
            return false;
        }
        self.shown_at_ns = Some(timestamp_ns);
        true
    }

    pub fn on_key_event(&mut self, event: &KeyEvent) -> KeyOutcome<RatingResult> {
        if self.status.is_terminal() {
            return KeyOutcome::Ignored;
        }
        let Some(shown) = self.shown_at_ns else {
            return KeyOutcome::Ignored;
        };
        let Some(rating) = event.token.digit().filter(|d| (1..=self.params.scale).contains(d))
        else {
            return KeyOutcome::Ignored;
        };

        self.status = TrialStatus::Completed;
        self.display.clear();
        let rt_ms = ns_to_ms(event.timestamp_ns.saturating_sub(shown));
        debug!(rating, rt_ms, "rating recorded");
        KeyOutcome::Completed(RatingResult {
            metadata: std::mem::take(&mut self.params.metadata),
            prompt: self.params.stimulus.clone(),
            rating,
            rt_ms,
        })
    }

    pub fn abort(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TrialStatus::Aborted;
        self.display.clear();
        true
    }

    pub fn status(&self) -> TrialStatus {
        self.status
    }

    pub fn is_armed(&self) -> bool {
        self.shown_at_ns.is_some()
    }

    pub fn stimulus(&self) -> &str {
        &self.params.stimulus
    }

    pub fn question(&self) -> &str {
        &self.params.question
    }

    pub fn scale(&self) -> u8 {
        self.params.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spr::DeferredDisplay;
    use spr_core::KeyToken;

    fn press(c: char, ms: u64) -> KeyEvent {
        KeyEvent::new(KeyToken::Char(c), ms * 1_000_000)
    }

    #[test]
    fn test_rating_records_digit_and_rt() {
        let params = LikertParams::new("미개한", "이 표현은 얼마나 부정적입니까?")
            .metadata(TrialMetadata::new().with("modifier_category", "hate"));
        let mut trial = LikertTrial::start(params, DeferredDisplay).unwrap();
        assert!(trial.on_key_event(&press('4', 10)).is_ignored());

        trial.displayed(1_000_000_000);
        assert!(!trial.displayed(1_500_000_000));
        let result = trial.on_key_event(&press('4', 2_250)).completed().unwrap();
        assert_eq!(result.rating, 4);
        assert_eq!(result.rt_ms, 1_250);
        assert_eq!(result.prompt, "미개한");
        assert_eq!(result.metadata.get_str("modifier_category").as_deref(), Some("hate"));
    }

    #[test]
    fn test_out_of_scale_keys_ignored() {
        let mut trial = LikertTrial::start(
            LikertParams::new("sentence", "q").scale(5),
            |_: usize, _: &str| Some(0),
        )
        .unwrap();
        for c in ['0', '6', '9', 'a'] {
            assert!(trial.on_key_event(&press(c, 5)).is_ignored());
        }
        assert!(trial.on_key_event(&KeyEvent::new(KeyToken::Space, 5)).is_ignored());
        assert_eq!(trial.status(), TrialStatus::Displaying(0));
        assert!(trial.on_key_event(&press('5', 5)).completed().is_some());
        assert!(trial.on_key_event(&press('1', 6)).is_ignored());
    }

    #[test]
    fn test_invalid_scale_rejected() {
        for scale in [0, 1, 10] {
            let err = LikertTrial::start(LikertParams::new("s", "q").scale(scale), DeferredDisplay)
                .err();
            assert_eq!(err, Some(SprError::InvalidScale(scale)));
        }
    }

    #[test]
    fn test_abort_blocks_rating() {
        let mut trial = LikertTrial::start(LikertParams::new("s", "q"), DeferredDisplay).unwrap();
        trial.displayed(0);
        assert!(trial.abort());
        assert!(!trial.abort());
        assert!(trial.on_key_event(&press('3', 1)).is_ignored());
    }
}
