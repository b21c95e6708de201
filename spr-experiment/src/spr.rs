//! Self-paced reading trial engine.
//!
//! A sentence is split into whitespace-delimited regions that are revealed
//! one at a time. Each accepted press of the advance key closes the current
//! region and records how long it was visible. The engine never reads a
//! clock: display moments and key presses arrive with their own timestamps.

use spr_core::{
    KeyEvent, KeyOutcome, KeyToken, SprError, TrialMetadata, TrialResult, TrialStatus, segment,
};
use spr_timing::ns_to_ms;
use tracing::debug;

pub const DEFAULT_INSTRUCTION: &str = "SPACE를 눌러 다음 부분으로 진행하세요.";

/// Display effect supplied by the host.
pub trait RegionDisplay {
    /// Render `text`, replacing whatever region was on screen.
    ///
    /// Return the moment the region became visible if that is known now, or
    /// `None` when presentation completes later; the host then reports it
    /// through `region_displayed`.
    fn show_region(&mut self, index: usize, text: &str) -> Option<u64>;

    /// Remove the region from screen once the trial is over.
    fn clear(&mut self) {}
}

impl<F> RegionDisplay for F
where
    F: FnMut(usize, &str) -> Option<u64>,
{
    fn show_region(&mut self, index: usize, text: &str) -> Option<u64> {
        self(index, text)
    }
}

/// Display that leaves presentation to a frame loop.
#[derive(Debug, Clone, Default)]
pub struct DeferredDisplay;

impl RegionDisplay for DeferredDisplay {
    fn show_region(&mut self, index: usize, text: &str) -> Option<u64> {
        debug!(index, region = text, "region queued for next frame");
        None
    }
}

#[derive(Debug, Clone)]
pub struct SprParams {
    pub sentence: String,
    pub metadata: TrialMetadata,
    pub advance_key: KeyToken,
    pub instruction_text: String,
}

impl SprParams {
    pub fn new(sentence: impl Into<String>) -> Self {
        Self {
            sentence: sentence.into(),
            metadata: TrialMetadata::new(),
            advance_key: KeyToken::Space,
            instruction_text: DEFAULT_INSTRUCTION.to_string(),
        }
    }

    pub fn metadata(mut self, metadata: TrialMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn advance_key(mut self, key: KeyToken) -> Self {
        self.advance_key = key;
        self
    }

    pub fn instruction_text(mut self, text: impl Into<String>) -> Self {
        self.instruction_text = text.into();
        self
    }
}

pub struct SprTrial<D: RegionDisplay> {
    sentence: String,
    metadata: TrialMetadata,
    advance_key: KeyToken,
    instruction_text: String,
    regions: Vec<String>,
    status: TrialStatus,
    region_start_ns: Option<u64>,
    revealed_texts: Vec<String>,
    reading_times: Vec<u64>,
    display: D,
}

impl<D: RegionDisplay> SprTrial<D> {
    /// Segments the sentence and shows its first region.
    pub fn start(params: SprParams, display: D) -> Result<Self, SprError> {
        let regions = segment(&params.sentence)?;
        let count = regions.len();
        let mut trial = Self {
            sentence: params.sentence,
            metadata: params.metadata,
            advance_key: params.advance_key,
            instruction_text: params.instruction_text,
            regions,
            status: TrialStatus::Displaying(0),
            region_start_ns: None,
            revealed_texts: Vec::with_capacity(count),
            reading_times: Vec::with_capacity(count),
            display,
        };
        debug!(regions = count, "spr trial started");
        trial.show_current();
        Ok(trial)
    }

    fn show_current(&mut self) {
        if let TrialStatus::Displaying(index) = self.status {
            if let Some(ts) = self.display.show_region(index, &self.regions[index]) {
                self.region_displayed(ts);
            }
        }
    }

    /// Arms the timer of the current region. Later calls for the same region
    /// (redraws, reflows) are ignored and return `false`.
    pub fn region_displayed(&mut self, timestamp_ns: u64) -> bool {
        match self.status {
            TrialStatus::Displaying(_) if self.region_start_ns.is_none() => {
                self.region_start_ns = Some(timestamp_ns);
                true
            }
            _ => false,
        }
    }

    pub fn on_key_event(&mut self, event: &KeyEvent) -> KeyOutcome<TrialResult> {
        let TrialStatus::Displaying(index) = self.status else {
            return KeyOutcome::Ignored;
        };
        if event.token != self.advance_key {
            return KeyOutcome::Ignored;
        }
        let Some(start) = self.region_start_ns else {
            debug!(index, "advance before region was visible, ignored");
            return KeyOutcome::Ignored;
        };

        let rt = ns_to_ms(event.timestamp_ns.saturating_sub(start));
        self.reading_times.push(rt);
        self.revealed_texts.push(self.regions[index].clone());
        self.region_start_ns = None;

        let next = index + 1;
        if next < self.regions.len() {
            self.status = TrialStatus::Displaying(next);
            self.show_current();
            return KeyOutcome::Advanced { index: next };
        }

        self.status = TrialStatus::Completed;
        self.display.clear();
        let result = TrialResult::new(
            std::mem::take(&mut self.metadata),
            self.sentence.clone(),
            std::mem::take(&mut self.revealed_texts),
            std::mem::take(&mut self.reading_times),
        );
        debug!(
            regions = result.total_regions,
            total_ms = result.total_reading_time,
            "spr trial completed"
        );
        KeyOutcome::Completed(result)
    }

    /// Abandons the trial. Partial timings are dropped and no result is ever
    /// produced. Returns `false` if the trial had already ended.
    pub fn abort(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TrialStatus::Aborted;
        self.region_start_ns = None;
        self.revealed_texts.clear();
        self.reading_times.clear();
        self.display.clear();
        debug!("spr trial aborted");
        true
    }

    pub fn status(&self) -> TrialStatus {
        self.status
    }

    pub fn current_index(&self) -> usize {
        match self.status {
            TrialStatus::Displaying(i) => i,
            _ => self.regions.len(),
        }
    }

    pub fn current_region(&self) -> Option<&str> {
        match self.status {
            TrialStatus::Displaying(i) => Some(&self.regions[i]),
            _ => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.region_start_ns.is_some()
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn revealed_texts(&self) -> &[String] {
        &self.revealed_texts
    }

    pub fn reading_times(&self) -> &[u64] {
        &self.reading_times
    }

    pub fn advance_key(&self) -> &KeyToken {
        &self.advance_key
    }

    pub fn instruction_text(&self) -> &str {
        &self.instruction_text
    }

    pub fn display(&self) -> &D {
        &self.display
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    /// Display that becomes visible at a scripted time and logs what it showed.
    #[derive(Default)]
    struct ScriptedDisplay {
        now_ns: u64,
        shown: Vec<String>,
        cleared: bool,
    }

    impl RegionDisplay for ScriptedDisplay {
        fn show_region(&mut self, _index: usize, text: &str) -> Option<u64> {
            self.shown.push(text.to_string());
            Some(self.now_ns)
        }

        fn clear(&mut self) {
            self.cleared = true;
        }
    }

    fn key(token: KeyToken, ms: u64) -> KeyEvent {
        KeyEvent::new(token, ms * MS)
    }

    #[test]
    fn test_empty_sentence_fails_before_display() {
        let mut shown = 0;
        let display = |_: usize, _: &str| {
            shown += 1;
            Some(0)
        };
        let err = SprTrial::start(SprParams::new("   "), display).err();
        assert_eq!(err, Some(SprError::EmptySentence));
        assert_eq!(shown, 0);
    }

    #[test]
    fn test_first_region_shown_on_start() {
        let trial = SprTrial::start(SprParams::new("A B C"), ScriptedDisplay::default()).unwrap();
        assert_eq!(trial.display().shown, vec!["A"]);
        assert_eq!(trial.current_region(), Some("A"));
        assert!(trial.is_armed());
    }

    #[test]
    fn test_three_region_walkthrough() {
        let mut trial =
            SprTrial::start(SprParams::new("A B C"), ScriptedDisplay::default()).unwrap();

        // region B becomes visible as the key for A lands
        trial.display.now_ns = 100 * MS;
        let out = trial.on_key_event(&key(KeyToken::Space, 100));
        assert_eq!(out, KeyOutcome::Advanced { index: 1 });
        assert_eq!(trial.reading_times(), &[100]);
        assert_eq!(trial.current_region(), Some("B"));
        assert!(!trial.region_displayed(120 * MS));

        trial.display.now_ns = 350 * MS;

        let out = trial.on_key_event(&key(KeyToken::Space, 350));
        assert_eq!(out, KeyOutcome::Advanced { index: 2 });
        assert_eq!(trial.reading_times(), &[100, 250]);
        assert_eq!(trial.current_region(), Some("C"));

        let result = trial
            .on_key_event(&key(KeyToken::Space, 430))
            .completed()
            .unwrap();
        assert_eq!(result.region_texts, vec!["A", "B", "C"]);
        assert_eq!(result.region_reading_times, vec![100, 250, 80]);
        assert_eq!(result.total_regions, 3);
        assert_eq!(result.total_reading_time, 430);
        assert_eq!(trial.display().shown, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_non_advance_key_is_inert() {
        let mut trial =
            SprTrial::start(SprParams::new("A B"), ScriptedDisplay::default()).unwrap();
        for token in [KeyToken::Enter, KeyToken::Char('j'), KeyToken::Escape] {
            assert!(trial.on_key_event(&key(token, 50)).is_ignored());
        }
        assert_eq!(trial.current_index(), 0);
        assert!(trial.reading_times().is_empty());
        assert!(trial.revealed_texts().is_empty());
    }

    #[test]
    fn test_custom_advance_key() {
        let params = SprParams::new("A B").advance_key(KeyToken::Char('j'));
        let mut trial = SprTrial::start(params, ScriptedDisplay::default()).unwrap();
        assert!(trial.on_key_event(&key(KeyToken::Space, 10)).is_ignored());
        assert_eq!(
            trial.on_key_event(&key(KeyToken::Char('j'), 10)),
            KeyOutcome::Advanced { index: 1 }
        );
    }

    #[test]
    fn test_single_token_completes_on_one_press() {
        let mut trial =
            SprTrial::start(SprParams::new("Hello"), ScriptedDisplay::default()).unwrap();
        let result = trial
            .on_key_event(&key(KeyToken::Space, 42))
            .completed()
            .unwrap();
        assert_eq!(result.total_regions, 1);
        assert_eq!(result.region_texts, vec!["Hello"]);
        assert_eq!(result.region_reading_times, vec![42]);
        assert_eq!(trial.status(), TrialStatus::Completed);
        assert!(trial.display().cleared);
    }

    #[test]
    fn test_keys_after_completion_are_ignored() {
        let mut trial =
            SprTrial::start(SprParams::new("Hello"), ScriptedDisplay::default()).unwrap();
        assert!(trial.on_key_event(&key(KeyToken::Space, 1)).completed().is_some());
        assert!(trial.on_key_event(&key(KeyToken::Space, 2)).is_ignored());
        assert_eq!(trial.current_index(), 1);
    }

    #[test]
    fn test_deferred_display_waits_for_ack() {
        let mut trial = SprTrial::start(SprParams::new("A B"), DeferredDisplay).unwrap();
        assert!(!trial.is_armed());
        assert!(trial.on_key_event(&key(KeyToken::Space, 5)).is_ignored());

        assert!(trial.region_displayed(20 * MS));
        // a redraw of the same region must not move the start time
        assert!(!trial.region_displayed(35 * MS));

        let out = trial.on_key_event(&key(KeyToken::Space, 120));
        assert_eq!(out, KeyOutcome::Advanced { index: 1 });
        assert_eq!(trial.reading_times(), &[100]);
        assert!(!trial.is_armed());
    }

    #[test]
    fn test_key_timestamp_before_display_saturates() {
        let mut trial = SprTrial::start(SprParams::new("A"), DeferredDisplay).unwrap();
        trial.region_displayed(50 * MS);
        let result = trial
            .on_key_event(&key(KeyToken::Space, 40))
            .completed()
            .unwrap();
        assert_eq!(result.region_reading_times, vec![0]);
    }

    #[test]
    fn test_key_at_end_of_clock_range() {
        let mut trial = SprTrial::start(SprParams::new("A"), DeferredDisplay).unwrap();
        trial.region_displayed(0);
        let result = trial
            .on_key_event(&KeyEvent::new(KeyToken::Space, u64::MAX))
            .completed()
            .unwrap();
        assert_eq!(result.region_reading_times, vec![18_446_744_073_710]);
    }

    #[test]
    fn test_abort_is_idempotent_and_silent() {
        let mut trial =
            SprTrial::start(SprParams::new("A B C"), ScriptedDisplay::default()).unwrap();
        trial.on_key_event(&key(KeyToken::Space, 10));
        assert!(trial.abort());
        assert!(!trial.abort());
        assert_eq!(trial.status(), TrialStatus::Aborted);
        assert!(trial.reading_times().is_empty());
        assert!(trial.on_key_event(&key(KeyToken::Space, 20)).is_ignored());
        assert!(trial.on_key_event(&key(KeyToken::Space, 30)).is_ignored());
        assert_eq!(trial.current_region(), None);
    }

    #[test]
    fn test_abort_after_completion_is_noop() {
        let mut trial =
            SprTrial::start(SprParams::new("A"), ScriptedDisplay::default()).unwrap();
        trial.on_key_event(&key(KeyToken::Space, 10));
        assert!(!trial.abort());
        assert_eq!(trial.status(), TrialStatus::Completed);
    }

    #[test]
    fn test_metadata_passes_through() {
        let metadata = TrialMetadata::new()
            .with("item_id", "B01_HI_2")
            .with("emotion", "H")
            .with("plausibility", "I")
            .with("version", "2")
            .with("is_filler", 0);
        let params = SprParams::new("x y").metadata(metadata.clone());
        let mut trial = SprTrial::start(params, ScriptedDisplay::default()).unwrap();
        trial.on_key_event(&key(KeyToken::Space, 1));
        let result = trial
            .on_key_event(&key(KeyToken::Space, 2))
            .completed()
            .unwrap();
        assert_eq!(result.metadata, metadata);
        assert_eq!(result.sentence, "x y");
    }
}
