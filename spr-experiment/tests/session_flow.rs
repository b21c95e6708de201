use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use chrono::{TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use spr_core::record::{TAG_PRACTICE, TAG_READING, TAG_RECALL};
use spr_core::{KeyEvent, KeyToken, SessionRecord};
use spr_experiment::{
    DisplayInfo, ExperimentConfig, InputSource, KeyboardHub, PressFilter, RawKeyState, Screen,
    SessionStateMachine, StepOutcome,
};
use spr_timing::{ManualTimer, Timer};

const LIST: &str = r#"[
    {"list_id": 2, "item_id": "B01_HP_2", "base": "B01", "emotion": "H", "plausibility": "P",
     "version": 2, "stimulus_text": "그 미개한 탈렌족은 산에 산다", "is_filler": 0},
    {"list_id": 2, "item_id": "B01_NI_2", "base": "B01", "emotion": "N", "plausibility": "I",
     "version": 2, "stimulus_text": "그 고립된 탈렌족은 바다에 산다", "is_filler": 0},
    {"list_id": 2, "item_id": "F01", "base": "NA", "emotion": "NA", "plausibility": "P_filler",
     "version": "NA", "stimulus_text": "오늘은 날씨가 맑다", "is_filler": 1}
]"#;

struct Harness {
    machine: SessionStateMachine,
    timer: ManualTimer,
    hub: KeyboardHub,
    filter: PressFilter,
    queue: Rc<RefCell<VecDeque<KeyEvent>>>,
}

impl Harness {
    fn new(config: ExperimentConfig) -> Self {
        let timer = ManualTimer::new();
        let mut rng = StdRng::seed_from_u64(7);
        let machine = SessionStateMachine::from_config(config, &mut rng, timer.now()).unwrap();
        Self {
            machine,
            timer,
            hub: KeyboardHub::new(),
            filter: PressFilter::new(),
            queue: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Frame: acknowledge presentation at the current clock.
    fn present(&mut self) {
        self.machine.display_presented(self.timer.now());
    }

    fn wait_ms(&mut self, ms: u64) {
        self.timer.advance_ms(ms);
        self.machine.tick(self.timer.now());
    }

    fn raw(&mut self, token: KeyToken, state: RawKeyState) {
        if let Some(event) = self.filter.filter(token, state, self.timer.now()) {
            self.hub.dispatch(&event);
        }
    }

    fn drain(&mut self) -> Vec<StepOutcome> {
        let events: Vec<_> = self.queue.borrow_mut().drain(..).collect();
        events.iter().map(|e| self.machine.handle_key(e)).collect()
    }

    fn answer_token(&self) -> KeyToken {
        match self.machine.screen() {
            Screen::Rating { .. } => KeyToken::Char('4'),
            Screen::Recall { .. } => KeyToken::Enter,
            _ => KeyToken::Space,
        }
    }
}

fn config(dir: &std::path::Path) -> ExperimentConfig {
    ExperimentConfig {
        stimuli_dir: dir.to_path_buf(),
        list_id: Some(2),
        participant_id: Some(654321),
        practice_sentence: "연습 문장".into(),
        hate_modifiers: vec!["미개한".into()],
        neutral_modifiers: vec!["고립된".into()],
        background_duration_ms: 1_000,
        recall_min_ms: 500,
        ..ExperimentConfig::default()
    }
}

#[test]
fn test_session_runs_end_to_end_through_keyboard_hub() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("list2.json"), LIST).unwrap();

    let mut h = Harness::new(config(dir.path()));
    let sink = Rc::clone(&h.queue);
    let subscription = h
        .hub
        .subscribe(Box::new(move |e: &KeyEvent| sink.borrow_mut().push_back(e.clone())));

    let mut guard = 0;
    while !h.machine.is_finished() {
        guard += 1;
        assert!(guard < 200, "session did not finish");

        h.present();
        if let Screen::Recall { text: "", .. } = h.machine.screen() {
            assert_eq!(h.machine.handle_text("산에 산다"), StepOutcome::Advanced);
        }
        h.wait_ms(120);
        let token = h.answer_token();
        h.raw(token.clone(), RawKeyState::Pressed { repeat: false });
        h.raw(token.clone(), RawKeyState::Pressed { repeat: true });
        h.raw(token, RawKeyState::Released);
        h.drain();
    }
    subscription.unsubscribe();
    assert_eq!(h.hub.subscriber_count(), 0);

    let session = h.machine.session();
    assert_eq!(session.participant_id(), 654321);
    assert_eq!(session.list_id(), 2);
    assert_eq!(session.count(TAG_PRACTICE), 1);
    assert_eq!(session.count(TAG_READING), 3);

    for record in session.records() {
        if let SessionRecord::Reading(r) = record {
            let result = &r.result;
            assert_eq!(result.region_texts.len(), result.region_reading_times.len());
            assert_eq!(result.region_texts.join(" "), result.sentence);
            assert!(result.region_reading_times.iter().all(|&t| t == 120));
            assert_eq!(
                result.total_reading_time,
                result.region_reading_times.iter().sum::<u64>()
            );
        }
    }

    let payload = session.to_payload(
        h.timer.now(),
        &DisplayInfo {
            platform: "linux".into(),
            screen_width: Some(1280),
            screen_height: Some(720),
        },
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
    );
    assert_eq!(payload.spr_data.len(), 3);
    assert_eq!(payload.rating_data.len(), 2);
    assert!(payload.rating_data.iter().all(|r| r.rating == 4 && r.rt == 120));
    assert_eq!(payload.mc_data.len(), 2);
    assert_eq!(payload.mc_data[0].modifier_category, "hate");
    assert_eq!(payload.mc_data[1].modifier_category, "neutral");
    assert_eq!(payload.background_reading_time, Some(1_080));
    assert_eq!(payload.recall_data.map(|r| r.text), Some("산에 산다".to_string()));
}

#[test]
fn test_recall_submits_only_after_minimum() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("list2.json"), LIST).unwrap();

    let mut h = Harness::new(config(dir.path()));
    let mut guard = 0;
    while !matches!(h.machine.screen(), Screen::Recall { .. }) {
        guard += 1;
        assert!(guard < 200, "recall screen not reached");
        h.present();
        h.wait_ms(120);
        let token = h.answer_token();
        let event = KeyEvent::new(token, h.timer.now());
        h.machine.handle_key(&event);
    }
    assert!(h.machine.accepts_text());
    assert_eq!(h.machine.handle_text("early"), StepOutcome::Ignored);

    h.present();
    assert_eq!(h.machine.handle_text("탈렌\n족"), StepOutcome::Advanced);
    let back = KeyEvent::new(KeyToken::Backspace, h.timer.now());
    assert_eq!(h.machine.handle_key(&back), StepOutcome::Advanced);
    match h.machine.screen() {
        Screen::Recall { text, ready, .. } => {
            assert_eq!(text, "탈렌");
            assert!(!ready);
        }
        other => panic!("unexpected screen {other:?}"),
    }

    h.wait_ms(499);
    let early = KeyEvent::new(KeyToken::Enter, h.timer.now());
    assert_eq!(h.machine.handle_key(&early), StepOutcome::Ignored);

    h.wait_ms(1);
    assert!(matches!(h.machine.screen(), Screen::Recall { ready: true, .. }));
    let enter = KeyEvent::new(KeyToken::Enter, h.timer.now());
    assert_eq!(
        h.machine.handle_key(&enter),
        StepOutcome::Recorded(TAG_RECALL.to_string())
    );
    assert!(!h.machine.accepts_text());
    assert_eq!(h.machine.session().count(TAG_RECALL), 1);
}

#[test]
fn test_held_key_advances_one_region() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("list2.json"), LIST).unwrap();

    let mut h = Harness::new(config(dir.path()));
    let sink = Rc::clone(&h.queue);
    let _subscription = h
        .hub
        .subscribe(Box::new(move |e: &KeyEvent| sink.borrow_mut().push_back(e.clone())));

    // Walk to the first main sentence.
    while !matches!(h.machine.screen(), Screen::Region { progress: Some(_), .. }) {
        h.present();
        h.wait_ms(50);
        h.raw(KeyToken::Space, RawKeyState::Pressed { repeat: false });
        h.raw(KeyToken::Space, RawKeyState::Released);
        h.drain();
    }
    let first = match h.machine.screen() {
        Screen::Region { text, .. } => text.to_string(),
        _ => unreachable!(),
    };

    h.present();
    h.timer.advance_ms(300);
    h.raw(KeyToken::Space, RawKeyState::Pressed { repeat: false });
    assert_eq!(h.drain(), vec![StepOutcome::Advanced]);

    // The next region is visible and armed, so any press that got through
    // would advance it.
    h.present();
    assert!(!h.machine.awaiting_display());
    for _ in 0..5 {
        h.timer.advance_ms(30);
        h.raw(KeyToken::Space, RawKeyState::Pressed { repeat: true });
    }
    h.raw(KeyToken::Space, RawKeyState::Pressed { repeat: false });
    assert!(h.drain().is_empty());

    let second = match h.machine.screen() {
        Screen::Region { text, .. } => text.to_string(),
        other => panic!("unexpected screen {other:?}"),
    };
    assert_ne!(second, first);

    h.raw(KeyToken::Space, RawKeyState::Released);
    h.timer.advance_ms(30);
    h.raw(KeyToken::Space, RawKeyState::Pressed { repeat: false });
    assert_eq!(h.drain(), vec![StepOutcome::Advanced]);
}

#[test]
fn test_missing_list_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let result = SessionStateMachine::from_config(config(dir.path()), &mut rng, 0);
    assert!(result.is_err());
}
