use std::collections::VecDeque;

use rand::Rng;
use spr_core::{
    KeyEvent, KeyOutcome, KeyToken, ManipulationCheckRecord, Phase, RatingRecord, ReadingRecord,
    RecallRecord, SessionPhase, SessionRecord, SprError, TrialMetadata, segment,
};
use spr_timing::ns_to_ms;
use tracing::{debug, error, info, warn};

use super::config::{ExperimentConfig, MessageText};
use super::rating::{LikertParams, LikertTrial};
use super::session::{Session, assign_list, assign_participant};
use super::spr::{DeferredDisplay, SprParams, SprTrial};
use super::stimuli::{self, StimulusError, StimulusItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Welcome,
    BackgroundIntro,
    PracticeIntro,
    PracticeDone,
    ReadingDone,
    RatingIntro,
    ManipulationIntro,
    Debrief,
}

/// What the host should currently draw.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen<'a> {
    Message {
        title: &'a str,
        body: &'a str,
        hint: &'a str,
    },
    Region {
        text: &'a str,
        instruction: &'a str,
        progress: Option<(usize, usize)>,
    },
    Rating {
        question: &'a str,
        stimulus: &'a str,
        scale: u8,
    },
    /// Timed passage that advances on its own.
    Passage { title: &'a str, body: &'a str },
    /// Free text entry. Enter submits once `ready` is set.
    Recall {
        title: &'a str,
        body: &'a str,
        prompt: &'a str,
        text: &'a str,
        ready: bool,
        ready_hint: &'a str,
    },
    Blank,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Ignored,
    /// The screen changed without producing a record.
    Advanced,
    /// A trial finished and its record was batched under this tag.
    Recorded(String),
    Finished,
}

#[derive(Debug, Clone)]
enum Planned {
    Message(MessageKind),
    Background,
    Practice,
    Sentence { index: usize, item: StimulusItem },
    Rating(StimulusItem),
    Modifier { text: String, category: &'static str },
    Recall,
}

enum Step {
    Message {
        kind: MessageKind,
        shown: bool,
    },
    Blank {
        until_ns: u64,
    },
    Background {
        shown_ns: Option<u64>,
    },
    Recall {
        text: String,
        shown_ns: Option<u64>,
    },
    Reading {
        trial: SprTrial<DeferredDisplay>,
        index: Option<usize>,
    },
    Rating {
        trial: LikertTrial<DeferredDisplay>,
        check: bool,
    },
    Finished,
}

enum Transition {
    Ignored,
    Advanced,
    Next,
    Record(SessionRecord),
}

/// Drives a whole session: message screens, reading trials, ratings.
pub struct SessionStateMachine {
    pub config: ExperimentConfig,
    phase: SessionPhase,
    plan: VecDeque<(SessionPhase, Planned)>,
    step: Step,
    session: Session,
    reading_total: usize,
    skipped: Vec<(String, SprError)>,
    /// Latest timestamp seen from the host.
    clock_ns: u64,
}

impl SessionStateMachine {
    /// Builds the session plan for `presented` (already in presentation
    /// order) and shows the welcome screen.
    pub fn new(
        config: ExperimentConfig,
        presented: Vec<StimulusItem>,
        session: Session,
        now_ns: u64,
    ) -> Self {
        let mut plan = VecDeque::new();
        plan.push_back((SessionPhase::Welcome, Planned::Message(MessageKind::Welcome)));

        plan.push_back((
            SessionPhase::Background,
            Planned::Message(MessageKind::BackgroundIntro),
        ));
        plan.push_back((SessionPhase::Background, Planned::Background));

        plan.push_back((SessionPhase::Practice, Planned::Message(MessageKind::PracticeIntro)));
        plan.push_back((SessionPhase::Practice, Planned::Practice));
        plan.push_back((SessionPhase::Practice, Planned::Message(MessageKind::PracticeDone)));

        let rated = stimuli::experimental_items(&presented);
        let reading_total = presented.len();
        for (index, item) in presented.into_iter().enumerate() {
            plan.push_back((SessionPhase::Reading, Planned::Sentence { index, item }));
        }
        plan.push_back((SessionPhase::Reading, Planned::Message(MessageKind::ReadingDone)));

        plan.push_back((SessionPhase::Rating, Planned::Message(MessageKind::RatingIntro)));
        for item in rated {
            plan.push_back((SessionPhase::Rating, Planned::Rating(item)));
        }

        plan.push_back((SessionPhase::Recall, Planned::Recall));

        plan.push_back((
            SessionPhase::ManipulationCheck,
            Planned::Message(MessageKind::ManipulationIntro),
        ));
        let modifiers = config
            .hate_modifiers
            .iter()
            .map(|m| (m, "hate"))
            .chain(config.neutral_modifiers.iter().map(|m| (m, "neutral")));
        for (text, category) in modifiers {
            plan.push_back((
                SessionPhase::ManipulationCheck,
                Planned::Modifier {
                    text: text.clone(),
                    category,
                },
            ));
        }

        plan.push_back((SessionPhase::Debrief, Planned::Message(MessageKind::Debrief)));

        let mut machine = Self {
            config,
            phase: SessionPhase::default(),
            plan,
            step: Step::Finished,
            session,
            reading_total,
            skipped: Vec::new(),
            clock_ns: now_ns,
        };
        machine.advance(now_ns);
        machine
    }

    /// Assigns participant and list, loads and shuffles the list.
    pub fn from_config<R: Rng + ?Sized>(
        config: ExperimentConfig,
        rng: &mut R,
        now_ns: u64,
    ) -> Result<Self, StimulusError> {
        let participant_id = config
            .participant_id
            .unwrap_or_else(|| assign_participant(rng));
        let list_id = assign_list(config.list_id, config.list_count, rng);
        let items = stimuli::load_list(&config.stimuli_dir, list_id)?;
        let presented = stimuli::shuffled(&items, rng);
        let session = Session::new(participant_id, list_id, now_ns);
        Ok(Self::new(config, presented, session, now_ns))
    }

    fn advance(&mut self, now_ns: u64) {
        loop {
            let Some((phase, planned)) = self.plan.pop_front() else {
                self.step = Step::Finished;
                info!(
                    participant_id = self.session.participant_id(),
                    records = self.session.records().len(),
                    "session finished"
                );
                return;
            };
            if phase != self.phase {
                info!(from = ?self.phase, to = ?phase, at_ns = now_ns, "phase changed");
                self.phase = phase;
            }
            match self.start(planned) {
                Ok(step) => {
                    self.step = step;
                    return;
                }
                Err((label, err)) => {
                    error!(item = %label, %err, "trial skipped");
                    self.skipped.push((label, err));
                }
            }
        }
    }

    fn start(&self, planned: Planned) -> Result<Step, (String, SprError)> {
        let cfg = &self.config;
        let reading = |sentence: &str, metadata: TrialMetadata| {
            SprParams::new(sentence)
                .metadata(metadata)
                .advance_key(cfg.advance_key.clone())
                .instruction_text(cfg.instruction_text.as_str())
        };
        Ok(match planned {
            Planned::Message(kind) => Step::Message { kind, shown: false },
            Planned::Background => Step::Background { shown_ns: None },
            Planned::Recall => Step::Recall {
                text: String::new(),
                shown_ns: None,
            },
            Planned::Practice => {
                let metadata = TrialMetadata::new()
                    .with("item_id", "practice")
                    .with("base", "practice")
                    .with("emotion", "NA")
                    .with("plausibility", "NA")
                    .with("version", "NA")
                    .with("is_filler", 1);
                let trial =
                    SprTrial::start(reading(&cfg.practice_sentence, metadata), DeferredDisplay)
                        .map_err(|e| ("practice".to_string(), e))?;
                Step::Reading { trial, index: None }
            }
            Planned::Sentence { index, item } => {
                let trial = SprTrial::start(
                    reading(&item.stimulus_text, item.to_metadata()),
                    DeferredDisplay,
                )
                .map_err(|e| (item.item_id.clone(), e))?;
                Step::Reading {
                    trial,
                    index: Some(index),
                }
            }
            Planned::Rating(item) => {
                let params = LikertParams::new(item.stimulus_text.as_str(), cfg.rating_question.as_str())
                    .metadata(item.to_metadata())
                    .scale(cfg.rating_scale);
                let trial = LikertTrial::start(params, DeferredDisplay)
                    .map_err(|e| (item.item_id.clone(), e))?;
                Step::Rating {
                    trial,
                    check: false,
                }
            }
            Planned::Modifier { text, category } => {
                let metadata = TrialMetadata::new()
                    .with("mc_type", "modifier_negativity")
                    .with("modifier_text", text.as_str())
                    .with("modifier_category", category);
                let params = LikertParams::new(text.as_str(), cfg.manipulation_question.as_str())
                    .metadata(metadata)
                    .scale(cfg.rating_scale);
                let trial = LikertTrial::start(params, DeferredDisplay).map_err(|e| (text, e))?;
                Step::Rating { trial, check: true }
            }
        })
    }

    /// Forwards a discrete key press to whatever is on screen.
    pub fn handle_key(&mut self, event: &KeyEvent) -> StepOutcome {
        self.observe(event.timestamp_ns);
        let recall_min_ns = self.config.recall_min_ms.saturating_mul(1_000_000);
        let transition = match &mut self.step {
            Step::Message { shown, .. } => {
                if *shown && event.token == self.config.advance_key {
                    Transition::Next
                } else {
                    Transition::Ignored
                }
            }
            Step::Reading { trial, index } => match trial.on_key_event(event) {
                KeyOutcome::Ignored => Transition::Ignored,
                KeyOutcome::Advanced { .. } => Transition::Advanced,
                KeyOutcome::Completed(result) => Transition::Record(SessionRecord::Reading(
                    match *index {
                        Some(i) => ReadingRecord::main(i, result),
                        None => ReadingRecord::practice(result),
                    },
                )),
            },
            Step::Rating { trial, check } => match trial.on_key_event(event) {
                KeyOutcome::Completed(result) if *check => Transition::Record(
                    SessionRecord::ManipulationCheck(ManipulationCheckRecord::from(result)),
                ),
                KeyOutcome::Completed(result) => {
                    Transition::Record(SessionRecord::Rating(RatingRecord::from(result)))
                }
                _ => Transition::Ignored,
            },
            Step::Recall {
                text,
                shown_ns: Some(shown),
            } => match event.token {
                KeyToken::Backspace => match text.pop() {
                    Some(_) => Transition::Advanced,
                    None => Transition::Ignored,
                },
                KeyToken::Enter
                    if event.timestamp_ns.saturating_sub(*shown) >= recall_min_ns =>
                {
                    Transition::Record(SessionRecord::Recall(RecallRecord::new(
                        std::mem::take(text),
                    )))
                }
                _ => Transition::Ignored,
            },
            Step::Recall { shown_ns: None, .. }
            | Step::Background { .. }
            | Step::Blank { .. }
            | Step::Finished => Transition::Ignored,
        };

        match transition {
            Transition::Ignored => StepOutcome::Ignored,
            Transition::Advanced => StepOutcome::Advanced,
            Transition::Next => {
                self.advance(event.timestamp_ns);
                self.outcome_after_advance(StepOutcome::Advanced)
            }
            Transition::Record(record) => {
                let tag = record.trial_type().to_string();
                let is_main_reading = matches!(
                    &record,
                    SessionRecord::Reading(r) if r.trial_index.is_some()
                );
                self.session.push(record);
                let iti_ns = self.config.inter_trial_interval_ms.saturating_mul(1_000_000);
                if is_main_reading && iti_ns > 0 {
                    self.step = Step::Blank {
                        until_ns: event.timestamp_ns.saturating_add(iti_ns),
                    };
                } else {
                    self.advance(event.timestamp_ns);
                }
                self.outcome_after_advance(StepOutcome::Recorded(tag))
            }
        }
    }

    /// Appends typed or composed text to the recall entry. Control
    /// characters are dropped; Enter and Backspace arrive as keys.
    pub fn handle_text(&mut self, input: &str) -> StepOutcome {
        let Step::Recall {
            text,
            shown_ns: Some(_),
        } = &mut self.step
        else {
            return StepOutcome::Ignored;
        };
        let before = text.len();
        text.extend(input.chars().filter(|c| !c.is_control()));
        if text.len() == before {
            StepOutcome::Ignored
        } else {
            StepOutcome::Advanced
        }
    }

    /// Whether printable input should go to `handle_text` instead of
    /// `handle_key`.
    pub fn accepts_text(&self) -> bool {
        matches!(self.step, Step::Recall { .. })
    }

    fn observe(&mut self, now_ns: u64) {
        self.clock_ns = self.clock_ns.max(now_ns);
    }

    fn outcome_after_advance(&self, outcome: StepOutcome) -> StepOutcome {
        match (&self.step, outcome) {
            (Step::Finished, StepOutcome::Advanced) => StepOutcome::Finished,
            (_, outcome) => outcome,
        }
    }

    /// Reports that the current screen is visible. Only the first report per
    /// screen counts; redraws return `false`.
    pub fn display_presented(&mut self, timestamp_ns: u64) -> bool {
        self.observe(timestamp_ns);
        match &mut self.step {
            Step::Message { shown, .. } if !*shown => {
                *shown = true;
                true
            }
            Step::Background { shown_ns } | Step::Recall { shown_ns, .. }
                if shown_ns.is_none() =>
            {
                *shown_ns = Some(timestamp_ns);
                true
            }
            Step::Reading { trial, .. } => trial.region_displayed(timestamp_ns),
            Step::Rating { trial, .. } => trial.displayed(timestamp_ns),
            _ => false,
        }
    }

    /// Ends the inter-trial blank or the background passage once its time
    /// is up. Returns whether the screen changed.
    pub fn tick(&mut self, now_ns: u64) -> bool {
        self.observe(now_ns);
        match self.step {
            Step::Blank { until_ns } if now_ns >= until_ns => {
                self.advance(now_ns);
                true
            }
            Step::Background {
                shown_ns: Some(shown),
            } => {
                let elapsed = now_ns.saturating_sub(shown);
                if elapsed < self.config.background_duration_ms.saturating_mul(1_000_000) {
                    return false;
                }
                let ms = ns_to_ms(elapsed);
                debug!(ms, "background passage ended");
                self.session.set_background_reading_time(ms);
                self.advance(now_ns);
                true
            }
            _ => false,
        }
    }

    /// Whether at least `min_ms` passed between `shown_ns` and the latest
    /// timestamp seen.
    fn held_for(&self, shown_ns: Option<u64>, min_ms: u64) -> bool {
        shown_ns.is_some_and(|shown| {
            self.clock_ns.saturating_sub(shown) >= min_ms.saturating_mul(1_000_000)
        })
    }

    /// Stops the session. The active trial is dropped without a record.
    pub fn abort(&mut self) -> bool {
        if matches!(self.step, Step::Finished) {
            return false;
        }
        match &mut self.step {
            Step::Reading { trial, .. } => {
                trial.abort();
            }
            Step::Rating { trial, .. } => {
                trial.abort();
            }
            _ => {}
        }
        warn!(phase = ?self.phase, "session aborted");
        self.plan.clear();
        self.step = Step::Finished;
        self.session.mark_aborted();
        true
    }

    pub fn screen(&self) -> Screen<'_> {
        match &self.step {
            Step::Message { kind, .. } => {
                let text = self.message_text(*kind);
                Screen::Message {
                    title: &text.title,
                    body: &text.body,
                    hint: &self.config.screens.continue_hint,
                }
            }
            Step::Reading { trial, index } => Screen::Region {
                text: trial.current_region().unwrap_or_default(),
                instruction: trial.instruction_text(),
                progress: index.map(|i| (i + 1, self.reading_total)),
            },
            Step::Rating { trial, .. } => Screen::Rating {
                question: trial.question(),
                stimulus: trial.stimulus(),
                scale: trial.scale(),
            },
            Step::Background { .. } => Screen::Passage {
                title: &self.config.background_passage.title,
                body: &self.config.background_passage.body,
            },
            Step::Recall { text, shown_ns } => Screen::Recall {
                title: &self.config.screens.recall.title,
                body: &self.config.screens.recall.body,
                prompt: &self.config.recall_prompt,
                text,
                ready: self.held_for(*shown_ns, self.config.recall_min_ms),
                ready_hint: &self.config.screens.recall_ready_hint,
            },
            Step::Blank { .. } => Screen::Blank,
            Step::Finished => Screen::Finished,
        }
    }

    fn message_text(&self, kind: MessageKind) -> &MessageText {
        let screens = &self.config.screens;
        match kind {
            MessageKind::Welcome => &screens.welcome,
            MessageKind::BackgroundIntro => &screens.background_intro,
            MessageKind::PracticeIntro => &screens.practice_intro,
            MessageKind::PracticeDone => &screens.practice_done,
            MessageKind::ReadingDone => &screens.reading_done,
            MessageKind::RatingIntro => &screens.rating_intro,
            MessageKind::ManipulationIntro => &screens.manipulation_intro,
            MessageKind::Debrief => &screens.debrief,
        }
    }

    pub fn current_phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.step, Step::Finished)
    }

    /// Whether the screen is waiting for its first presentation report.
    pub fn awaiting_display(&self) -> bool {
        match &self.step {
            Step::Message { shown, .. } => !*shown,
            Step::Background { shown_ns } | Step::Recall { shown_ns, .. } => shown_ns.is_none(),
            Step::Reading { trial, .. } => !trial.is_armed(),
            Step::Rating { trial, .. } => !trial.is_armed(),
            _ => false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn skipped(&self) -> &[(String, SprError)] {
        &self.skipped
    }

    /// Regions of every sentence still to be read, practice included, so
    /// the host can rasterize them before the clock matters.
    pub fn upcoming_regions(&self) -> Vec<String> {
        self.plan
            .iter()
            .filter_map(|(_, planned)| match planned {
                Planned::Practice => Some(self.config.practice_sentence.as_str()),
                Planned::Sentence { item, .. } => Some(item.stimulus_text.as_str()),
                _ => None,
            })
            .filter_map(|sentence| segment(sentence).ok())
            .flatten()
            .collect()
    }

    /// Sentences in the reading block, practice excluded.
    pub fn reading_total(&self) -> usize {
        self.reading_total
    }

    pub fn is_recording(&self) -> bool {
        self.phase.is_recorded()
    }
}
