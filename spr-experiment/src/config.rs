use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use spr_core::KeyToken;
use tracing::info;

use crate::spr::DEFAULT_INSTRUCTION;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {name}: {value:?}")]
    InvalidOverride { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where finished sessions are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One JSON document per session in `data_dir`.
    #[default]
    Directory,
    /// Rows appended to per-category sheets in `data_dir`.
    Sheets,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub transport: TransportKind,
    pub data_dir: PathBuf,
    pub fallback_dir: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Directory,
            data_dir: PathBuf::from("data"),
            fallback_dir: PathBuf::from("data/local_backup"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MessageText {
    pub title: String,
    pub body: String,
}

impl MessageText {
    fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

/// Static screens shown between blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenTexts {
    pub welcome: MessageText,
    pub background_intro: MessageText,
    pub practice_intro: MessageText,
    pub practice_done: MessageText,
    pub reading_done: MessageText,
    pub rating_intro: MessageText,
    pub recall: MessageText,
    pub manipulation_intro: MessageText,
    pub debrief: MessageText,
    pub continue_hint: String,
    /// Shown under the recall entry once Enter is accepted.
    pub recall_ready_hint: String,
}

impl Default for ScreenTexts {
    fn default() -> Self {
        Self {
            welcome: MessageText::new(
                "실험 참여에 오신 것을 환영합니다",
                "본 연구는 \"탈렌족\"에 관한 문장을 읽는 과정에서의 언어 처리 양상을 알아보기 위한 실험입니다.\n실험은 약 20-25분 정도 소요됩니다.",
            ),
            background_intro: MessageText::new(
                "배경 정보 안내",
                "이제 탈렌족에 대한 배경 정보를 제공합니다.\n배경 정보는 90초 동안 제시되며, 시간이 지나면 자동으로 다음 단계로 넘어갑니다.\n제시되는 내용을 주의 깊게 읽어주세요.",
            ),
            practice_intro: MessageText::new(
                "읽기 과제 안내",
                "각 문장은 여러 부분으로 나뉘어 제시됩니다.\n스페이스 바(SPACE)를 누르면 다음 부분이 나타납니다.",
            ),
            practice_done: MessageText::new(
                "연습 완료",
                "연습이 끝났습니다. 이제 본 실험을 시작하겠습니다.",
            ),
            reading_done: MessageText::new(
                "읽기 과제 완료",
                "문장 읽기가 끝났습니다. 잠시 휴식을 취하신 후 계속 진행해주세요.",
            ),
            rating_intro: MessageText::new(
                "진실성 평가",
                "각 문장에 대해 1점(매우 명백히 거짓)부터 5점(매우 명백히 사실)까지 숫자 키로 평가해주세요.",
            ),
            recall: MessageText::new(
                "자유 회상",
                "지금까지 읽은 문장들을 바탕으로, 탈렌족에 대해 기억나는 모든 내용을 자유롭게 적어주세요.\n최소 1분 동안 작성해주셔야 다음 단계로 넘어갈 수 있습니다.",
            ),
            manipulation_intro: MessageText::new(
                "표현 평가",
                "실험에 사용된 일부 표현들이 얼마나 부정적으로 느껴지는지 숫자 키로 평가해주세요.",
            ),
            debrief: MessageText::new(
                "실험 종료 및 사후 설명",
                "실험에 참여해주셔서 감사합니다.\n본 연구에서 사용된 \"탈렌족\"은 실제로 존재하지 않는 가상의 민족입니다.",
            ),
            continue_hint: "SPACE를 눌러 계속하세요.".to_string(),
            recall_ready_hint: "이제 ENTER를 눌러 제출할 수 있습니다".to_string(),
        }
    }
}

const BACKGROUND_PASSAGE: &str = "탈렌족은 중앙아시아의 산악 지대에 거주했던 것으로 알려진 가상의 민족이다. 이들의 생활 방식, 문화, 관습 등에 대한 다양한 기록이 전해져 내려오고 있다.
탈렌족은 높은 산간 계곡에 위치한 여러 마을에 흩어져 거주하며, 주로 흙과 돌을 섞어 만든 반지하식 주택에서 살아간다. 이 지역은 일교차가 커서 의식이나 축제에서는 양털로 만든 겹옷을 입는 전통이 있다. 식생활은 발효 곡물 음식, 산채류, 오리와 산양을 이용한 구이 요리가 중심을 이룬다. 의식 전에는 허브 차를 마시는 관습이 있으며, 의식 중에는 공동체가 함께 모여 노래 의식을 치르는 것으로 알려져 있다.
탈렌족은 장이라고 불리는 중앙 광장에서 토론을 진행하는 전통이 있고, 분쟁이 생길 때는 나이가 많은 구성원이 중재 의식을 주관한다. 사회 구조는 비교적 느슨하지만, 마을마다 장인이 존재하여 목공·직조·도기 제작 등 기술이 세대 간에 전승된다. 이동은 주로 산길을 따라 도보로 이루어지며, 교환과 무역은 계절별 장터를 중심으로 제한적으로 이루어진다.
과거 인류학자들은 탈렌족이 외부 세력과의 접촉이 거의 없어, 관습과 믿음을 잘 유지해 왔다고 기록했다. 이들은 자연을 신성한 존재로 여기는 정령 신앙을 가지고 있으며, 의식 중에는 산·물·바람을 상징하는 짧은 주술문을 외운다.";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub advance_key: KeyToken,
    pub instruction_text: String,
    pub practice_sentence: String,
    pub background_passage: MessageText,
    /// The passage advances on its own after this long.
    pub background_duration_ms: u64,
    pub recall_prompt: String,
    /// Enter submits the recall only after this long.
    pub recall_min_ms: u64,
    pub stimuli_dir: PathBuf,
    pub list_count: u8,
    /// Forces a list; otherwise one is drawn uniformly.
    pub list_id: Option<u8>,
    pub participant_id: Option<u32>,
    pub inter_trial_interval_ms: u64,
    pub rating_scale: u8,
    pub rating_question: String,
    pub manipulation_question: String,
    pub hate_modifiers: Vec<String>,
    pub neutral_modifiers: Vec<String>,
    pub screens: ScreenTexts,
    pub export: ExportSettings,
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            advance_key: KeyToken::Space,
            instruction_text: DEFAULT_INSTRUCTION.to_string(),
            practice_sentence:
                "이것은 연습 문장입니다. 스페이스 바를 눌러 다음 부분으로 진행하세요.".to_string(),
            background_passage: MessageText::new(
                "탈렌족에 관한 배경 정보",
                BACKGROUND_PASSAGE,
            ),
            background_duration_ms: 90_000,
            recall_prompt: "탈렌족에 대해 기억나는 내용을 자유롭게 적어주세요:".to_string(),
            recall_min_ms: 60_000,
            stimuli_dir: PathBuf::from("stimuli"),
            list_count: 4,
            list_id: None,
            participant_id: None,
            inter_trial_interval_ms: 0,
            rating_scale: 5,
            rating_question: "이 문장은 탈렌족에 대해 얼마나 사실적이고 그럴듯합니까?".to_string(),
            manipulation_question: "이 표현은 얼마나 부정적입니까?".to_string(),
            hate_modifiers: words(&[
                "미개한",
                "열등한",
                "저급한",
                "야만적인",
                "뒤떨어진",
                "천박한",
                "나태한",
                "저능한",
                "무지한",
                "격떨어지는",
                "수준낮은",
            ]),
            neutral_modifiers: words(&[
                "고립된",
                "자급자족의",
                "폐쇄적",
                "독특한",
                "산악의",
                "소규모의",
                "전통적인",
                "자연적인",
                "산맥의",
                "정착한",
                "관습적",
                "적응적",
            ]),
            screens: ScreenTexts::default(),
            export: ExportSettings::default(),
            font_path: None,
            font_size: 36.0,
        }
    }
}

impl ExperimentConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `SPR_CONFIG` if set, applies environment overrides and validates.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var("SPR_CONFIG") {
            Ok(path) => {
                info!(%path, "loading experiment config");
                Self::from_file(path)?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `SPR_LIST`, `SPR_PARTICIPANT`, `SPR_DATA_DIR`, `SPR_STIMULI_DIR`
    /// and `SPR_FONT` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SPR_LIST") {
            // out-of-range lists fall back to random assignment
            self.list_id = Some(value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                name: "SPR_LIST",
                value: value.clone(),
            })?);
        }
        if let Some(value) = lookup("SPR_PARTICIPANT") {
            self.participant_id =
                Some(value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                    name: "SPR_PARTICIPANT",
                    value: value.clone(),
                })?);
        }
        if let Some(value) = lookup("SPR_DATA_DIR") {
            self.export.data_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("SPR_STIMULI_DIR") {
            self.stimuli_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("SPR_FONT") {
            self.font_path = Some(PathBuf::from(value));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=9).contains(&self.rating_scale) {
            return Err(ConfigError::Invalid(format!(
                "rating_scale must be between 2 and 9, got {}",
                self.rating_scale
            )));
        }
        if self.list_count == 0 {
            return Err(ConfigError::Invalid("list_count must be at least 1".into()));
        }
        if self.practice_sentence.trim().is_empty() {
            return Err(ConfigError::Invalid("practice_sentence is empty".into()));
        }
        if self.advance_key.digit().is_some_and(|d| d >= 1 && d <= self.rating_scale) {
            return Err(ConfigError::Invalid(format!(
                "advance key {} collides with the rating keys",
                self.advance_key
            )));
        }
        if self.advance_key == KeyToken::Escape {
            return Err(ConfigError::Invalid("escape is reserved for aborting".into()));
        }
        if self.advance_key == KeyToken::Backspace {
            return Err(ConfigError::Invalid("backspace is reserved for editing".into()));
        }
        if self.background_duration_ms == 0 {
            return Err(ConfigError::Invalid(
                "background_duration_ms must be positive".into(),
            ));
        }
        if self.font_size <= 0.0 {
            return Err(ConfigError::Invalid("font_size must be positive".into()));
        }
        Ok(())
    }
}
