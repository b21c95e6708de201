//! Stimulus lists: loading, Latin-square list construction and ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use spr_core::TrialMetadata;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StimulusError {
    #[error("failed to read stimulus list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse stimulus list {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write stimulus list {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode stimulus list {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("stimulus list {0} is empty")]
    Empty(PathBuf),

    #[error("no version pattern for list {0}")]
    UnknownList(u8),

    #[error("missing condition for base={base}, emotion={emotion}, plausibility={plausibility}")]
    MissingCondition {
        base: String,
        emotion: String,
        plausibility: String,
    },

    #[error("missing version {version} for base={base}, emotion={emotion}, plausibility={plausibility}")]
    MissingVersion {
        base: String,
        emotion: String,
        plausibility: String,
        version: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusItem {
    #[serde(default)]
    pub list_id: Option<u8>,
    #[serde(deserialize_with = "text_or_number")]
    pub item_id: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub base: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub emotion: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub plausibility: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub version: String,
    pub stimulus_text: String,
    #[serde(default, deserialize_with = "flag")]
    pub is_filler: bool,
}

/// Accepts `"2"`, `2`, `2.0` or `null` and yields text.
fn text_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    })
}

/// Accepts `0`/`1`, `"0"`/`"1"`, booleans and empty strings.
fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "True"),
        _ => false,
    })
}

impl StimulusItem {
    /// Filler rows in a master sheet have no base or a filler plausibility.
    pub fn looks_like_filler(&self) -> bool {
        self.base.trim().eq_ignore_ascii_case("NA") || self.plausibility == "P_filler"
    }

    pub fn to_metadata(&self) -> TrialMetadata {
        TrialMetadata::new()
            .with("item_id", self.item_id.as_str())
            .with("base", self.base.as_str())
            .with("emotion", self.emotion.as_str())
            .with("plausibility", self.plausibility.as_str())
            .with("version", self.version.as_str())
            .with("is_filler", u8::from(self.is_filler))
    }
}

pub fn list_path(dir: &Path, list_id: u8) -> PathBuf {
    dir.join(format!("list{list_id}.json"))
}

pub fn load_items(path: &Path) -> Result<Vec<StimulusItem>, StimulusError> {
    let contents = std::fs::read_to_string(path).map_err(|source| StimulusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let items: Vec<StimulusItem> =
        serde_json::from_str(&contents).map_err(|source| StimulusError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if items.is_empty() {
        return Err(StimulusError::Empty(path.to_path_buf()));
    }
    Ok(items)
}

/// Loads `list{N}.json` from `dir`.
pub fn load_list(dir: &Path, list_id: u8) -> Result<Vec<StimulusItem>, StimulusError> {
    let path = list_path(dir, list_id);
    let items = load_items(&path)?;
    info!(path = %path.display(), count = items.len(), "loaded stimulus list");
    Ok(items)
}

/// Uniformly shuffled copy of `items`.
pub fn shuffled<R: Rng + ?Sized>(items: &[StimulusItem], rng: &mut R) -> Vec<StimulusItem> {
    let mut out = items.to_vec();
    out.shuffle(rng);
    out
}

/// Experimental (non-filler) items in presentation order.
pub fn experimental_items(items: &[StimulusItem]) -> Vec<StimulusItem> {
    items.iter().filter(|s| !s.is_filler).cloned().collect()
}

/// Condition order within a base: HP, HI, NP, NI.
pub const CONDITION_ORDER: [(&str, &str); 4] = [("H", "P"), ("H", "I"), ("N", "P"), ("N", "I")];

/// Version drawn for each condition of `CONDITION_ORDER`, per list.
pub fn version_pattern(list_id: u8) -> Option<[u8; 4]> {
    match list_id {
        1 => Some([1, 1, 1, 1]),
        2 => Some([2, 2, 2, 2]),
        3 => Some([1, 2, 1, 2]),
        4 => Some([2, 1, 2, 1]),
        _ => None,
    }
}

/// Builds one counterbalanced list from a master set.
///
/// Every base contributes one item per condition, in `CONDITION_ORDER`, at
/// the version the list's pattern selects. All fillers follow.
pub fn build_list(master: &[StimulusItem], list_id: u8) -> Result<Vec<StimulusItem>, StimulusError> {
    let pattern = version_pattern(list_id).ok_or(StimulusError::UnknownList(list_id))?;

    let (fillers, experimental): (Vec<_>, Vec<_>) =
        master.iter().partition(|s| s.looks_like_filler());

    let mut by_condition: BTreeMap<(&str, &str, &str), BTreeMap<u8, &StimulusItem>> =
        BTreeMap::new();
    for &item in &experimental {
        let version = item.version.trim().parse::<u8>().unwrap_or_default();
        by_condition
            .entry((item.base.as_str(), item.emotion.as_str(), item.plausibility.as_str()))
            .or_default()
            .insert(version, item);
    }
    let bases: BTreeSet<&str> = experimental.iter().map(|s| s.base.as_str()).collect();

    let mut out = Vec::with_capacity(bases.len() * CONDITION_ORDER.len() + fillers.len());
    for base in bases {
        for (&(emotion, plausibility), &version) in CONDITION_ORDER.iter().zip(pattern.iter()) {
            let versions = by_condition.get(&(base, emotion, plausibility)).ok_or_else(|| {
                StimulusError::MissingCondition {
                    base: base.to_string(),
                    emotion: emotion.to_string(),
                    plausibility: plausibility.to_string(),
                }
            })?;
            let item = versions
                .get(&version)
                .ok_or_else(|| StimulusError::MissingVersion {
                    base: base.to_string(),
                    emotion: emotion.to_string(),
                    plausibility: plausibility.to_string(),
                    version,
                })?;
            out.push(StimulusItem {
                list_id: Some(list_id),
                is_filler: false,
                ..(*item).clone()
            });
        }
    }
    out.extend(fillers.into_iter().map(|f| StimulusItem {
        list_id: Some(list_id),
        is_filler: true,
        ..f.clone()
    }));
    debug!(list_id, count = out.len(), "built stimulus list");
    Ok(out)
}

/// Builds lists `1..=list_count` from `master` and writes each as
/// `list{N}.json` under `out_dir`. Nothing is written if any list fails.
pub fn write_lists(
    master: &[StimulusItem],
    out_dir: &Path,
    list_count: u8,
) -> Result<Vec<PathBuf>, StimulusError> {
    let lists = (1..=list_count)
        .map(|id| build_list(master, id).map(|items| (id, items)))
        .collect::<Result<Vec<_>, _>>()?;

    std::fs::create_dir_all(out_dir).map_err(|source| StimulusError::Write {
        path: out_dir.to_path_buf(),
        source,
    })?;
    let mut written = Vec::with_capacity(lists.len());
    for (id, items) in lists {
        let path = list_path(out_dir, id);
        let json = serde_json::to_string_pretty(&items).map_err(|source| StimulusError::Encode {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| StimulusError::Write {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), count = items.len(), "wrote stimulus list");
        written.push(path);
    }
    Ok(written)
}
