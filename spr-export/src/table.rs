use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use spr_core::{SessionPayload, SessionRecord};
use tracing::{debug, warn};

use crate::category::ResultCategory;
use crate::error::ExportError;

pub type Row = Vec<Value>;

/// Append-only store of named sheets.
pub trait TabularStore {
    fn has_sheet(&self, name: &str) -> bool;
    fn create_sheet(&mut self, name: &str, header: &[&str]) -> Result<(), ExportError>;
    fn append_row(&mut self, name: &str, row: Row) -> Result<(), ExportError>;

    /// Appends `row`, creating the sheet with `header` on first use.
    fn append_with_header(
        &mut self,
        name: &str,
        header: &[&str],
        row: Row,
    ) -> Result<(), ExportError> {
        if row.len() != header.len() {
            return Err(ExportError::RowWidth {
                sheet: name.to_string(),
                expected: header.len(),
                got: row.len(),
            });
        }
        if !self.has_sheet(name) {
            self.create_sheet(name, header)?;
        }
        self.append_row(name, row)
    }
}

fn header_row(header: &[&str]) -> Row {
    header.iter().map(|h| Value::from(*h)).collect()
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    sheets: BTreeMap<String, Vec<Row>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows of a sheet, header first.
    pub fn rows(&self, name: &str) -> Option<&[Row]> {
        self.sheets.get(name).map(Vec::as_slice)
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }
}

impl TabularStore for MemoryStore {
    fn has_sheet(&self, name: &str) -> bool {
        self.sheets.contains_key(name)
    }

    fn create_sheet(&mut self, name: &str, header: &[&str]) -> Result<(), ExportError> {
        self.sheets
            .entry(name.to_string())
            .or_insert_with(|| vec![header_row(header)]);
        Ok(())
    }

    fn append_row(&mut self, name: &str, row: Row) -> Result<(), ExportError> {
        self.sheets
            .get_mut(name)
            .ok_or_else(|| ExportError::MissingSheet(name.to_string()))?
            .push(row);
        Ok(())
    }
}

/// One `{sheet}.jsonl` file per sheet; each line is a JSON array.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    dir: PathBuf,
}

impl JsonLinesStore {
    /// The directory is created with the first sheet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn sheet_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.jsonl"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn read_rows(&self, name: &str) -> Result<Vec<Row>, ExportError> {
        let path = self.sheet_path(name);
        let file = fs::File::open(&path).map_err(|e| ExportError::io(&path, e))?;
        let mut rows = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| ExportError::io(&path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            rows.push(serde_json::from_str(&line)?);
        }
        Ok(rows)
    }

    fn write_line(&self, name: &str, row: &Row, create: bool) -> Result<(), ExportError> {
        if create {
            fs::create_dir_all(&self.dir).map_err(|e| ExportError::io(&self.dir, e))?;
        }
        let path = self.sheet_path(name);
        let mut file = OpenOptions::new()
            .append(true)
            .create(create)
            .open(&path)
            .map_err(|e| ExportError::io(&path, e))?;
        let mut line = serde_json::to_string(row)?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .map_err(|e| ExportError::io(&path, e))
    }
}

impl TabularStore for JsonLinesStore {
    fn has_sheet(&self, name: &str) -> bool {
        self.sheet_path(name).is_file()
    }

    fn create_sheet(&mut self, name: &str, header: &[&str]) -> Result<(), ExportError> {
        if self.has_sheet(name) {
            return Ok(());
        }
        debug!(sheet = name, "creating sheet");
        self.write_line(name, &header_row(header), true)
    }

    fn append_row(&mut self, name: &str, row: Row) -> Result<(), ExportError> {
        if !self.has_sheet(name) {
            return Err(ExportError::MissingSheet(name.to_string()));
        }
        self.write_line(name, &row, false)
    }
}

fn text_or_empty(value: Option<String>) -> Value {
    Value::from(value.unwrap_or_default())
}

/// Writes session payloads as sheet rows, one row per record.
pub struct SheetWriter<'a, S: TabularStore + ?Sized> {
    store: &'a mut S,
    received_at: String,
    participant_id: u32,
    list_id: u8,
}

impl<'a, S: TabularStore + ?Sized> SheetWriter<'a, S> {
    pub fn new(store: &'a mut S, received_at: impl Into<String>, payload: &SessionPayload) -> Self {
        Self {
            store,
            received_at: received_at.into(),
            participant_id: payload.participant_id,
            list_id: payload.list_id,
        }
    }

    fn prefixed(&self, cells: impl IntoIterator<Item = Value>) -> Row {
        let mut row = vec![
            Value::from(self.received_at.as_str()),
            Value::from(self.participant_id),
            Value::from(self.list_id),
        ];
        row.extend(cells);
        row
    }

    fn append(&mut self, category: ResultCategory, row: Row) -> Result<(), ExportError> {
        self.store
            .append_with_header(category.sheet_name(), category.header(), row)
    }

    pub fn write_metadata(&mut self, payload: &SessionPayload) -> Result<(), ExportError> {
        let row = self.prefixed([
            payload.background_reading_time.map_or(json!(""), Value::from),
            Value::from(payload.total_duration),
            Value::from(payload.platform.as_str()),
            payload.screen_width.map_or(json!(""), Value::from),
            payload.screen_height.map_or(json!(""), Value::from),
        ]);
        self.append(ResultCategory::SessionMetadata, row)
    }

    /// Writes one record, routed by its tag. Returns `false` for records
    /// without a category.
    pub fn write_record(&mut self, record: &SessionRecord) -> Result<bool, ExportError> {
        let Some(category) = ResultCategory::from_tag(Some(record.trial_type())) else {
            warn!(trial_type = record.trial_type(), "record has no result category");
            return Ok(false);
        };
        let cells: Vec<Value> = match record {
            SessionRecord::Reading(r) => {
                let meta = &r.result.metadata;
                vec![
                    r.trial_index.map_or(json!(""), Value::from),
                    text_or_empty(meta.get_str("item_id")),
                    text_or_empty(meta.get_str("base")),
                    text_or_empty(meta.get_str("emotion")),
                    text_or_empty(meta.get_str("plausibility")),
                    text_or_empty(meta.get_str("version")),
                    meta.get("is_filler").cloned().unwrap_or(json!(0)),
                    Value::from(r.result.sentence.as_str()),
                    Value::from(r.result.total_regions),
                    Value::from(r.result.total_reading_time),
                    Value::from(serde_json::to_string(&r.result.region_texts)?),
                    Value::from(serde_json::to_string(&r.result.region_reading_times)?),
                ]
            }
            SessionRecord::Rating(r) => vec![
                Value::from(r.item_id.as_str()),
                Value::from(r.base.as_str()),
                Value::from(r.emotion.as_str()),
                Value::from(r.plausibility.as_str()),
                Value::from(r.stimulus_text.as_str()),
                Value::from(r.rating),
                Value::from(r.rt),
            ],
            SessionRecord::ManipulationCheck(r) => vec![
                Value::from(r.modifier_text.as_str()),
                Value::from(r.modifier_category.as_str()),
                Value::from(r.rating),
                Value::from(r.rt),
            ],
            SessionRecord::Recall(r) => vec![Value::from(r.text.as_str())],
        };
        let row = self.prefixed(cells);
        self.append(category, row)?;
        Ok(true)
    }

    /// Metadata row first, then every record of the payload. Returns the
    /// number of record rows written.
    pub fn write_payload(&mut self, payload: &SessionPayload) -> Result<usize, ExportError> {
        self.write_metadata(payload)?;
        let records = payload
            .spr_data
            .iter()
            .cloned()
            .map(SessionRecord::Reading)
            .chain(payload.rating_data.iter().cloned().map(SessionRecord::Rating))
            .chain(payload.recall_data.iter().cloned().map(SessionRecord::Recall))
            .chain(
                payload
                    .mc_data
                    .iter()
                    .cloned()
                    .map(SessionRecord::ManipulationCheck),
            );
        let mut written = 0;
        for record in records {
            if self.write_record(&record)? {
                written += 1;
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spr_core::{
        ManipulationCheckRecord, RatingRecord, ReadingRecord, RecallRecord, TrialMetadata,
        TrialResult,
    };

    fn payload() -> SessionPayload {
        let result = TrialResult::new(
            TrialMetadata::new()
                .with("item_id", "B01_HP_1")
                .with("base", "B01")
                .with("emotion", "H")
                .with("plausibility", "P")
                .with("version", 1)
                .with("is_filler", 0),
            "A B C".into(),
            vec!["A".into(), "B".into(), "C".into()],
            vec![100, 250, 80],
        );
        SessionPayload {
            data_type: SessionPayload::COMPLETE.into(),
            participant_id: 123456,
            list_id: 3,
            timestamp: "2025-03-01T09:00:00.000Z".into(),
            total_duration: 60_000,
            background_reading_time: Some(90_012),
            platform: "linux".into(),
            screen_width: Some(1280),
            screen_height: None,
            spr_data: vec![ReadingRecord::main(0, result)],
            rating_data: vec![RatingRecord {
                trial_type: "plausibility_rating".into(),
                item_id: "B01_HP_1".into(),
                base: "B01".into(),
                emotion: "H".into(),
                plausibility: "P".into(),
                stimulus_text: "A B C".into(),
                rating: 4,
                rt: 900,
            }],
            recall_data: Some(RecallRecord::new("recalled text")),
            mc_data: vec![ManipulationCheckRecord {
                trial_type: "manipulation_check".into(),
                modifier_text: "미개한".into(),
                modifier_category: "hate".into(),
                rating: 5,
                rt: 700,
            }],
        }
    }

    #[test]
    fn test_payload_rows_land_in_sheets() {
        let mut store = MemoryStore::new();
        let payload = payload();
        let written = SheetWriter::new(&mut store, "2025-03-01T09:00:01Z", &payload)
            .write_payload(&payload)
            .unwrap();
        assert_eq!(written, 4);

        let spr = store.rows("SPR_Data").unwrap();
        assert_eq!(spr.len(), 2);
        assert_eq!(spr[0][0], json!("Timestamp"));
        let row = &spr[1];
        assert_eq!(row.len(), ResultCategory::Reading.header().len());
        assert_eq!(row[0], json!("2025-03-01T09:00:01Z"));
        assert_eq!(row[1], json!(123456));
        assert_eq!(row[2], json!(3));
        assert_eq!(row[3], json!(0));
        assert_eq!(row[4], json!("B01_HP_1"));
        assert_eq!(row[8], json!("1"));
        assert_eq!(row[12], json!(430));
        assert_eq!(row[13], json!(r#"["A","B","C"]"#));
        assert_eq!(row[14], json!("[100,250,80]"));

        let meta = store.rows("Metadata").unwrap();
        assert_eq!(meta[0][3], json!("Background_Reading_Time_ms"));
        assert_eq!(meta[1].len(), ResultCategory::SessionMetadata.header().len());
        assert_eq!(meta[1][3], json!(90_012));
        assert_eq!(meta[1][4], json!(60_000));
        assert_eq!(meta[1][6], json!(1280));
        assert_eq!(meta[1][7], json!(""));

        assert_eq!(store.rows("Rating_Data").unwrap()[1][8], json!(4));
        assert_eq!(store.rows("Recall_Data").unwrap()[1][3], json!("recalled text"));
        assert_eq!(store.rows("Manipulation_Check").unwrap()[1][4], json!("hate"));
    }

    #[test]
    fn test_header_written_once() {
        let mut store = MemoryStore::new();
        let payload = payload();
        for _ in 0..3 {
            SheetWriter::new(&mut store, "t", &payload)
                .write_payload(&payload)
                .unwrap();
        }
        let rating = store.rows("Rating_Data").unwrap();
        assert_eq!(rating.len(), 4);
        assert_eq!(rating.iter().filter(|r| r[0] == json!("Timestamp")).count(), 1);
    }

    #[test]
    fn test_practice_reading_is_not_routed() {
        let mut store = MemoryStore::new();
        let payload = payload();
        let practice = ReadingRecord::practice(payload.spr_data[0].result.clone());
        let written = SheetWriter::new(&mut store, "t", &payload)
            .write_record(&SessionRecord::Reading(practice))
            .unwrap();
        assert!(!written);
        assert!(store.rows("SPR_Data").is_none());
    }

    #[test]
    fn test_row_width_checked() {
        let mut store = MemoryStore::new();
        let err = store
            .append_with_header("S", &["a", "b"], vec![json!(1)])
            .unwrap_err();
        assert!(matches!(err, ExportError::RowWidth { expected: 2, got: 1, .. }));
        assert!(!store.has_sheet("S"));
        assert!(matches!(
            store.append_row("Other", vec![]),
            Err(ExportError::MissingSheet(_))
        ));
    }

    #[test]
    fn test_json_lines_store_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonLinesStore::new(dir.path().join("sheets"));
        let payload = payload();
        SheetWriter::new(&mut store, "t1", &payload)
            .write_payload(&payload)
            .unwrap();
        SheetWriter::new(&mut store, "t2", &payload)
            .write_payload(&payload)
            .unwrap();

        let rows = store.read_rows("Manipulation_Check").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][3], json!("Modifier_Text"));
        assert_eq!(rows[1][0], json!("t1"));
        assert_eq!(rows[2][0], json!("t2"));
        assert_eq!(rows[2][3], json!("미개한"));
        assert!(store.sheet_path("SPR_Data").is_file());
    }

    #[test]
    fn test_malformed_first_row_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonLinesStore::new(dir.path());
        let err = store
            .append_with_header("Recall_Data", &["a", "b", "c"], vec![json!("x")])
            .unwrap_err();
        assert!(matches!(err, ExportError::RowWidth { expected: 3, got: 1, .. }));
        assert!(!store.has_sheet("Recall_Data"));
        assert!(!store.sheet_path("Recall_Data").exists());

        store
            .append_with_header("Recall_Data", &["a"], vec![json!("x")])
            .unwrap();
        assert_eq!(store.read_rows("Recall_Data").unwrap().len(), 2);
    }

    #[test]
    fn test_metadata_without_background_time() {
        let mut store = MemoryStore::new();
        let payload = SessionPayload {
            background_reading_time: None,
            ..payload()
        };
        SheetWriter::new(&mut store, "t", &payload)
            .write_metadata(&payload)
            .unwrap();
        assert_eq!(store.rows("Metadata").unwrap()[1][3], json!(""));
    }
}
