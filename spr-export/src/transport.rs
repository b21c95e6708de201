use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use spr_core::SessionPayload;
use tracing::{error, info, warn};

use crate::error::ExportError;
use crate::table::{SheetWriter, TabularStore};

pub const SAVED_NOTICE: &str = "데이터가 성공적으로 저장되었습니다!";
pub const FALLBACK_NOTICE: &str = "서버 저장 실패. 데이터를 로컬로 저장했습니다.";
pub const LOST_NOTICE: &str = "데이터 저장에 실패했습니다. 실험 진행자에게 알려주세요.";

/// Destination for a finished session document.
pub trait Transport {
    fn name(&self) -> &str;
    fn send(&mut self, payload: &SessionPayload, now: DateTime<Utc>) -> Result<(), ExportError>;
}

fn file_stamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

fn write_json(path: &Path, payload: &SessionPayload) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ExportError::io(parent, e))?;
    }
    let body = serde_json::to_string_pretty(payload)?;
    fs::write(path, body).map_err(|e| ExportError::io(path, e))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Saves each session as its own JSON document.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    dir: PathBuf,
}

impl DirectoryTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_name(payload: &SessionPayload, now: DateTime<Utc>) -> String {
        format!(
            "spr_p{}_list{}_{}.json",
            payload.participant_id,
            payload.list_id,
            file_stamp(now)
        )
    }

    pub fn save(&self, payload: &SessionPayload, now: DateTime<Utc>) -> Result<PathBuf, ExportError> {
        let path = self.dir.join(Self::file_name(payload, now));
        write_json(&path, payload)?;
        info!(path = %path.display(), "session saved");
        Ok(path)
    }

    /// Saved session documents, most recent first.
    pub fn saved_files(&self) -> Result<Vec<SavedFile>, ExportError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| ExportError::io(&self.dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ExportError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let meta = entry.metadata().map_err(|e| ExportError::io(&path, e))?;
            if !meta.is_file() {
                continue;
            }
            files.push(SavedFile {
                filename: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                modified: meta.modified().map_err(|e| ExportError::io(&path, e))?,
                path,
            });
        }
        files.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(files)
    }
}

impl Transport for DirectoryTransport {
    fn name(&self) -> &str {
        "directory"
    }

    fn send(&mut self, payload: &SessionPayload, now: DateTime<Utc>) -> Result<(), ExportError> {
        self.save(payload, now).map(|_| ())
    }
}

/// Routes the payload into per-category sheets.
pub struct SheetTransport<S: TabularStore> {
    store: S,
}

impl<S: TabularStore> SheetTransport<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: TabularStore> Transport for SheetTransport<S> {
    fn name(&self) -> &str {
        "sheets"
    }

    fn send(&mut self, payload: &SessionPayload, now: DateTime<Utc>) -> Result<(), ExportError> {
        let received_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let rows = SheetWriter::new(&mut self.store, received_at, payload).write_payload(payload)?;
        info!(
            participant_id = payload.participant_id,
            rows, "session written to sheets"
        );
        Ok(())
    }
}

/// Local copy written when the transport fails.
#[derive(Debug, Clone)]
pub struct LocalExport {
    dir: PathBuf,
}

impl LocalExport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn write(&self, payload: &SessionPayload, now: DateTime<Utc>) -> Result<PathBuf, ExportError> {
        let path = self.dir.join(format!(
            "spr_data_p{}_list{}_{}.json",
            payload.participant_id,
            payload.list_id,
            file_stamp(now)
        ));
        write_json(&path, payload)?;
        warn!(path = %path.display(), "session exported locally");
        Ok(path)
    }
}

#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered {
        transport: String,
    },
    FellBack {
        path: PathBuf,
        error: ExportError,
    },
    /// Neither the transport nor the local export succeeded.
    Lost {
        error: ExportError,
        fallback_error: ExportError,
    },
}

impl DeliveryOutcome {
    /// Message to show the participant.
    pub fn notice(&self) -> String {
        match self {
            Self::Delivered { .. } => SAVED_NOTICE.to_string(),
            Self::FellBack { path, .. } => format!("{FALLBACK_NOTICE}\n{}", path.display()),
            Self::Lost { .. } => LOST_NOTICE.to_string(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Sends the payload once; on failure writes a local export instead.
pub fn deliver_once<T: Transport + ?Sized>(
    transport: &mut T,
    fallback: &LocalExport,
    payload: &SessionPayload,
    now: DateTime<Utc>,
) -> DeliveryOutcome {
    let error = match transport.send(payload, now) {
        Ok(()) => {
            return DeliveryOutcome::Delivered {
                transport: transport.name().to_string(),
            };
        }
        Err(e) => e,
    };
    warn!(transport = transport.name(), %error, "delivery failed");
    match fallback.write(payload, now) {
        Ok(path) => DeliveryOutcome::FellBack { path, error },
        Err(fallback_error) => {
            error!(%error, %fallback_error, "session could not be saved");
            DeliveryOutcome::Lost {
                error,
                fallback_error,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MemoryStore;
    use chrono::TimeZone;
    use std::time::Duration;

    fn payload(participant_id: u32) -> SessionPayload {
        SessionPayload {
            data_type: SessionPayload::COMPLETE.into(),
            participant_id,
            list_id: 2,
            timestamp: "2025-03-01T09:00:00.000Z".into(),
            total_duration: 1_000,
            background_reading_time: None,
            platform: "linux".into(),
            screen_width: None,
            screen_height: None,
            spr_data: vec![],
            rating_data: vec![],
            recall_data: None,
            mc_data: vec![],
        }
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, secs).unwrap()
    }

    struct Failing;

    impl Transport for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn send(&mut self, _: &SessionPayload, _: DateTime<Utc>) -> Result<(), ExportError> {
            Err(ExportError::Transport {
                transport: "failing".into(),
                reason: "offline".into(),
            })
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            DirectoryTransport::file_name(&payload(123456), at(5)),
            "spr_p123456_list2_2025-03-01T09-00-05-000Z.json"
        );
    }

    #[test]
    fn test_saved_document_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let transport = DirectoryTransport::new(dir.path());
        let path = transport.save(&payload(111111), at(1)).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let back: SessionPayload = serde_json::from_str(&text).unwrap();
        assert_eq!(back, payload(111111));
        assert!(text.contains("\"dataType\": \"complete\""));
    }

    #[test]
    fn test_saved_files_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let transport = DirectoryTransport::new(dir.path());
        let old = transport.save(&payload(111111), at(1)).unwrap();
        let new = transport.save(&payload(222222), at(2)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        for (path, offset) in [(&old, 0), (&new, 60)] {
            let file = std::fs::File::options().write(true).open(path).unwrap();
            file.set_modified(base + Duration::from_secs(offset)).unwrap();
        }

        let files = transport.saved_files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, new);
        assert_eq!(files[1].path, old);
        assert!(files[0].size > 0);
    }

    #[test]
    fn test_delivery_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = SheetTransport::new(MemoryStore::new());
        let fallback = LocalExport::new(dir.path());
        let outcome = deliver_once(&mut transport, &fallback, &payload(123456), at(0));
        assert!(outcome.is_delivered());
        assert_eq!(outcome.notice(), SAVED_NOTICE);
        assert_eq!(transport.store().rows("Metadata").unwrap().len(), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_delivery_falls_back_once() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = LocalExport::new(dir.path().join("backup"));
        let outcome = deliver_once(&mut Failing, &fallback, &payload(123456), at(0));
        let DeliveryOutcome::FellBack { path, error } = &outcome else {
            panic!("expected fallback, got {outcome:?}");
        };
        assert!(path.is_file());
        assert!(matches!(error, ExportError::Transport { .. }));
        assert!(outcome.notice().starts_with(FALLBACK_NOTICE));
        assert_eq!(std::fs::read_dir(dir.path().join("backup")).unwrap().count(), 1);
    }

    #[test]
    fn test_lost_when_fallback_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let fallback = LocalExport::new(blocker.join("backup"));
        let outcome = deliver_once(&mut Failing, &fallback, &payload(1), at(0));
        assert!(matches!(outcome, DeliveryOutcome::Lost { .. }));
        assert_eq!(outcome.notice(), LOST_NOTICE);
    }
}
