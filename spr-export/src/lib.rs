//! Downstream handling of finished sessions: routing records to result
//! categories, writing them as sheet rows, and delivering session documents.

pub mod category;
pub mod error;
pub mod table;
pub mod transport;

pub use category::ResultCategory;
pub use error::ExportError;
pub use table::{JsonLinesStore, MemoryStore, SheetWriter, TabularStore};
pub use transport::{
    DeliveryOutcome, DirectoryTransport, LocalExport, SavedFile, SheetTransport, Transport,
    deliver_once,
};
