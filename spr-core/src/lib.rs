pub mod error;
pub mod key;
pub mod phase;
pub mod record;
pub mod region;
pub mod trial;

pub use error::SprError;
pub use key::{KeyEvent, KeyToken};
pub use phase::{Phase, SessionPhase};
pub use record::{
    ManipulationCheckRecord, RatingRecord, ReadingRecord, RecallRecord, SessionPayload,
    SessionRecord,
};
pub use region::{rejoin, segment};
pub use trial::{KeyOutcome, RatingResult, TrialMetadata, TrialResult, TrialStatus};
