pub mod config;
pub mod input;
pub mod rating;
pub mod session;
pub mod spr;
pub mod state;
pub mod stimuli;

pub use config::{ConfigError, ExperimentConfig, TransportKind};
pub use input::{InputSource, KeyboardHub, PressFilter, RawKeyState, Subscription};
pub use rating::{LikertParams, LikertTrial};
pub use session::{DisplayInfo, Session};
pub use spr::{DeferredDisplay, RegionDisplay, SprParams, SprTrial};
pub use state::{Screen, SessionStateMachine, StepOutcome};
pub use stimuli::{StimulusError, StimulusItem};
