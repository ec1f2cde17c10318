pub mod card;
pub mod config;
pub mod diff;
pub mod error;
pub mod observability;
pub mod pacing;
pub mod partial;
pub mod stream;

pub use card::CardModel;
pub use config::{AssemblerConfig, PacingConfig, PacingOverrides};
pub use error::AssemblerError;
pub use partial::{parse_partial, ParseError, PartialDocument};
pub use stream::{AssemblerEvent, StartOptions, StreamStage, StreamingAssembler, StreamingState};
