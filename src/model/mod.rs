pub mod types;
pub mod transcript;
pub mod gene;

pub use types::{GeneId, TranscriptId};
