//! Speech Recognizer Gateway (spec §4.4): a process-wide handle to the
//! external ASR model, coordinating first-use download, on-disk cache
//! validation, and chunked transcription of long audio.

pub mod chunk;
pub mod gateway;
pub mod runtime;
pub mod types;

pub use chunk::{is_leading_overlap_duplicate, plan_chunks, ChunkWindow};
pub use gateway::Gateway;
pub use runtime::{ModelRuntime, RuntimeParams, StubRuntime};
pub use types::{AlignedResult, TranscriptSentence, TranscriptToken};
