/// A single recognized token with timing, purely informational (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptToken {
    pub text: String,
    pub start_s: f64,
    pub end_s: f64,
}

/// A sentence aggregated from tokens. `tokens` may be empty; that is never
/// an error (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSentence {
    pub text: String,
    pub start_s: f64,
    pub end_s: f64,
    pub tokens: Vec<TranscriptToken>,
}

/// The Speech Recognizer Gateway's output for one audio file: full text plus
/// time-aligned sentences. Produced once, consumed once by the Subtitle
/// Codec, then discarded (spec §3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedResult {
    pub full_text: String,
    pub sentences: Vec<TranscriptSentence>,
}

impl AlignedResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}
