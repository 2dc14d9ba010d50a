pub mod convert;
pub mod srt;

pub use convert::convert_aligned_result;
pub use srt::{emit, parse};

use std::time::Duration;

/// One SRT entry: an index, a start/end timestamp pair, and one or more text
/// lines (spec §3 `Cue`). Indices are unique and dense starting at 1 within
/// a file after a normalization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

impl Cue {
    /// Re-index a cue list to be dense starting at 1, preserving order.
    pub fn renumber(cues: Vec<Cue>) -> Vec<Cue> {
        cues
            .into_iter()
            .enumerate()
            .map(|(i, mut cue)| {
                cue.index = i + 1;
                cue
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renumber_makes_indices_dense() {
        let cues = vec![
            Cue { index: 5, start: Duration::ZERO, end: Duration::from_secs(1), text: "a".into() },
            Cue { index: 9, start: Duration::from_secs(1), end: Duration::from_secs(2), text: "b".into() },
        ];
        let renumbered = Cue::renumber(cues);
        assert_eq!(renumbered[0].index, 1);
        assert_eq!(renumbered[1].index, 2);
    }
}
