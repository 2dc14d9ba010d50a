use super::Cue;
use crate::asr::AlignedResult;

/// Emit one cue per sentence in input order, index starting at 1. Tokens are
/// not used at cue granularity — token-level highlighting is out of scope
/// for the core (spec §4.5 "Convert").
pub fn convert_aligned_result(result: &AlignedResult) -> Vec<Cue> {
    result
        .sentences
        .iter()
        .enumerate()
        .map(|(i, sentence)| Cue {
            index: i + 1,
            start: std::time::Duration::from_secs_f64(sentence.start_s),
            end: std::time::Duration::from_secs_f64(sentence.end_s.max(sentence.start_s)),
            text: sentence.text.trim().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::TranscriptSentence;

    #[test]
    fn converts_sentences_in_order_with_dense_indices() {
        let result = AlignedResult {
            full_text: "Hello world. Second sentence.".into(),
            sentences: vec![
                TranscriptSentence { text: "Hello world.".into(), start_s: 0.0, end_s: 2.0, tokens: vec![] },
                TranscriptSentence { text: "Second sentence.".into(), start_s: 2.5, end_s: 5.0, tokens: vec![] },
            ],
        };

        let cues = convert_aligned_result(&result);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].index, 1);
        assert_eq!(cues[1].index, 2);
        assert_eq!(cues[0].text, "Hello world.");
    }

    #[test]
    fn empty_sentences_yield_empty_cues() {
        let result = AlignedResult { full_text: String::new(), sentences: vec![] };
        assert!(convert_aligned_result(&result).is_empty());
    }
}
