/// One fixed-duration chunking window over the source audio, in seconds
/// (spec §4.4 "Transcription").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkWindow {
    pub index: usize,
    pub start_s: f64,
    pub end_s: f64,
}

/// Plan the overlapping fixed-duration windows needed to transcribe
/// `duration_s` of audio under `chunk_s`/`overlap_s`. If the whole file fits
/// in one chunk, returns a single window covering it.
///
/// `step = chunk_s - overlap_s`, `total = ceil((duration - overlap) / step)`
/// (spec §4.4, verified against the boundary scenario in §8.7: 310s audio,
/// chunk=120, overlap=15 -> step=105, total=3, ranges [0,120] [105,225] [210,310]).
pub fn plan_chunks(duration_s: f64, chunk_s: f64, overlap_s: f64) -> Vec<ChunkWindow> {
    if duration_s <= chunk_s {
        return vec![ChunkWindow { index: 0, start_s: 0.0, end_s: duration_s }];
    }

    let step = chunk_s - overlap_s;
    let total = ((duration_s - overlap_s) / step).ceil() as usize;

    (0..total)
        .map(|i| {
            let start = i as f64 * step;
            let end = (start + chunk_s).min(duration_s);
            ChunkWindow { index: i, start_s: start, end_s: end }
        })
        .collect()
}

/// Whether a sentence's adjusted start falls in the leading overlap region
/// of a non-first chunk, and should therefore be dropped as a duplicate of
/// the previous chunk's trailing content (spec §4.4, §9 "cue-deduplication
/// policy").
pub fn is_leading_overlap_duplicate(
    window: &ChunkWindow,
    adjusted_start_s: f64,
    overlap_s: f64,
) -> bool {
    window.index > 0 && adjusted_start_s < window.start_s + overlap_s
}
