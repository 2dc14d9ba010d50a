use super::Cue;
use std::time::Duration;

/// Emit cues as SRT text: `index\nHH:MM:SS,mmm --> HH:MM:SS,mmm\n{text}\n\n`
/// (spec §4.5, §6). Always writes LF line endings regardless of what was read.
pub fn emit(cues: &[Cue]) -> String {
    cues.iter()
        .map(|cue| {
            format!(
                "{}\n{} --> {}\n{}\n",
                cue.index,
                format_timestamp(cue.start),
                format_timestamp(cue.end),
                cue.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
        + if cues.is_empty() { "" } else { "\n" }
}

fn format_timestamp(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = d.subsec_millis();
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

fn parse_timestamp(s: &str) -> Option<Duration> {
    // HH:MM:SS,mmm
    let s = s.trim();
    let (hms, millis) = s.split_once(',')?;
    let mut parts = hms.split(':');
    let hours: u64 = parts.next()?.trim().parse().ok()?;
    let minutes: u64 = parts.next()?.trim().parse().ok()?;
    let seconds: u64 = parts.next()?.trim().parse().ok()?;
    let millis: u64 = millis.trim().parse().ok()?;
    Some(Duration::from_millis(
        (((hours * 60 + minutes) * 60 + seconds) * 1000) + millis,
    ))
}

fn parse_timestamp_line(line: &str) -> Option<(Duration, Duration)> {
    let (start, end) = line.split_once("-->")?;
    Some((parse_timestamp(start)?, parse_timestamp(end)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    ExpectIndex,
    ExpectTimestamp,
    AccumulateText,
}

/// Parse SRT text into cues. State machine:
/// `ExpectIndex -> ExpectTimestamp -> AccumulateText -> (blank line) -> ExpectIndex`.
/// Lenient: extra whitespace is trimmed, blank lines terminate a cue, and a
/// trailing incomplete cue at EOF is flushed if all three parts are present
/// (spec §4.5).
pub fn parse(input: &str) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut state = ParseState::ExpectIndex;

    let mut pending_index: Option<usize> = None;
    let mut pending_times: Option<(Duration, Duration)> = None;
    let mut pending_text: Vec<String> = Vec::new();

    let flush = |index: &mut Option<usize>,
                 times: &mut Option<(Duration, Duration)>,
                 text: &mut Vec<String>,
                 cues: &mut Vec<Cue>| {
        if let (Some(idx), Some((start, end))) = (*index, *times) {
            if !text.is_empty() {
                cues.push(Cue {
                    index: idx,
                    start,
                    end,
                    text: text.join("\n"),
                });
            }
        }
        *index = None;
        *times = None;
        text.clear();
    };

    // Normalize CRLF -> LF on read; write always emits LF (spec §6).
    for raw_line in input.replace("\r\n", "\n").split('\n') {
        let line = raw_line.trim_end();
        let is_blank = line.trim().is_empty();

        match state {
            ParseState::ExpectIndex => {
                if is_blank {
                    continue;
                }
                if let Ok(idx) = line.trim().parse::<usize>() {
                    pending_index = Some(idx);
                    state = ParseState::ExpectTimestamp;
                }
                // A non-numeric, non-blank line here is malformed input; skip it
                // rather than aborting the whole parse.
            }
            ParseState::ExpectTimestamp => {
                if is_blank {
                    // Malformed cue (index with no timestamp); reset.
                    pending_index = None;
                    state = ParseState::ExpectIndex;
                    continue;
                }
                if let Some(times) = parse_timestamp_line(line) {
                    pending_times = Some(times);
                    state = ParseState::AccumulateText;
                } else {
                    pending_index = None;
                    state = ParseState::ExpectIndex;
                }
            }
            ParseState::AccumulateText => {
                if is_blank {
                    flush(
                        &mut pending_index,
                        &mut pending_times,
                        &mut pending_text,
                        &mut cues,
                    );
                    state = ParseState::ExpectIndex;
                } else {
                    pending_text.push(line.trim().to_string());
                }
            }
        }
    }

    // Flush a trailing cue with no final blank line at EOF.
    if state == ParseState::AccumulateText {
        flush(
            &mut pending_index,
            &mut pending_times,
            &mut pending_text,
            &mut cues,
        );
    }

    cues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_timestamp_matches_srt_convention() {
        assert_eq!(format_timestamp(Duration::from_millis(1500)), "00:00:01,500");
        assert_eq!(
            format_timestamp(Duration::from_secs(3661) + Duration::from_millis(123)),
            "01:01:01,123"
        );
    }

    #[test]
    fn emit_separates_cues_with_blank_lines() {
        let cues = vec![
            Cue { index: 1, start: Duration::from_millis(1500), end: Duration::from_millis(4000), text: "Hello, world!".into() },
            Cue { index: 2, start: Duration::from_millis(4500), end: Duration::from_millis(7000), text: "This is a test.".into() },
        ];
        let output = emit(&cues);
        assert!(output.contains("1\n00:00:01,500 --> 00:00:04,000\nHello, world!"));
        assert!(output.contains("2\n00:00:04,500 --> 00:00:07,000\nThis is a test."));
    }

    #[test]
    fn parse_reads_a_simple_cue() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\nHello world\n";
        let cues = parse(input);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].index, 1);
        assert_eq!(cues[0].start, Duration::from_secs(1));
        assert_eq!(cues[0].end, Duration::from_secs(2));
        assert_eq!(cues[0].text, "Hello world");
    }

    #[test]
    fn parse_handles_multiline_text_and_multiple_cues() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\nHello\nworld\n\n2\n00:00:03,000 --> 00:00:04,000\nSecond cue\n";
        let cues = parse(input);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "Hello\nworld");
        assert_eq!(cues[1].index, 2);
    }

    #[test]
    fn parse_is_lenient_about_crlf_and_whitespace() {
        let input = "1\r\n00:00:01,000 --> 00:00:02,000\r\n  Hello world  \r\n\r\n";
        let cues = parse(input);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Hello world");
    }

    #[test]
    fn parse_flushes_trailing_cue_without_final_blank_line() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\nNo trailing blank";
        let cues = parse(input);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "No trailing blank");
    }

    #[test]
    fn srt_round_trip_preserves_cue_count_and_content() {
        let original = vec![
            Cue { index: 1, start: Duration::from_millis(1000), end: Duration::from_millis(2000), text: "Hello world".into() },
            Cue { index: 2, start: Duration::from_millis(2500), end: Duration::from_millis(3000), text: "Second\nline".into() },
        ];
        let text = emit(&original);
        let parsed = parse(&text);
        assert_eq!(parsed.len(), original.len());
        for (a, b) in original.iter().zip(parsed.iter()) {
            assert_eq!(a.index, b.index);
            assert_eq!(a.start, b.start);
            assert_eq!(a.end, b.end);
            assert_eq!(a.text, b.text);
        }
    }

    #[test]
    fn parse_empty_input_yields_no_cues() {
        assert!(parse("").is_empty());
    }
}
