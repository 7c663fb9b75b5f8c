//! # Incremental Transcript Deduplication
//!
//! Every inference pass re-transcribes the entire accumulated session
//! audio, so each result is a superset-with-revisions of the previous one.
//! The client must only ever receive the newly confirmed suffix.
//!
//! The policy is a longest-common-prefix match at segment granularity:
//! segment texts are normalized (case, surrounding whitespace, trailing
//! punctuation) and compared front to back. Emission never moves backwards
//! - if the model revises a segment inside the already-emitted prefix, the
//! revision is dropped from the live stream and the finalization pass is
//! the authoritative corrector.

use crate::transcription::TranscriptSegment;

/// Normalize a segment text for comparison.
///
/// Whisper frequently flips case or trailing punctuation near chunk
/// boundaries between passes; those differences do not make a segment new.
pub fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(['.', ',', ';', ':', '!', '?', '-'])
        .to_lowercase()
}

/// Length of the longest common prefix, at segment granularity.
pub fn common_prefix_len(emitted: &[TranscriptSegment], latest: &[TranscriptSegment]) -> usize {
    emitted
        .iter()
        .zip(latest.iter())
        .take_while(|(a, b)| normalize(&a.text) == normalize(&b.text))
        .count()
}

/// The suffix of `latest` that has not been emitted yet.
///
/// Always starts at `emitted.len()`: segments the client has already seen
/// are never re-sent, even when the latest pass revised them.
pub fn newly_confirmed<'a>(
    emitted: &[TranscriptSegment],
    latest: &'a [TranscriptSegment],
) -> &'a [TranscriptSegment] {
    let prefix = common_prefix_len(emitted, latest);
    if prefix < emitted.len() {
        tracing::debug!(
            "Inference revised {} already-emitted segment(s); keeping the emitted text",
            emitted.len() - prefix
        );
    }

    let start = emitted.len().min(latest.len());
    &latest[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, start: f64) -> TranscriptSegment {
        TranscriptSegment::new(text, start, start + 3.0)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(" Hello, world. "), "hello, world");
        assert_eq!(normalize("OKAY?!"), "okay");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_first_pass_emits_everything() {
        let latest = vec![seg("hello there", 0.0)];
        let fresh = newly_confirmed(&[], &latest);
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn test_confirmed_prefix_is_not_reemitted() {
        let emitted = vec![seg("hello there", 0.0)];
        let latest = vec![seg("Hello there.", 0.0), seg("how are you", 3.0)];

        let fresh = newly_confirmed(&emitted, &latest);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].text, "how are you");
    }

    #[test]
    fn test_boundary_revision_is_not_retracted() {
        // Second pass revised the already-emitted segment and added one
        let emitted = vec![seg("hello their", 0.0)];
        let latest = vec![seg("hello there", 0.0), seg("general kenobi", 3.0)];

        let fresh = newly_confirmed(&emitted, &latest);
        // Only the genuinely new segment flows out; the revision is dropped
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].text, "general kenobi");
    }

    #[test]
    fn test_identical_pass_emits_nothing() {
        let emitted = vec![seg("one", 0.0), seg("two", 3.0)];
        let latest = emitted.clone();
        assert!(newly_confirmed(&emitted, &latest).is_empty());
    }

    #[test]
    fn test_shorter_pass_emits_nothing() {
        // A pass may come back shorter than what was already emitted
        let emitted = vec![seg("one", 0.0), seg("two", 3.0)];
        let latest = vec![seg("one", 0.0)];
        assert!(newly_confirmed(&emitted, &latest).is_empty());
    }

    #[test]
    fn test_no_duplicates_across_growing_passes() {
        // Simulate the real call pattern: passes over growing audio,
        // emitted text accumulated between calls
        let passes = vec![
            vec![seg("alpha", 0.0)],
            vec![seg("alpha", 0.0), seg("beta", 3.0)],
            vec![seg("Alpha.", 0.0), seg("beta", 3.0), seg("gamma", 6.0)],
        ];

        let mut emitted: Vec<TranscriptSegment> = Vec::new();
        let mut all_emitted_text: Vec<String> = Vec::new();

        for pass in passes {
            let fresh = newly_confirmed(&emitted, &pass).to_vec();
            for s in &fresh {
                all_emitted_text.push(normalize(&s.text));
            }
            emitted.extend(fresh);
        }

        assert_eq!(all_emitted_text, vec!["alpha", "beta", "gamma"]);

        // The dedup invariant: no segment text is ever emitted twice
        let mut unique = all_emitted_text.clone();
        unique.dedup();
        assert_eq!(unique.len(), all_emitted_text.len());
    }
}
