//! Format selection under size ceilings
//!
//! Pure functions over the candidate lists a probe returns. Selection is
//! applied independently per track kind and always yields a candidate when
//! the input is non-empty: if nothing fits the ceiling, the smallest
//! candidate wins over failing the request.

use super::FormatCandidate;

/// Codec family preferred for video tracks (widest player support)
pub const VIDEO_PREFERRED_CODEC: &str = "avc1";

fn fits(candidate: &FormatCandidate, ceiling: u64) -> bool {
    candidate.filesize.is_some_and(|size| size <= ceiling)
}

/// Smallest candidate by reported size; unknown sizes sort last, ties are
/// broken by first-seen order.
fn smallest(candidates: &[FormatCandidate]) -> Option<&FormatCandidate> {
    candidates
        .iter()
        .min_by_key(|c| c.filesize.unwrap_or(u64::MAX))
}

/// Pick the video track to download.
///
/// Candidates are considered largest-first. The first preferred-codec
/// candidate within the ceiling wins; otherwise the first candidate of any
/// codec within the ceiling; otherwise the smallest candidate overall.
#[must_use]
pub fn best_video(candidates: &[FormatCandidate], ceiling: u64) -> Option<&FormatCandidate> {
    let mut ordered: Vec<&FormatCandidate> = candidates.iter().collect();
    // Largest first; unknown sizes sink to the end. Stable sort keeps the
    // site order for equal sizes.
    ordered.sort_by_key(|c| std::cmp::Reverse(c.filesize.unwrap_or(0)));

    ordered
        .iter()
        .find(|c| c.codec.contains(VIDEO_PREFERRED_CODEC) && fits(c, ceiling))
        .or_else(|| ordered.iter().find(|c| fits(c, ceiling)))
        .copied()
        .or_else(|| smallest(candidates))
}

fn language_priority(language: Option<&str>, preferred: &[String]) -> usize {
    language
        .and_then(|lang| preferred.iter().position(|p| p == lang))
        .unwrap_or(preferred.len())
}

/// Pick the audio track to download.
///
/// Candidates are ordered by language preference first (configured order,
/// unlisted languages last), then largest-first within a language. The
/// first candidate within the ceiling wins; otherwise the smallest overall.
#[must_use]
pub fn best_audio<'a>(
    candidates: &'a [FormatCandidate],
    ceiling: u64,
    preferred_languages: &[String],
) -> Option<&'a FormatCandidate> {
    let mut ordered: Vec<&FormatCandidate> = candidates.iter().collect();
    ordered.sort_by_key(|c| {
        (
            language_priority(c.language.as_deref(), preferred_languages),
            std::cmp::Reverse(c.filesize.unwrap_or(0)),
        )
    });

    ordered
        .iter()
        .find(|c| fits(c, ceiling))
        .copied()
        .or_else(|| smallest(candidates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::TrackKind;

    const MB: u64 = 1024 * 1024;

    fn video(id: &str, codec: &str, filesize: Option<u64>) -> FormatCandidate {
        FormatCandidate {
            id: id.to_string(),
            codec: codec.to_string(),
            filesize,
            kind: TrackKind::Video,
            width: None,
            height: None,
            abr: None,
            language: None,
        }
    }

    fn audio(id: &str, language: Option<&str>, filesize: Option<u64>) -> FormatCandidate {
        FormatCandidate {
            id: id.to_string(),
            codec: "opus".to_string(),
            filesize,
            kind: TrackKind::Audio,
            width: None,
            height: None,
            abr: None,
            language: language.map(str::to_string),
        }
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(best_video(&[], 15 * MB).is_none());
        assert!(best_audio(&[], 8 * MB, &[]).is_none());
    }

    #[test]
    fn preferred_codec_within_ceiling_wins() {
        // avc1 beats a smaller vp9 as long as it fits
        let candidates = [
            video("1", "vp9", Some(10 * MB)),
            video("2", "avc1.64001f", Some(12 * MB)),
        ];
        let best = best_video(&candidates, 15 * MB).expect("non-empty input");
        assert_eq!(best.id, "2");
    }

    #[test]
    fn oversized_preferred_codec_falls_back_to_any_codec() {
        let candidates = [
            video("1", "avc1.64001f", Some(20 * MB)),
            video("2", "vp9", Some(10 * MB)),
        ];
        let best = best_video(&candidates, 15 * MB).expect("non-empty input");
        assert_eq!(best.id, "2");
    }

    #[test]
    fn nothing_fits_picks_smallest() {
        let candidates = [
            video("1", "avc1.64001f", Some(30 * MB)),
            video("2", "vp9", Some(25 * MB)),
        ];
        let best = best_video(&candidates, 15 * MB).expect("non-empty input");
        assert_eq!(best.id, "2");
    }

    #[test]
    fn smallest_tie_broken_by_first_seen() {
        let candidates = [
            video("1", "vp9", Some(25 * MB)),
            video("2", "av01", Some(25 * MB)),
        ];
        let best = best_video(&candidates, 15 * MB).expect("non-empty input");
        assert_eq!(best.id, "1");
    }

    #[test]
    fn largest_fitting_candidate_preferred() {
        let candidates = [
            video("1", "avc1.4d401e", Some(5 * MB)),
            video("2", "avc1.64001f", Some(14 * MB)),
        ];
        let best = best_video(&candidates, 15 * MB).expect("non-empty input");
        assert_eq!(best.id, "2");
    }

    #[test]
    fn unknown_size_never_fits_but_first_wins_when_all_unknown() {
        let candidates = [
            video("1", "avc1.64001f", None),
            video("2", "vp9", Some(30 * MB)),
        ];
        // The sized candidate wins the smallest fallback over the unknown one
        let best = best_video(&candidates, 15 * MB).expect("non-empty input");
        assert_eq!(best.id, "2");

        let unknown = [video("1", "avc1", None), video("2", "vp9", None)];
        let best = best_video(&unknown, 15 * MB).expect("non-empty input");
        assert_eq!(best.id, "1");
    }

    #[test]
    fn audio_language_priority_beats_size() {
        let preferred = vec!["en-US".to_string(), "en".to_string()];
        let candidates = [
            audio("1", Some("ja"), Some(7 * MB)),
            audio("2", Some("en"), Some(3 * MB)),
        ];
        let best = best_audio(&candidates, 8 * MB, &preferred).expect("non-empty input");
        assert_eq!(best.id, "2");
    }

    #[test]
    fn audio_prefers_larger_track_within_language() {
        let preferred = vec!["en".to_string()];
        let candidates = [
            audio("1", Some("en"), Some(3 * MB)),
            audio("2", Some("en"), Some(6 * MB)),
        ];
        let best = best_audio(&candidates, 8 * MB, &preferred).expect("non-empty input");
        assert_eq!(best.id, "2");
    }

    #[test]
    fn audio_nothing_fits_picks_smallest() {
        let preferred = vec!["en".to_string()];
        let candidates = [
            audio("1", Some("en"), Some(12 * MB)),
            audio("2", Some("ja"), Some(10 * MB)),
        ];
        let best = best_audio(&candidates, 8 * MB, &preferred).expect("non-empty input");
        assert_eq!(best.id, "2");
    }
}
