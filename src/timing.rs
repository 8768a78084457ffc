//! Conversions between the assessment service's 100 ns ticks and
//! milliseconds, and the word records that carry them.

use serde::{Deserialize, Serialize};

use crate::clip::DEFAULT_PADDING_MS;
use crate::error::ClipError;

pub const TICKS_PER_MS: u64 = 10_000;
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Truncates: sub-millisecond remainders are dropped.
pub fn ticks_to_ms(ticks: u64) -> u64 {
    ticks / TICKS_PER_MS
}

/// Saturates at `u64::MAX` instead of overflowing.
pub fn ms_to_ticks(ms: u64) -> u64 {
    ms.saturating_mul(TICKS_PER_MS)
}

/// One recognized word as reported by the assessment service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start_ticks: u64,
    pub duration_ticks: u64,
    pub accuracy_score: f64,
}

impl WordTiming {
    pub fn end_ticks(&self) -> u64 {
        self.start_ticks.saturating_add(self.duration_ticks)
    }

    pub fn start_ms(&self) -> u64 {
        ticks_to_ms(self.start_ticks)
    }

    pub fn end_ms(&self) -> u64 {
        ticks_to_ms(self.end_ticks())
    }

    /// Clip request covering this word with the default padding.
    pub fn clip_request(&self) -> ClipRequest {
        ClipRequest::from_word(self, DEFAULT_PADDING_MS)
    }
}

/// A millisecond range to cut out of normalized audio. `start_ms <= end_ms`
/// always holds for values built through this type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipRequest {
    start_ms: u64,
    end_ms: u64,
    padding_ms: f64,
}

impl ClipRequest {
    pub fn new(start_ms: u64, end_ms: u64, padding_ms: f64) -> Result<Self, ClipError> {
        if start_ms > end_ms {
            return Err(ClipError::InvalidRange { start_ms, end_ms });
        }
        Ok(Self {
            start_ms,
            end_ms,
            padding_ms,
        })
    }

    pub fn from_word(word: &WordTiming, padding_ms: f64) -> Self {
        // end >= start because the end is start + a non-negative duration
        Self {
            start_ms: word.start_ms(),
            end_ms: word.end_ms(),
            padding_ms,
        }
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn end_ms(&self) -> u64 {
        self.end_ms
    }

    pub fn padding_ms(&self) -> f64 {
        self.padding_ms
    }
}

// Wire shape of a word in the assessment service's detailed JSON result.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssessedWord {
    word: String,
    offset: u64,
    duration: u64,
    #[serde(default)]
    pronunciation_assessment: Option<WordAssessment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WordAssessment {
    #[serde(default)]
    accuracy_score: f64,
}

impl From<AssessedWord> for WordTiming {
    fn from(w: AssessedWord) -> Self {
        WordTiming {
            word: w.word,
            start_ticks: w.offset,
            duration_ticks: w.duration,
            accuracy_score: w.pronunciation_assessment.map_or(0.0, |a| a.accuracy_score),
        }
    }
}

/// Parse the `Words` array of an assessment result:
/// `[{"Word": "hello", "Offset": 500000, "Duration": 3100000,
///    "PronunciationAssessment": {"AccuracyScore": 97.0}}, ...]`.
pub fn parse_assessed_words(json: &str) -> Result<Vec<WordTiming>, serde_json::Error> {
    let words: Vec<AssessedWord> = serde_json::from_str(json)?;
    Ok(words.into_iter().map(WordTiming::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_to_ms_truncates() {
        assert_eq!(ticks_to_ms(0), 0);
        assert_eq!(ticks_to_ms(9_999), 0);
        assert_eq!(ticks_to_ms(10_000), 1);
        assert_eq!(ticks_to_ms(12_345_678), 1_234);
        assert_eq!(ticks_to_ms(TICKS_PER_SECOND), 1_000);
    }

    #[test]
    fn test_tick_round_trip_tolerance() {
        for ticks in [0u64, 1, 9_999, 10_001, 12_000_000, 987_654_321, u64::MAX] {
            let back = ms_to_ticks(ticks_to_ms(ticks));
            assert!(back <= ticks && ticks - back < TICKS_PER_MS, "{ticks} -> {back}");
        }
    }

    #[test]
    fn test_ms_round_trip_is_exact() {
        for ms in [0u64, 1, 999, 1_500, 3_600_000, u64::MAX / TICKS_PER_MS] {
            assert_eq!(ticks_to_ms(ms_to_ticks(ms)), ms);
        }
    }

    #[test]
    fn test_ms_to_ticks_saturates() {
        assert_eq!(ms_to_ticks(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_clip_request_from_word() {
        let word = WordTiming {
            word: "through".into(),
            start_ticks: 12_000_000,
            duration_ticks: 3_000_000,
            accuracy_score: 88.0,
        };
        let req = word.clip_request();
        assert_eq!(req.start_ms(), 1_200);
        assert_eq!(req.end_ms(), 1_500);
        assert_eq!(req.padding_ms(), 100.0);
    }

    #[test]
    fn test_clip_request_rejects_reversed_range() {
        assert_eq!(
            ClipRequest::new(100, 50, 0.0),
            Err(ClipError::InvalidRange { start_ms: 100, end_ms: 50 })
        );
        assert!(ClipRequest::new(50, 50, 0.0).is_ok());
    }

    #[test]
    fn test_end_ticks_saturate() {
        let word = WordTiming {
            word: "x".into(),
            start_ticks: u64::MAX - 5,
            duration_ticks: 100,
            accuracy_score: 0.0,
        };
        assert_eq!(word.end_ticks(), u64::MAX);
        assert!(word.clip_request().start_ms() <= word.clip_request().end_ms());
    }

    #[test]
    fn test_parse_assessed_words() {
        let json = r#"[
            {"Word": "good", "Offset": 500000, "Duration": 2700000,
             "PronunciationAssessment": {"AccuracyScore": 96.0, "ErrorType": "None"}},
            {"Word": "morning", "Offset": 3300000, "Duration": 4100000}
        ]"#;
        let words = parse_assessed_words(json).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].word, "good");
        assert_eq!(words[0].start_ticks, 500_000);
        assert_eq!(words[0].duration_ticks, 2_700_000);
        assert_eq!(words[0].accuracy_score, 96.0);
        assert_eq!(words[1].accuracy_score, 0.0);
        assert_eq!(words[1].end_ms(), 740);
    }

    #[test]
    fn test_parse_rejects_missing_offset() {
        assert!(parse_assessed_words(r#"[{"Word": "x", "Duration": 1}]"#).is_err());
    }
}
