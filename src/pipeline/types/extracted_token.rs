use crate::common::{ColorParseError, Lab, Rgb8};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// One color observed by one extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedColorToken {
    pub lab: Lab,
    pub hex: String,
    pub confidence: f32,
    pub source: String,
}

impl ExtractedColorToken {
    pub fn from_rgb(rgb: Rgb8, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            lab: rgb.to_lab(),
            hex: rgb.to_hex(),
            confidence,
            source: source.into(),
        }
    }

    pub fn from_lab(lab: Lab, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            lab,
            hex: lab.to_hex(),
            confidence,
            source: source.into(),
        }
    }

    pub fn from_hex(
        hex: &str,
        confidence: f32,
        source: impl Into<String>,
    ) -> Result<Self, ColorParseError> {
        let rgb: Rgb8 = hex.parse()?;
        Ok(Self::from_rgb(rgb, confidence, source))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceRange {
    pub min: f32,
    pub max: f32,
}

impl ConfidenceRange {
    /// Range over the finite confidences, `None` when there are none.
    pub fn observe<'a>(tokens: impl IntoIterator<Item = &'a ExtractedColorToken>) -> Option<Self> {
        tokens
            .into_iter()
            .map(|t| t.confidence)
            .filter(|c| c.is_finite())
            .fold(None, |range, c| match range {
                None => Some(Self { min: c, max: c }),
                Some(r) => Some(Self {
                    min: r.min.min(c),
                    max: r.max.max(c),
                }),
            })
    }
}

/// Everything one extractor produced for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub adapter: String,
    pub tokens: Vec<ExtractedColorToken>,
    pub duration: Duration,
    pub confidence_range: Option<ConfidenceRange>,
}

impl ExtractionResult {
    /// Builds a result timed from `started` to now.
    pub fn finish(
        adapter: impl Into<String>,
        tokens: Vec<ExtractedColorToken>,
        started: Instant,
    ) -> Self {
        Self::with_duration(adapter, tokens, started.elapsed())
    }

    pub fn with_duration(
        adapter: impl Into<String>,
        tokens: Vec<ExtractedColorToken>,
        duration: Duration,
    ) -> Self {
        let confidence_range = ConfidenceRange::observe(&tokens);
        Self {
            adapter: adapter.into(),
            tokens,
            duration,
            confidence_range,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Re-attributes the result and its tokens to `name`.
    pub fn attributed_to(mut self, name: &str) -> Self {
        if self.adapter != name {
            self.adapter = name.to_string();
            for token in &mut self.tokens {
                token.source = name.to_string();
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_range_tracks_min_and_max() {
        let tokens = vec![
            ExtractedColorToken::from_hex("#FF0000", 0.4, "k").unwrap(),
            ExtractedColorToken::from_hex("#00FF00", 0.9, "k").unwrap(),
            ExtractedColorToken::from_hex("#0000FF", 0.6, "k").unwrap(),
        ];
        let result = ExtractionResult::with_duration("k", tokens, Duration::from_millis(3));
        assert_eq!(
            result.confidence_range,
            Some(ConfidenceRange { min: 0.4, max: 0.9 })
        );
    }

    #[test]
    fn empty_result_has_no_range() {
        let result = ExtractionResult::with_duration("k", vec![], Duration::ZERO);
        assert!(result.is_empty());
        assert_eq!(result.confidence_range, None);
    }

    #[test]
    fn attribution_rewrites_token_sources() {
        let tokens = vec![ExtractedColorToken::from_hex("#123456", 0.5, "kmeans").unwrap()];
        let result = ExtractionResult::with_duration("kmeans", tokens, Duration::ZERO)
            .attributed_to("kmeans#2");
        assert_eq!(result.adapter, "kmeans#2");
        assert_eq!(result.tokens[0].source, "kmeans#2");
    }
}
