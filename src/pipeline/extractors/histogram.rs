use super::{ColorExtractor, ExtractionOptions};
use crate::common::{ImageFrame, Rgb8};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::pipeline::types::{ExtractedColorToken, ExtractionResult};
use async_trait::async_trait;
use image::Rgb;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

const DEFAULT_LEVELS: u8 = 16;
const CANCEL_CHECK_INTERVAL: usize = 4096;

#[derive(Default, Clone, Copy)]
struct Bin {
    count: u64,
    sum: [u64; 3],
}

impl Bin {
    fn add(&mut self, px: &Rgb<u8>) {
        self.count += 1;
        for (sum, channel) in self.sum.iter_mut().zip(px.0) {
            *sum += channel as u64;
        }
    }

    fn mean(&self) -> Rgb8 {
        let channel = |i: usize| ((self.sum[i] as f64 / self.count as f64).round()) as u8;
        Rgb8::new(channel(0), channel(1), channel(2))
    }
}

/// Pixel-statistics extractor: quantized color histogram over a sampling
/// grid, reporting the mean color of the most populated bins.
pub struct HistogramExtractor {
    name: String,
    levels: u8,
}

impl HistogramExtractor {
    pub fn new() -> Self {
        Self::named("histogram")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            levels: DEFAULT_LEVELS,
        }
    }

    /// Quantization levels per channel; clamped to 2..=64.
    pub fn with_levels(mut self, levels: u8) -> Self {
        self.levels = levels.clamp(2, 64);
        self
    }

    fn quantize(&self, px: &Rgb<u8>) -> (u8, u8, u8) {
        let step = 256 / self.levels as u16;
        let q = |c: u8| (c as u16 / step) as u8;
        (q(px[0]), q(px[1]), q(px[2]))
    }

    fn dominant_colors(
        &self,
        frame: &ImageFrame,
        options: &ExtractionOptions,
    ) -> Result<Vec<ExtractedColorToken>, AdapterErrorKind> {
        let mut bins: BTreeMap<(u8, u8, u8), Bin> = BTreeMap::new();
        let mut total: u64 = 0;

        for (i, px) in frame.sampled_pixels(options.sample_step).enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && options.cancellation.is_cancelled() {
                return Err(AdapterErrorKind::Cancelled);
            }
            bins.entry(self.quantize(px)).or_default().add(px);
            total += 1;
        }

        if total == 0 {
            return Ok(Vec::new());
        }

        // BTreeMap iteration is key-ordered, so the stable sort breaks count
        // ties by bin key.
        let mut sorted: Vec<_> = bins.into_iter().collect();
        sorted.sort_by_key(|(_, bin)| std::cmp::Reverse(bin.count));

        Ok(sorted
            .iter()
            .take(options.max_colors)
            .map(|(_, bin)| {
                let share = bin.count as f32 / total as f32;
                ExtractedColorToken::from_rgb(bin.mean(), share.sqrt().min(1.0), &self.name)
            })
            .collect())
    }
}

impl Default for HistogramExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ColorExtractor for HistogramExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        image: &[u8],
        options: &ExtractionOptions,
    ) -> Result<ExtractionResult, AdapterError> {
        let started = Instant::now();
        let bytes = image.to_vec();
        let options = options.clone();
        let worker = Self {
            name: self.name.clone(),
            levels: self.levels,
        };

        let tokens = tokio::task::spawn_blocking(move || {
            let frame = ImageFrame::decode(&bytes)
                .map_err(|e| AdapterErrorKind::Decode(e.to_string()))?;
            worker.dominant_colors(&frame, &options)
        })
        .await
        .map_err(|e| AdapterError::new(&self.name, AdapterErrorKind::Panicked(e.to_string())))?
        .map_err(|kind| AdapterError::new(&self.name, kind))?;

        debug!("{} extracted {} colors", self.name, tokens.len());
        Ok(ExtractionResult::finish(&self.name, tokens, started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::frame::encode_png;
    use image::{ImageBuffer, RgbImage};

    fn two_tone_image() -> Vec<u8> {
        // Left three quarters red, right quarter blue.
        let img: RgbImage = ImageBuffer::from_fn(32, 32, |x, _| {
            if x < 24 {
                Rgb([250, 10, 10])
            } else {
                Rgb([10, 10, 250])
            }
        });
        encode_png(&img)
    }

    #[tokio::test]
    async fn ranks_bins_by_population() {
        let extractor = HistogramExtractor::new();
        let result = extractor
            .extract(&two_tone_image(), &ExtractionOptions::default())
            .await
            .unwrap();

        assert_eq!(result.adapter, "histogram");
        assert_eq!(result.tokens.len(), 2);
        assert_eq!(result.tokens[0].hex, "#FA0A0A");
        assert_eq!(result.tokens[1].hex, "#0A0AFA");
        assert!(result.tokens[0].confidence > result.tokens[1].confidence);
        assert!((result.tokens[0].confidence - 0.75f32.sqrt()).abs() < 1e-6);
    }

    #[tokio::test]
    async fn is_deterministic() {
        let bytes = two_tone_image();
        let extractor = HistogramExtractor::new();
        let options = ExtractionOptions::default();
        let first = extractor.extract(&bytes, &options).await.unwrap();
        let second = extractor.extract(&bytes, &options).await.unwrap();
        assert_eq!(first.tokens, second.tokens);
    }

    #[tokio::test]
    async fn honors_max_colors() {
        let options = ExtractionOptions {
            max_colors: 1,
            ..ExtractionOptions::default()
        };
        let result = HistogramExtractor::new()
            .extract(&two_tone_image(), &options)
            .await
            .unwrap();
        assert_eq!(result.tokens.len(), 1);
    }

    #[tokio::test]
    async fn reports_decode_failures_with_its_name() {
        let err = HistogramExtractor::named("stats")
            .extract(b"not a png", &ExtractionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.adapter, "stats");
        assert!(matches!(err.kind, AdapterErrorKind::Decode(_)));
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let options = ExtractionOptions::default();
        options.cancellation.cancel();
        let err = HistogramExtractor::new()
            .extract(&two_tone_image(), &options)
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Cancelled);
    }
}
