// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Size-targeted compression.
//
// Rasters go through a fixed-budget search: lossy formats binary-search the
// encoder quality, PNG in lossless mode derives a resampling scale instead.
// Documents are re-saved. Compression never destroys input: when encoding
// or re-saving fails the original bytes come back as `Outcome::Unchanged`.

use mediawerk_core::error::{MediawerkError, Result};
use mediawerk_core::{
    AssetFormat, CompressOptions, CompressionMode, CompressionReport, CompressionTarget,
    EncodedAsset, Outcome, ResampleFilter,
};
use tracing::{debug, info, instrument, warn};

use crate::image::codec::{self, EncodeOptions, RasterBuffer};
use crate::pdf::PdfReader;

/// Quality search lower bound.
pub const QUALITY_MIN: f32 = 0.05;
/// Quality search upper bound.
pub const QUALITY_MAX: f32 = 0.95;
/// Binary search steps against a percentage target.
pub const PERCENTAGE_ITERATIONS: usize = 8;
/// Binary search steps against an absolute byte budget.
pub const MAX_BYTES_ITERATIONS: usize = 10;
/// Quality used, together with a shrink, when no byte-budget candidate fit.
pub const FALLBACK_QUALITY: f32 = 0.3;
/// Smallest scale a percentage may translate into on the lossless path.
pub const PERCENTAGE_MIN_SCALE: f32 = 0.1;
/// Smallest scale ever derived from a byte budget.
pub const BUDGET_MIN_SCALE: f32 = 0.05;
/// Lossless rescale passes against a byte budget, the first included.
pub const LOSSLESS_RESCALE_PASSES: usize = 6;
/// Each pass after the first shrinks the scale by at least this factor.
const RESCALE_STEP: f32 = 0.9;

/// One encoding attempt.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub bytes: Vec<u8>,
    pub quality: f32,
    pub scale: f32,
    /// Whether this candidate is at or under the target size.
    pub met_target: bool,
}

/// Fixed-budget search for an encoding that meets a size target.
#[derive(Debug, Clone, Copy)]
pub struct QualitySearch {
    format: AssetFormat,
    filter: ResampleFilter,
}

impl QualitySearch {
    pub fn new(format: AssetFormat, filter: ResampleFilter) -> Self {
        Self { format, filter }
    }

    /// Search for `buffer`, whose source encoding was `original_size` bytes.
    ///
    /// `target` must already be normalised. Only encoder errors propagate.
    #[instrument(skip(self, buffer), fields(format = %self.format))]
    pub fn run(
        &self,
        buffer: &RasterBuffer,
        mode: CompressionMode,
        target: CompressionTarget,
        original_size: u64,
    ) -> Result<Candidate> {
        let target_bytes = target.target_bytes(original_size);

        // Only PNG has a lossless encoder; other formats always search quality.
        if mode == CompressionMode::Lossless && self.format == AssetFormat::Png {
            return self.lossless(buffer, target, target_bytes);
        }

        match target {
            CompressionTarget::Percentage(_) => {
                let (best, lowest) = self.bisect(buffer, target_bytes, PERCENTAGE_ITERATIONS)?;
                Ok(best.unwrap_or(lowest))
            }
            CompressionTarget::MaxBytes(_) => {
                let (best, _) = self.bisect(buffer, target_bytes, MAX_BYTES_ITERATIONS)?;
                match best {
                    Some(candidate) => Ok(candidate),
                    None => {
                        let scale = budget_scale(target_bytes, original_size as f64);
                        debug!(scale, "No candidate fit the budget, shrinking");
                        self.attempt(buffer, FALLBACK_QUALITY, scale, target_bytes)
                    }
                }
            }
        }
    }

    /// Binary search over quality. Returns the best candidate that met the
    /// target (the last success, i.e. the highest quality), if any, and the
    /// lowest-quality candidate encoded.
    fn bisect(
        &self,
        buffer: &RasterBuffer,
        target_bytes: f64,
        iterations: usize,
    ) -> Result<(Option<Candidate>, Candidate)> {
        let (mut lo, mut hi) = (QUALITY_MIN, QUALITY_MAX);
        let mut best: Option<Candidate> = None;
        let mut lowest: Option<Candidate> = None;

        for iteration in 0..iterations {
            let mid = (lo + hi) / 2.0;
            let candidate = self.attempt(buffer, mid, 1.0, target_bytes)?;
            debug!(
                iteration,
                quality = mid,
                size = candidate.bytes.len(),
                target_bytes,
                "Search step"
            );

            if lowest.as_ref().is_none_or(|l| candidate.quality < l.quality) {
                lowest = Some(candidate.clone());
            }
            if candidate.met_target {
                lo = mid;
                best = Some(candidate);
            } else {
                hi = mid;
            }
        }

        match lowest {
            Some(lowest) => Ok((best, lowest)),
            None => Err(MediawerkError::Encode("quality search ran no iterations".into())),
        }
    }

    fn lossless(
        &self,
        buffer: &RasterBuffer,
        target: CompressionTarget,
        target_bytes: f64,
    ) -> Result<Candidate> {
        match target {
            CompressionTarget::Percentage(p) => {
                let scale = (1.0 - f32::from(p) / 100.0)
                    .sqrt()
                    .clamp(PERCENTAGE_MIN_SCALE, 1.0);
                self.attempt(buffer, 1.0, scale, target_bytes)
            }
            CompressionTarget::MaxBytes(_) => {
                let first = self.attempt(buffer, 1.0, 1.0, target_bytes)?;
                if first.met_target {
                    return Ok(first);
                }
                let mut scale = budget_scale(target_bytes, first.bytes.len() as f64);
                debug!(first_size = first.bytes.len(), scale, "First pass over budget, rescaling");
                let mut candidate = self.attempt(buffer, 1.0, scale, target_bytes)?;

                // Container overhead does not shrink with the pixel count, so
                // the square-root estimate can land just over the budget.
                for pass in 1..LOSSLESS_RESCALE_PASSES {
                    if candidate.met_target || scale <= BUDGET_MIN_SCALE {
                        break;
                    }
                    let ratio = (target_bytes / candidate.bytes.len() as f64).sqrt() as f32;
                    scale = (scale * ratio.min(RESCALE_STEP)).max(BUDGET_MIN_SCALE);
                    debug!(pass, size = candidate.bytes.len(), scale, "Still over budget, tightening");
                    candidate = self.attempt(buffer, 1.0, scale, target_bytes)?;
                }
                Ok(candidate)
            }
        }
    }

    fn attempt(
        &self,
        buffer: &RasterBuffer,
        quality: f32,
        scale: f32,
        target_bytes: f64,
    ) -> Result<Candidate> {
        let options = EncodeOptions::quality(quality)
            .with_scale(scale)
            .with_filter(self.filter);
        let bytes = codec::encode(buffer, self.format, options)?;
        let met_target = bytes.len() as f64 <= target_bytes;
        Ok(Candidate {
            bytes,
            quality,
            scale,
            met_target,
        })
    }
}

/// `sqrt(target / current)` clamped into `[0.05, 1]`.
fn budget_scale(target_bytes: f64, current_size: f64) -> f32 {
    if current_size <= 0.0 {
        return 1.0;
    }
    ((target_bytes / current_size).sqrt() as f32).clamp(BUDGET_MIN_SCALE, 1.0)
}

/// Expected output size for a target, before any encoding has happened.
pub fn estimate_compressed_size(original_size: u64, target: CompressionTarget) -> u64 {
    match target {
        CompressionTarget::Percentage(p) => {
            (original_size as f64 * (1.0 - f64::from(p) / 100.0)).round() as u64
        }
        CompressionTarget::MaxBytes(n) => original_size.min(n),
    }
}

/// Routes an asset to the raster search or the document re-save.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compressor {
    filter: ResampleFilter,
}

impl Compressor {
    pub fn new(filter: ResampleFilter) -> Self {
        Self { filter }
    }

    #[instrument(skip(self, asset), fields(name = asset.name(), format = %asset.format(), size = asset.original_size()))]
    pub fn compress(&self, asset: &EncodedAsset, options: CompressOptions) -> Result<CompressionReport> {
        let target = options.target.normalized()?;
        let format = asset.format();

        let report = match format {
            AssetFormat::Jpg | AssetFormat::Png | AssetFormat::Webp => {
                let buffer = codec::decode(asset)?;
                let search = QualitySearch::new(format, self.filter);
                match search.run(&buffer, options.mode, target, asset.original_size()) {
                    Ok(candidate) => {
                        let output = EncodedAsset::new(output_name(asset), format, candidate.bytes);
                        report(asset, output, Outcome::Transformed, Some(candidate.quality), Some(candidate.scale))
                    }
                    Err(err) => {
                        warn!(%err, "Raster re-encode failed, keeping original");
                        unchanged(asset, format!("re-encoding failed: {err}"))
                    }
                }
            }
            AssetFormat::Pdf => match resave_document(asset.bytes(), options.mode) {
                Ok(bytes) => {
                    let output = EncodedAsset::new(output_name(asset), format, bytes);
                    report(asset, output, Outcome::Transformed, None, None)
                }
                Err(err) => {
                    warn!(%err, "Document re-save failed, keeping original");
                    unchanged(asset, format!("document could not be re-saved: {err}"))
                }
            },
            AssetFormat::Svg | AssetFormat::Docx => {
                unchanged(asset, format!("{format} files have no compression axis"))
            }
        };

        info!(
            original = report.original_size,
            compressed = report.compressed_size,
            unchanged = report.outcome.is_unchanged(),
            "Compression complete"
        );
        Ok(report)
    }
}

/// Lossy re-saves with unreachable objects pruned and streams compressed;
/// lossless re-saves the parsed document as is.
fn resave_document(bytes: &[u8], mode: CompressionMode) -> Result<Vec<u8>> {
    let mut reader = PdfReader::from_bytes(bytes)?;
    if mode == CompressionMode::Lossy {
        reader.compact();
    }
    reader.to_bytes()
}

/// `<base>_compressed.<ext>`; rasters other than PNG/WEBP come out as `jpg`.
fn output_name(asset: &EncodedAsset) -> String {
    let ext = match asset.format() {
        AssetFormat::Png => "png",
        AssetFormat::Webp => "webp",
        AssetFormat::Pdf => "pdf",
        _ => "jpg",
    };
    format!("{}_compressed.{ext}", asset.base_name())
}

fn report(
    input: &EncodedAsset,
    output: EncodedAsset,
    outcome: Outcome,
    quality: Option<f32>,
    scale: Option<f32>,
) -> CompressionReport {
    CompressionReport {
        original_size: input.original_size(),
        compressed_size: output.original_size(),
        asset: output,
        outcome,
        quality,
        scale,
    }
}

fn unchanged(input: &EncodedAsset, reason: String) -> CompressionReport {
    report(input, input.clone(), Outcome::unchanged(reason), None, None)
}
