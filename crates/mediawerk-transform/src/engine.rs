// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine facade — the five entry points the orchestrating application calls,
// wired to one validated `EngineConfig`.
//
// All methods are synchronous and CPU-bound. In an async context, wrap calls
// in `tokio::task::spawn_blocking` (see `Batch::run_async`).

use mediawerk_core::error::Result;
use mediawerk_core::{
    AssetFormat, BackgroundRemovalReport, CompressOptions, CompressionReport, EncodedAsset,
    EngineConfig, ScrubReport, TransformJob, TransformResult,
};
use tracing::{info, instrument};

use crate::compress::Compressor;
use crate::convert::FormatConverter;
use crate::image::codec::{self, EncodeOptions};
use crate::image::segment::BackgroundSegmenter;
use crate::merge::DocumentMerger;
use crate::scrub::MetadataScrubber;

/// Entry point for every transform. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MediaEngine {
    config: EngineConfig,
    compressor: Compressor,
    converter: FormatConverter,
    scrubber: MetadataScrubber,
    merger: DocumentMerger,
}

impl MediaEngine {
    /// Build an engine, rejecting an out-of-range configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config))
    }

    fn assemble(config: EngineConfig) -> Self {
        Self {
            compressor: Compressor::new(config.resample_filter),
            converter: FormatConverter::new(&config),
            scrubber: MetadataScrubber::new(config.scrub_quality),
            merger: DocumentMerger::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compress(&self, asset: &EncodedAsset, options: CompressOptions) -> Result<CompressionReport> {
        self.compressor.compress(asset, options)
    }

    /// Cut the background out of a JPG, PNG or WEBP raster. `tolerance`
    /// defaults to the configured value and is clamped to 5..=100. Any other
    /// format is a decode error.
    #[instrument(skip(self, asset), fields(name = asset.name(), bytes_len = asset.bytes().len()))]
    pub fn remove_background(
        &self,
        asset: &EncodedAsset,
        tolerance: Option<u8>,
    ) -> Result<BackgroundRemovalReport> {
        let buffer = codec::decode(asset)?;

        let segmenter =
            BackgroundSegmenter::new(tolerance.unwrap_or(self.config.default_tolerance));
        let (cutout, mask) = segmenter.remove_background(buffer);
        let bytes = codec::encode(&cutout, AssetFormat::Png, EncodeOptions::default())?;

        let base = asset.base_name();
        let summary = mask.summary();
        info!(
            tolerance = segmenter.tolerance(),
            transparent = summary.transparent,
            edge = summary.edge,
            "Background removed"
        );
        Ok(BackgroundRemovalReport {
            preview: EncodedAsset::new(format!("{base}_preview.png"), AssetFormat::Png, bytes.clone()),
            output: EncodedAsset::new(format!("{base}_nobg.png"), AssetFormat::Png, bytes),
            mask: summary,
        })
    }

    pub fn scrub_metadata(&self, asset: &EncodedAsset) -> Result<ScrubReport> {
        self.scrubber.scrub(asset)
    }

    /// Convert from the asset's own format.
    pub fn convert(&self, asset: &EncodedAsset, to: AssetFormat) -> Result<Vec<EncodedAsset>> {
        self.converter.convert(asset, asset.format(), to)
    }

    /// Convert, reading the asset as `from` regardless of its tag.
    pub fn convert_from(
        &self,
        asset: &EncodedAsset,
        from: AssetFormat,
        to: AssetFormat,
    ) -> Result<Vec<EncodedAsset>> {
        self.converter.convert(asset, from, to)
    }

    pub fn merge_documents(
        &self,
        assets: &[EncodedAsset],
        order: Option<&[usize]>,
    ) -> Result<EncodedAsset> {
        self.merger.merge(assets, order)
    }

    /// Run one single-asset job.
    pub fn apply(&self, job: &TransformJob, asset: &EncodedAsset) -> Result<TransformResult> {
        Ok(match *job {
            TransformJob::Compress(options) => TransformResult::Compressed(self.compress(asset, options)?),
            TransformJob::RemoveBackground { tolerance } => {
                TransformResult::BackgroundRemoved(self.remove_background(asset, tolerance)?)
            }
            TransformJob::Scrub => TransformResult::Scrubbed(self.scrub_metadata(asset)?),
            TransformJob::Convert { to } => TransformResult::Converted(self.convert(asset, to)?),
        })
    }
}

impl Default for MediaEngine {
    fn default() -> Self {
        Self::assemble(EngineConfig::default())
    }
}
