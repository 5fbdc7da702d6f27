// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MediawerkError, Result};

/// Interpolation used whenever a buffer is resampled by a scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleFilter {
    Nearest,
    /// Bilinear.
    #[default]
    Triangle,
    CatmullRom,
    Lanczos3,
}

/// Tunables for the transform engine.
///
/// The search contract constants (iteration counts, quality bounds, clamp
/// ranges) are constants in their modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Background removal colour tolerance used when the caller gives none.
    pub default_tolerance: u8,
    /// Encoder quality for format conversion (0.0-1.0).
    pub conversion_quality: f32,
    /// Encoder quality when re-encoding a raster to strip its metadata.
    pub scrub_quality: f32,
    /// Scale factor for rendering document pages to rasters.
    pub render_scale: f32,
    /// Canvas width for vector documents without intrinsic dimensions.
    pub vector_default_width: u32,
    /// Canvas height for vector documents without intrinsic dimensions.
    pub vector_default_height: u32,
    pub resample_filter: ResampleFilter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_tolerance: 40,
            conversion_quality: 0.92,
            scrub_quality: 0.95,
            render_scale: 2.0,
            vector_default_width: 800,
            vector_default_height: 600,
            resample_filter: ResampleFilter::Triangle,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(5..=100).contains(&self.default_tolerance) {
            return Err(MediawerkError::Config(format!(
                "default_tolerance must be within 5..=100, got {}",
                self.default_tolerance
            )));
        }
        for (name, quality) in [
            ("conversion_quality", self.conversion_quality),
            ("scrub_quality", self.scrub_quality),
        ] {
            if !(quality > 0.0 && quality <= 1.0) {
                return Err(MediawerkError::Config(format!(
                    "{name} must be within (0, 1], got {quality}"
                )));
            }
        }
        if !(self.render_scale > 0.0 && self.render_scale <= 8.0) {
            return Err(MediawerkError::Config(format!(
                "render_scale must be within (0, 8], got {}",
                self.render_scale
            )));
        }
        if self.vector_default_width == 0 || self.vector_default_height == 0 {
            return Err(MediawerkError::Config(
                "vector default dimensions must be positive".into(),
            ));
        }
        Ok(())
    }
}
