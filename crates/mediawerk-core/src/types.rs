// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Mediawerk transform engine.

use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{MediawerkError, Result};

/// Closed set of asset formats the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetFormat {
    Pdf,
    Jpg,
    Png,
    Webp,
    Docx,
    Svg,
}

impl AssetFormat {
    pub const ALL: [AssetFormat; 6] = [
        Self::Pdf,
        Self::Jpg,
        Self::Png,
        Self::Webp,
        Self::Docx,
        Self::Svg,
    ];

    /// MIME type string, as a browser or HTTP client would label the file.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Svg => "image/svg+xml",
        }
    }

    /// Canonical file extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Docx => "docx",
            Self::Svg => "svg",
        }
    }

    /// Infer the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" => Some(Self::Jpg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "docx" => Some(Self::Docx),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }

    /// Infer the format from the extension of a file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        name.rsplit_once('.')
            .and_then(|(_, ext)| Self::from_extension(ext))
    }

    /// Decodable pixel formats (JPG, PNG, WEBP).
    pub fn is_raster(&self) -> bool {
        matches!(self, Self::Jpg | Self::Png | Self::Webp)
    }

    /// Whether an encoded file of this format can carry an alpha channel.
    pub fn supports_transparency(&self) -> bool {
        matches!(self, Self::Png | Self::Webp)
    }
}

impl fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pdf => "PDF",
            Self::Jpg => "JPG",
            Self::Png => "PNG",
            Self::Webp => "WEBP",
            Self::Docx => "DOCX",
            Self::Svg => "SVG",
        };
        f.write_str(label)
    }
}

impl FromStr for AssetFormat {
    type Err = MediawerkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s).ok_or_else(|| {
            MediawerkError::InvalidOptions(format!(
                "unknown format '{s}' (expected one of PDF, JPG, PNG, WEBP, DOCX, SVG)"
            ))
        })
    }
}

/// One file's worth of bytes, tagged with its format.
///
/// Immutable once constructed; transforms always produce new assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAsset {
    name: String,
    format: AssetFormat,
    bytes: Vec<u8>,
}

impl EncodedAsset {
    pub fn new(name: impl Into<String>, format: AssetFormat, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            format,
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> AssetFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Size of the encoded bytes.
    pub fn original_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// File name with its last extension stripped (`photo.v2.jpg` -> `photo.v2`).
    pub fn base_name(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !ext.is_empty() => stem,
            _ => &self.name,
        }
    }

    /// Same bytes and name under a different declared format.
    pub fn with_format(self, format: AssetFormat) -> Self {
        Self { format, ..self }
    }

    /// Hex-encoded SHA-256 of the bytes.
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    /// `data:` URL suitable for inline previews.
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            STANDARD.encode(&self.bytes)
        )
    }

    pub fn summary(&self) -> AssetSummary {
        AssetSummary {
            name: self.name.clone(),
            format: self.format,
            size: self.original_size(),
            sha256: self.sha256_hex(),
        }
    }
}

/// Provenance of one asset, without its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub name: String,
    pub format: AssetFormat,
    pub size: u64,
    pub sha256: String,
}

/// Whether the quality search varies encoder quality or spatial scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    #[default]
    Lossy,
    Lossless,
}

/// What the caller wants the compressed output to look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionTarget {
    /// Reduce the size by this many percent.
    Percentage(u8),
    /// Do not exceed this many bytes.
    MaxBytes(u64),
}

impl CompressionTarget {
    pub const MIN_PERCENTAGE: u8 = 10;
    pub const MAX_PERCENTAGE: u8 = 90;

    /// `MaxBytes` expressed in kibibytes, as entered in the UI.
    pub fn max_kilobytes(kb: u64) -> Self {
        Self::MaxBytes(kb.saturating_mul(1024))
    }

    /// Clamp percentages into the searchable range and reject empty byte budgets.
    pub fn normalized(self) -> Result<Self> {
        match self {
            Self::Percentage(p) => Ok(Self::Percentage(
                p.clamp(Self::MIN_PERCENTAGE, Self::MAX_PERCENTAGE),
            )),
            Self::MaxBytes(0) => Err(MediawerkError::InvalidOptions(
                "maximum size must be at least one byte".into(),
            )),
            other => Ok(other),
        }
    }

    /// Target byte count for an input of `original_size` bytes.
    pub fn target_bytes(&self, original_size: u64) -> f64 {
        match self {
            Self::Percentage(p) => original_size as f64 * (1.0 - f64::from(*p) / 100.0),
            Self::MaxBytes(n) => *n as f64,
        }
    }
}

impl Default for CompressionTarget {
    fn default() -> Self {
        Self::Percentage(50)
    }
}

/// Declarative options for one compression job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompressOptions {
    pub mode: CompressionMode,
    pub target: CompressionTarget,
}

/// Whether a best-effort transform actually produced new bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Transformed,
    /// The original bytes were returned untouched.
    Unchanged { reason: String },
}

impl Outcome {
    pub fn unchanged(reason: impl Into<String>) -> Self {
        Self::Unchanged {
            reason: reason.into(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged { .. })
    }
}

/// Result of `compress`.
#[derive(Debug, Clone)]
pub struct CompressionReport {
    pub asset: EncodedAsset,
    pub original_size: u64,
    pub compressed_size: u64,
    pub outcome: Outcome,
    /// Winning encoder quality, when a raster search ran.
    pub quality: Option<f32>,
    /// Winning scale factor, when a raster search ran.
    pub scale: Option<f32>,
}

impl CompressionReport {
    /// Bytes saved; negative when the output grew.
    pub fn bytes_saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }
}

/// Result of `scrub_metadata`.
#[derive(Debug, Clone)]
pub struct ScrubReport {
    pub asset: EncodedAsset,
    /// Human-readable categories of metadata removed, in a stable order.
    pub removed_fields: Vec<String>,
    pub outcome: Outcome,
}

/// Pixel counts per alpha-mask class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaskSummary {
    pub opaque: usize,
    pub transparent: usize,
    pub edge: usize,
}

/// Result of `remove_background`.
#[derive(Debug, Clone)]
pub struct BackgroundRemovalReport {
    pub output: EncodedAsset,
    pub preview: EncodedAsset,
    pub mask: MaskSummary,
}

/// Any transform's result, as handed back to a batch.
#[derive(Debug, Clone)]
pub enum TransformResult {
    Compressed(CompressionReport),
    BackgroundRemoved(BackgroundRemovalReport),
    Scrubbed(ScrubReport),
    Converted(Vec<EncodedAsset>),
    Merged(EncodedAsset),
}

impl TransformResult {
    /// Primary output assets, in the order they should be saved.
    pub fn outputs(&self) -> Vec<&EncodedAsset> {
        match self {
            Self::Compressed(report) => vec![&report.asset],
            Self::BackgroundRemoved(report) => vec![&report.output],
            Self::Scrubbed(report) => vec![&report.asset],
            Self::Converted(assets) => assets.iter().collect(),
            Self::Merged(asset) => vec![asset],
        }
    }

    pub fn into_outputs(self) -> Vec<EncodedAsset> {
        match self {
            Self::Compressed(report) => vec![report.asset],
            Self::BackgroundRemoved(report) => vec![report.output],
            Self::Scrubbed(report) => vec![report.asset],
            Self::Converted(assets) => assets,
            Self::Merged(asset) => vec![asset],
        }
    }

    pub fn summary(&self) -> TransformSummary {
        let mut summary = TransformSummary {
            kind: self.kind().to_string(),
            outputs: self.outputs().into_iter().map(EncodedAsset::summary).collect(),
            original_size: None,
            compressed_size: None,
            removed_fields: None,
            unchanged_reason: None,
        };
        match self {
            Self::Compressed(report) => {
                summary.original_size = Some(report.original_size);
                summary.compressed_size = Some(report.compressed_size);
                summary.unchanged_reason = unchanged_reason(&report.outcome);
            }
            Self::Scrubbed(report) => {
                summary.removed_fields = Some(report.removed_fields.clone());
                summary.unchanged_reason = unchanged_reason(&report.outcome);
            }
            _ => {}
        }
        summary
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Compressed(_) => "compress",
            Self::BackgroundRemoved(_) => "remove-background",
            Self::Scrubbed(_) => "scrub",
            Self::Converted(_) => "convert",
            Self::Merged(_) => "merge",
        }
    }
}

fn unchanged_reason(outcome: &Outcome) -> Option<String> {
    match outcome {
        Outcome::Unchanged { reason } => Some(reason.clone()),
        Outcome::Transformed => None,
    }
}

/// Serializable digest of a `TransformResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSummary {
    pub kind: String,
    pub outputs: Vec<AssetSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unchanged_reason: Option<String>,
}

/// A single-asset transform request, as queued in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformJob {
    Compress(CompressOptions),
    RemoveBackground { tolerance: Option<u8> },
    Scrub,
    Convert { to: AssetFormat },
}

/// Unique identifier for a batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchItemId(pub Uuid);

impl BatchItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Render a byte count for display (`0 B`, `512 B`, `1.5 KB`, `2.25 MB`).
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes == 0 {
        "0 B".to_string()
    } else if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    }
}
