// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mediawerk-transform — the media transform engine.
//
// Size-targeted compression, corner-seeded background removal, metadata
// scrubbing, table-driven format conversion and PDF merging over in-memory
// assets. Nothing here touches the filesystem.

pub mod batch;
pub mod compress;
pub mod convert;
pub mod engine;
pub mod image;
pub mod merge;
pub mod pdf;
pub mod scrub;

#[cfg(test)]
mod test_support;

// Re-export the primary structs so callers can use `mediawerk_transform::MediaEngine` etc.
pub use batch::{Batch, BatchItem, BatchProgress, BatchSummary, ItemStatus};
pub use compress::{Compressor, QualitySearch, estimate_compressed_size};
pub use convert::{FormatConverter, Strategy};
pub use engine::MediaEngine;
pub use crate::image::{BackgroundSegmenter, RasterBuffer};
pub use merge::DocumentMerger;
pub use scrub::MetadataScrubber;
