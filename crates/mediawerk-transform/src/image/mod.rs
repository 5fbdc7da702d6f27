// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — pixel codec, SVG rasterisation, background segmentation.

pub mod codec;
pub mod segment;
pub mod svg;

pub use codec::{EncodeOptions, RasterBuffer};
pub use segment::{AlphaClass, AlphaMask, BackgroundSegmenter};
