// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vector rasteriser — parse SVG with `usvg`, paint it with `resvg` onto a
// white canvas sized to the document's intrinsic dimensions, and wrap
// rasters back up as minimal SVG documents.

use mediawerk_core::error::{MediawerkError, Result};
use mediawerk_core::{AssetFormat, EncodedAsset};
use resvg::tiny_skia::{Color, Pixmap, Transform};
use resvg::usvg::{Options, Size, Tree};
use tracing::{debug, instrument};

use super::codec::{self, EncodeOptions, RasterBuffer};

/// Rasterise an SVG document over white.
///
/// Documents without usable `width`/`height`/`viewBox` get a canvas of
/// `default_size` (width, height).
#[instrument(skip(svg_bytes), fields(bytes_len = svg_bytes.len()))]
pub fn rasterize(svg_bytes: &[u8], default_size: (u32, u32)) -> Result<RasterBuffer> {
    let mut options = Options::default();
    if let Some(size) = Size::from_wh(default_size.0 as f32, default_size.1 as f32) {
        options.default_size = size;
    }

    let tree = Tree::from_data(svg_bytes, &options)
        .map_err(|err| MediawerkError::Decode(format!("failed to parse SVG: {err}")))?;

    let size = tree.size();
    let (width, height) = codec::checked_dimensions(
        f64::from(size.width()).ceil(),
        f64::from(size.height()).ceil(),
    )?;
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        MediawerkError::Decode(format!("SVG has unusable dimensions {width}x{height}"))
    })?;
    pixmap.fill(Color::WHITE);
    resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());

    debug!(width, height, "SVG rasterised");
    // Every pixel is opaque after the white fill, so premultiplied == straight.
    RasterBuffer::new(width, height, pixmap.take())
}

/// Wrap a raster as a minimal SVG document embedding it as a PNG data URL.
pub fn wrap_raster(buffer: &RasterBuffer) -> Result<Vec<u8>> {
    let png = codec::encode(buffer, AssetFormat::Png, EncodeOptions::default())?;
    let href = EncodedAsset::new("embedded.png", AssetFormat::Png, png).data_url();
    let (width, height) = (buffer.width(), buffer.height());
    let svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\">\n  \
         <image href=\"{href}\" width=\"{width}\" height=\"{height}\"/>\n</svg>\n"
    );
    Ok(svg.into_bytes())
}
