// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pixel buffer codec — decode JPG/PNG/WEBP into an owned RGBA raster and
// re-encode a raster into a target format at a given quality and scale.
// Uses the `image` crate for decoding, JPEG and PNG, and `webp` (libwebp)
// for lossy WebP, which `image` cannot produce.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageBuffer, ImageEncoder, ImageFormat, Rgba, RgbaImage};
use mediawerk_core::error::{MediawerkError, Result};
use mediawerk_core::{AssetFormat, EncodedAsset, ResampleFilter};
use tracing::{debug, instrument};

/// Background used wherever transparency has to be flattened.
pub const WHITE: [u8; 3] = [255, 255, 255];

/// Largest canvas the engine allocates for a render (64 megapixels, 256 MiB
/// of RGBA).
pub const MAX_PIXELS: u64 = 64 * 1024 * 1024;

/// Round canvas dimensions to pixels (at least 1x1), refusing anything over
/// [`MAX_PIXELS`] before a buffer is allocated.
pub fn checked_dimensions(width: f64, height: f64) -> Result<(u32, u32)> {
    if !(width.is_finite() && height.is_finite()) {
        return Err(MediawerkError::Encode(format!(
            "canvas dimensions {width}x{height} are not finite"
        )));
    }
    let (w, h) = (width.max(1.0), height.max(1.0));
    if w * h > MAX_PIXELS as f64 {
        return Err(MediawerkError::Encode(format!(
            "a {w}x{h} canvas exceeds the {MAX_PIXELS} pixel limit"
        )));
    }
    Ok((w as u32, h as u32))
}

/// Decoded pixel grid: `width * height` pixels, R,G,B,A interleaved.
///
/// The byte length always equals `width * height * 4`; every constructor
/// checks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterBuffer {
    // -- Construction ---------------------------------------------------------

    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(MediawerkError::Decode(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(MediawerkError::Decode(format!(
                "pixel buffer holds {} bytes, expected {expected} for {width}x{height}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A buffer with every pixel set to `rgba`.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        checked_dimensions(f64::from(width), f64::from(height))?;
        let pixels = rgba.repeat(width as usize * height as usize);
        Self::new(width, height, pixels)
    }

    pub fn from_image(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable pixel access. The length cannot change through a slice.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        self.pixel(x, y)[3]
    }

    /// True when no pixel carries any transparency.
    pub fn is_opaque(&self) -> bool {
        self.pixels.chunks_exact(4).all(|px| px[3] == 255)
    }

    pub fn into_image(self) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels)
            .ok_or_else(|| MediawerkError::Encode("pixel buffer does not match its dimensions".into()))
    }

    fn view(&self) -> Result<ImageBuffer<Rgba<u8>, &[u8]>> {
        ImageBuffer::from_raw(self.width, self.height, self.pixels.as_slice())
            .ok_or_else(|| MediawerkError::Encode("pixel buffer does not match its dimensions".into()))
    }

    // -- Transformations --------------------------------------------------------

    /// Resample to `scale` times the current dimensions (never below 1x1).
    ///
    /// `scale` must be in (0, 1]; anything at or above 1 returns a copy.
    #[instrument(skip(self), fields(from_w = self.width, from_h = self.height))]
    pub fn resampled(&self, scale: f32, filter: ResampleFilter) -> Result<Self> {
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(MediawerkError::Encode(format!(
                "scale factor must be within (0, 1], got {scale}"
            )));
        }
        if scale >= 1.0 {
            return Ok(self.clone());
        }
        let new_w = ((self.width as f32 * scale).round() as u32).max(1);
        let new_h = ((self.height as f32 * scale).round() as u32).max(1);
        let resized = imageops::resize(&self.view()?, new_w, new_h, filter_type(filter));
        debug!(new_w, new_h, "Resample complete");
        Self::from_image(resized)
    }

    /// Alpha-composite over a solid colour; the result is fully opaque.
    pub fn composited_over(&self, background: [u8; 3]) -> Self {
        let mut pixels = self.pixels.clone();
        for px in pixels.chunks_exact_mut(4) {
            let alpha = u32::from(px[3]);
            for (channel, bg) in px.iter_mut().take(3).zip(background) {
                let blended = (u32::from(*channel) * alpha + u32::from(bg) * (255 - alpha) + 127) / 255;
                *channel = blended as u8;
            }
            px[3] = 255;
        }
        Self {
            width: self.width,
            height: self.height,
            pixels,
        }
    }

    /// Tightly packed RGB bytes, alpha discarded.
    pub fn rgb_bytes(&self) -> Vec<u8> {
        self.pixels
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    }
}

/// Encoder parameters. `quality` is ignored by formats without a quality
/// axis (PNG); `scale` always applies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeOptions {
    pub quality: f32,
    pub scale: f32,
    pub filter: ResampleFilter,
}

impl EncodeOptions {
    pub fn quality(quality: f32) -> Self {
        Self {
            quality,
            ..Self::default()
        }
    }

    pub fn with_scale(self, scale: f32) -> Self {
        Self { scale, ..self }
    }

    pub fn with_filter(self, filter: ResampleFilter) -> Self {
        Self { filter, ..self }
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            quality: 0.92,
            scale: 1.0,
            filter: ResampleFilter::default(),
        }
    }
}

/// Decode a raster asset into an owned RGBA buffer.
#[instrument(skip(asset), fields(format = %asset.format(), bytes_len = asset.bytes().len()))]
pub fn decode(asset: &EncodedAsset) -> Result<RasterBuffer> {
    let format = image_format(asset.format()).ok_or_else(|| {
        MediawerkError::Decode(format!("{} is not a raster image format", asset.format()))
    })?;
    let img = image::load_from_memory_with_format(asset.bytes(), format).map_err(|err| {
        MediawerkError::Decode(format!("failed to decode {} image: {err}", asset.format()))
    })?;
    debug!(width = img.width(), height = img.height(), "Image decoded from bytes");
    RasterBuffer::from_image(img.to_rgba8())
}

/// Encode a buffer into `format`, resampling first when `options.scale < 1`.
#[instrument(skip(buffer), fields(width = buffer.width(), height = buffer.height(), %format))]
pub fn encode(buffer: &RasterBuffer, format: AssetFormat, options: EncodeOptions) -> Result<Vec<u8>> {
    let resampled;
    let source = if options.scale < 1.0 || !options.scale.is_finite() {
        resampled = buffer.resampled(options.scale, options.filter)?;
        &resampled
    } else {
        buffer
    };

    let bytes = match format {
        AssetFormat::Jpg => encode_jpeg(source, options.quality)?,
        AssetFormat::Png => encode_png(source)?,
        AssetFormat::Webp => encode_webp(source, options.quality)?,
        other => {
            return Err(MediawerkError::Encode(format!(
                "{other} cannot hold a raster image"
            )));
        }
    };
    debug!(output_bytes = bytes.len(), quality = options.quality, scale = options.scale, "Encoded");
    Ok(bytes)
}

/// Map a 0.0-1.0 quality onto the 1-100 scale JPEG and WebP encoders use.
fn percent_quality(quality: f32) -> f32 {
    (quality * 100.0).round().clamp(1.0, 100.0)
}

fn encode_jpeg(buffer: &RasterBuffer, quality: f32) -> Result<Vec<u8>> {
    let rgb = buffer.composited_over(WHITE).rgb_bytes();
    let mut output = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut output, percent_quality(quality) as u8);
    encoder
        .write_image(&rgb, buffer.width(), buffer.height(), ExtendedColorType::Rgb8)
        .map_err(|err| MediawerkError::Encode(format!("JPEG encoding failed: {err}")))?;
    Ok(output)
}

fn encode_png(buffer: &RasterBuffer) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut output, CompressionType::Best, PngFilter::Adaptive);
    // Opaque images drop the alpha channel; a quarter of the samples is free size.
    let written = if buffer.is_opaque() {
        encoder.write_image(
            &buffer.rgb_bytes(),
            buffer.width(),
            buffer.height(),
            ExtendedColorType::Rgb8,
        )
    } else {
        encoder.write_image(
            buffer.pixels(),
            buffer.width(),
            buffer.height(),
            ExtendedColorType::Rgba8,
        )
    };
    written.map_err(|err| MediawerkError::Encode(format!("PNG encoding failed: {err}")))?;
    Ok(output)
}

fn encode_webp(buffer: &RasterBuffer, quality: f32) -> Result<Vec<u8>> {
    let opaque = buffer.is_opaque();
    let rgb = if opaque { buffer.rgb_bytes() } else { Vec::new() };
    let encoder = if opaque {
        webp::Encoder::from_rgb(&rgb, buffer.width(), buffer.height())
    } else {
        webp::Encoder::from_rgba(buffer.pixels(), buffer.width(), buffer.height())
    };

    let mut config = webp::WebPConfig::new()
        .map_err(|_| MediawerkError::Encode("failed to create WebP encoder configuration".into()))?;
    config.lossless = 0;
    config.quality = percent_quality(quality);
    config.method = 4;

    let encoded = encoder
        .encode_advanced(&config)
        .map_err(|err| MediawerkError::Encode(format!("WebP encoding failed: {err:?}")))?;
    Ok(encoded.to_vec())
}

fn image_format(format: AssetFormat) -> Option<ImageFormat> {
    match format {
        AssetFormat::Jpg => Some(ImageFormat::Jpeg),
        AssetFormat::Png => Some(ImageFormat::Png),
        AssetFormat::Webp => Some(ImageFormat::WebP),
        _ => None,
    }
}

fn filter_type(filter: ResampleFilter) -> FilterType {
    match filter {
        ResampleFilter::Nearest => FilterType::Nearest,
        ResampleFilter::Triangle => FilterType::Triangle,
        ResampleFilter::CatmullRom => FilterType::CatmullRom,
        ResampleFilter::Lanczos3 => FilterType::Lanczos3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{noisy_buffer, raster_asset};

    #[test]
    fn constructor_enforces_length_invariant() {
        assert!(RasterBuffer::new(2, 2, vec![0; 16]).is_ok());
        assert!(RasterBuffer::new(2, 2, vec![0; 15]).is_err());
        assert!(RasterBuffer::new(0, 2, Vec::new()).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        let asset = EncodedAsset::new("bad.png", AssetFormat::Png, b"not a png".to_vec());
        assert!(matches!(decode(&asset), Err(MediawerkError::Decode(_))));
    }

    #[test]
    fn decode_rejects_non_raster_formats() {
        let asset = EncodedAsset::new("doc.pdf", AssetFormat::Pdf, b"%PDF-1.5".to_vec());
        assert!(matches!(decode(&asset), Err(MediawerkError::Decode(_))));
    }

    #[test]
    fn png_round_trip_keeps_pixels_and_alpha() {
        let mut buffer = noisy_buffer(24, 16);
        buffer.pixels_mut()[3] = 0;
        let asset = raster_asset(&buffer, AssetFormat::Png);
        let decoded = decode(&asset).unwrap();
        assert_eq!(decoded, buffer);
    }

    #[test]
    fn lower_jpeg_quality_produces_smaller_output() {
        let buffer = noisy_buffer(64, 64);
        let low = encode(&buffer, AssetFormat::Jpg, EncodeOptions::quality(0.1)).unwrap();
        let high = encode(&buffer, AssetFormat::Jpg, EncodeOptions::quality(0.95)).unwrap();
        assert!(low.len() < high.len(), "{} !< {}", low.len(), high.len());
    }

    #[test]
    fn lossy_webp_decodes_back_with_same_dimensions() {
        let buffer = noisy_buffer(40, 30);
        let bytes = encode(&buffer, AssetFormat::Webp, EncodeOptions::quality(0.5)).unwrap();
        let decoded = decode(&EncodedAsset::new("x.webp", AssetFormat::Webp, bytes)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[test]
    fn scale_resamples_before_encoding() {
        let buffer = noisy_buffer(100, 50);
        let bytes = encode(
            &buffer,
            AssetFormat::Png,
            EncodeOptions::default().with_scale(0.5),
        )
        .unwrap();
        let decoded = decode(&EncodedAsset::new("x.png", AssetFormat::Png, bytes)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (50, 25));
    }

    #[test]
    fn tiny_scale_never_reaches_zero_pixels() {
        let buffer = noisy_buffer(10, 10);
        let scaled = buffer.resampled(0.01, ResampleFilter::Nearest).unwrap();
        assert_eq!((scaled.width(), scaled.height()), (1, 1));
        assert!(buffer.resampled(0.0, ResampleFilter::Nearest).is_err());
    }

    #[test]
    fn compositing_over_white_flattens_transparency() {
        let buffer = RasterBuffer::filled(2, 2, [0, 0, 0, 0]).unwrap();
        let flat = buffer.composited_over(WHITE);
        assert!(flat.is_opaque());
        assert_eq!(flat.pixel(1, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn documents_cannot_hold_rasters() {
        let buffer = noisy_buffer(4, 4);
        let err = encode(&buffer, AssetFormat::Pdf, EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, MediawerkError::Encode(_)));
    }

    #[test]
    fn oversized_canvas_is_refused_before_allocation() {
        let err = RasterBuffer::filled(60_000, 60_000, [255; 4]).unwrap_err();
        assert!(matches!(err, MediawerkError::Encode(_)));
        assert!(checked_dimensions(f64::INFINITY, 10.0).is_err());
        assert_eq!(checked_dimensions(0.2, 8192.0).unwrap(), (1, 8192));
    }
}
