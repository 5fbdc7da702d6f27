// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Format converter — a closed table maps each supported (from, to) pair to
// one of five strategies. Pairs missing from the table are rejected with
// `UnsupportedConversion`; conversion failures always propagate.

use std::borrow::Cow;

use mediawerk_core::AssetFormat::{self, Docx, Jpg, Pdf, Png, Svg, Webp};
use mediawerk_core::error::{MediawerkError, Result};
use mediawerk_core::{EncodedAsset, EngineConfig, ResampleFilter};
use tracing::{debug, info, instrument};

use crate::image::codec::{self, EncodeOptions, RasterBuffer, WHITE};
use crate::image::svg;
use crate::pdf::{PageRenderer, PdfReader, PdfWriter};

/// How a supported pair is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Decode and re-encode, or wrap in a minimal SVG.
    RasterToRaster,
    /// Rasterise an SVG at its intrinsic size.
    VectorToRaster,
    /// One page sized to the image, image as its only content.
    ImageToDocument,
    /// One raster per page.
    DocumentToRaster,
    /// Single notice page naming the source file.
    OfficeToDocument,
}

/// Every supported conversion. Add pairs here, nowhere else.
pub const CONVERSION_TABLE: &[((AssetFormat, AssetFormat), Strategy)] = &[
    ((Jpg, Jpg), Strategy::RasterToRaster),
    ((Jpg, Png), Strategy::RasterToRaster),
    ((Jpg, Webp), Strategy::RasterToRaster),
    ((Jpg, Svg), Strategy::RasterToRaster),
    ((Png, Jpg), Strategy::RasterToRaster),
    ((Png, Png), Strategy::RasterToRaster),
    ((Png, Webp), Strategy::RasterToRaster),
    ((Png, Svg), Strategy::RasterToRaster),
    ((Webp, Jpg), Strategy::RasterToRaster),
    ((Webp, Png), Strategy::RasterToRaster),
    ((Webp, Webp), Strategy::RasterToRaster),
    ((Webp, Svg), Strategy::RasterToRaster),
    ((Svg, Jpg), Strategy::VectorToRaster),
    ((Svg, Png), Strategy::VectorToRaster),
    ((Svg, Webp), Strategy::VectorToRaster),
    ((Jpg, Pdf), Strategy::ImageToDocument),
    ((Png, Pdf), Strategy::ImageToDocument),
    ((Webp, Pdf), Strategy::ImageToDocument),
    ((Svg, Pdf), Strategy::ImageToDocument),
    ((Pdf, Jpg), Strategy::DocumentToRaster),
    ((Pdf, Png), Strategy::DocumentToRaster),
    ((Pdf, Webp), Strategy::DocumentToRaster),
    ((Docx, Pdf), Strategy::OfficeToDocument),
];

pub fn strategy_for(from: AssetFormat, to: AssetFormat) -> Option<Strategy> {
    CONVERSION_TABLE
        .iter()
        .find(|(pair, _)| *pair == (from, to))
        .map(|(_, strategy)| *strategy)
}

/// Formats `from` can be converted into, in table order.
pub fn supported_targets(from: AssetFormat) -> Vec<AssetFormat> {
    CONVERSION_TABLE
        .iter()
        .filter(|((source, _), _)| *source == from)
        .map(|((_, target), _)| *target)
        .collect()
}

const OFFICE_NOTICE: [&str; 2] = [
    "Note: Full DOCX conversion requires server-side processing.",
    "This is a placeholder PDF.",
];

#[derive(Debug, Clone)]
pub struct FormatConverter {
    quality: f32,
    render_scale: f32,
    vector_default_size: (u32, u32),
    filter: ResampleFilter,
}

impl FormatConverter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            quality: config.conversion_quality,
            render_scale: config.render_scale,
            vector_default_size: (config.vector_default_width, config.vector_default_height),
            filter: config.resample_filter,
        }
    }

    /// Convert `asset`, read as `from`, into `to`. Document sources yield one
    /// asset per page; everything else yields exactly one.
    #[instrument(skip(self, asset), fields(name = asset.name(), bytes_len = asset.bytes().len()))]
    pub fn convert(
        &self,
        asset: &EncodedAsset,
        from: AssetFormat,
        to: AssetFormat,
    ) -> Result<Vec<EncodedAsset>> {
        let strategy =
            strategy_for(from, to).ok_or(MediawerkError::UnsupportedConversion { from, to })?;

        // The caller's declared source format wins over the asset's tag.
        let source = if asset.format() == from {
            Cow::Borrowed(asset)
        } else {
            Cow::Owned(asset.clone().with_format(from))
        };
        let base = source.base_name();

        let outputs = match strategy {
            Strategy::RasterToRaster => {
                let buffer = codec::decode(&source)?;
                vec![EncodedAsset::new(
                    format!("{base}.{}", to.extension()),
                    to,
                    self.encode_raster(&buffer, to)?,
                )]
            }
            Strategy::VectorToRaster => {
                let buffer = svg::rasterize(source.bytes(), self.vector_default_size)?;
                vec![EncodedAsset::new(
                    format!("{base}.{}", to.extension()),
                    to,
                    self.encode_raster(&buffer, to)?,
                )]
            }
            Strategy::ImageToDocument => {
                let buffer = if from == Svg {
                    svg::rasterize(source.bytes(), self.vector_default_size)?
                } else {
                    codec::decode(&source)?
                };
                let bytes = PdfWriter::new(base).image_page(&buffer);
                vec![EncodedAsset::new(format!("{base}.pdf"), Pdf, bytes)]
            }
            Strategy::DocumentToRaster => self.render_pages(&source, to)?,
            Strategy::OfficeToDocument => {
                let mut paragraphs = vec![format!("Converted from: {}", source.name())];
                paragraphs.extend(OFFICE_NOTICE.iter().map(|s| s.to_string()));
                let bytes = PdfWriter::new(base).notice_page(&paragraphs);
                vec![EncodedAsset::new(format!("{base}.pdf"), Pdf, bytes)]
            }
        };

        info!(?strategy, outputs = outputs.len(), "Conversion complete");
        Ok(outputs)
    }

    /// Encode for `to`, flattening over white when `to` cannot hold alpha.
    fn encode_raster(&self, buffer: &RasterBuffer, to: AssetFormat) -> Result<Vec<u8>> {
        if to == Svg {
            return svg::wrap_raster(&buffer.composited_over(WHITE));
        }
        let flattened;
        let source = if to.supports_transparency() {
            buffer
        } else {
            flattened = buffer.composited_over(WHITE);
            &flattened
        };
        let options = EncodeOptions::quality(self.quality).with_filter(self.filter);
        codec::encode(source, to, options)
    }

    fn render_pages(&self, source: &EncodedAsset, to: AssetFormat) -> Result<Vec<EncodedAsset>> {
        let reader = PdfReader::from_bytes(source.bytes())?;
        let page_ids = reader.page_ids();
        if page_ids.is_empty() {
            return Err(MediawerkError::Decode("PDF document has no pages".into()));
        }

        let renderer = PageRenderer::new(reader.document(), self.render_scale);
        let base = source.base_name();
        let mut outputs = Vec::with_capacity(page_ids.len());
        for (index, page_id) in page_ids.into_iter().enumerate() {
            let buffer = renderer.render_page(page_id)?;
            let bytes = self.encode_raster(&buffer, to)?;
            debug!(page = index + 1, bytes = bytes.len(), "Page converted");
            outputs.push(EncodedAsset::new(
                format!("{base}_page{}.{}", index + 1, to.extension()),
                to,
                bytes,
            ));
        }
        Ok(outputs)
    }
}

impl Default for FormatConverter {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use lopdf::Object;

    use super::*;
    use crate::test_support::{
        TestPage, build_pdf, noisy_buffer, op, pdf_asset, pdf_with_page_widths, raster_asset,
    };

    fn dims(asset: &EncodedAsset) -> (u32, u32) {
        let buffer = codec::decode(asset).unwrap();
        (buffer.width(), buffer.height())
    }

    #[test]
    fn table_has_no_duplicate_pairs() {
        for (i, (pair, _)) in CONVERSION_TABLE.iter().enumerate() {
            assert!(
                CONVERSION_TABLE[i + 1..].iter().all(|(other, _)| other != pair),
                "duplicate entry for {pair:?}"
            );
        }
    }

    #[test]
    fn raster_round_trips_preserve_dimensions() {
        let converter = FormatConverter::default();
        let pairs = [(Jpg, Png), (Png, Webp), (Webp, Jpg), (Png, Jpg)];
        for (a, b) in pairs {
            let original = raster_asset(&noisy_buffer(37, 23), a);
            let there = converter.convert(&original, a, b).unwrap().remove(0);
            let back = converter.convert(&there, b, a).unwrap().remove(0);
            assert_eq!(dims(&back), (37, 23), "{a} -> {b} -> {a}");
            assert_eq!(back.format(), a);
        }
    }

    #[test]
    fn unsupported_pairs_are_rejected() {
        let asset = EncodedAsset::new("letter.docx", Docx, b"PK".to_vec());
        let err = FormatConverter::default().convert(&asset, Docx, Svg).unwrap_err();
        assert!(matches!(err, MediawerkError::UnsupportedConversion { from: Docx, to: Svg }));
        assert_eq!(err.to_string(), "Conversion from DOCX to SVG is not supported");

        let pdf = pdf_asset("a.pdf", pdf_with_page_widths(&[10]));
        assert!(FormatConverter::default().convert(&pdf, Pdf, Svg).is_err());
        assert!(FormatConverter::default().convert(&pdf, Pdf, Docx).is_err());
    }

    #[test]
    fn transparency_is_flattened_to_white_for_jpeg() {
        let buffer = RasterBuffer::filled(8, 8, [0, 0, 0, 0]).unwrap();
        let png = raster_asset(&buffer, Png);
        let jpg = FormatConverter::default().convert(&png, Png, Jpg).unwrap().remove(0);
        let decoded = codec::decode(&jpg).unwrap();
        let [r, g, b, a] = decoded.pixel(4, 4);
        assert!(r > 240 && g > 240 && b > 240, "got {r},{g},{b}");
        assert_eq!(a, 255);
        assert_eq!(jpg.name(), "fixture.jpg");
    }

    #[test]
    fn transparency_survives_into_png() {
        let mut buffer = noisy_buffer(6, 6);
        buffer.pixels_mut()[3] = 0;
        let webp = raster_asset(&buffer, Webp);
        let png = FormatConverter::default().convert(&webp, Webp, Png).unwrap().remove(0);
        assert!(codec::decode(&png).unwrap().alpha(0, 0) < 16);
    }

    #[test]
    fn raster_to_svg_wraps_a_data_url() {
        let asset = raster_asset(&noisy_buffer(9, 5), Jpg);
        let out = FormatConverter::default().convert(&asset, Jpg, Svg).unwrap().remove(0);
        let text = String::from_utf8(out.bytes().to_vec()).unwrap();
        assert!(text.starts_with("<svg"));
        assert!(text.contains("width=\"9\" height=\"5\""));
        assert_eq!(out.name(), "fixture.svg");
    }

    #[test]
    fn svg_rasterises_at_intrinsic_size() {
        let svg = br##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20"><rect width="40" height="20" fill="#00f"/></svg>"##;
        let asset = EncodedAsset::new("icon.svg", Svg, svg.to_vec());
        let out = FormatConverter::default().convert(&asset, Svg, Png).unwrap().remove(0);
        assert_eq!(dims(&out), (40, 20));
        assert_eq!(out.name(), "icon.png");
    }

    #[test]
    fn image_becomes_single_page_sized_to_pixels() {
        let asset = raster_asset(&noisy_buffer(150, 90), Png);
        let out = FormatConverter::default().convert(&asset, Png, Pdf).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), "fixture.pdf");
        let reader = PdfReader::from_bytes(out[0].bytes()).unwrap();
        assert_eq!(reader.page_count(), 1);
        let [x0, y0, x1, y1] = reader.media_box(reader.page_ids()[0]);
        assert!(((x1 - x0) - 150.0).abs() < 0.5);
        assert!(((y1 - y0) - 90.0).abs() < 0.5);
    }

    #[test]
    fn document_renders_one_asset_per_page() {
        let asset = pdf_asset("deck.pdf", pdf_with_page_widths(&[100, 60, 80]));
        let out = FormatConverter::default().convert(&asset, Pdf, Png).unwrap();
        let names: Vec<&str> = out.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["deck_page1.png", "deck_page2.png", "deck_page3.png"]);
        // Default render scale is 2.0; test pages are 200pt tall.
        assert_eq!(dims(&out[0]), (200, 400));
        assert_eq!(dims(&out[1]), (120, 400));
    }

    #[test]
    fn rendered_page_shows_filled_shapes() {
        let mut page = TestPage::blank(50, 50);
        page.operations = vec![
            op("rg", vec![Object::Real(0.0), Object::Real(0.0), Object::Real(1.0)]),
            op("re", vec![0.into(), 0.into(), 50.into(), 50.into()]),
            op("f", vec![]),
        ];
        let asset = pdf_asset("blue.pdf", build_pdf(vec![page], None));
        let out = FormatConverter::default().convert(&asset, Pdf, Png).unwrap();
        let buffer = codec::decode(&out[0]).unwrap();
        assert_eq!(buffer.pixel(50, 50), [0, 0, 255, 255]);
    }

    #[test]
    fn image_document_image_keeps_proportions() {
        let converter = FormatConverter::default();
        let asset = raster_asset(&noisy_buffer(30, 20), Jpg);
        let pdf = converter.convert(&asset, Jpg, Pdf).unwrap().remove(0);
        let pages = converter.convert(&pdf, Pdf, Png).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(dims(&pages[0]), (60, 40));
    }

    #[test]
    fn text_pages_fail_instead_of_rendering_blank() {
        let mut page = TestPage::blank(612, 792);
        page.operations = vec![
            op("BT", vec![]),
            op("Tf", vec![Object::Name(b"F1".to_vec()), 24.into()]),
            op("Td", vec![72.into(), 720.into()]),
            op("Tj", vec![Object::string_literal("Hello")]),
            op("ET", vec![]),
        ];
        let converter = FormatConverter::default();
        let letter = pdf_asset("letter.pdf", build_pdf(vec![page], None));
        let err = converter.convert(&letter, Pdf, Png).unwrap_err();
        assert!(matches!(err, MediawerkError::Decode(_)), "{err:?}");

        let docx = EncodedAsset::new("minutes.docx", Docx, b"PK\x03\x04".to_vec());
        let notice = converter.convert(&docx, Docx, Pdf).unwrap().remove(0);
        assert!(converter.convert(&notice, Pdf, Jpg).is_err());
    }

    #[test]
    fn empty_document_is_a_decode_error() {
        let asset = pdf_asset("empty.pdf", build_pdf(Vec::new(), None));
        let err = FormatConverter::default().convert(&asset, Pdf, Jpg).unwrap_err();
        assert!(matches!(err, MediawerkError::Decode(_)));
    }

    #[test]
    fn office_document_gets_a_notice_page() {
        let asset = EncodedAsset::new("minutes.docx", Docx, b"PK\x03\x04".to_vec());
        let out = FormatConverter::default().convert(&asset, Docx, Pdf).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), "minutes.pdf");
        assert_eq!(PdfReader::from_bytes(out[0].bytes()).unwrap().page_count(), 1);
    }

    #[test]
    fn supported_targets_follow_the_table() {
        assert_eq!(supported_targets(Pdf), vec![Jpg, Png, Webp]);
        assert_eq!(supported_targets(Docx), vec![Pdf]);
        assert_eq!(supported_targets(Svg), vec![Jpg, Png, Webp, Pdf]);
    }
}
