// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metadata scrubber.
//
// Rasters are decoded and re-encoded from bare pixels, which drops every
// auxiliary chunk or segment. PDFs get their /Info slots overwritten. Anything
// else passes through. A failed scrub returns the original bytes with a
// degraded field list; it never errors on a document it cannot rewrite.

use mediawerk_core::error::Result;
use mediawerk_core::{AssetFormat, EncodedAsset, Outcome, ScrubReport};
use tracing::{info, instrument, warn};

use crate::image::codec::{self, EncodeOptions};
use crate::pdf::PdfReader;

/// Categories reported for any re-encoded raster.
pub const RASTER_FIELDS: [&str; 6] = [
    "EXIF data",
    "GPS coordinates",
    "Camera info",
    "Timestamps",
    "Author info",
    "Software info",
];

/// Reported when a document could not be rewritten.
pub const PARTIAL_FIELD: &str = "Metadata (partial)";

/// Reported for formats the scrubber has no structural handle on.
pub const GENERIC_FIELD: &str = "File metadata";

#[derive(Debug, Clone, Copy)]
pub struct MetadataScrubber {
    /// Encoder quality for re-encoded rasters.
    quality: f32,
}

impl MetadataScrubber {
    pub fn new(quality: f32) -> Self {
        Self { quality }
    }

    /// Strip metadata. Only a raster that cannot be decoded is an error.
    #[instrument(skip(self, asset), fields(name = asset.name(), format = %asset.format()))]
    pub fn scrub(&self, asset: &EncodedAsset) -> Result<ScrubReport> {
        let format = asset.format();
        let name = format!("{}_clean.{}", asset.base_name(), format.extension());

        let report = match format {
            AssetFormat::Jpg | AssetFormat::Png | AssetFormat::Webp => {
                let buffer = codec::decode(asset)?;
                match codec::encode(&buffer, format, EncodeOptions::quality(self.quality)) {
                    Ok(bytes) => ScrubReport {
                        asset: EncodedAsset::new(name, format, bytes),
                        removed_fields: to_strings(&RASTER_FIELDS),
                        outcome: Outcome::Transformed,
                    },
                    Err(err) => {
                        warn!(%err, "Raster re-encode failed, keeping original");
                        degraded(asset, name, format!("re-encoding failed: {err}"))
                    }
                }
            }
            AssetFormat::Pdf => match clear_document(asset.bytes()) {
                Ok((bytes, cleared)) => ScrubReport {
                    asset: EncodedAsset::new(name, format, bytes),
                    removed_fields: cleared,
                    outcome: Outcome::Transformed,
                },
                Err(err) => {
                    warn!(%err, "Document metadata could not be cleared, keeping original");
                    degraded(asset, name, format!("document could not be rewritten: {err}"))
                }
            },
            AssetFormat::Svg | AssetFormat::Docx => ScrubReport {
                asset: EncodedAsset::new(name, format, asset.bytes().to_vec()),
                removed_fields: vec![GENERIC_FIELD.to_string()],
                outcome: Outcome::unchanged(format!("{format} files are passed through")),
            },
        };

        info!(
            removed = report.removed_fields.len(),
            unchanged = report.outcome.is_unchanged(),
            "Scrub complete"
        );
        Ok(report)
    }
}

impl Default for MetadataScrubber {
    fn default() -> Self {
        Self::new(0.95)
    }
}

fn clear_document(bytes: &[u8]) -> Result<(Vec<u8>, Vec<String>)> {
    let mut reader = PdfReader::from_bytes(bytes)?;
    let cleared = reader.clear_info_metadata()?;
    Ok((reader.to_bytes()?, cleared))
}

fn degraded(asset: &EncodedAsset, name: String, reason: String) -> ScrubReport {
    ScrubReport {
        asset: EncodedAsset::new(name, asset.format(), asset.bytes().to_vec()),
        removed_fields: vec![PARTIAL_FIELD.to_string()],
        outcome: Outcome::unchanged(reason),
    }
}

fn to_strings(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use lopdf::{Object, dictionary};
    use mediawerk_core::MediawerkError;

    use super::*;
    use crate::test_support::{build_pdf, noisy_buffer, pdf_asset, raster_asset, TestPage};

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    /// Insert a tEXt chunk right after IHDR (8-byte signature + 25-byte IHDR).
    fn png_with_text(png: &[u8], keyword: &str, text: &str) -> Vec<u8> {
        let mut data = keyword.as_bytes().to_vec();
        data.push(0);
        data.extend_from_slice(text.as_bytes());

        let mut crc = flate2::Crc::new();
        crc.update(b"tEXt");
        crc.update(&data);

        let mut chunk = (data.len() as u32).to_be_bytes().to_vec();
        chunk.extend_from_slice(b"tEXt");
        chunk.extend_from_slice(&data);
        chunk.extend_from_slice(&crc.sum().to_be_bytes());

        let mut out = png[..33].to_vec();
        out.extend_from_slice(&chunk);
        out.extend_from_slice(&png[33..]);
        out
    }

    /// Insert a COM segment right after SOI.
    fn jpeg_with_comment(jpeg: &[u8], comment: &str) -> Vec<u8> {
        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xFE]);
        out.extend_from_slice(&((comment.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(comment.as_bytes());
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn png_text_chunks_are_dropped() {
        let clean = raster_asset(&noisy_buffer(16, 16), AssetFormat::Png);
        let tagged = png_with_text(clean.bytes(), "Author", "Jane Q. Photographer");
        let asset = EncodedAsset::new("holiday.png", AssetFormat::Png, tagged);
        assert!(codec::decode(&asset).is_ok());

        let report = MetadataScrubber::default().scrub(&asset).unwrap();
        assert!(!contains(report.asset.bytes(), b"Jane Q. Photographer"));
        assert_eq!(report.asset.name(), "holiday_clean.png");
        assert_eq!(report.removed_fields, to_strings(&RASTER_FIELDS));
        assert_eq!(report.outcome, Outcome::Transformed);
    }

    #[test]
    fn jpeg_comment_segments_are_dropped() {
        let clean = raster_asset(&noisy_buffer(16, 16), AssetFormat::Jpg);
        let tagged = jpeg_with_comment(clean.bytes(), "shot at 51.5N 0.12W");
        let asset = EncodedAsset::new("IMG_0001.jpg", AssetFormat::Jpg, tagged);

        let report = MetadataScrubber::default().scrub(&asset).unwrap();
        assert!(!contains(report.asset.bytes(), b"51.5N"));
        let decoded = codec::decode(&report.asset).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }

    #[test]
    fn pdf_info_slots_are_overwritten() {
        let info = dictionary! {
            "Title" => Object::string_literal("Quarterly numbers"),
            "Author" => Object::string_literal("A. Person"),
            "Producer" => Object::string_literal("SomeWriter 9.1"),
        };
        let asset = pdf_asset("report.pdf", build_pdf(vec![TestPage::blank(100, 100)], Some(info)));
        let report = MetadataScrubber::default().scrub(&asset).unwrap();

        assert_eq!(report.asset.name(), "report_clean.pdf");
        assert_eq!(
            report.removed_fields,
            vec![
                "Title",
                "Author",
                "Subject",
                "Keywords",
                "Producer",
                "Creator",
                "Creation date",
                "Modification date"
            ]
        );
        assert!(!contains(report.asset.bytes(), b"A. Person"));
        assert!(!contains(report.asset.bytes(), b"Quarterly numbers"));
    }

    #[test]
    fn scrubbing_twice_reports_the_same_fields() {
        let asset = pdf_asset("a.pdf", build_pdf(vec![TestPage::blank(50, 50)], None));
        let scrubber = MetadataScrubber::default();
        let once = scrubber.scrub(&asset).unwrap();
        let twice = scrubber.scrub(&once.asset).unwrap();
        assert_eq!(once.removed_fields, twice.removed_fields);
        assert_eq!(twice.outcome, Outcome::Transformed);
        assert_eq!(twice.asset.name(), "a_clean_clean.pdf");
    }

    #[test]
    fn malformed_pdf_degrades_instead_of_failing() {
        let asset = pdf_asset("broken.pdf", b"%PDF-1.7 nope".to_vec());
        let report = MetadataScrubber::default().scrub(&asset).unwrap();
        assert_eq!(report.removed_fields, vec![PARTIAL_FIELD]);
        assert_eq!(report.asset.bytes(), asset.bytes());
        assert_eq!(report.asset.name(), "broken_clean.pdf");
        assert!(report.outcome.is_unchanged());
    }

    #[test]
    fn other_formats_pass_through() {
        let asset = EncodedAsset::new("letter.docx", AssetFormat::Docx, b"PK\x03\x04".to_vec());
        let report = MetadataScrubber::default().scrub(&asset).unwrap();
        assert_eq!(report.removed_fields, vec![GENERIC_FIELD]);
        assert_eq!(report.asset.bytes(), asset.bytes());
        assert_eq!(report.asset.name(), "letter_clean.docx");
    }

    #[test]
    fn undecodable_raster_is_an_error() {
        let asset = EncodedAsset::new("x.webp", AssetFormat::Webp, b"RIFF".to_vec());
        let err = MetadataScrubber::default().scrub(&asset).unwrap_err();
        assert!(matches!(err, MediawerkError::Decode(_)));
    }
}
