// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — single-page documents for image and office conversions.
//
// Each page is a list of printpdf `Op`s; the document is serialised in one
// `save` call and any printpdf warnings are only counted.

use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage,
    RawImageData, RawImageFormat, TextItem, XObjectTransform,
};
use tracing::{debug, info, instrument};

use crate::image::codec::{RasterBuffer, WHITE};

/// A4 in millimetres, used for notice pages.
const A4_MM: (f32, f32) = (210.0, 297.0);

/// Builds one-page PDF documents.
pub struct PdfWriter {
    /// Title embedded in the document's /Info dictionary.
    title: String,
}

impl PdfWriter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    // -- Image page -----------------------------------------------------------

    /// A single page exactly the size of the image, one point per pixel,
    /// with the image (flattened over white) as its only content.
    #[instrument(skip(self, buffer), fields(width = buffer.width(), height = buffer.height()))]
    pub fn image_page(&self, buffer: &RasterBuffer) -> Vec<u8> {
        let (width, height) = (buffer.width(), buffer.height());
        info!(title = %self.title, "Creating image PDF");

        let raw = RawImage {
            pixels: RawImageData::U8(buffer.composited_over(WHITE).rgb_bytes()),
            width: width as usize,
            height: height as usize,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };

        let mut doc = PdfDocument::new(&self.title);
        let xobject_id = doc.add_image(&raw);

        // At 72 dpi one image pixel covers one point.
        let ops = vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                scale_x: Some(1.0),
                scale_y: Some(1.0),
                dpi: Some(72.0),
                rotate: None,
            },
        }];

        let page = PdfPage::new(px_to_mm(width), px_to_mm(height), ops);
        doc.with_pages(vec![page]);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        debug!(output_bytes = output.len(), warnings = warnings.len(), "Image page written");
        output
    }

    // -- Notice page ----------------------------------------------------------

    /// A single A4 page of Helvetica text, one paragraph per entry.
    #[instrument(skip(self, paragraphs), fields(paragraphs = paragraphs.len()))]
    pub fn notice_page(&self, paragraphs: &[String]) -> Vec<u8> {
        let (page_w, page_h) = (Mm(A4_MM.0), Mm(A4_MM.1));

        let font_size_pt: f32 = 12.0;
        let line_height_pt: f32 = 16.0;
        let margin_mm: f32 = 25.0;
        let margin_pt = Mm(margin_mm).into_pt().0;

        // Average Helvetica glyph width is roughly half the font size.
        let avg_char_width_mm = 0.50 * font_size_pt * 0.3528;
        let max_chars_per_line = ((page_w.0 - 2.0 * margin_mm) / avg_char_width_mm) as usize;

        let lines = wrap_text(&paragraphs.join("\n\n"), max_chars_per_line);
        let page_h_pt = page_h.into_pt().0;
        let lines_per_page = ((page_h_pt - 2.0 * margin_pt) / line_height_pt) as usize;

        let mut ops = Vec::new();
        for (index, line) in lines.iter().take(lines_per_page).enumerate() {
            let y_pt = page_h_pt - margin_pt - index as f32 * line_height_pt;
            ops.push(Op::StartTextSection);
            ops.push(Op::SetTextCursor {
                pos: Point {
                    x: Pt(margin_pt),
                    y: Pt(y_pt),
                },
            });
            ops.push(Op::SetFontSizeBuiltinFont {
                size: Pt(font_size_pt),
                font: BuiltinFont::Helvetica,
            });
            ops.push(Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(line.clone())],
                font: BuiltinFont::Helvetica,
            });
            ops.push(Op::EndTextSection);
        }

        let mut doc = PdfDocument::new(&self.title);
        doc.with_pages(vec![PdfPage::new(page_w, page_h, ops)]);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        debug!(lines = lines.len(), output_bytes = output.len(), "Notice page written");
        output
    }
}

/// Pixel count to the page length that makes one pixel one point.
fn px_to_mm(px: u32) -> Mm {
    Mm(px as f32 * 25.4 / 72.0)
}

// -- Text wrapping helper -----------------------------------------------------

/// Wrap text so that no line exceeds `max_width` characters.
///
/// Splits on existing newlines first, then word-wraps each paragraph. Words
/// longer than `max_width` are force-broken on character boundaries.
pub(crate) fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let max_width = max_width.max(1);
    let mut result = Vec::new();

    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            result.push(String::new());
            continue;
        }

        let mut current = String::new();
        let mut current_len = 0;
        for word in words {
            let word_len = word.chars().count();
            if word_len > max_width {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                let chars: Vec<char> = word.chars().collect();
                let mut chunks = chars.chunks(max_width).peekable();
                while let Some(chunk) = chunks.next() {
                    if chunks.peek().is_some() {
                        result.push(chunk.iter().collect());
                    } else {
                        current = chunk.iter().collect();
                        current_len = chunk.len();
                    }
                }
            } else if current.is_empty() {
                current.push_str(word);
                current_len = word_len;
            } else if current_len + 1 + word_len <= max_width {
                current.push(' ');
                current.push_str(word);
                current_len += 1 + word_len;
            } else {
                result.push(std::mem::replace(&mut current, word.to_string()));
                current_len = word_len;
            }
        }
        if !current.is_empty() {
            result.push(current);
        }
    }

    result
}
