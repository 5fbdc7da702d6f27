// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory fixtures shared by the unit tests: deterministic rasters and
// small hand-assembled PDFs.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use mediawerk_core::{AssetFormat, EncodedAsset};

use crate::image::codec::{self, EncodeOptions, RasterBuffer};

/// Opaque buffer with a gradient plus pseudo-random noise, so lossy encoders
/// have something to throw away.
pub fn noisy_buffer(width: u32, height: u32) -> RasterBuffer {
    let mut state: u32 = 0x9E37_79B9;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let noise = state.to_le_bytes();
            pixels.push(((x * 255 / width.max(1)) as u8).wrapping_add(noise[0] >> 2));
            pixels.push(((y * 255 / height.max(1)) as u8).wrapping_add(noise[1] >> 2));
            pixels.push(noise[2]);
            pixels.push(255);
        }
    }
    RasterBuffer::new(width, height, pixels).unwrap()
}

/// Encode `buffer` as `format` and wrap it as `fixture.<ext>`.
pub fn raster_asset(buffer: &RasterBuffer, format: AssetFormat) -> EncodedAsset {
    let bytes = codec::encode(buffer, format, EncodeOptions::quality(0.92)).unwrap();
    EncodedAsset::new(format!("fixture.{}", format.extension()), format, bytes)
}

pub fn pdf_asset(name: &str, bytes: Vec<u8>) -> EncodedAsset {
    EncodedAsset::new(name, AssetFormat::Pdf, bytes)
}

/// One page of a hand-built PDF.
pub struct TestPage {
    pub media_box: [i64; 4],
    pub operations: Vec<Operation>,
    pub xobjects: Vec<(&'static str, Stream)>,
}

impl TestPage {
    pub fn blank(width: i64, height: i64) -> Self {
        Self {
            media_box: [0, 0, width, height],
            operations: Vec::new(),
            xobjects: Vec::new(),
        }
    }
}

pub fn op(operator: &str, operands: Vec<Object>) -> Operation {
    Operation::new(operator, operands)
}

pub fn build_pdf(pages: Vec<TestPage>, info: Option<Dictionary>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();

    for page in pages {
        let content = Content {
            operations: page.operations,
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

        let mut xobjects = Dictionary::new();
        for (name, stream) in page.xobjects {
            let id = doc.add_object(stream);
            xobjects.set(name, id);
        }

        let [x0, y0, x1, y1] = page.media_box;
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![x0.into(), y0.into(), x1.into(), y1.into()],
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if let Some(info) = info {
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", info_id);
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Blank pages whose MediaBox widths identify them in ordering tests.
pub fn pdf_with_page_widths(widths: &[i64]) -> Vec<u8> {
    build_pdf(
        widths.iter().map(|w| TestPage::blank(*w, 200)).collect(),
        None,
    )
}

/// Uncompressed DeviceRGB image XObject.
pub fn rgb_image_stream(width: i64, height: i64, rgb: Vec<u8>) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        rgb,
    )
}

/// Page MediaBox widths, in page order.
pub fn page_widths(bytes: &[u8]) -> Vec<i64> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            media_box[2].as_float().unwrap().round() as i64
        })
        .collect()
}
