// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF page renderer — paint one page of a `lopdf` document onto a raster.
//
// Only image XObjects (also inside Form XObjects) and filled rectangles are
// painted. A page that shows text, strokes or curves, shadings or inline
// images is refused with a decode error rather than rendered incomplete.
// Clipping is ignored. Every device pixel is sampled by mapping its centre
// back into user space through the inverse CTM (nearest neighbour).

use std::collections::BTreeSet;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use mediawerk_core::error::{MediawerkError, Result};
use tracing::{debug, instrument, warn};

use super::reader::{inherited_attribute, media_box, resolve};
use crate::image::codec::{self, RasterBuffer};

/// Form XObjects nested deeper than this are refused.
const MAX_FORM_DEPTH: usize = 8;

/// Text rendering mode that paints nothing (OCR layers over scans).
const INVISIBLE_TEXT: i64 = 3;

/// 2D affine transform `[a b c d e f]` in PDF's row-vector convention:
/// `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// Concatenate: apply `self` first, then `other`.
    pub fn concat(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// `None` for singular (zero-area) transforms.
    pub fn inverse(&self) -> Option<Matrix> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < 1e-9 {
            return None;
        }
        Some(Matrix {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        let values: Vec<f32> = operands.iter().filter_map(|o| o.as_float().ok()).collect();
        match values.as_slice() {
            [a, b, c, d, e, f] => Some(Matrix {
                a: *a,
                b: *b,
                c: *c,
                d: *d,
                e: *e,
                f: *f,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    ctm: Matrix,
    fill: [u8; 3],
    text_mode: i64,
}

/// Content the renderer met but cannot draw, by kind.
type Unpainted = BTreeSet<&'static str>;

/// Renders pages of one document at a fixed scale.
pub struct PageRenderer<'a> {
    doc: &'a Document,
    scale: f32,
}

impl<'a> PageRenderer<'a> {
    pub fn new(doc: &'a Document, scale: f32) -> Self {
        Self { doc, scale }
    }

    /// Paint one page over white. Output dimensions are the page's /MediaBox
    /// in points times the scale factor.
    ///
    /// Fails with `Encode` when the canvas would exceed
    /// [`codec::MAX_PIXELS`], and with `Decode` when the page holds content
    /// that would be missing from the raster.
    #[instrument(skip(self), fields(scale = self.scale))]
    pub fn render_page(&self, page_id: ObjectId) -> Result<RasterBuffer> {
        let [x0, y0, x1, y1] = media_box(self.doc, page_id);
        let (width, height) = codec::checked_dimensions(
            (f64::from(x1 - x0) * f64::from(self.scale)).round(),
            (f64::from(y1 - y0) * f64::from(self.scale)).round(),
        )?;
        let mut canvas = RasterBuffer::filled(width, height, [255, 255, 255, 255])?;

        // User space to device space: scale, flip y, origin at the box's top-left.
        let device = Matrix {
            a: self.scale,
            b: 0.0,
            c: 0.0,
            d: -self.scale,
            e: -x0 * self.scale,
            f: y1 * self.scale,
        };

        let content = self.doc.get_page_content(page_id).map_err(|err| {
            MediawerkError::Decode(format!("cannot read PDF page content: {err}"))
        })?;
        let resources = inherited_attribute(self.doc, page_id, b"Resources")
            .and_then(|r| r.as_dict().ok());

        let mut unpainted = Unpainted::new();
        self.run(&content, resources, device, &mut canvas, 0, &mut unpainted)?;
        if !unpainted.is_empty() {
            let kinds: Vec<&str> = unpainted.into_iter().collect();
            return Err(MediawerkError::Decode(format!(
                "page contains content that cannot be rendered: {}",
                kinds.join(", ")
            )));
        }
        debug!(width, height, "Page rendered");
        Ok(canvas)
    }

    fn run(
        &self,
        content: &[u8],
        resources: Option<&Dictionary>,
        base: Matrix,
        canvas: &mut RasterBuffer,
        depth: usize,
        unpainted: &mut Unpainted,
    ) -> Result<()> {
        let content = Content::decode(content)
            .map_err(|err| MediawerkError::Decode(format!("malformed PDF content stream: {err}")))?;

        let mut state = GraphicsState {
            ctm: base,
            fill: [0, 0, 0],
            text_mode: 0,
        };
        let mut saved: Vec<GraphicsState> = Vec::new();
        let mut rects: Vec<[f32; 4]> = Vec::new();
        // Set once the current path has segments other than `re`.
        let mut curved = false;

        for operation in &content.operations {
            let operands = &operation.operands;
            match operation.operator.as_str() {
                "q" => saved.push(state),
                "Q" => {
                    if let Some(previous) = saved.pop() {
                        state = previous;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        state.ctm = m.concat(&state.ctm);
                    }
                }
                "rg" => {
                    if let Some(rgb) = colour(operands, 3) {
                        state.fill = rgb;
                    }
                }
                "g" => {
                    if let Some(rgb) = colour(operands, 1) {
                        state.fill = rgb;
                    }
                }
                "k" => {
                    if let Some(rgb) = colour(operands, 4) {
                        state.fill = rgb;
                    }
                }
                "sc" | "scn" => {
                    if let Some(rgb) = colour(operands, operands.len()) {
                        state.fill = rgb;
                    }
                }
                "m" | "l" | "c" | "v" | "y" | "h" => curved = true,
                "re" => {
                    let values: Vec<f32> =
                        operands.iter().filter_map(|o| o.as_float().ok()).collect();
                    if let [x, y, w, h] = values.as_slice() {
                        rects.push([*x, *y, *w, *h]);
                    }
                }
                "f" | "F" | "f*" => {
                    if curved {
                        unpainted.insert("curved paths");
                    }
                    for rect in rects.drain(..) {
                        fill_rect(canvas, &state.ctm, rect, state.fill);
                    }
                    curved = false;
                }
                "n" => {
                    rects.clear();
                    curved = false;
                }
                "S" | "s" | "B" | "B*" | "b" | "b*" => {
                    unpainted.insert("stroked paths");
                    rects.clear();
                    curved = false;
                }
                "Tr" => {
                    if let Some(mode) = operands.first().and_then(|o| o.as_i64().ok()) {
                        state.text_mode = mode;
                    }
                }
                "Tj" | "TJ" | "'" | "\"" => {
                    if state.text_mode != INVISIBLE_TEXT {
                        unpainted.insert("text");
                    }
                }
                "sh" => {
                    unpainted.insert("shadings");
                }
                "BI" | "ID" | "EI" => {
                    unpainted.insert("inline images");
                }
                "Do" => {
                    let Some(name) = operands.first().and_then(|o| o.as_name().ok()) else {
                        continue;
                    };
                    self.draw_xobject(name, resources, &state, canvas, depth, unpainted)?;
                }
                // State and marked-content operators paint nothing.
                _ => {}
            }
        }
        Ok(())
    }

    fn draw_xobject(
        &self,
        name: &[u8],
        resources: Option<&Dictionary>,
        state: &GraphicsState,
        canvas: &mut RasterBuffer,
        depth: usize,
        unpainted: &mut Unpainted,
    ) -> Result<()> {
        let xobject_name = String::from_utf8_lossy(name);
        let Some(stream) = resources
            .and_then(|r| r.get(b"XObject").ok())
            .map(|x| resolve(self.doc, x))
            .and_then(|x| x.as_dict().ok())
            .and_then(|x| x.get(name).ok())
            .map(|x| resolve(self.doc, x))
            .and_then(|x| x.as_stream().ok())
        else {
            warn!(xobject = %xobject_name, "XObject not found in page resources");
            return Ok(());
        };

        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => match decode_image(self.doc, stream) {
                Ok(image) => draw_image(canvas, &state.ctm, &image),
                Err(reason) => {
                    warn!(xobject = %xobject_name, %reason, "Unsupported image");
                    unpainted.insert("images in unsupported encodings");
                }
            },
            Ok(b"Form") => {
                if depth >= MAX_FORM_DEPTH {
                    warn!(xobject = %xobject_name, depth, "Form XObject nesting too deep");
                    unpainted.insert("deeply nested forms");
                    return Ok(());
                }
                let matrix = stream
                    .dict
                    .get(b"Matrix")
                    .and_then(Object::as_array)
                    .ok()
                    .and_then(|m| Matrix::from_operands(m))
                    .unwrap_or(Matrix::IDENTITY);
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .map(|r| resolve(self.doc, r))
                    .and_then(|r| r.as_dict().ok())
                    .or(resources);
                let content = match stream_data(stream) {
                    Ok(content) => content,
                    Err(reason) => {
                        warn!(xobject = %xobject_name, %reason, "Unreadable form");
                        unpainted.insert("unreadable forms");
                        return Ok(());
                    }
                };
                self.run(
                    &content,
                    form_resources,
                    matrix.concat(&state.ctm),
                    canvas,
                    depth + 1,
                    unpainted,
                )?;
            }
            _ => debug!(xobject = %xobject_name, "Ignoring XObject of unknown subtype"),
        }
        Ok(())
    }
}

// -- Painting -------------------------------------------------------------------

/// Device-space pixel bounds of a user-space rectangle under `ctm`.
fn device_bounds(canvas: &RasterBuffer, ctm: &Matrix, rect: [f32; 4]) -> Option<(u32, u32, u32, u32)> {
    let [x, y, w, h] = rect;
    let corners = [(x, y), (x + w, y), (x, y + h), (x + w, y + h)].map(|(u, v)| ctm.apply(u, v));
    let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min).floor().max(0.0);
    let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min).floor().max(0.0);
    let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max).ceil();
    let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max).ceil();
    let max_x = max_x.min(canvas.width() as f32);
    let max_y = max_y.min(canvas.height() as f32);
    if min_x >= max_x || min_y >= max_y {
        return None;
    }
    Some((min_x as u32, min_y as u32, max_x as u32, max_y as u32))
}

fn fill_rect(canvas: &mut RasterBuffer, ctm: &Matrix, rect: [f32; 4], rgb: [u8; 3]) {
    let Some(inverse) = ctm.inverse() else {
        return;
    };
    let Some((x0, y0, x1, y1)) = device_bounds(canvas, ctm, rect) else {
        return;
    };
    let [rx, ry, rw, rh] = rect;
    let (ux0, ux1) = (rx.min(rx + rw), rx.max(rx + rw));
    let (uy0, uy1) = (ry.min(ry + rh), ry.max(ry + rh));
    let width = canvas.width() as usize;

    let pixels = canvas.pixels_mut();
    for py in y0..y1 {
        for px in x0..x1 {
            let (u, v) = inverse.apply(px as f32 + 0.5, py as f32 + 0.5);
            if u >= ux0 && u < ux1 && v >= uy0 && v < uy1 {
                let i = (py as usize * width + px as usize) * 4;
                pixels[i..i + 3].copy_from_slice(&rgb);
            }
        }
    }
}

/// Images occupy the unit square of their CTM, row 0 at the top (v = 1).
fn draw_image(canvas: &mut RasterBuffer, ctm: &Matrix, image: &RasterBuffer) {
    let Some(inverse) = ctm.inverse() else {
        return;
    };
    let Some((x0, y0, x1, y1)) = device_bounds(canvas, ctm, [0.0, 0.0, 1.0, 1.0]) else {
        return;
    };
    let (iw, ih) = (image.width() as f32, image.height() as f32);
    let width = canvas.width() as usize;

    let pixels = canvas.pixels_mut();
    for py in y0..y1 {
        for px in x0..x1 {
            let (u, v) = inverse.apply(px as f32 + 0.5, py as f32 + 0.5);
            if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
                continue;
            }
            let ix = ((u * iw) as u32).min(image.width() - 1);
            let iy = (((1.0 - v) * ih) as u32).min(image.height() - 1);
            let src = image.pixel(ix, iy);
            let alpha = u32::from(src[3]);
            let i = (py as usize * width + px as usize) * 4;
            for (dst, s) in pixels[i..i + 3].iter_mut().zip(src) {
                *dst = ((u32::from(s) * alpha + u32::from(*dst) * (255 - alpha) + 127) / 255) as u8;
            }
        }
    }
}

fn colour(operands: &[Object], components: usize) -> Option<[u8; 3]> {
    let values: Vec<f32> = operands.iter().filter_map(|o| o.as_float().ok()).collect();
    if values.len() != components {
        return None;
    }
    let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Some(match values.as_slice() {
        [gray] => [to_byte(*gray); 3],
        [r, g, b] => [to_byte(*r), to_byte(*g), to_byte(*b)],
        [c, m, y, k] => cmyk_to_rgb([to_byte(*c), to_byte(*m), to_byte(*y), to_byte(*k)]),
        _ => return None,
    })
}

fn cmyk_to_rgb([c, m, y, k]: [u8; 4]) -> [u8; 3] {
    let white = 255 - u32::from(k);
    let channel = |v: u8| ((255 - u32::from(v)) * white / 255) as u8;
    [channel(c), channel(m), channel(y)]
}

// -- Image XObject decoding -------------------------------------------------------

/// Decoded sample layout of an image XObject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColourSpace {
    Gray,
    Rgb,
    Cmyk,
}

impl ColourSpace {
    fn components(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }
}

fn decode_image(doc: &Document, stream: &Stream) -> std::result::Result<RasterBuffer, String> {
    let dict = &stream.dict;
    let width = dict_u32(dict, b"Width")?;
    let height = dict_u32(dict, b"Height")?;

    let mut image = if filter_names(dict)?.as_slice() == [b"DCTDecode".as_slice()] {
        let decoded = ::image::load_from_memory_with_format(&stream.content, ::image::ImageFormat::Jpeg)
            .map_err(|err| format!("JPEG decode error: {err}"))?;
        RasterBuffer::from_image(decoded.to_rgba8()).map_err(|err| err.to_string())?
    } else {
        let bits = dict.get(b"BitsPerComponent").and_then(Object::as_i64).unwrap_or(8);
        if bits != 8 {
            return Err(format!("{bits} bits per component"));
        }
        let space = colour_space(doc, dict)?;
        let samples = stream_data(stream)?;
        samples_to_raster(&samples, width, height, space)?
    };

    if let Ok(smask) = dict.get(b"SMask")
        && let Ok(mask) = resolve(doc, smask).as_stream()
    {
        apply_soft_mask(&mut image, mask)?;
    }
    Ok(image)
}

fn apply_soft_mask(image: &mut RasterBuffer, mask: &Stream) -> std::result::Result<(), String> {
    let mw = dict_u32(&mask.dict, b"Width")?;
    let mh = dict_u32(&mask.dict, b"Height")?;
    let alpha = stream_data(mask)?;
    if alpha.len() < mw as usize * mh as usize {
        return Err("soft mask data too short".into());
    }
    let (w, h) = (image.width(), image.height());
    let pixels = image.pixels_mut();
    for y in 0..h {
        for x in 0..w {
            let mx = (x as u64 * u64::from(mw) / u64::from(w)) as usize;
            let my = (y as u64 * u64::from(mh) / u64::from(h)) as usize;
            pixels[(y as usize * w as usize + x as usize) * 4 + 3] = alpha[my * mw as usize + mx];
        }
    }
    Ok(())
}

fn samples_to_raster(
    samples: &[u8],
    width: u32,
    height: u32,
    space: ColourSpace,
) -> std::result::Result<RasterBuffer, String> {
    let n = space.components();
    let expected = width as usize * height as usize * n;
    if samples.len() < expected {
        return Err(format!(
            "image data too short: expected {expected}, got {}",
            samples.len()
        ));
    }
    let pixels: Vec<u8> = samples[..expected]
        .chunks_exact(n)
        .flat_map(|s| {
            let [r, g, b] = match space {
                ColourSpace::Gray => [s[0]; 3],
                ColourSpace::Rgb => [s[0], s[1], s[2]],
                ColourSpace::Cmyk => cmyk_to_rgb([s[0], s[1], s[2], s[3]]),
            };
            [r, g, b, 255]
        })
        .collect();
    RasterBuffer::new(width, height, pixels).map_err(|err| err.to_string())
}

fn colour_space(doc: &Document, dict: &Dictionary) -> std::result::Result<ColourSpace, String> {
    let Ok(object) = dict.get(b"ColorSpace") else {
        return Ok(ColourSpace::Rgb);
    };
    match resolve(doc, object) {
        Object::Name(name) => match name.as_slice() {
            b"DeviceRGB" | b"CalRGB" => Ok(ColourSpace::Rgb),
            b"DeviceGray" | b"CalGray" => Ok(ColourSpace::Gray),
            b"DeviceCMYK" => Ok(ColourSpace::Cmyk),
            other => Err(format!("colour space {}", String::from_utf8_lossy(other))),
        },
        // [/ICCBased <<stream with /N>>]: fall back on the component count.
        Object::Array(items) if items.first().and_then(|o| o.as_name().ok()) == Some(b"ICCBased".as_slice()) => {
            let n = items
                .get(1)
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_stream().ok())
                .and_then(|s| s.dict.get(b"N").and_then(Object::as_i64).ok());
            match n {
                Some(1) => Ok(ColourSpace::Gray),
                Some(3) => Ok(ColourSpace::Rgb),
                Some(4) => Ok(ColourSpace::Cmyk),
                other => Err(format!("ICC profile with {other:?} components")),
            }
        }
        other => Err(format!("colour space {other:?}")),
    }
}

fn filter_names(dict: &Dictionary) -> std::result::Result<Vec<&[u8]>, String> {
    match dict.get(b"Filter") {
        Err(_) => Ok(Vec::new()),
        Ok(Object::Name(name)) => Ok(vec![name.as_slice()]),
        Ok(Object::Array(items)) => items
            .iter()
            .map(|o| o.as_name().map_err(|_| "filter is not a name".to_string()))
            .collect(),
        Ok(other) => Err(format!("unexpected /Filter {other:?}")),
    }
}

/// Stream bytes with every filter undone. lopdf handles Flate (including
/// PNG predictors), LZW and ASCII85.
fn stream_data(stream: &Stream) -> std::result::Result<Vec<u8>, String> {
    if filter_names(&stream.dict)?.is_empty() {
        return Ok(stream.content.clone());
    }
    stream
        .decompressed_content()
        .map_err(|err| format!("cannot decode stream: {err}"))
}

fn dict_u32(dict: &Dictionary, key: &[u8]) -> std::result::Result<u32, String> {
    let value = dict
        .get(key)
        .and_then(Object::as_i64)
        .map_err(|_| format!("missing /{}", String::from_utf8_lossy(key)))?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| format!("invalid /{} {value}", String::from_utf8_lossy(key)))
}
