// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Segmentation engine — colour-proximity background detection.
//
// Four flood fills grow from the image corners. Each fill compares every
// candidate pixel against its own seed's colour (never a running average),
// so differently coloured corners each claim their own region. The union of
// the four regions is the background. A second pass softens the cut-out by
// marking foreground pixels that touch a transparent pixel as `Edge`.

use mediawerk_core::MaskSummary;
use tracing::{debug, instrument, warn};

use super::codec::RasterBuffer;

pub const DEFAULT_TOLERANCE: u8 = 40;
pub const MIN_TOLERANCE: u8 = 5;
pub const MAX_TOLERANCE: u8 = 100;
/// Alpha given to foreground pixels on the cut-out boundary.
pub const EDGE_ALPHA: u8 = 128;

const NEIGHBOURS: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Per-pixel classification after segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaClass {
    /// Foreground; alpha left as decoded.
    Opaque,
    /// Background (or already fully transparent); alpha becomes 0.
    Transparent,
    /// Foreground touching a transparent pixel; alpha becomes `EDGE_ALPHA`.
    Edge,
}

/// Classification over the same dimensions as the buffer it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    classes: Vec<AlphaClass>,
}

impl AlphaMask {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn class_at(&self, x: u32, y: u32) -> AlphaClass {
        self.classes[y as usize * self.width as usize + x as usize]
    }

    pub fn summary(&self) -> MaskSummary {
        self.classes
            .iter()
            .fold(MaskSummary::default(), |mut acc, class| {
                match class {
                    AlphaClass::Opaque => acc.opaque += 1,
                    AlphaClass::Transparent => acc.transparent += 1,
                    AlphaClass::Edge => acc.edge += 1,
                }
                acc
            })
    }

    /// Write the mask into the buffer's alpha channel.
    ///
    /// Returns `false` (and leaves the buffer alone) if the dimensions differ.
    pub fn apply(&self, buffer: &mut RasterBuffer) -> bool {
        if buffer.width() != self.width || buffer.height() != self.height {
            return false;
        }
        for (px, class) in buffer.pixels_mut().chunks_exact_mut(4).zip(&self.classes) {
            match class {
                AlphaClass::Opaque => {}
                AlphaClass::Transparent => px[3] = 0,
                AlphaClass::Edge => px[3] = EDGE_ALPHA,
            }
        }
        true
    }
}

/// Flood-fill background detector seeded from the four corners.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundSegmenter {
    tolerance: u8,
}

impl BackgroundSegmenter {
    /// `tolerance` is a Euclidean RGB distance, clamped to 5..=100.
    pub fn new(tolerance: u8) -> Self {
        let clamped = tolerance.clamp(MIN_TOLERANCE, MAX_TOLERANCE);
        if clamped != tolerance {
            warn!(requested = tolerance, clamped, "Tolerance out of range, clamped");
        }
        Self { tolerance: clamped }
    }

    pub fn tolerance(&self) -> u8 {
        self.tolerance
    }

    /// Background membership per flattened pixel index.
    #[instrument(skip_all, fields(width = buffer.width(), height = buffer.height(), tolerance = self.tolerance))]
    pub fn detect_background(&self, buffer: &RasterBuffer) -> Vec<bool> {
        let (w, h) = (buffer.width(), buffer.height());
        let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)];

        let mut background = vec![false; buffer.pixel_count()];
        let mut visited = vec![false; buffer.pixel_count()];
        let mut stack = Vec::new();

        for (sx, sy) in corners {
            visited.fill(false);
            let grown = self.flood_fill(buffer, (sx, sy), &mut visited, &mut stack);
            for (bg, hit) in background.iter_mut().zip(&visited) {
                *bg |= *hit;
            }
            debug!(seed_x = sx, seed_y = sy, grown, "Seed region grown");
        }
        background
    }

    /// Classify every pixel. The buffer must still hold its original alpha.
    pub fn mask(&self, buffer: &RasterBuffer) -> AlphaMask {
        let background = self.detect_background(buffer);
        let (w, h) = (buffer.width() as usize, buffer.height() as usize);
        let pixels = buffer.pixels();

        let transparent: Vec<bool> = background
            .iter()
            .enumerate()
            .map(|(i, bg)| *bg || pixels[i * 4 + 3] == 0)
            .collect();

        let classes = (0..w * h)
            .map(|i| {
                if transparent[i] {
                    return AlphaClass::Transparent;
                }
                let (x, y) = ((i % w) as i64, (i / w) as i64);
                let touches_transparent = NEIGHBOURS.iter().any(|(dx, dy)| {
                    let (nx, ny) = (x + dx, y + dy);
                    nx >= 0
                        && ny >= 0
                        && (nx as usize) < w
                        && (ny as usize) < h
                        && transparent[ny as usize * w + nx as usize]
                });
                if touches_transparent {
                    AlphaClass::Edge
                } else {
                    AlphaClass::Opaque
                }
            })
            .collect();

        AlphaMask {
            width: buffer.width(),
            height: buffer.height(),
            classes,
        }
    }

    /// Mask then composite: background alpha zeroed, boundary softened.
    pub fn remove_background(&self, mut buffer: RasterBuffer) -> (RasterBuffer, AlphaMask) {
        let mask = self.mask(&buffer);
        mask.apply(&mut buffer);
        (buffer, mask)
    }

    /// Grow one seed's region into `visited` with an explicit work-list.
    /// Returns the region size.
    fn flood_fill(
        &self,
        buffer: &RasterBuffer,
        seed: (u32, u32),
        visited: &mut [bool],
        stack: &mut Vec<(u32, u32)>,
    ) -> usize {
        let (w, h) = (buffer.width() as i64, buffer.height() as i64);
        let seed_rgb = rgb(buffer.pixel(seed.0, seed.1));
        let limit = f64::from(self.tolerance);
        let mut grown = 0;

        stack.clear();
        stack.push(seed);
        while let Some((x, y)) = stack.pop() {
            let index = y as usize * w as usize + x as usize;
            if visited[index] {
                continue;
            }
            if colour_distance(rgb(buffer.pixel(x, y)), seed_rgb) > limit {
                continue;
            }
            visited[index] = true;
            grown += 1;

            for (dx, dy) in NEIGHBOURS {
                let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                if nx >= 0 && ny >= 0 && nx < w && ny < h && !visited[(ny * w + nx) as usize] {
                    stack.push((nx as u32, ny as u32));
                }
            }
        }
        grown
    }
}

impl Default for BackgroundSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

fn rgb(px: [u8; 4]) -> [f64; 3] {
    [f64::from(px[0]), f64::from(px[1]), f64::from(px[2])]
}

fn colour_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}
