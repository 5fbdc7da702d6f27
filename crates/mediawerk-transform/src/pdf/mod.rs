// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — parsing, metadata clearing, page import, page rendering and
// single-page document creation.

pub mod reader;
pub mod render;
pub mod writer;

pub use reader::PdfReader;
pub use render::PageRenderer;
pub use writer::PdfWriter;
