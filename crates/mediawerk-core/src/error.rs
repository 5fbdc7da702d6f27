// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Mediawerk.

use thiserror::Error;

use crate::types::AssetFormat;

/// Top-level error type for all Mediawerk operations.
#[derive(Debug, Error)]
pub enum MediawerkError {
    // -- Transform errors --
    /// Input is not a well-formed instance of its declared format.
    #[error("could not decode input: {0}")]
    Decode(String),

    /// The target format cannot represent the given buffer or content.
    #[error("could not encode output: {0}")]
    Encode(String),

    #[error("Conversion from {from} to {to} is not supported")]
    UnsupportedConversion { from: AssetFormat, to: AssetFormat },

    #[error("merge failed: {0}")]
    Merge(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MediawerkError>;
