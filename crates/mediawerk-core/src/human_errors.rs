// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages.
//
// Every technical error is mapped to a short plain-English message with an
// actionable suggestion. Batch items and the CLI show these instead of the
// raw error chain.

use crate::error::MediawerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Something went wrong on our side; trying again may help.
    Transient,
    /// User must do something (pick another file, change a setting).
    ActionRequired,
    /// Cannot be fixed by retrying — wrong format, unsupported conversion.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether running the same job again could succeed.
    pub retriable: bool,
    pub severity: Severity,
}

impl std::fmt::Display for HumanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.message, self.suggestion)
    }
}

/// Convert a `MediawerkError` into a `HumanError`.
pub fn humanize_error(err: &MediawerkError) -> HumanError {
    match err {
        MediawerkError::Decode(detail) => {
            if detail.contains("PDF") || detail.contains("document") {
                HumanError {
                    message: "There's a problem with this PDF file.".into(),
                    suggestion: "The file may be damaged or password-protected. Try opening it in a PDF viewer first, or pick a different file.".into(),
                    retriable: false,
                    severity: Severity::Permanent,
                }
            } else {
                HumanError {
                    message: "This file couldn't be read.".into(),
                    suggestion: "The file may be damaged, or its extension doesn't match its contents. Try saving it again as JPG or PNG.".into(),
                    retriable: false,
                    severity: Severity::Permanent,
                }
            }
        }

        MediawerkError::Encode(detail) => HumanError {
            message: "The result couldn't be saved in that format.".into(),
            suggestion: format!("Try a different output format or a smaller image. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        MediawerkError::UnsupportedConversion { from, to } => HumanError {
            message: format!("Converting {from} to {to} isn't supported."),
            suggestion: format!(
                "Pick a different target format, or convert the {from} file to PDF or PNG first."
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        MediawerkError::Merge(detail) => HumanError {
            message: "The PDFs couldn't be merged.".into(),
            suggestion: format!("Remove the file that failed and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        MediawerkError::InvalidOptions(detail) => HumanError {
            message: "Those settings can't be used.".into(),
            suggestion: format!("Adjust the settings and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        MediawerkError::Config(detail) => HumanError {
            message: "The configuration file has a problem.".into(),
            suggestion: format!("Fix or remove the configuration file. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        MediawerkError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "No file exists at that path.".into(),
                suggestion: "Check the spelling of the path and that the file was not moved.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "Access to the file or output folder was refused.".into(),
                suggestion: "Pick an output folder you can write to, or adjust its permissions.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "A file could not be read or written.".into(),
                suggestion: "Run the job again; if it keeps failing, check free disk space.".into(),
                retriable: true,
                severity: Severity::Transient,
            },
        },

        MediawerkError::Serialization(_) => HumanError {
            message: "Some settings data couldn't be read.".into(),
            suggestion: "Check that the file is valid JSON. If this keeps happening, please report it.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}
