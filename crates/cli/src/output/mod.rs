//! Output formatting for human and JSON modes

mod formatter;

pub use formatter::Formatter;

/// Output options shared by every command
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Strict JSON on stdout, no colors or progress
    pub json: bool,
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
}
