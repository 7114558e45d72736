//! Document filtering by file extension

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Extensions treated as documents (compared case-insensitively)
pub const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".txt", ".doc", ".docx"];

/// Whether `key` ends in one of the document extensions, ignoring case
pub fn is_document(key: &str) -> bool {
    let lower = key.to_lowercase();
    DOCUMENT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Which objects a migration run is allowed to transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    /// Every object is eligible
    #[default]
    None,
    /// Only documents are eligible
    #[serde(alias = "include")]
    IncludeDocuments,
    /// Everything except documents is eligible
    #[serde(alias = "exclude")]
    ExcludeDocuments,
}

impl FilterMode {
    /// Whether an object with this key passes the filter
    pub fn admits(&self, key: &str) -> bool {
        match self {
            FilterMode::None => true,
            FilterMode::IncludeDocuments => is_document(key),
            FilterMode::ExcludeDocuments => !is_document(key),
        }
    }
}

impl std::fmt::Display for FilterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterMode::None => write!(f, "none"),
            FilterMode::IncludeDocuments => write!(f, "include-documents"),
            FilterMode::ExcludeDocuments => write!(f, "exclude-documents"),
        }
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "all" => Ok(FilterMode::None),
            "include" | "include-documents" => Ok(FilterMode::IncludeDocuments),
            "exclude" | "exclude-documents" => Ok(FilterMode::ExcludeDocuments),
            _ => Err(format!(
                "Invalid filter mode: {s} (expected none, include or exclude)"
            )),
        }
    }
}
