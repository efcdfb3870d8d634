//! JSON rendering for analyses and documents.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// JSON output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonFormat {
    /// Pretty-printed JSON with indentation
    #[default]
    Pretty,
    /// Compact JSON without extra whitespace
    Compact,
}

impl std::str::FromStr for JsonFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(JsonFormat::Pretty),
            "compact" => Ok(JsonFormat::Compact),
            other => Err(format!("unknown JSON format '{}'", other)),
        }
    }
}

/// Serialize any result type (analysis, normalized document, fused analysis).
pub fn to_json<T: Serialize + ?Sized>(value: &T, format: JsonFormat) -> Result<String> {
    let result = match format {
        JsonFormat::Pretty => serde_json::to_string_pretty(value),
        JsonFormat::Compact => serde_json::to_string(value),
    };

    result.map_err(|e| Error::Export(format!("JSON serialization error: {}", e)))
}
