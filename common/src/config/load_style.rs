use serde::{Deserialize, Serialize};

/// Output rendering style for CLI diagnostics (dumps of the effective config
/// on startup). Mirrors the teacher's `load_style::LoadStyle`, generalized to
/// the three formats `pretty_util::to_string_pretty` supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    Yaml,
    Json,
    None,
}

impl Format {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "json" => Format::Json,
            "none" => Format::None,
            _ => Format::Yaml,
        }
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::Yaml
    }
}
