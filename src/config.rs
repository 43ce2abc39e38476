use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// IngestConfig – how source files are laid out
// ---------------------------------------------------------------------------

/// Layout of the per-session CSV exports and the plottability denylist.
///
/// Every field has a default, so a JSON file only needs the keys it changes:
///
/// ```json
/// { "header_lines": 2, "animal_keys": ["vole"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Lines of `key:value` metadata before the table starts.
    pub header_lines: usize,
    /// Accepted names for the animal identifier, tried in order.
    pub animal_keys: Vec<String>,
    pub experiment_keys: Vec<String>,
    pub day_keys: Vec<String>,
    /// Round index column of by-round files.
    pub round_column: String,
    /// Unnamed index columns that by-round files may carry.
    pub index_columns: Vec<String>,
    /// Metric names that are never plottable.
    pub do_not_plot: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            header_lines: 1,
            animal_keys: strings(&["animal_ID", "animal", "vole"]),
            experiment_keys: strings(&["experiment"]),
            day_keys: strings(&["day"]),
            round_column: "Round".to_string(),
            index_columns: strings(&["", "Unnamed: 0"]),
            do_not_plot: strings(&["day", "date"]),
        }
    }
}

impl IngestConfig {
    /// Load from a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn is_denylisted(&self, metric: &str) -> bool {
        self.do_not_plot.iter().any(|d| d == metric)
    }

    pub fn is_index_column(&self, column: &str) -> bool {
        self.index_columns.iter().any(|c| c == column)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: IngestConfig =
            serde_json::from_str(r#"{ "header_lines": 3, "do_not_plot": ["date"] }"#).unwrap();
        assert_eq!(cfg.header_lines, 3);
        assert_eq!(cfg.round_column, "Round");
        assert!(cfg.is_denylisted("date"));
        assert!(!cfg.is_denylisted("day"));
    }

    #[test]
    fn defaults_denylist_day_and_date() {
        let cfg = IngestConfig::default();
        assert!(cfg.is_denylisted("day"));
        assert!(cfg.is_denylisted("date"));
        assert!(!cfg.is_denylisted("weight"));
        assert!(cfg.is_index_column("Unnamed: 0"));
    }
}
