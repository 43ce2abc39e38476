use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};

use super::model::{SessionKey, classify};
use crate::config::IngestConfig;

/// Metadata from the header block: key → value.
pub type Header = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Body types
// ---------------------------------------------------------------------------

/// One variable of a summary file after transposition.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub var_name: String,
    pub var: String,
    pub var_desc: String,
}

/// Summary table: one row per variable.
#[derive(Debug, Clone, Default)]
pub struct SummaryBody {
    pub rows: Vec<SummaryRow>,
}

impl SummaryBody {
    /// Value of the first row named `var_name`.
    pub fn value_of(&self, var_name: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.var_name == var_name)
            .map(|r| r.var.as_str())
    }
}

/// By-round table: the round index column plus one column per variable.
#[derive(Debug, Clone, Default)]
pub struct RoundBody {
    /// Raw round index cells, one per row.
    pub rounds: Vec<String>,
    /// (variable name, cells) in file order; cells align with `rounds`.
    pub columns: Vec<(String, Vec<String>)>,
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read a summary export.
///
/// Layout after the header block:
///
/// ```text
/// ,0,1,2,3
/// var_name,animal_ID,experiment,day,weight
/// var,7,E1,3,21.5
/// var_desc,Animal,Experiment,Day,Body weight (g)
/// ```
///
/// The first line is a column-label row and is ignored. Rows are picked by
/// their first cell; `var_name` and `var` are required, `var_desc` is not.
pub fn read_summary(path: &Path, config: &IngestConfig) -> Result<(Header, SummaryBody)> {
    let text = std::fs::read_to_string(path).context("reading summary CSV")?;
    let (head_text, body_text) = split_header(&text, config.header_lines);
    let header = parse_header(head_text)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body_text.as_bytes());

    let mut labelled: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("summary row {row_no}"))?;
        let Some(label) = record.get(0) else {
            continue;
        };
        // First occurrence wins if a label repeats.
        labelled
            .entry(label.to_string())
            .or_insert_with(|| record.iter().skip(1).map(str::to_string).collect());
    }

    let names = labelled.get("var_name").context("summary CSV missing 'var_name' row")?;
    let values = labelled.get("var").context("summary CSV missing 'var' row")?;
    let descs = labelled.get("var_desc");

    let rows = names
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.is_empty())
        .map(|(i, name)| SummaryRow {
            var_name: name.clone(),
            var: values.get(i).cloned().unwrap_or_default(),
            var_desc: descs.and_then(|d| d.get(i)).cloned().unwrap_or_default(),
        })
        .collect();

    Ok((header, SummaryBody { rows }))
}

/// Read a by-round export: a header row, then one row per round.
pub fn read_by_round(path: &Path, config: &IngestConfig) -> Result<(Header, RoundBody)> {
    let text = std::fs::read_to_string(path).context("reading by-round CSV")?;
    let (head_text, body_text) = split_header(&text, config.header_lines);
    let header = parse_header(head_text)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body_text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("reading by-round column names")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let round_idx = headers
        .iter()
        .position(|h| *h == config.round_column)
        .with_context(|| format!("by-round CSV missing '{}' column", config.round_column))?;

    let var_cols: Vec<usize> = (0..headers.len())
        .filter(|&i| i != round_idx && !config.is_index_column(&headers[i]))
        .collect();

    let mut body = RoundBody {
        rounds: Vec::new(),
        columns: var_cols.iter().map(|&i| (headers[i].clone(), Vec::new())).collect(),
    };

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("by-round row {row_no}"))?;
        body.rounds.push(record.get(round_idx).unwrap_or("").to_string());
        for (slot, &col_idx) in var_cols.iter().enumerate() {
            body.columns[slot]
                .1
                .push(record.get(col_idx).unwrap_or("").to_string());
        }
    }

    Ok((header, body))
}

// ---------------------------------------------------------------------------
// Session metadata
// ---------------------------------------------------------------------------

/// Resolve animal / experiment / day.
///
/// Each field is looked up in the summary body first (when one is given),
/// then in the header, trying every configured alias in order.
pub fn session_key(
    header: &Header,
    body: Option<&SummaryBody>,
    config: &IngestConfig,
) -> Result<SessionKey> {
    let animal = lookup(header, body, &config.animal_keys)?;
    let experiment = lookup(header, body, &config.experiment_keys)?;
    let day = lookup(header, body, &config.day_keys)?;

    Ok(SessionKey {
        animal: coerce_integer(animal).with_context(|| format!("animal '{animal}'"))?,
        experiment: experiment.to_string(),
        day: coerce_integer(day).with_context(|| format!("day '{day}'"))?,
    })
}

fn lookup<'a>(header: &'a Header, body: Option<&'a SummaryBody>, keys: &[String]) -> Result<&'a str> {
    let from_body = body.and_then(|b| keys.iter().find_map(|k| b.value_of(k)));
    from_body
        .or_else(|| keys.iter().find_map(|k| header.get(k).map(String::as_str)))
        .with_context(|| format!("missing metadata (tried {})", keys.join(", ")))
}

/// Integer text, or a float with no fractional part.
pub fn coerce_integer(raw: &str) -> Result<i64> {
    match classify(raw).as_i64() {
        Some(i) => Ok(i),
        None => bail!("'{raw}' is not an integer"),
    }
}

// -- helpers --

/// Split off the first `n` lines.
fn split_header(text: &str, n: usize) -> (&str, &str) {
    if n == 0 {
        return ("", text);
    }
    match text.match_indices('\n').nth(n - 1) {
        Some((pos, _)) => (&text[..pos], &text[pos + 1..]),
        None => (text, ""),
    }
}

/// Each header cell is `key:value` or `key=value`; other cells are ignored.
fn parse_header(text: &str) -> Result<Header> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut header = Header::new();
    for result in reader.records() {
        let record = result.context("parsing header block")?;
        for cell in record.iter() {
            if let Some(pos) = cell.find([':', '=']) {
                let key = cell[..pos].trim();
                if !key.is_empty() {
                    header.insert(key.to_string(), cell[pos + 1..].trim().to_string());
                }
            }
        }
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_header_takes_leading_lines() {
        assert_eq!(split_header("a\nb\nc\n", 1), ("a", "b\nc\n"));
        assert_eq!(split_header("a\nb\nc\n", 2), ("a\nb", "c\n"));
        assert_eq!(split_header("a", 3), ("a", ""));
        assert_eq!(split_header("a\nb", 0), ("", "a\nb"));
    }

    #[test]
    fn header_accepts_both_separators() {
        let h = parse_header("animal: 4,experiment=E1, day : 2 ,junk\n").unwrap();
        assert_eq!(h["animal"], "4");
        assert_eq!(h["experiment"], "E1");
        assert_eq!(h["day"], "2");
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn time_values_keep_their_colons() {
        let h = parse_header("date:2024-01-02,time:10:30\n").unwrap();
        assert_eq!(h["time"], "10:30");
    }

    #[test]
    fn coerce_integer_accepts_integral_floats() {
        assert_eq!(coerce_integer("3").unwrap(), 3);
        assert_eq!(coerce_integer("3.0").unwrap(), 3);
        assert!(coerce_integer("3.5").is_err());
        assert!(coerce_integer("three").is_err());
    }

    #[test]
    fn session_key_prefers_body_over_header() {
        let mut header = Header::new();
        header.insert("vole".into(), "9".into());
        header.insert("experiment".into(), "header-exp".into());
        header.insert("day".into(), "4".into());
        let body = SummaryBody {
            rows: vec![SummaryRow {
                var_name: "experiment".into(),
                var: "body-exp".into(),
                var_desc: String::new(),
            }],
        };

        let key = session_key(&header, Some(&body), &IngestConfig::default()).unwrap();
        assert_eq!(key.animal, 9);
        assert_eq!(key.experiment, "body-exp");
        assert_eq!(key.day, 4);
    }

    #[test]
    fn session_key_names_missing_field() {
        let header = Header::new();
        let err = session_key(&header, None, &IngestConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("animal_ID"));
    }
}
