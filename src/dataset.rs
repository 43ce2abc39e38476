use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::IngestConfig;
use crate::data::matrix::{Matrix, RoundMatrix};
use crate::data::model::{Round, RoundTable, ScalarValue, SessionKey, ValueKind, classify};
use crate::data::reader::{self, Header, RoundBody, SummaryBody};
use crate::data::rounds::RoundMetricStore;
use crate::data::scalar::ScalarMetricStore;
use crate::error::{Error, Result};

const SUMMARY: &str = "summary";
const BY_ROUND: &str = "by-round";

// ---------------------------------------------------------------------------
// MetricStore – either aggregation shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetricStore {
    Summary(ScalarMetricStore),
    ByRound(RoundMetricStore),
}

impl MetricStore {
    pub fn name(&self) -> &str {
        match self {
            MetricStore::Summary(s) => s.name(),
            MetricStore::ByRound(r) => r.name(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            MetricStore::Summary(s) => s.description(),
            MetricStore::ByRound(r) => r.description(),
        }
    }

    pub fn data_type(&self) -> Option<ValueKind> {
        match self {
            MetricStore::Summary(s) => s.data_type(),
            MetricStore::ByRound(r) => r.data_type(),
        }
    }

    pub fn is_plottable(&self) -> bool {
        match self {
            MetricStore::Summary(s) => s.is_plottable(),
            MetricStore::ByRound(r) => r.is_plottable(),
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            MetricStore::Summary(_) => SUMMARY,
            MetricStore::ByRound(_) => BY_ROUND,
        }
    }
}

// ---------------------------------------------------------------------------
// IngestReport – outcome of one file
// ---------------------------------------------------------------------------

/// What one ingestion call did. Rejections were already logged.
#[derive(Debug)]
pub struct IngestReport {
    pub file: PathBuf,
    pub session: SessionKey,
    /// Variables stored.
    pub accepted: usize,
    /// Variables rejected (duplicates, shape mismatches).
    pub rejected: Vec<Error>,
}

impl IngestReport {
    fn new(file: &Path, session: SessionKey) -> Self {
        IngestReport {
            file: file.to_path_buf(),
            session,
            accepted: 0,
            rejected: Vec::new(),
        }
    }

    /// Count a success or keep a per-variable failure; anything else propagates.
    fn record(&mut self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.accepted += 1;
                Ok(())
            }
            Err(err) if err.is_per_variable() => {
                warn!("{}: {err}", self.file.display());
                self.rejected.push(err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// LongitudinalDataset – every metric of one study
// ---------------------------------------------------------------------------

/// Metrics of one longitudinal study, built up one session file at a time.
///
/// Files may arrive in any order. A value for an (animal, experiment, day)
/// that is already filled is rejected, never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongitudinalDataset {
    name: String,
    config: IngestConfig,
    metrics: BTreeMap<String, MetricStore>,
    experiments: BTreeSet<String>,
    files: BTreeSet<PathBuf>,
    animal_order: Option<Vec<i64>>,
}

impl LongitudinalDataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, IngestConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: IngestConfig) -> Self {
        LongitudinalDataset {
            name: name.into(),
            config,
            metrics: BTreeMap::new(),
            experiments: BTreeSet::new(),
            files: BTreeSet::new(),
            animal_order: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Fix the row order of every query; `None` derives it from the data.
    pub fn set_animal_order(&mut self, order: Option<Vec<i64>>) {
        self.animal_order = order;
    }

    pub fn animal_order(&self) -> Option<&[i64]> {
        self.animal_order.as_deref()
    }

    pub fn experiments(&self) -> &BTreeSet<String> {
        &self.experiments
    }

    pub fn files(&self) -> &BTreeSet<PathBuf> {
        &self.files
    }

    pub fn has_file(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    pub fn metric(&self, name: &str) -> Option<&MetricStore> {
        self.metrics.get(name)
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    /// Names of metrics whose values can be plotted, ascending.
    pub fn plottable_metrics(&self) -> Vec<&str> {
        self.metrics
            .values()
            .filter(|m| m.is_plottable())
            .map(MetricStore::name)
            .collect()
    }

    pub fn scalar(&self, metric: &str) -> Result<&ScalarMetricStore> {
        match self.metrics.get(metric) {
            Some(MetricStore::Summary(s)) => Ok(s),
            Some(other) => Err(shape_mismatch(metric, SUMMARY, other)),
            None => Err(Error::MetricNotFound(metric.to_string())),
        }
    }

    pub fn rounds(&self, metric: &str) -> Result<&RoundMetricStore> {
        match self.metrics.get(metric) {
            Some(MetricStore::ByRound(r)) => Ok(r),
            Some(other) => Err(shape_mismatch(metric, BY_ROUND, other)),
            None => Err(Error::MetricNotFound(metric.to_string())),
        }
    }

    // -- ingestion --

    /// Ingest one summary export.
    ///
    /// Unreadable files and missing session metadata fail the whole call.
    /// Per-variable rejections are logged and listed in the report.
    pub fn ingest_summary(&mut self, path: impl AsRef<Path>) -> Result<IngestReport> {
        let path = path.as_ref();
        let (header, body) =
            reader::read_summary(path, &self.config).map_err(|e| reader_error(path, e))?;
        self.apply_summary(path, &header, &body)
    }

    /// Ingest one by-round export.
    pub fn ingest_by_round(&mut self, path: impl AsRef<Path>) -> Result<IngestReport> {
        let path = path.as_ref();
        let (header, body) =
            reader::read_by_round(path, &self.config).map_err(|e| reader_error(path, e))?;
        self.apply_by_round(path, &header, &body)
    }

    fn apply_summary(
        &mut self,
        path: &Path,
        header: &Header,
        body: &SummaryBody,
    ) -> Result<IngestReport> {
        let session = reader::session_key(header, Some(body), &self.config)
            .map_err(|e| malformed(path, e))?;
        self.experiments.insert(session.experiment.clone());

        let mut report = IngestReport::new(path, session.clone());
        let mut seen = HashSet::new();
        for row in &body.rows {
            if !seen.insert(row.var_name.as_str()) {
                continue;
            }
            let outcome =
                self.add_scalar(&row.var_name, &row.var_desc, &session, classify(&row.var), path);
            report.record(outcome)?;
        }

        self.finish(path, &report);
        Ok(report)
    }

    fn apply_by_round(
        &mut self,
        path: &Path,
        header: &Header,
        body: &RoundBody,
    ) -> Result<IngestReport> {
        let session =
            reader::session_key(header, None, &self.config).map_err(|e| malformed(path, e))?;
        let rounds = body
            .rounds
            .iter()
            .enumerate()
            .map(|(i, raw)| reader::coerce_integer(raw).with_context(|| format!("round row {i}")))
            .collect::<anyhow::Result<Vec<i64>>>()
            .map_err(|e| malformed(path, e))?;
        self.experiments.insert(session.experiment.clone());

        let mut report = IngestReport::new(path, session.clone());
        let mut seen = HashSet::new();
        for (name, cells) in &body.columns {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let table = RoundTable::new(
                rounds
                    .iter()
                    .zip(cells)
                    .map(|(&index, raw)| Round {
                        index,
                        value: classify(raw),
                    })
                    .collect(),
            );
            let outcome = self.add_rounds(name, &session, table, path);
            report.record(outcome)?;
        }

        self.finish(path, &report);
        Ok(report)
    }

    fn add_scalar(
        &mut self,
        name: &str,
        description: &str,
        session: &SessionKey,
        value: ScalarValue,
        path: &Path,
    ) -> Result<()> {
        let do_not_plot = self.config.is_denylisted(name);
        let store = self.metrics.entry(name.to_string()).or_insert_with(|| {
            debug!("new summary metric '{name}'");
            MetricStore::Summary(ScalarMetricStore::new(name, description, do_not_plot))
        });
        match store {
            MetricStore::Summary(s) => {
                s.add(session.animal, session.day, &session.experiment, value, path)
            }
            other => Err(shape_mismatch(name, SUMMARY, other)),
        }
    }

    fn add_rounds(
        &mut self,
        name: &str,
        session: &SessionKey,
        table: RoundTable,
        path: &Path,
    ) -> Result<()> {
        let do_not_plot = self.config.is_denylisted(name);
        let store = self.metrics.entry(name.to_string()).or_insert_with(|| {
            debug!("new by-round metric '{name}'");
            MetricStore::ByRound(RoundMetricStore::new(name, "", do_not_plot))
        });
        match store {
            MetricStore::ByRound(r) => {
                r.add(session.animal, &session.experiment, session.day, table, path)
            }
            other => Err(shape_mismatch(name, BY_ROUND, other)),
        }
    }

    fn finish(&mut self, path: &Path, report: &IngestReport) {
        if !self.files.insert(path.to_path_buf()) {
            debug!("{} was already ingested", path.display());
        }
        info!(
            "ingested {} ({}): {} stored, {} rejected",
            path.display(),
            report.session,
            report.accepted,
            report.rejected.len()
        );
    }

    // -- queries --

    /// Dense animals × days matrix of one summary metric.
    ///
    /// Rows follow the dataset's animal order when set; columns follow `days`
    /// when given. Otherwise both are the sorted values observed in
    /// `experiment`.
    pub fn query(&self, metric: &str, experiment: &str, days: Option<&[i64]>) -> Result<Matrix> {
        let store = self.scalar(metric)?;
        if !self.experiments.contains(experiment) {
            return Err(Error::ExperimentNotFound(experiment.to_string()));
        }
        if store.data_type() == Some(ValueKind::Text) {
            return Err(Error::NotNumeric(metric.to_string()));
        }
        Ok(store.extract_matrix(experiment, self.animal_order(), days))
    }

    /// Dense animals × rounds matrix of one by-round metric on one day.
    pub fn query_rounds(&self, metric: &str, experiment: &str, day: i64) -> Result<RoundMatrix> {
        let store = self.rounds(metric)?;
        if store.data_type() == Some(ValueKind::Text) {
            return Err(Error::NotNumeric(metric.to_string()));
        }
        store.extract_matrix(experiment, day, self.animal_order())
    }
}

fn shape_mismatch(metric: &str, expected: &'static str, actual: &MetricStore) -> Error {
    Error::ShapeMismatch {
        metric: metric.to_string(),
        expected,
        actual: actual.shape(),
    }
}

fn malformed(path: &Path, err: anyhow::Error) -> Error {
    Error::MalformedFile {
        path: path.to_path_buf(),
        reason: format!("{err:#}"),
    }
}

/// I/O failures stay I/O errors; everything else the reader reports is a
/// malformed file. Text that is not UTF-8 counts as malformed.
fn reader_error(path: &Path, err: anyhow::Error) -> Error {
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        if io.kind() != std::io::ErrorKind::InvalidData {
            return Error::Io(std::io::Error::new(
                io.kind(),
                format!("{}: {io}", path.display()),
            ));
        }
    }
    malformed(path, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reader::SummaryRow;
    use crate::data::rounds::RoundSelection;

    fn summary_body(animal: i64, day: i64, experiment: &str, vars: &[(&str, &str)]) -> SummaryBody {
        let mut rows = vec![
            row("animal_ID", &animal.to_string()),
            row("experiment", experiment),
            row("day", &day.to_string()),
        ];
        rows.extend(vars.iter().map(|(n, v)| row(n, v)));
        SummaryBody { rows }
    }

    fn row(name: &str, value: &str) -> SummaryRow {
        SummaryRow {
            var_name: name.to_string(),
            var: value.to_string(),
            var_desc: format!("{name} description"),
        }
    }

    fn ingest(ds: &mut LongitudinalDataset, file: &str, body: &SummaryBody) -> IngestReport {
        ds.apply_summary(Path::new(file), &Header::new(), body).unwrap()
    }

    fn round_header(animal: i64, experiment: &str, day: i64) -> Header {
        let mut h = Header::new();
        h.insert("animal".into(), animal.to_string());
        h.insert("experiment".into(), experiment.into());
        h.insert("day".into(), day.to_string());
        h
    }

    fn round_body(vars: &[(&str, &[&str])]) -> RoundBody {
        let n = vars.first().map_or(0, |(_, cells)| cells.len());
        RoundBody {
            rounds: (1..=n).map(|i| i.to_string()).collect(),
            columns: vars
                .iter()
                .map(|(name, cells)| {
                    (name.to_string(), cells.iter().map(|c| c.to_string()).collect())
                })
                .collect(),
        }
    }

    #[test]
    fn end_to_end_weight_matrix() {
        let mut ds = LongitudinalDataset::new("study");
        ingest(&mut ds, "a1d1.csv", &summary_body(1, 1, "E1", &[("weight", "10")]));
        ingest(&mut ds, "a2d1.csv", &summary_body(2, 1, "E1", &[("weight", "9")]));
        ingest(&mut ds, "a1d2.csv", &summary_body(1, 2, "E1", &[("weight", "12")]));

        let m = ds.query("weight", "E1", None).unwrap();
        assert_eq!(m.animals, vec![1, 2]);
        assert_eq!(m.days, vec![1, 2]);
        assert_eq!(m.values[0], vec![10.0, 12.0]);
        assert_eq!(m.values[1][0], 9.0);
        assert!(m.values[1][1].is_nan());
    }

    #[test]
    fn reingesting_a_file_rejects_every_variable() {
        let mut ds = LongitudinalDataset::new("study");
        let body = summary_body(1, 1, "E1", &[("weight", "10"), ("entries", "4")]);
        let first = ingest(&mut ds, "a1d1.csv", &body);
        assert_eq!(first.accepted, 5);
        assert!(first.rejected.is_empty());

        let second = ingest(&mut ds, "a1d1.csv", &body);
        assert_eq!(second.accepted, 0);
        assert_eq!(second.rejected.len(), 5);
        assert!(second
            .rejected
            .iter()
            .all(|e| matches!(e, Error::DuplicateObservation { .. })));

        assert_eq!(ds.files().len(), 1);
        assert_eq!(ds.scalar("weight").unwrap().len(), 1);
    }

    #[test]
    fn duplicate_from_other_file_keeps_first_value() {
        let mut ds = LongitudinalDataset::new("study");
        ingest(&mut ds, "first.csv", &summary_body(1, 1, "E1", &[("weight", "10")]));
        let report = ingest(
            &mut ds,
            "second.csv",
            &summary_body(1, 1, "E1", &[("weight", "99"), ("speed", "2.5")]),
        );

        // weight, animal_ID, experiment, day collide; speed is new.
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected.len(), 4);
        let m = ds.query("weight", "E1", None).unwrap();
        assert_eq!(m.values, vec![vec![10.0]]);
        assert_eq!(ds.files().len(), 2);
    }

    #[test]
    fn duplicate_variable_in_one_file_is_counted_once() {
        let mut ds = LongitudinalDataset::new("study");
        let report = ingest(
            &mut ds,
            "a1d1.csv",
            &summary_body(1, 1, "E1", &[("weight", "10"), ("weight", "11")]),
        );
        assert_eq!(report.accepted, 4);
        assert!(report.rejected.is_empty());
        assert_eq!(ds.query("weight", "E1", None).unwrap().values, vec![vec![10.0]]);
    }

    #[test]
    fn plottable_metrics_exclude_denylist_and_text() {
        let mut ds = LongitudinalDataset::new("study");
        ingest(
            &mut ds,
            "a1d1.csv",
            &summary_body(1, 1, "E1", &[("weight", "10"), ("date", "20240102"), ("arena", "north")]),
        );

        let plottable = ds.plottable_metrics();
        assert_eq!(plottable, vec!["animal_ID", "weight"]);
        assert!(!plottable.contains(&"day"));
        assert!(!plottable.contains(&"date"));
    }

    #[test]
    fn metric_turns_unplottable_after_text_value() {
        let mut ds = LongitudinalDataset::new("study");
        ingest(&mut ds, "a1d1.csv", &summary_body(1, 1, "E1", &[("score", "3")]));
        assert!(ds.plottable_metrics().contains(&"score"));

        ingest(&mut ds, "a1d2.csv", &summary_body(1, 2, "E1", &[("score", "n/a")]));
        assert!(!ds.plottable_metrics().contains(&"score"));
        assert!(matches!(ds.query("score", "E1", None), Err(Error::NotNumeric(_))));
    }

    #[test]
    fn query_reports_unknown_names() {
        let mut ds = LongitudinalDataset::new("study");
        ingest(&mut ds, "a1d1.csv", &summary_body(1, 1, "E1", &[("weight", "10")]));

        assert!(matches!(ds.query("height", "E1", None), Err(Error::MetricNotFound(_))));
        assert!(matches!(ds.query("weight", "E9", None), Err(Error::ExperimentNotFound(_))));
    }

    #[test]
    fn query_uses_animal_order_and_days() {
        let mut ds = LongitudinalDataset::new("study");
        ingest(&mut ds, "a1d1.csv", &summary_body(1, 1, "E1", &[("weight", "10")]));
        ingest(&mut ds, "a2d3.csv", &summary_body(2, 3, "E1", &[("weight", "11.5")]));
        ds.set_animal_order(Some(vec![2, 1, 7]));

        let m = ds.query("weight", "E1", Some(&[1, 2, 3])).unwrap();
        assert_eq!(m.animals, vec![2, 1, 7]);
        assert_eq!(m.days, vec![1, 2, 3]);
        assert_eq!(m.get(2, 3), Some(11.5));
        assert_eq!(m.get(1, 1), Some(10.0));
        assert!(m.values[2].iter().all(|v| v.is_nan()));
        assert!(m.values[0][1].is_nan());
    }

    #[test]
    fn summary_metadata_falls_back_to_header() {
        let mut ds = LongitudinalDataset::new("study");
        let mut header = Header::new();
        header.insert("vole".into(), "5".into());
        header.insert("experiment".into(), "E2".into());
        header.insert("day".into(), "3.0".into());
        let body = SummaryBody {
            rows: vec![row("weight", "20")],
        };

        let report = ds.apply_summary(Path::new("h.csv"), &header, &body).unwrap();
        assert_eq!(report.session.animal, 5);
        assert_eq!(report.session.day, 3);
        assert!(ds.experiments().contains("E2"));
        assert_eq!(ds.query("weight", "E2", None).unwrap().values, vec![vec![20.0]]);
    }

    #[test]
    fn missing_metadata_aborts_file() {
        let mut ds = LongitudinalDataset::new("study");
        let body = SummaryBody {
            rows: vec![row("weight", "20")],
        };
        let err = ds
            .apply_summary(Path::new("bad.csv"), &Header::new(), &body)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedFile { .. }));
        assert!(ds.metric("weight").is_none());
        assert!(ds.files().is_empty());
    }

    #[test]
    fn by_round_ingestion_builds_tables() {
        let mut ds = LongitudinalDataset::new("study");
        let body = round_body(&[("latency", &["1.5", "2.5", ""]), ("choice", &["L", "R", "L"])]);
        let report = ds
            .apply_by_round(Path::new("r.csv"), &round_header(4, "E1", 5), &body)
            .unwrap();
        assert_eq!(report.accepted, 2);

        let store = ds.rounds("latency").unwrap();
        match store.get("E1", Some(5), Some(4), None).unwrap() {
            RoundSelection::Entry(entry) => {
                assert_eq!(entry.table.len(), 3);
                assert_eq!(entry.table.value_at(2), Some(&ScalarValue::Float(2.5)));
            }
            other => panic!("unexpected selection: {other:?}"),
        }
        assert!(ds.plottable_metrics().contains(&"latency"));
        assert!(!ds.plottable_metrics().contains(&"choice"));

        let m = ds.query_rounds("latency", "E1", 5).unwrap();
        assert_eq!(m.rounds, vec![1, 2, 3]);
        assert_eq!(m.observed(), 2);
    }

    #[test]
    fn by_round_duplicate_is_rejected() {
        let mut ds = LongitudinalDataset::new("study");
        let body = round_body(&[("latency", &["1", "2"])]);
        let header = round_header(4, "E1", 5);
        ds.apply_by_round(Path::new("r1.csv"), &header, &body).unwrap();
        let report = ds.apply_by_round(Path::new("r2.csv"), &header, &body).unwrap();

        assert_eq!(report.accepted, 0);
        assert!(matches!(
            report.rejected.as_slice(),
            [Error::DuplicateRoundObservation { .. }]
        ));
    }

    #[test]
    fn shape_mismatch_is_per_variable() {
        let mut ds = LongitudinalDataset::new("study");
        ingest(&mut ds, "s.csv", &summary_body(1, 1, "E1", &[("latency", "3")]));
        let body = round_body(&[("latency", &["1"]), ("pokes", &["2"])]);
        let report = ds
            .apply_by_round(Path::new("r.csv"), &round_header(1, "E1", 1), &body)
            .unwrap();

        assert_eq!(report.accepted, 1);
        assert!(matches!(report.rejected.as_slice(), [Error::ShapeMismatch { .. }]));
        assert!(matches!(
            ds.query_rounds("latency", "E1", 1),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn first_shape_seen_owns_a_shared_name() {
        let mut ds = LongitudinalDataset::new("study");
        let body = round_body(&[("latency", &["1", "2"])]);
        ds.apply_by_round(Path::new("r.csv"), &round_header(1, "E1", 1), &body)
            .unwrap();
        let report = ingest(&mut ds, "s.csv", &summary_body(1, 2, "E1", &[("latency", "3")]));

        assert!(report
            .rejected
            .iter()
            .any(|e| matches!(e, Error::ShapeMismatch { expected: "summary", .. })));
        assert_eq!(ds.metric("latency").map(MetricStore::shape), Some("by-round"));
        assert!(matches!(
            ds.query("latency", "E1", None),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn many_sessions_out_of_order_stay_canonical() {
        let mut ds = LongitudinalDataset::new("study");
        for animal in (1..=40).rev() {
            for day in (1..=50).rev() {
                let body = summary_body(animal, day, "E1", &[("weight", &(animal * day).to_string())]);
                ingest(&mut ds, &format!("a{animal}d{day}.csv"), &body);
            }
        }

        let weight = ds.scalar("weight").unwrap();
        assert_eq!(weight.len(), 2000);
        let keys: Vec<(i64, i64)> = weight.iter().map(|o| (o.animal, o.day)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        let m = ds.query("weight", "E1", None).unwrap();
        assert_eq!(m.animals.len(), 40);
        assert_eq!(m.days.len(), 50);
        assert_eq!(m.values[2][4], 15.0);
    }

    #[test]
    fn non_integer_round_index_aborts_file() {
        let mut ds = LongitudinalDataset::new("study");
        let mut body = round_body(&[("latency", &["1"])]);
        body.rounds = vec!["first".into()];
        let err = ds
            .apply_by_round(Path::new("r.csv"), &round_header(1, "E1", 1), &body)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedFile { .. }));
        assert!(ds.experiments().is_empty());
    }
}
