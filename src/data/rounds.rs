use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::matrix::RoundMatrix;
use super::model::{RoundEntry, RoundTable, ValueKind};
use crate::error::{Error, Result};

/// experiment → day → entry, for one animal.
type ExperimentDays = HashMap<String, BTreeMap<i64, RoundEntry>>;

// ---------------------------------------------------------------------------
// RoundSelection – what `get` hands back
// ---------------------------------------------------------------------------

/// Result of [`RoundMetricStore::get`], one variant per lookup mode.
#[derive(Debug)]
pub enum RoundSelection<'a> {
    /// animal and day given.
    Entry(&'a RoundEntry),
    /// day given: one entry per animal, in animal order.
    ByAnimal(Vec<(i64, &'a RoundEntry)>),
    /// animal given: entries keyed by day.
    ByDay(BTreeMap<i64, &'a RoundEntry>),
    /// neither given: every animal's entries keyed by day, in animal order.
    All(Vec<(i64, BTreeMap<i64, &'a RoundEntry>)>),
}

// ---------------------------------------------------------------------------
// RoundMetricStore – animal → experiment → day → round table
// ---------------------------------------------------------------------------

/// Per-round sub-tables of one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundMetricStore {
    name: String,
    description: String,
    data: HashMap<i64, ExperimentDays>,
    /// Sorted animal IDs, maintained on first sighting of each animal.
    animals: Vec<i64>,
    data_type: Option<ValueKind>,
    plottable: bool,
    do_not_plot: bool,
}

impl RoundMetricStore {
    pub fn new(name: impl Into<String>, description: impl Into<String>, do_not_plot: bool) -> Self {
        RoundMetricStore {
            name: name.into(),
            description: description.into(),
            data: HashMap::new(),
            animals: Vec::new(),
            data_type: None,
            plottable: false,
            do_not_plot,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn data_type(&self) -> Option<ValueKind> {
        self.data_type
    }

    pub fn is_plottable(&self) -> bool {
        self.plottable
    }

    /// Animals seen so far, ascending.
    pub fn animals(&self) -> &[i64] {
        &self.animals
    }

    /// Number of stored (animal, experiment, day) entries.
    pub fn len(&self) -> usize {
        self.data
            .values()
            .flat_map(|exps| exps.values())
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_experiment(&self, experiment: &str) -> bool {
        self.data.values().any(|exps| exps.contains_key(experiment))
    }

    /// Insert one day's round table, rejecting it if that day is already filled.
    pub fn add(
        &mut self,
        animal: i64,
        experiment: &str,
        day: i64,
        table: RoundTable,
        source_file: &Path,
    ) -> Result<()> {
        if let Err(pos) = self.animals.binary_search(&animal) {
            self.animals.insert(pos, animal);
        }
        let days = self
            .data
            .entry(animal)
            .or_default()
            .entry(experiment.to_string())
            .or_default();

        if let Some(existing) = days.get(&day) {
            return Err(Error::DuplicateRoundObservation {
                metric: self.name.clone(),
                animal,
                experiment: experiment.to_string(),
                day,
                old_file: existing.source_file.clone(),
                new_file: source_file.to_path_buf(),
            });
        }

        if let Some(kind) = table.kind() {
            self.data_type = Some(match self.data_type {
                Some(current) => current.widen(kind),
                None => kind,
            });
        }
        self.plottable = !self.do_not_plot && self.data_type.is_some_and(ValueKind::is_numeric);

        days.insert(
            day,
            RoundEntry {
                table,
                source_file: source_file.to_path_buf(),
            },
        );
        Ok(())
    }

    /// Look up entries for `experiment`.
    ///
    /// | animal | day  | result                                  |
    /// |--------|------|-----------------------------------------|
    /// | some   | some | the single entry                        |
    /// | none   | some | animal → entry, animals lacking it omitted |
    /// | some   | none | day → entry for that animal             |
    /// | none   | none | animal → (day → entry)                  |
    ///
    /// Animals are visited in `order` when given, else ascending.
    pub fn get(
        &self,
        experiment: &str,
        day: Option<i64>,
        animal: Option<i64>,
        order: Option<&[i64]>,
    ) -> Result<RoundSelection<'_>> {
        if !self.has_experiment(experiment) {
            return Err(Error::ExperimentNotFound(experiment.to_string()));
        }

        match (animal, day) {
            (Some(animal), Some(day)) => {
                let days = self.experiment_days(animal, experiment)?;
                days.get(&day)
                    .map(RoundSelection::Entry)
                    .ok_or_else(|| Error::DayNotFound {
                        animal,
                        experiment: experiment.to_string(),
                        day,
                    })
            }
            (Some(animal), None) => {
                let days = self.experiment_days(animal, experiment)?;
                Ok(RoundSelection::ByDay(days.iter().map(|(&d, e)| (d, e)).collect()))
            }
            (None, Some(day)) => Ok(RoundSelection::ByAnimal(
                self.entries_for_day(experiment, day, order),
            )),
            (None, None) => {
                let all: Vec<(i64, BTreeMap<i64, &RoundEntry>)> = self
                    .ordered_animals(order)
                    .filter_map(|a| {
                        self.data
                            .get(&a)
                            .and_then(|exps| exps.get(experiment))
                            .map(|days| (a, days.iter().map(|(&d, e)| (d, e)).collect()))
                    })
                    .collect();
                Ok(RoundSelection::All(all))
            }
        }
    }

    /// Reshape one experiment day into an animals × rounds matrix.
    ///
    /// Rows follow `animal_order` when given, else the animals holding data
    /// for that day. Columns are the distinct round indices present.
    pub fn extract_matrix(
        &self,
        experiment: &str,
        day: i64,
        animal_order: Option<&[i64]>,
    ) -> Result<RoundMatrix> {
        if !self.has_experiment(experiment) {
            return Err(Error::ExperimentNotFound(experiment.to_string()));
        }
        let entries = self.entries_for_day(experiment, day, animal_order);

        let rounds: Vec<i64> = entries
            .iter()
            .flat_map(|(_, e)| e.table.rounds.iter().map(|r| r.index))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let animals = match animal_order {
            Some(order) => order.to_vec(),
            None => entries.iter().map(|(a, _)| *a).collect(),
        };

        let mut matrix = RoundMatrix::missing(day, animals, rounds);
        for (animal, entry) in &entries {
            for round in &entry.table.rounds {
                if let Some(v) = round.value.as_f64() {
                    matrix.set(*animal, round.index, v);
                }
            }
        }
        Ok(matrix)
    }

    fn experiment_days(&self, animal: i64, experiment: &str) -> Result<&BTreeMap<i64, RoundEntry>> {
        let exps = self.data.get(&animal).ok_or_else(|| Error::AnimalNotFound {
            animal,
            experiment: experiment.to_string(),
        })?;
        exps.get(experiment)
            .ok_or_else(|| Error::ExperimentNotFound(experiment.to_string()))
    }

    fn entries_for_day(
        &self,
        experiment: &str,
        day: i64,
        order: Option<&[i64]>,
    ) -> Vec<(i64, &RoundEntry)> {
        self.ordered_animals(order)
            .filter_map(|a| {
                self.data
                    .get(&a)
                    .and_then(|exps| exps.get(experiment))
                    .and_then(|days| days.get(&day))
                    .map(|e| (a, e))
            })
            .collect()
    }

    fn ordered_animals<'a>(&'a self, order: Option<&'a [i64]>) -> impl Iterator<Item = i64> + 'a {
        order.unwrap_or(self.animals.as_slice()).iter().copied()
    }
}
