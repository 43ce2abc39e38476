use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::matrix::Matrix;
use super::model::{Observation, ObservationKey, ScalarValue, ValueKind};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// ScalarMetricStore – one value per (animal, day, experiment)
// ---------------------------------------------------------------------------

/// All scalar observations of one metric.
///
/// Observations are keyed by (animal, experiment, day), so iteration is
/// always in canonical order and a taken slot is found by lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarMetricStore {
    name: String,
    description: String,
    #[serde(with = "observation_list")]
    observations: BTreeMap<ObservationKey, Observation>,
    data_type: Option<ValueKind>,
    plottable: bool,
    do_not_plot: bool,
}

impl ScalarMetricStore {
    /// Create an empty store. `do_not_plot` marks a denylisted name.
    pub fn new(name: impl Into<String>, description: impl Into<String>, do_not_plot: bool) -> Self {
        ScalarMetricStore {
            name: name.into(),
            description: description.into(),
            observations: BTreeMap::new(),
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

    /// Widest kind over every value added so far; `None` while empty.
    pub fn data_type(&self) -> Option<ValueKind> {
        self.data_type
    }

    pub fn is_plottable(&self) -> bool {
        self.plottable
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Observations ordered by animal, then experiment, then day.
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.values()
    }

    pub fn get(&self, animal: i64, day: i64, experiment: &str) -> Option<&Observation> {
        self.observations.get(&(animal, experiment.to_string(), day))
    }

    /// Insert a value, rejecting it if the (animal, day, experiment) slot is taken.
    pub fn add(
        &mut self,
        animal: i64,
        day: i64,
        experiment: &str,
        value: ScalarValue,
        source_file: &Path,
    ) -> Result<()> {
        let key = (animal, experiment.to_string(), day);
        if let Some(old) = self.observations.get(&key) {
            return Err(Error::DuplicateObservation {
                metric: self.name.clone(),
                animal,
                day,
                experiment: experiment.to_string(),
                old_value: old.value.clone(),
                new_value: value,
                old_file: old.source_file.clone(),
                new_file: source_file.to_path_buf(),
            });
        }

        let kind = value.kind();
        self.data_type = Some(match self.data_type {
            Some(current) => current.widen(kind),
            None => kind,
        });
        self.check_plottable();

        self.observations.insert(
            key,
            Observation {
                animal,
                day,
                experiment: experiment.to_string(),
                value,
                source_file: source_file.to_path_buf(),
            },
        );
        Ok(())
    }

    fn check_plottable(&mut self) {
        self.plottable = !self.do_not_plot && self.data_type.is_some_and(ValueKind::is_numeric);
        if !self.plottable && !self.do_not_plot {
            log::debug!(
                "metric '{}' is {} and not plottable",
                self.name,
                self.data_type.map_or("empty".to_string(), |k| k.to_string())
            );
        }
    }

    pub fn experiments(&self) -> BTreeSet<&str> {
        self.iter().map(|o| o.experiment.as_str()).collect()
    }

    /// Sorted distinct animals observed in `experiment`.
    pub fn animals(&self, experiment: &str) -> Vec<i64> {
        self.iter()
            .filter(|o| o.experiment == experiment)
            .map(|o| o.animal)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted distinct days observed in `experiment`.
    pub fn days(&self, experiment: &str) -> Vec<i64> {
        self.iter()
            .filter(|o| o.experiment == experiment)
            .map(|o| o.day)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Reshape one experiment into an animals × days matrix.
    ///
    /// Supplied orders fix the rows/columns and may name animals or days with
    /// no data; those cells are NaN. Text values also read as NaN.
    pub fn extract_matrix(
        &self,
        experiment: &str,
        animal_order: Option<&[i64]>,
        day_order: Option<&[i64]>,
    ) -> Matrix {
        let animals = animal_order.map_or_else(|| self.animals(experiment), |a| a.to_vec());
        let days = day_order.map_or_else(|| self.days(experiment), |d| d.to_vec());

        let mut matrix = Matrix::missing(animals, days);
        for obs in self.iter().filter(|o| o.experiment == experiment) {
            if let Some(v) = obs.value.as_f64() {
                matrix.set(obs.animal, obs.day, v);
            }
        }
        matrix
    }
}

/// Observations travel as a plain list; keys are rebuilt on the way in.
mod observation_list {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::data::model::{Observation, ObservationKey};

    pub fn serialize<S: Serializer>(
        observations: &BTreeMap<ObservationKey, Observation>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(observations.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<ObservationKey, Observation>, D::Error> {
        let mut observations = BTreeMap::new();
        for obs in Vec::<Observation>::deserialize(deserializer)? {
            if let Some(prev) = observations.insert(obs.key(), obs) {
                return Err(D::Error::custom(format!(
                    "two observations for animal {} / {} / day {}",
                    prev.animal, prev.experiment, prev.day
                )));
            }
        }
        Ok(observations)
    }
}
