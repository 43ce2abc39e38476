use std::io::Write;

use serde::Serialize;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Matrix – dense animals × days view of one metric
// ---------------------------------------------------------------------------

/// Dense view of one metric within one experiment.
///
/// `values[i][j]` belongs to `animals[i]` on `days[j]`; NaN marks a missing
/// observation.
#[derive(Debug, Clone, Serialize)]
pub struct Matrix {
    pub animals: Vec<i64>,
    pub days: Vec<i64>,
    pub values: Vec<Vec<f64>>,
}

impl Matrix {
    /// An all-NaN matrix over the given axes.
    pub fn missing(animals: Vec<i64>, days: Vec<i64>) -> Self {
        let values = vec![vec![f64::NAN; days.len()]; animals.len()];
        Matrix { animals, days, values }
    }

    /// Set the cell for (`animal`, `day`). Axes values not present are ignored.
    pub fn set(&mut self, animal: i64, day: i64, value: f64) {
        set_cell(&self.animals, &self.days, &mut self.values, animal, day, value);
    }

    pub fn get(&self, animal: i64, day: i64) -> Option<f64> {
        let i = self.animals.iter().position(|&a| a == animal)?;
        let j = self.days.iter().position(|&d| d == day)?;
        Some(self.values[i][j])
    }

    /// Number of non-missing cells.
    pub fn observed(&self) -> usize {
        count_observed(&self.values)
    }

    /// Write as CSV: one row per animal, one column per day.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        write_grid(writer, "animal", &self.animals, &self.days, &self.values)
    }
}

// ---------------------------------------------------------------------------
// RoundMatrix – dense animals × rounds view of one day
// ---------------------------------------------------------------------------

/// Dense view of one by-round metric on one experiment day.
#[derive(Debug, Clone, Serialize)]
pub struct RoundMatrix {
    pub day: i64,
    pub animals: Vec<i64>,
    pub rounds: Vec<i64>,
    pub values: Vec<Vec<f64>>,
}

impl RoundMatrix {
    pub fn missing(day: i64, animals: Vec<i64>, rounds: Vec<i64>) -> Self {
        let values = vec![vec![f64::NAN; rounds.len()]; animals.len()];
        RoundMatrix {
            day,
            animals,
            rounds,
            values,
        }
    }

    pub fn set(&mut self, animal: i64, round: i64, value: f64) {
        set_cell(&self.animals, &self.rounds, &mut self.values, animal, round, value);
    }

    pub fn observed(&self) -> usize {
        count_observed(&self.values)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        write_grid(writer, "animal", &self.animals, &self.rounds, &self.values)
    }
}

// -- shared helpers --

fn set_cell(rows: &[i64], cols: &[i64], values: &mut [Vec<f64>], row: i64, col: i64, value: f64) {
    // An order may repeat a key; every matching cell gets the value.
    let col_hits: Vec<usize> = positions(cols, col);
    if col_hits.is_empty() {
        return;
    }
    for i in positions(rows, row) {
        for &j in &col_hits {
            values[i][j] = value;
        }
    }
}

fn positions(axis: &[i64], key: i64) -> Vec<usize> {
    axis.iter()
        .enumerate()
        .filter(|&(_, &k)| k == key)
        .map(|(i, _)| i)
        .collect()
}

fn count_observed(values: &[Vec<f64>]) -> usize {
    values.iter().flatten().filter(|v| !v.is_nan()).count()
}

fn write_grid<W: Write>(
    writer: W,
    corner: &str,
    rows: &[i64],
    cols: &[i64],
    values: &[Vec<f64>],
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(cols.len() + 1);
    header.push(corner.to_string());
    header.extend(cols.iter().map(i64::to_string));
    wtr.write_record(&header)?;

    for (row, cells) in rows.iter().zip(values) {
        let mut record = Vec::with_capacity(cells.len() + 1);
        record.push(row.to_string());
        record.extend(
            cells
                .iter()
                .map(|v| if v.is_nan() { String::new() } else { v.to_string() }),
        );
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_matrix_is_all_nan() {
        let m = Matrix::missing(vec![1, 2], vec![1, 2, 3]);
        assert_eq!(m.values.len(), 2);
        assert!(m.values.iter().all(|r| r.len() == 3 && r.iter().all(|v| v.is_nan())));
        assert_eq!(m.observed(), 0);
    }

    #[test]
    fn set_ignores_keys_outside_axes() {
        let mut m = Matrix::missing(vec![1], vec![1]);
        m.set(1, 1, 4.0);
        m.set(2, 1, 5.0);
        m.set(1, 9, 6.0);
        assert_eq!(m.get(1, 1), Some(4.0));
        assert_eq!(m.get(2, 1), None);
        assert_eq!(m.observed(), 1);
    }

    #[test]
    fn csv_leaves_missing_cells_blank() {
        let mut m = Matrix::missing(vec![1, 2], vec![1, 2]);
        m.set(1, 1, 10.0);
        m.set(1, 2, 12.5);
        m.set(2, 1, 9.0);

        let mut out = Vec::new();
        m.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "animal,1,2\n1,10,12.5\n2,9,\n");
    }
}
