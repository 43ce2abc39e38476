use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ValueKind – the closed set of inferred value types
// ---------------------------------------------------------------------------

/// Semantic type of a value read from CSV text.
///
/// Variants are ordered from most to least specific so a store-level type is
/// simply the maximum over its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Integer,
    Float,
    Text,
}

impl ValueKind {
    /// Whether values of this kind can be placed in a numeric matrix.
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Integer | ValueKind::Float)
    }

    /// The most specific kind consistent with both `self` and `other`.
    pub fn widen(self, other: ValueKind) -> ValueKind {
        self.max(other)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Integer => write!(f, "integer"),
            ValueKind::Float => write!(f, "float"),
            ValueKind::Text => write!(f, "text"),
        }
    }
}

// ---------------------------------------------------------------------------
// ScalarValue – one classified cell
// ---------------------------------------------------------------------------

/// A value classified from CSV text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Integer(i64),
    Float(#[serde(with = "nan_as_null")] f64),
    Text(String),
}

impl ScalarValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ScalarValue::Integer(_) => ValueKind::Integer,
            ScalarValue::Float(_) => ValueKind::Float,
            ScalarValue::Text(_) => ValueKind::Text,
        }
    }

    /// Numeric view of the value; `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(i) => Some(*i as f64),
            ScalarValue::Float(v) => Some(*v),
            ScalarValue::Text(_) => None,
        }
    }

    /// Integer view, accepting floats with no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(i) => Some(*i),
            ScalarValue::Float(v) if v.is_finite() && v.fract() == 0.0 => integral_to_i64(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Integer(i) => write!(f, "{i}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Text(s) => write!(f, "'{s}'"),
        }
    }
}

/// Classify one CSV cell.
///
/// Integer parse first, then float, then text. NaN stays a float; a finite
/// float with no fractional part becomes an integer. Blank cells are missing
/// numbers and classify as `Float(NaN)`.
pub fn classify(raw: &str) -> ScalarValue {
    let s = raw.trim();
    if s.is_empty() {
        return ScalarValue::Float(f64::NAN);
    }
    if let Ok(i) = s.parse::<i64>() {
        return ScalarValue::Integer(i);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_nan() => ScalarValue::Float(v),
        Ok(v) if v.is_finite() && v.fract() == 0.0 => match integral_to_i64(v) {
            Some(i) => ScalarValue::Integer(i),
            None => ScalarValue::Float(v),
        },
        Ok(v) => ScalarValue::Float(v),
        Err(_) => ScalarValue::Text(s.to_string()),
    }
}

fn integral_to_i64(v: f64) -> Option<i64> {
    // i64::MAX is not exactly representable; 2^63 is the first value out of range.
    if v >= -9_223_372_036_854_775_808.0 && v < 9_223_372_036_854_775_808.0 {
        Some(v as i64)
    } else {
        None
    }
}

/// serde_json writes NaN as `null`; read `null` back as NaN.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

// ---------------------------------------------------------------------------
// SessionKey – which animal / experiment / day a file describes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub animal: i64,
    pub experiment: String,
    pub day: i64,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "animal {} / experiment '{}' / day {}",
            self.animal, self.experiment, self.day
        )
    }
}

// ---------------------------------------------------------------------------
// Observation – one scalar value of one metric
// ---------------------------------------------------------------------------

/// A single scalar measurement for one (animal, day, experiment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub animal: i64,
    pub day: i64,
    pub experiment: String,
    pub value: ScalarValue,
    pub source_file: PathBuf,
}

/// (animal, experiment, day); sorting by it gives the canonical order.
pub type ObservationKey = (i64, String, i64);

impl Observation {
    pub fn key(&self) -> ObservationKey {
        (self.animal, self.experiment.clone(), self.day)
    }
}

// ---------------------------------------------------------------------------
// RoundTable – within-day measurements of one metric
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub index: i64,
    pub value: ScalarValue,
}

/// Ordered (round, value) pairs for one animal on one day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundTable {
    pub rounds: Vec<Round>,
}

impl RoundTable {
    pub fn new(rounds: Vec<Round>) -> Self {
        RoundTable { rounds }
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Widest value kind in the table, `None` when empty.
    pub fn kind(&self) -> Option<ValueKind> {
        self.rounds.iter().map(|r| r.value.kind()).max()
    }

    /// Value recorded for a round index, if any.
    pub fn value_at(&self, index: i64) -> Option<&ScalarValue> {
        self.rounds
            .iter()
            .find(|r| r.index == index)
            .map(|r| &r.value)
    }
}

/// A round table stamped with the file that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEntry {
    pub table: RoundTable,
    pub source_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_follows_integer_float_text_order() {
        assert_eq!(classify("3").kind(), ValueKind::Integer);
        assert_eq!(classify("3.0").kind(), ValueKind::Integer);
        assert_eq!(classify("3.5").kind(), ValueKind::Float);
        assert_eq!(classify("abc").kind(), ValueKind::Text);
        assert_eq!(classify("nan").kind(), ValueKind::Float);
    }

    #[test]
    fn classify_reclassifies_integral_floats() {
        assert_eq!(classify("3.0"), ScalarValue::Integer(3));
        assert_eq!(classify(" -12 "), ScalarValue::Integer(-12));
        assert_eq!(classify("1e3"), ScalarValue::Integer(1000));
    }

    #[test]
    fn classify_blank_is_missing_number() {
        match classify("  ") {
            ScalarValue::Float(v) => assert!(v.is_nan()),
            other => panic!("expected NaN, got {other:?}"),
        }
    }

    #[test]
    fn classify_keeps_infinite_and_huge_as_float() {
        assert_eq!(classify("inf").kind(), ValueKind::Float);
        assert_eq!(classify("1e30").kind(), ValueKind::Float);
    }

    #[test]
    fn widen_picks_least_specific() {
        assert_eq!(ValueKind::Integer.widen(ValueKind::Float), ValueKind::Float);
        assert_eq!(ValueKind::Text.widen(ValueKind::Integer), ValueKind::Text);
        assert_eq!(ValueKind::Integer.widen(ValueKind::Integer), ValueKind::Integer);
    }

    #[test]
    fn as_i64_accepts_integral_float() {
        assert_eq!(ScalarValue::Float(4.0).as_i64(), Some(4));
        assert_eq!(ScalarValue::Float(4.5).as_i64(), None);
        assert_eq!(ScalarValue::Text("4".into()).as_i64(), None);
    }

    #[test]
    fn nan_survives_json() {
        let json = serde_json::to_string(&ScalarValue::Float(f64::NAN)).unwrap();
        let back: ScalarValue = serde_json::from_str(&json).unwrap();
        assert!(back.as_f64().unwrap().is_nan());
    }

    #[test]
    fn round_table_kind_and_lookup() {
        let table = RoundTable::new(vec![
            Round { index: 1, value: ScalarValue::Integer(2) },
            Round { index: 2, value: ScalarValue::Float(2.5) },
        ]);
        assert_eq!(table.kind(), Some(ValueKind::Float));
        assert_eq!(table.value_at(2), Some(&ScalarValue::Float(2.5)));
        assert_eq!(table.value_at(3), None);
        assert_eq!(RoundTable::default().kind(), None);
    }
}
