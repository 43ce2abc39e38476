/// Data layer: value model, file reader, metric stores and dense matrices.
///
/// Architecture:
/// ```text
///  summary .csv / by-round .csv
///        │
///        ▼
///   ┌──────────┐
///   │  reader   │  header block + body → (Header, SummaryBody | RoundBody)
///   └──────────┘
///        │
///        ▼
///   ┌─────────────────┐
///   │ scalar / rounds │  one store per metric
///   └─────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  matrix   │  animals × days (or rounds), NaN for missing
///   └──────────┘
/// ```

pub mod matrix;
pub mod model;
pub mod reader;
pub mod rounds;
pub mod scalar;
