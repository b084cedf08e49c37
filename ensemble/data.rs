//! # Prediction Loading and Validation Module
//!
//! This module serves as the exclusive entry point for per-model submission
//! CSVs. Its responsibility is to read each file, validate it against the
//! two-column submission schema, and transform it into the clean structures
//! the blending core operates on.
//!
//! - Strict Schema: the columns `ID` and `target` must exist; any extra
//!   columns are dropped during projection. Column names are not
//!   configurable.
//! - User-Centric Errors: failures are assumed to be user-input errors. The
//!   `DataError` enum is designed to give clear, actionable feedback.
//! - Dynamic input typing: `target` may arrive as any numeric type; it is
//!   cast to `f64` here and declared integer only on output.

use ndarray::Array1;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ModelEntry;

pub const ID_COLUMN: &str = "ID";
pub const TARGET_COLUMN: &str = "target";

/// One model's predictions in file order: parallel sample IDs and labels.
#[derive(Debug, Clone)]
pub struct PredictionTable {
    pub ids: Vec<String>,
    pub labels: Array1<f64>,
}

impl PredictionTable {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A comprehensive error type for all loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("submission file '{}' does not exist or is not a regular file", .0.display())]
    MissingInput(PathBuf),
    #[error("error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("the required column '{column}' was not found in '{}'. Please check spelling and case.", .path.display())]
    ColumnNotFound { column: String, path: PathBuf },
    #[error("the 'target' column in '{}' could not be converted to numeric labels (found type: {found_type})", .path.display())]
    TargetNotNumeric { path: PathBuf, found_type: String },
    #[error("missing or null values were found in the '{column}' column of '{}'", .path.display())]
    MissingValuesFound { column: String, path: PathBuf },
    #[error("non-finite values (NaN or Infinity) were found in the 'target' column of '{}'", .0.display())]
    NonFiniteTarget(PathBuf),
    #[error("duplicate sample ID '{id}' in '{}'", .path.display())]
    DuplicateId { id: String, path: PathBuf },
    #[error("'{}' contains a header but no data rows", .0.display())]
    Empty(PathBuf),
}

/// Reads one model's submission CSV into a [`PredictionTable`].
///
/// The row order is whatever the file provides; when this model is the
/// reference it dictates the output ordering, so no sorting happens here.
pub fn load(entry: &ModelEntry) -> Result<PredictionTable, DataError> {
    let path = entry.csv_path.as_path();
    if !path.is_file() {
        return Err(DataError::MissingInput(path.to_path_buf()));
    }

    let df = read_submission_frame(path)?;
    if df.height() == 0 {
        return Err(DataError::Empty(path.to_path_buf()));
    }

    let ids = extract_ids(&df, path)?;
    let labels = extract_labels(&df, path)?;

    let mut seen = ahash::AHashSet::with_capacity(ids.len());
    for id in &ids {
        if !seen.insert(id.as_str()) {
            return Err(DataError::DuplicateId {
                id: id.clone(),
                path: path.to_path_buf(),
            });
        }
    }

    Ok(PredictionTable {
        ids,
        labels: Array1::from_vec(labels),
    })
}

fn read_submission_frame(path: &Path) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b',')),
        )
        .finish()?;

    for column in [ID_COLUMN, TARGET_COLUMN] {
        if !df.get_column_names().iter().any(|c| c == &column) {
            return Err(DataError::ColumnNotFound {
                column: column.to_string(),
                path: path.to_path_buf(),
            });
        }
    }

    // Drop extra columns once validation has passed.
    let df = df.select([ID_COLUMN, TARGET_COLUMN])?;
    Ok(df)
}

fn extract_ids(df: &DataFrame, path: &Path) -> Result<Vec<String>, DataError> {
    let series = df.column(ID_COLUMN)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound {
            column: ID_COLUMN.to_string(),
            path: path.to_path_buf(),
        });
    }

    // IDs are opaque strings; numeric-looking IDs are normalized to text.
    let casted = series.cast(&DataType::String)?;
    let chunked = casted.str()?.rechunk();
    Ok(chunked.into_no_null_iter().map(str::to_string).collect())
}

fn extract_labels(df: &DataFrame, path: &Path) -> Result<Vec<f64>, DataError> {
    let series = df.column(TARGET_COLUMN)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound {
            column: TARGET_COLUMN.to_string(),
            path: path.to_path_buf(),
        });
    }

    let casted = match series.cast(&DataType::Float64) {
        Ok(casted) => casted,
        Err(_) => {
            return Err(DataError::TargetNotNumeric {
                path: path.to_path_buf(),
                found_type: format!("{:?}", series.dtype()),
            });
        }
    };

    // A lossy cast turns unparseable entries into nulls rather than failing.
    if casted.null_count() > 0 {
        return Err(DataError::TargetNotNumeric {
            path: path.to_path_buf(),
            found_type: format!("{:?}", series.dtype()),
        });
    }

    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteTarget(path.to_path_buf()));
    }
    Ok(values)
}
