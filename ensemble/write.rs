//! Submission output. The file is staged in a temporary sibling inside the
//! output directory and renamed into place, so an interrupted run never
//! leaves a partial CSV behind.

use chrono::Utc;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to persist submission to '{}': {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes the submission CSV and returns its path.
///
/// The filename is `ensemble_<n>m_<tag>_<UTC timestamp>.csv`; the body is a
/// header row `ID,target` followed by one `id,label` row per sample, with
/// labels serialized as plain integers.
pub fn write_submission(
    ids: &[String],
    labels: &[i64],
    output_dir: &Path,
    tag: &str,
    model_count: usize,
) -> Result<PathBuf, WriteError> {
    fs::create_dir_all(output_dir)?;

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let final_path = output_dir.join(format!("ensemble_{model_count}m_{tag}_{stamp}.csv"));

    let mut staging = NamedTempFile::new_in(output_dir)?;
    {
        let mut writer = BufWriter::new(staging.as_file_mut());
        writeln!(writer, "ID,target")?;
        for (id, label) in ids.iter().zip(labels) {
            writeln!(writer, "{id},{label}")?;
        }
        writer.flush()?;
    }

    staging
        .persist(&final_path)
        .map_err(|err| WriteError::Persist {
            path: final_path.clone(),
            source: err.error,
        })?;

    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn writes_header_and_integer_rows() {
        let dir = TempDir::new().unwrap();
        let path =
            write_submission(&ids(&["a", "b", "c"]), &[0, 16, 9], dir.path(), "wavg", 1).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        assert_eq!(body, "ID,target\na,0\nb,16\nc,9\n");
    }

    #[test]
    fn filename_carries_model_count_and_tag() {
        let dir = TempDir::new().unwrap();
        let path = write_submission(&ids(&["a"]), &[3], dir.path(), "wavg", 2).unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("ensemble_2m_wavg_"));
        assert!(name.ends_with(".csv"));
    }

    #[test]
    fn no_staging_file_survives_a_successful_write() {
        let dir = TempDir::new().unwrap();
        write_submission(&ids(&["a"]), &[1], dir.path(), "wavg", 1).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn creates_the_output_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("out/subs");
        let path = write_submission(&ids(&["a"]), &[1], &nested, "wavg", 1).unwrap();
        assert!(path.is_file());
    }
}
