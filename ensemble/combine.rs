// ========================================================================================
//
//                           Alignment, weighting, and projection
//
// ========================================================================================
//
// The first configured model is the reference: its ID sequence fixes the output
// ordering, so repeated runs over the same inputs produce byte-identical files.
// Every other table is joined onto that sequence; the join must cover it
// completely, and the reference must in turn cover every other table. Silently
// dropping rows would corrupt the submission.

use ahash::AHashMap;
use itertools::Itertools;
use ndarray::Array1;
use thiserror::Error;

use crate::config::ModelEntry;
use crate::data::PredictionTable;

/// How many offending IDs an alignment error names before truncating.
pub const MAX_REPORTED_IDS: usize = 10;

#[derive(Error, Debug)]
pub enum AlignError {
    #[error(
        "model '{model}' is missing {total_missing} sample ID(s) required by the reference order, e.g. [{}]",
        .missing.iter().join(", ")
    )]
    MissingSamples {
        model: String,
        /// Up to [`MAX_REPORTED_IDS`] of the missing IDs.
        missing: Vec<String>,
        total_missing: usize,
    },
    #[error(
        "reference model '{reference}' lacks {total_missing} sample ID(s) present in model '{model}', e.g. [{}]",
        .missing.iter().join(", ")
    )]
    UnknownSamples {
        reference: String,
        model: String,
        missing: Vec<String>,
        total_missing: usize,
    },
}

fn truncate_ids(mut ids: Vec<String>) -> (Vec<String>, usize) {
    let total = ids.len();
    ids.truncate(MAX_REPORTED_IDS);
    (ids, total)
}

/// Sums `weight * target` over all models in the reference ID order.
///
/// The join is left-biased on the reference table, and set equality is
/// enforced in both directions before any partial result can escape.
pub fn combine(entries: &[(ModelEntry, PredictionTable)]) -> Result<Array1<f64>, AlignError> {
    let ((reference_entry, reference), rest) = entries
        .split_first()
        .expect("combine requires at least one loaded model");

    let reference_index: AHashMap<&str, usize> = reference
        .ids
        .iter()
        .enumerate()
        .map(|(row, id)| (id.as_str(), row))
        .collect();

    let mut accumulator = Array1::<f64>::zeros(reference.len());
    accumulator.scaled_add(reference_entry.weight, &reference.labels);

    for (entry, table) in rest {
        let lookup: AHashMap<&str, f64> = table
            .ids
            .iter()
            .map(String::as_str)
            .zip(table.labels.iter().copied())
            .collect();

        let mut missing = Vec::new();
        for (row, id) in reference.ids.iter().enumerate() {
            match lookup.get(id.as_str()) {
                Some(&label) => accumulator[row] += entry.weight * label,
                None => missing.push(id.clone()),
            }
        }
        if !missing.is_empty() {
            let (missing, total_missing) = truncate_ids(missing);
            return Err(AlignError::MissingSamples {
                model: entry.name.clone(),
                missing,
                total_missing,
            });
        }

        // Full coverage with equal row counts implies equal ID sets; anything
        // beyond that is an ID the reference has never seen.
        if table.len() != reference.len() {
            let unknown: Vec<String> = table
                .ids
                .iter()
                .filter(|id| !reference_index.contains_key(id.as_str()))
                .cloned()
                .collect();
            let (missing, total_missing) = truncate_ids(unknown);
            return Err(AlignError::UnknownSamples {
                reference: reference_entry.name.clone(),
                model: entry.name.clone(),
                missing,
                total_missing,
            });
        }
    }

    Ok(accumulator)
}

/// Rounds each weighted sum half away from zero, clips to `[0, K-1]`, and
/// casts to an integer class label.
pub fn project(accumulator: &Array1<f64>, num_classes: i64) -> Vec<i64> {
    let max_label = num_classes - 1;
    accumulator
        .iter()
        .map(|&sum| (sum.round() as i64).clamp(0, max_label))
        .collect()
}

/// Infers K as `max(observed label) + 1` across all loaded tables.
pub fn infer_num_classes(entries: &[(ModelEntry, PredictionTable)]) -> i64 {
    let max_label = entries
        .iter()
        .flat_map(|(_, table)| table.labels.iter().copied())
        .fold(0.0_f64, f64::max);
    max_label.round() as i64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::path::PathBuf;

    fn entry(name: &str, weight: f64) -> ModelEntry {
        ModelEntry {
            name: name.to_string(),
            csv_path: PathBuf::from(format!("{name}.csv")),
            observed_score: 0.8,
            weight,
        }
    }

    fn table(ids: &[&str], labels: &[f64]) -> PredictionTable {
        PredictionTable {
            ids: ids.iter().map(|id| id.to_string()).collect(),
            labels: Array1::from_vec(labels.to_vec()),
        }
    }

    #[test]
    fn agreeing_models_reproduce_the_shared_label() {
        let entries = vec![
            (entry("a", 0.7), table(&["X"], &[3.0])),
            (entry("b", 0.3), table(&["X"], &[3.0])),
        ];
        let acc = combine(&entries).unwrap();
        assert_abs_diff_eq!(acc[0], 3.0, epsilon = 1e-12);
        assert_eq!(project(&acc, 18), vec![3]);
    }

    #[test]
    fn weights_decide_between_disagreeing_labels() {
        let heavy_first = vec![
            (entry("a", 0.7), table(&["Y"], &[3.0])),
            (entry("b", 0.3), table(&["Y"], &[4.0])),
        ];
        let acc = combine(&heavy_first).unwrap();
        assert_abs_diff_eq!(acc[0], 3.3, epsilon = 1e-12);
        assert_eq!(project(&acc, 18), vec![3]);

        let heavy_second = vec![
            (entry("a", 0.3), table(&["Y"], &[3.0])),
            (entry("b", 0.7), table(&["Y"], &[4.0])),
        ];
        let acc = combine(&heavy_second).unwrap();
        assert_abs_diff_eq!(acc[0], 3.7, epsilon = 1e-12);
        assert_eq!(project(&acc, 18), vec![4]);
    }

    #[test]
    fn three_way_mix_rounds_to_the_nearest_label() {
        let entries = vec![
            (entry("a", 0.5), table(&["Z"], &[2.0])),
            (entry("b", 0.3), table(&["Z"], &[5.0])),
            (entry("c", 0.2), table(&["Z"], &[7.0])),
        ];
        let acc = combine(&entries).unwrap();
        assert_abs_diff_eq!(acc[0], 3.9, epsilon = 1e-12);
        assert_eq!(project(&acc, 18), vec![4]);
    }

    #[test]
    fn half_way_sums_round_up() {
        let entries = vec![
            (entry("a", 0.5), table(&["W"], &[3.0])),
            (entry("b", 0.5), table(&["W"], &[4.0])),
        ];
        let acc = combine(&entries).unwrap();
        assert_abs_diff_eq!(acc[0], 3.5, epsilon = 1e-12);
        assert_eq!(project(&acc, 18), vec![4]);
    }

    #[test]
    fn output_follows_the_reference_order() {
        let entries = vec![
            (entry("a", 1.0), table(&["c", "a", "b"], &[1.0, 2.0, 3.0])),
            (entry("b", 0.0), table(&["a", "b", "c"], &[9.0, 9.0, 9.0])),
        ];
        let acc = combine(&entries).unwrap();
        assert_abs_diff_eq!(acc[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(acc[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(acc[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn missing_reference_id_aborts_and_names_the_model() {
        let entries = vec![
            (entry("a", 0.5), table(&["a", "b", "c"], &[1.0, 2.0, 3.0])),
            (entry("b", 0.5), table(&["a", "b"], &[1.0, 2.0])),
        ];
        match combine(&entries) {
            Err(AlignError::MissingSamples {
                model,
                missing,
                total_missing,
            }) => {
                assert_eq!(model, "b");
                assert_eq!(missing, vec!["c".to_string()]);
                assert_eq!(total_missing, 1);
            }
            other => panic!("expected MissingSamples, got {:?}", other),
        }
    }

    #[test]
    fn extra_ids_in_a_non_reference_model_abort() {
        let entries = vec![
            (entry("a", 0.5), table(&["a", "b"], &[1.0, 2.0])),
            (entry("b", 0.5), table(&["a", "b", "z"], &[1.0, 2.0, 3.0])),
        ];
        match combine(&entries) {
            Err(AlignError::UnknownSamples {
                reference,
                model,
                missing,
                ..
            }) => {
                assert_eq!(reference, "a");
                assert_eq!(model, "b");
                assert_eq!(missing, vec!["z".to_string()]);
            }
            other => panic!("expected UnknownSamples, got {:?}", other),
        }
    }

    #[test]
    fn alignment_errors_truncate_to_ten_ids() {
        let reference_ids: Vec<String> = (0..15).map(|i| format!("id{i}")).collect();
        let reference_refs: Vec<&str> = reference_ids.iter().map(String::as_str).collect();
        let labels = vec![1.0; 15];
        let entries = vec![
            (entry("a", 0.5), table(&reference_refs, &labels)),
            (entry("b", 0.5), table(&["id0"], &[1.0])),
        ];
        match combine(&entries) {
            Err(AlignError::MissingSamples {
                missing,
                total_missing,
                ..
            }) => {
                assert_eq!(missing.len(), MAX_REPORTED_IDS);
                assert_eq!(total_missing, 14);
            }
            other => panic!("expected MissingSamples, got {:?}", other),
        }
    }

    #[test]
    fn projection_clips_into_the_class_range() {
        let acc = array![-0.4, 2.4, 7.9, 17.2, 22.0];
        assert_eq!(project(&acc, 18), vec![0, 2, 8, 17, 17]);
    }

    #[test]
    fn class_count_is_inferred_from_the_largest_label() {
        let entries = vec![
            (entry("a", 0.5), table(&["a", "b"], &[0.0, 16.0])),
            (entry("b", 0.5), table(&["a", "b"], &[9.0, 2.0])),
        ];
        assert_eq!(infer_num_classes(&entries), 17);
    }
}
