use std::collections::HashMap;
use std::path::Path;

use log::debug;

use crate::error::{ProcmineError, Result};
use crate::report::{DeviationKind, Severity};

/// Expected activity sequence that cases are checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceModel {
    activities: Vec<String>,
}

impl ReferenceModel {
    /// # Errors
    ///
    /// Returns `InvalidReferenceModel` when no activity is given.
    pub fn new(activities: Vec<String>) -> Result<Self> {
        let activities: Vec<String> = activities
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        if activities.is_empty() {
            return Err(ProcmineError::InvalidReferenceModel(
                "reference model has no activities".to_string(),
            ));
        }

        Ok(Self { activities })
    }

    /// Parses a comma-separated sequence such as `"Create PO,Approve PO,Pay"`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReferenceModel` when the sequence is empty.
    pub fn parse_sequence(sequence: &str) -> Result<Self> {
        Self::new(sequence.split(',').map(str::to_string).collect())
    }

    /// Loads a reference model file: a JSON array of names, or one activity per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is malformed JSON, or is empty.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let trimmed = contents.trim_start();

        let activities: Vec<String> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else {
            contents.lines().map(str::to_string).collect()
        };

        debug!(
            "Loaded reference model with {} activities from {}",
            activities.len(),
            path.display()
        );
        Self::new(activities)
    }

    pub fn activities(&self) -> &[String] {
        &self.activities
    }

    pub fn matches(&self, sequence: &[&str]) -> bool {
        self.activities.len() == sequence.len()
            && self.activities.iter().zip(sequence).all(|(a, b)| a == b)
    }
}

/// Outcome of aligning one case sequence against the reference model.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Alignment {
    pub kind: DeviationKind,
    pub severity: Severity,
    pub fitness: f64,
    pub extra_activities: Vec<String>,
    pub missing_activities: Vec<String>,
}

/// Classifies how a non-matching case deviates from the reference.
///
/// Log-only and model-only alignment moves each cost 1; synchronous moves are
/// free, so the cost is what remains outside the longest common subsequence.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn align(reference: &ReferenceModel, sequence: &[&str]) -> Alignment {
    let expected: Vec<&str> = reference.activities.iter().map(String::as_str).collect();
    let common = lcs_len(&expected, sequence);
    let cost = (expected.len() - common) + (sequence.len() - common);
    let total = expected.len() + sequence.len();
    let fitness = if total == 0 {
        1.0
    } else {
        (total - cost) as f64 / total as f64
    };

    let extra_activities = multiset_difference(sequence, &expected);
    let missing_activities = multiset_difference(&expected, sequence);

    let kind = if !missing_activities.is_empty() {
        DeviationKind::MissingActivity
    } else if !extra_activities.is_empty() {
        DeviationKind::ExtraActivity
    } else {
        DeviationKind::Reordered
    };

    Alignment {
        kind,
        severity: Severity::from_fitness(fitness),
        fitness,
        extra_activities,
        missing_activities,
    }
}

fn lcs_len(a: &[&str], b: &[&str]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for x in a {
        let mut diagonal = 0;
        for (j, y) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if x == y {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Items of `left` not accounted for in `right`, counting repeats, in `left` order.
fn multiset_difference(left: &[&str], right: &[&str]) -> Vec<String> {
    let mut available: HashMap<&str, usize> = HashMap::new();
    for item in right {
        *available.entry(*item).or_insert(0) += 1;
    }

    left.iter()
        .filter(|item| match available.get_mut(**item) {
            Some(count) if *count > 0 => {
                *count -= 1;
                false
            }
            _ => true,
        })
        .map(|item| (*item).to_string())
        .collect()
}
