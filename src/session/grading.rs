use crate::types::exercise::{Feedback, Hint, Target, TargetKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const NO_MORE_HINTS: &str = "No more hints available.";
pub const EMPTY_HINT: &str = "No hint available.";
pub const NO_ANSWER: &str = "No answer provided";
pub const INVALID_NUMBER: &str = "Invalid number format";
pub const CORRECT: &str = "Correct!";
pub const INCORRECT: &str = "Incorrect";
pub const UNSUPPORTED_TARGET: &str = "Unsupported target type";
const ALL_CORRECT: &str = "All answers are correct!";
const SOME_INCORRECT: &str = "Some answers are incorrect.";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TargetResult {
    pub correct: bool,
    pub feedback: String,
    pub expected: f64,
}

/// Per-target results plus the overall message, serialized as one flat map
/// with the overall message under `_feedback`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GradeReport {
    #[serde(flatten)]
    pub results: BTreeMap<String, TargetResult>,
    #[serde(rename = "_feedback")]
    pub overall: String,
}

impl GradeReport {
    pub fn all_correct(&self) -> bool {
        self.results.values().all(|r| r.correct)
    }
}

/// Grades every target against `answers`. Pure: the same inputs always give
/// the same report.
pub fn grade(targets: &[Target], feedback: &Feedback, answers: &BTreeMap<String, String>) -> GradeReport {
    let results: BTreeMap<String, TargetResult> = targets
        .iter()
        .map(|target| (target.id.clone(), grade_target(target, answers.get(&target.id))))
        .collect();

    let overall = if results.values().all(|r| r.correct) {
        feedback.correct.clone().unwrap_or_else(|| ALL_CORRECT.to_string())
    } else {
        feedback.incorrect.clone().unwrap_or_else(|| SOME_INCORRECT.to_string())
    };
    GradeReport { results, overall }
}

fn grade_target(target: &Target, answer: Option<&String>) -> TargetResult {
    let verdict = |correct: bool, feedback: &str| TargetResult {
        correct,
        feedback: feedback.to_string(),
        expected: target.value,
    };

    let Some(answer) = answer else {
        return verdict(false, NO_ANSWER);
    };
    match target.kind {
        TargetKind::Numeric => match answer.trim().parse::<f64>() {
            Ok(user_value) => {
                let correct = (user_value - target.value).abs() <= target.tolerance;
                verdict(correct, if correct { CORRECT } else { INCORRECT })
            }
            Err(_) => verdict(false, INVALID_NUMBER),
        },
        TargetKind::Unsupported => verdict(false, UNSUPPORTED_TARGET),
    }
}

/// Next hint to show. With a target whose hints exist, only those are
/// considered, otherwise the whole pool; already shown hints are skipped.
/// A target whose own hints are exhausted does not fall back to the pool.
pub fn select_hint<'a>(hints: &'a [Hint], shown: &BTreeSet<String>, target: Option<&str>) -> Option<&'a Hint> {
    let for_target: Vec<&Hint> = match target {
        Some(target_id) => hints
            .iter()
            .filter(|h| h.target.as_deref() == Some(target_id))
            .collect(),
        None => Vec::new(),
    };
    let pool: Vec<&Hint> = if for_target.is_empty() {
        hints.iter().collect()
    } else {
        for_target
    };
    pool.into_iter().find(|h| !shown.contains(&h.id))
}
