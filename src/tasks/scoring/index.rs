use std::collections::{BTreeSet, HashMap};

use crate::db::models::{CodeAttempt, Problem};

use super::tally::MarkScheme;

/// Code attempts grouped by student, in load order. Read-only once built.
#[derive(Debug, Default)]
pub(crate) struct CodeAttemptIndex {
    by_student: HashMap<String, Vec<CodeAttempt>>,
    total: usize,
}

impl CodeAttemptIndex {
    pub(crate) fn from_attempts(attempts: Vec<CodeAttempt>) -> Self {
        let total = attempts.len();
        let mut by_student: HashMap<String, Vec<CodeAttempt>> = HashMap::new();
        for attempt in attempts {
            by_student.entry(attempt.student_id.clone()).or_default().push(attempt);
        }

        Self { by_student, total }
    }

    pub(crate) fn attempts_for(&self, student_id: &str) -> &[CodeAttempt] {
        self.by_student.get(student_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct problem ids referenced by any indexed attempt, sorted.
    pub(crate) fn problem_ids(&self) -> Vec<String> {
        self.by_student
            .values()
            .flatten()
            .map(|attempt| attempt.problem_id.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.total
    }

    pub(crate) fn student_count(&self) -> usize {
        self.by_student.len()
    }
}

/// Marks per problem id, fetched once per job.
#[derive(Debug, Default)]
pub(crate) struct ProblemIndex {
    marks: HashMap<String, MarkScheme>,
}

impl ProblemIndex {
    pub(crate) fn from_problems(problems: Vec<Problem>) -> Self {
        let marks = problems
            .into_iter()
            .map(|problem| {
                let scheme = MarkScheme::for_problem(&problem);
                (problem.id, scheme)
            })
            .collect();

        Self { marks }
    }

    /// Zero marks when the problem could not be resolved.
    pub(crate) fn marks_for(&self, problem_id: &str) -> MarkScheme {
        self.marks.get(problem_id).copied().unwrap_or(MarkScheme::ZERO)
    }

    pub(crate) fn len(&self) -> usize {
        self.marks.len()
    }
}
