use crate::db::models::{Answer, CodeAttempt, Problem, Quiz, StudentAttempt};
use crate::repositories::results::ResultUpsert;

use super::index::ProblemIndex;

/// Reward for a right answer and penalty for any other answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MarkScheme {
    pub(crate) reward: f64,
    pub(crate) penalty: f64,
}

impl MarkScheme {
    pub(crate) const ZERO: Self = Self { reward: 0.0, penalty: 0.0 };

    /// Unset or non-numeric marks count as zero.
    pub(crate) fn new(reward: Option<f64>, penalty: Option<f64>) -> Self {
        Self { reward: number_or_zero(reward), penalty: number_or_zero(penalty) }
    }

    pub(crate) fn for_quiz(quiz: &Quiz) -> Self {
        Self::new(quiz.per_question_marks, quiz.negative_marks)
    }

    pub(crate) fn for_problem(problem: &Problem) -> Self {
        Self::new(problem.marks, problem.negative_marks)
    }

    fn delta(self, answer: &Answer) -> f64 {
        if answer.is_right() {
            self.reward
        } else {
            -self.penalty
        }
    }
}

fn number_or_zero(value: Option<f64>) -> f64 {
    value.filter(|value| !value.is_nan()).unwrap_or(0.0)
}

/// Running totals for one student while their attempts are folded in.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct StudentTally {
    score: f64,
    correct: i64,
    attempted: i64,
}

impl StudentTally {
    pub(crate) fn add_mcq_answer(&mut self, marks: MarkScheme, answer: &Answer) {
        self.score += marks.delta(answer);
        if answer.is_right() {
            self.correct += 1;
        }
        self.attempted += 1;
    }

    /// Coding answers move the score only; the counters track MCQs.
    pub(crate) fn add_coding_answer(&mut self, marks: MarkScheme, answer: &Answer) {
        self.score += marks.delta(answer);
    }

    /// Non-finite totals (from corrupt marks) are written as zero.
    pub(crate) fn final_score(&self) -> f64 {
        if self.score.is_finite() {
            self.score
        } else {
            0.0
        }
    }

    pub(crate) fn into_upsert(self, student_id: &str, quiz_id: &str) -> ResultUpsert {
        ResultUpsert {
            student_id: student_id.to_string(),
            quiz_id: quiz_id.to_string(),
            total_score: self.final_score(),
            total_correct: self.correct,
            total_attempt: self.attempted,
        }
    }
}

/// Scores one student: their MCQ attempt plus every coding attempt they made.
pub(crate) fn score_attempt(
    attempt: &StudentAttempt,
    quiz_marks: MarkScheme,
    code_attempts: &[CodeAttempt],
    problems: &ProblemIndex,
) -> ResultUpsert {
    let mut tally = StudentTally::default();

    for answer in attempt.answers.iter() {
        tally.add_mcq_answer(quiz_marks, answer);
    }

    for code_attempt in code_attempts {
        let marks = problems.marks_for(&code_attempt.problem_id);
        for answer in code_attempt.answers.iter() {
            tally.add_coding_answer(marks, answer);
        }
    }

    tally.into_upsert(&attempt.student_id, &attempt.quiz_id)
}
