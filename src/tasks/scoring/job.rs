use std::fmt;
use std::time::Instant;

use futures::TryStreamExt;
use thiserror::Error;

use crate::core::config::{CodeAttemptScope, WorkerSettings};
use crate::services::scoring_store::{ScoringStore, StoreError};

use super::batch::ResultBatcher;
use super::index::{CodeAttemptIndex, ProblemIndex};
use super::tally::{self, MarkScheme};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScoringOptions {
    pub(crate) batch_size: usize,
    pub(crate) code_attempt_scope: CodeAttemptScope,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self { batch_size: 100, code_attempt_scope: CodeAttemptScope::All }
    }
}

impl From<&WorkerSettings> for ScoringOptions {
    fn from(settings: &WorkerSettings) -> Self {
        Self { batch_size: settings.batch_size, code_attempt_scope: settings.code_attempt_scope }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScoringSummary {
    pub(crate) quiz_id: String,
    pub(crate) students_scored: u64,
    pub(crate) rows_written: u64,
    pub(crate) batches_flushed: u64,
    pub(crate) code_attempts_indexed: usize,
    pub(crate) problems_indexed: usize,
}

/// Phase of a scoring run, carried on store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScoringStage {
    LoadQuiz,
    IndexCodeAttempts,
    IndexProblems,
    StreamAttempts,
    WriteResults,
}

impl fmt::Display for ScoringStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::LoadQuiz => "loading quiz",
            Self::IndexCodeAttempts => "indexing code attempts",
            Self::IndexProblems => "indexing problems",
            Self::StreamAttempts => "streaming student attempts",
            Self::WriteResults => "writing results",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Error)]
pub(crate) enum ScoringError {
    #[error("quiz {quiz_id} not found")]
    QuizNotFound { quiz_id: String },
    #[error("store failure while {stage}: {source}")]
    Store {
        stage: ScoringStage,
        #[source]
        source: StoreError,
    },
}

impl ScoringError {
    /// Missing quizzes stay missing; store failures may be transient.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    fn store(stage: ScoringStage) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store { stage, source }
    }
}

/// Computes and persists every student's result for one quiz.
///
/// Attempts are consumed from a cursor one at a time; only the code attempt
/// and problem indexes plus one pending batch are held in memory. Batches
/// written before a failure remain in place.
pub(crate) async fn run_scoring_job<S: ScoringStore + ?Sized>(
    store: &S,
    quiz_id: &str,
    options: ScoringOptions,
) -> Result<ScoringSummary, ScoringError> {
    let started = Instant::now();

    let quiz = store
        .find_quiz(quiz_id)
        .await
        .map_err(ScoringError::store(ScoringStage::LoadQuiz))?
        .ok_or_else(|| ScoringError::QuizNotFound { quiz_id: quiz_id.to_string() })?;
    let quiz_marks = MarkScheme::for_quiz(&quiz);

    let code_attempts = CodeAttemptIndex::from_attempts(
        store
            .list_code_attempts(options.code_attempt_scope, quiz_id)
            .await
            .map_err(ScoringError::store(ScoringStage::IndexCodeAttempts))?,
    );

    let problem_ids = code_attempts.problem_ids();
    let problems = ProblemIndex::from_problems(
        store
            .list_problems(&problem_ids)
            .await
            .map_err(ScoringError::store(ScoringStage::IndexProblems))?,
    );
    if problems.len() < problem_ids.len() {
        tracing::warn!(
            quiz_id,
            referenced = problem_ids.len(),
            resolved = problems.len(),
            "Some coding problems could not be resolved; their answers score zero"
        );
    }

    tracing::info!(
        quiz_id,
        per_question_marks = quiz_marks.reward,
        negative_marks = quiz_marks.penalty,
        code_attempts = code_attempts.len(),
        coding_students = code_attempts.student_count(),
        problems = problems.len(),
        scope = options.code_attempt_scope.as_str(),
        "Scoring indexes built"
    );

    let mut batcher = ResultBatcher::new(store, options.batch_size);
    let mut students_scored = 0u64;

    let mut attempts = store.stream_student_attempts(quiz_id);
    while let Some(attempt) =
        attempts.try_next().await.map_err(ScoringError::store(ScoringStage::StreamAttempts))?
    {
        let upsert = tally::score_attempt(
            &attempt,
            quiz_marks,
            code_attempts.attempts_for(&attempt.student_id),
            &problems,
        );
        batcher.add(upsert).await.map_err(ScoringError::store(ScoringStage::WriteResults))?;
        students_scored += 1;
    }
    drop(attempts);

    batcher.flush().await.map_err(ScoringError::store(ScoringStage::WriteResults))?;

    let summary = ScoringSummary {
        quiz_id: quiz_id.to_string(),
        students_scored,
        rows_written: batcher.rows_written(),
        batches_flushed: batcher.batches_flushed(),
        code_attempts_indexed: code_attempts.len(),
        problems_indexed: problems.len(),
    };

    tracing::info!(
        quiz_id,
        students_scored,
        batches = summary.batches_flushed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Results processed for quiz"
    );

    Ok(summary)
}
