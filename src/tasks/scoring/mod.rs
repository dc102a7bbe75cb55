//! Per-quiz scoring: index coding work, stream MCQ attempts, write totals in batches.

mod batch;
mod index;
mod job;
mod tally;

pub(crate) use job::{run_scoring_job, ScoringOptions, ScoringSummary};
