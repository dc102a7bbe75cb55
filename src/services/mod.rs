pub(crate) mod job_queue;
pub(crate) mod scoring_store;
