pub(crate) mod scheduler;
pub(crate) mod scoring;
pub(crate) mod supervisor;
