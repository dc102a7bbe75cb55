mod parsing;
mod settings;
mod types;

#[cfg(test)]
pub(crate) use types::Environment;
pub(crate) use types::{CodeAttemptScope, Settings, WorkerSettings};
