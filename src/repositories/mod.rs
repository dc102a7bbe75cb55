pub(crate) mod code_attempts;
pub(crate) mod health;
pub(crate) mod problems;
pub(crate) mod quizzes;
pub(crate) mod results;
pub(crate) mod student_attempts;
