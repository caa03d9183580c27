//! The programming exercise learners work on.

use serde::Serialize;

pub const DEFAULT_TASK: &str = "The function 'time_to_seconds', which should take a string time as an input parameter. The string specifies a participant's finishing time in an event (e.g., holding their breath for as long as possible) and will have the following format: min:sec.hundredths. The function should convert this string into a floating-point number in the format seconds.hundredths and return this floating-point number.";

/// Task text shown to the learner and embedded into every tutoring prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDescription {
    pub text: String,
}

impl TaskDescription {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Default for TaskDescription {
    fn default() -> Self {
        Self::new(DEFAULT_TASK)
    }
}
