/// Submission Builder
///
/// Turns (source code, test case, environment id) into an unsent
/// `Submission`. A `LanguageId` can only come out of the language registry,
/// so an unresolved language cannot reach this point.

use crate::error::JudgeError;
use gavel_common::{JudgeResult, JudgeStatus, LanguageId, TestCase, Token};

/// Safety limits to keep pathological inputs away from the judge
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_STDIN_BYTES: usize = 10 * 1024 * 1024; // 10MB

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Unsent,
    /// Handed to the judge, no terminal result seen yet
    Dispatched,
    Finished(JudgeStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub source_code: String,
    pub language_id: LanguageId,
    pub stdin: String,
    pub expected_output: String,
    token: Option<Token>,
    status: SubmissionStatus,
}

impl Submission {
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, SubmissionStatus::Finished(_))
    }

    pub(crate) fn mark_dispatched(&mut self, token: Option<Token>) -> Result<(), JudgeError> {
        if self.status != SubmissionStatus::Unsent {
            return Err(JudgeError::InvalidSubmission(
                "submission was already dispatched".to_string(),
            ));
        }
        self.token = token;
        self.status = SubmissionStatus::Dispatched;
        Ok(())
    }

    /// Record the judge's result. Only terminal results stick, and a finished
    /// submission is never changed again.
    pub(crate) fn record(&mut self, result: &JudgeResult) -> Result<(), JudgeError> {
        if self.is_finished() {
            return Err(JudgeError::InvalidSubmission(
                "submission already has a terminal result".to_string(),
            ));
        }
        if result.status.is_terminal() {
            self.status = SubmissionStatus::Finished(result.status);
        }
        Ok(())
    }
}

/// Build an unsent submission
///
/// Empty stdin is a valid input; blank source code is treated as missing.
pub fn build(
    source_code: &str,
    test_case: &TestCase,
    language_id: LanguageId,
) -> Result<Submission, JudgeError> {
    if source_code.trim().is_empty() {
        return Err(JudgeError::InvalidSubmission(
            "source code is missing".to_string(),
        ));
    }
    if source_code.len() > MAX_SOURCE_CODE_BYTES {
        return Err(JudgeError::InvalidSubmission(format!(
            "source code exceeds maximum size of {} bytes",
            MAX_SOURCE_CODE_BYTES
        )));
    }
    if test_case.input.len() > MAX_STDIN_BYTES {
        return Err(JudgeError::InvalidSubmission(format!(
            "test input exceeds maximum size of {} bytes",
            MAX_STDIN_BYTES
        )));
    }

    Ok(Submission {
        source_code: source_code.to_string(),
        language_id,
        stdin: test_case.input.clone(),
        expected_output: test_case.expected_output.clone(),
        token: None,
        status: SubmissionStatus::Unsent,
    })
}
