use gavel_common::{LanguageError, Verdict};
use thiserror::Error;

/// Failures talking to the judge or preparing work for it
///
/// Grading failures (wrong answer, compile error, ...) are not errors; they
/// are carried in a `Verdict`.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Language {name} is not supported")]
    UnsupportedLanguage { name: String },

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Batch of {size} submissions exceeds the judge limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Judge unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected judge response: {0}")]
    Protocol(String),

    #[error("Judge did not finish {pending} of {total} submissions after {attempts} poll attempts")]
    PollTimeout {
        attempts: u32,
        pending: usize,
        total: usize,
    },
}

impl JudgeError {
    /// Transport failures are worth another attempt; everything else is final
    pub fn is_transient(&self) -> bool {
        matches!(self, JudgeError::Unavailable(_))
    }
}

impl From<LanguageError> for JudgeError {
    fn from(err: LanguageError) -> Self {
        match err {
            LanguageError::Unsupported { name } => JudgeError::UnsupportedLanguage { name },
            other => JudgeError::InvalidSubmission(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            JudgeError::Protocol(err.to_string())
        } else if err.is_builder() {
            JudgeError::InvalidSubmission(err.to_string())
        } else {
            // connect, timeout, request and body errors
            JudgeError::Unavailable(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize candidate: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Run-level failure of a validation, distinct from a `Reject`
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{}", describe_judge_failure(.language, .test_case, .source))]
    Judge {
        language: Option<String>,
        /// Zero-based test case index, when the failure belongs to one
        test_case: Option<usize>,
        #[source]
        source: JudgeError,
        /// Failing verdicts graded before the run broke off
        failures: Vec<Verdict>,
    },

    #[error("Failed to store validated candidate: {0}")]
    Store(#[from] SinkError),
}

impl ValidationError {
    pub fn judge(language: Option<&str>, test_case: Option<usize>, source: JudgeError) -> Self {
        ValidationError::Judge {
            language: language.map(str::to_string),
            test_case,
            source,
            failures: Vec::new(),
        }
    }

    /// Attach verdicts that were already graded when the run failed
    pub fn with_failures(mut self, graded: Vec<Verdict>) -> Self {
        if let ValidationError::Judge { failures, .. } = &mut self {
            failures.extend(graded);
        }
        self
    }

    pub fn failures(&self) -> &[Verdict] {
        match self {
            ValidationError::Judge { failures, .. } => failures,
            ValidationError::Store(_) => &[],
        }
    }

    pub fn judge_error(&self) -> Option<&JudgeError> {
        match self {
            ValidationError::Judge { source, .. } => Some(source),
            ValidationError::Store(_) => None,
        }
    }

    pub fn language(&self) -> Option<&str> {
        match self {
            ValidationError::Judge { language, .. } => language.as_deref(),
            ValidationError::Store(_) => None,
        }
    }
}

fn describe_judge_failure(
    language: &Option<String>,
    test_case: &Option<usize>,
    source: &JudgeError,
) -> String {
    match (language, test_case) {
        (Some(language), Some(index)) => format!(
            "Failed to test {} solution on testcase {}: {}",
            language,
            index + 1,
            source
        ),
        (Some(language), None) => format!("Failed to test {} solution: {}", language, source),
        (None, _) => source.to_string(),
    }
}
