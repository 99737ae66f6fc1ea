use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single input/expected-output pair attached to a problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    #[serde(rename = "output", alias = "expected_output", alias = "expectedOutput")]
    pub expected_output: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

/// Reference solution for one language, keyed by the name the author used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSolution {
    pub language: String,
    pub source_code: String,
}

impl LanguageSolution {
    pub fn new(language: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source_code: source_code.into(),
        }
    }
}

/// Problem candidate submitted by the problem-creation flow
///
/// `referenceSolutions` is a JSON object; its key order is the declaration
/// order and is preserved so that runs are reproducible. Fields this crate
/// does not interpret (description, difficulty, tags, ...) are carried in
/// `extra` so the persistence sink can store the candidate untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemCandidate {
    pub title: String,
    #[serde(rename = "testcases")]
    pub test_cases: Vec<TestCase>,
    #[serde(rename = "referenceSolutions", with = "ordered_solutions")]
    pub reference_solutions: Vec<LanguageSolution>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProblemCandidate {
    pub fn new(
        title: impl Into<String>,
        test_cases: Vec<TestCase>,
        reference_solutions: Vec<LanguageSolution>,
    ) -> Self {
        Self {
            title: title.into(),
            test_cases,
            reference_solutions,
            extra: serde_json::Map::new(),
        }
    }

    /// Names of the languages in declaration order
    pub fn languages(&self) -> Vec<&str> {
        self.reference_solutions
            .iter()
            .map(|s| s.language.as_str())
            .collect()
    }
}

mod ordered_solutions {
    use super::*;

    pub fn serialize<S: Serializer>(
        solutions: &[LanguageSolution],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(solutions.len()))?;
        for solution in solutions {
            map.serialize_entry(&solution.language, &solution.source_code)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<LanguageSolution>, D::Error> {
        deserializer.deserialize_map(SolutionsVisitor)
    }

    struct SolutionsVisitor;

    impl<'de> Visitor<'de> for SolutionsVisitor {
        type Value = Vec<LanguageSolution>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of language name to source code")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut solutions = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((language, source_code)) = access.next_entry::<String, String>()? {
                if solutions
                    .iter()
                    .any(|s: &LanguageSolution| s.language == language)
                {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate reference solution for language '{}'",
                        language
                    )));
                }
                solutions.push(LanguageSolution {
                    language,
                    source_code,
                });
            }
            Ok(solutions)
        }
    }
}

/// Opaque correlation id assigned by the judge to a queued submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runtime error sub-kinds reported by the judge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeSignal {
    Sigsegv,
    Sigxfsz,
    Sigfpe,
    Sigabrt,
    Nzec,
    Other,
    ExecFormat,
}

/// Closed set of judge statuses
///
/// Raw numeric ids are mapped into this type at the judge boundary; nothing
/// past the transport branches on integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeStatus {
    InQueue,
    Processing,
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    CompileError,
    RuntimeError(RuntimeSignal),
    InternalJudgeError,
}

impl JudgeStatus {
    /// Map a Judge0 status id. Returns `None` for ids outside the contract.
    pub fn from_id(id: u32) -> Option<Self> {
        let status = match id {
            1 => JudgeStatus::InQueue,
            2 => JudgeStatus::Processing,
            3 => JudgeStatus::Accepted,
            4 => JudgeStatus::WrongAnswer,
            5 => JudgeStatus::TimeLimitExceeded,
            6 => JudgeStatus::CompileError,
            7 => JudgeStatus::RuntimeError(RuntimeSignal::Sigsegv),
            8 => JudgeStatus::RuntimeError(RuntimeSignal::Sigxfsz),
            9 => JudgeStatus::RuntimeError(RuntimeSignal::Sigfpe),
            10 => JudgeStatus::RuntimeError(RuntimeSignal::Sigabrt),
            11 => JudgeStatus::RuntimeError(RuntimeSignal::Nzec),
            12 => JudgeStatus::RuntimeError(RuntimeSignal::Other),
            13 => JudgeStatus::InternalJudgeError,
            14 => JudgeStatus::RuntimeError(RuntimeSignal::ExecFormat),
            _ => return None,
        };
        Some(status)
    }

    pub fn id(&self) -> u32 {
        match self {
            JudgeStatus::InQueue => 1,
            JudgeStatus::Processing => 2,
            JudgeStatus::Accepted => 3,
            JudgeStatus::WrongAnswer => 4,
            JudgeStatus::TimeLimitExceeded => 5,
            JudgeStatus::CompileError => 6,
            JudgeStatus::RuntimeError(RuntimeSignal::Sigsegv) => 7,
            JudgeStatus::RuntimeError(RuntimeSignal::Sigxfsz) => 8,
            JudgeStatus::RuntimeError(RuntimeSignal::Sigfpe) => 9,
            JudgeStatus::RuntimeError(RuntimeSignal::Sigabrt) => 10,
            JudgeStatus::RuntimeError(RuntimeSignal::Nzec) => 11,
            JudgeStatus::RuntimeError(RuntimeSignal::Other) => 12,
            JudgeStatus::InternalJudgeError => 13,
            JudgeStatus::RuntimeError(RuntimeSignal::ExecFormat) => 14,
        }
    }

    /// A terminal status never changes on later polls
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JudgeStatus::InQueue | JudgeStatus::Processing)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, JudgeStatus::Accepted)
    }

    /// Description used when the judge did not send one
    pub fn default_description(&self) -> &'static str {
        match self {
            JudgeStatus::InQueue => "In Queue",
            JudgeStatus::Processing => "Processing",
            JudgeStatus::Accepted => "Accepted",
            JudgeStatus::WrongAnswer => "Wrong Answer",
            JudgeStatus::TimeLimitExceeded => "Time Limit Exceeded",
            JudgeStatus::CompileError => "Compilation Error",
            JudgeStatus::RuntimeError(RuntimeSignal::Sigsegv) => "Runtime Error (SIGSEGV)",
            JudgeStatus::RuntimeError(RuntimeSignal::Sigxfsz) => "Runtime Error (SIGXFSZ)",
            JudgeStatus::RuntimeError(RuntimeSignal::Sigfpe) => "Runtime Error (SIGFPE)",
            JudgeStatus::RuntimeError(RuntimeSignal::Sigabrt) => "Runtime Error (SIGABRT)",
            JudgeStatus::RuntimeError(RuntimeSignal::Nzec) => "Runtime Error (NZEC)",
            JudgeStatus::RuntimeError(RuntimeSignal::Other) => "Runtime Error (Other)",
            JudgeStatus::InternalJudgeError => "Internal Error",
            JudgeStatus::RuntimeError(RuntimeSignal::ExecFormat) => "Exec Format Error",
        }
    }
}

impl fmt::Display for JudgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_description())
    }
}

/// Result of one submission as reported by the judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub token: Option<Token>,
    pub status: JudgeStatus,
    pub status_description: String,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub message: Option<String>,
    /// Wall time in seconds
    pub time: Option<f64>,
    /// Peak memory in kilobytes
    pub memory: Option<u64>,
}

impl JudgeResult {
    /// Result carrying only a status, used by tests and fakes
    pub fn with_status(status: JudgeStatus) -> Self {
        Self {
            token: None,
            status,
            status_description: status.default_description().to_string(),
            stdout: None,
            stderr: None,
            compile_output: None,
            message: None,
            time: None,
            memory: None,
        }
    }
}

/// Everything known about the failing test case of a language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Zero-based position of the test case in the candidate
    pub test_case_index: usize,
    pub status: JudgeStatus,
    pub status_description: String,
    pub input: String,
    pub expected_output: String,
    pub actual_stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub message: Option<String>,
    pub time: Option<f64>,
    pub memory: Option<u64>,
}

/// Pass/fail judgment for one language's test-case set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub language: String,
    pub passed: bool,
    pub failing_test_case_index: Option<usize>,
    /// Number of test cases that were graded before the walk stopped
    pub tested: usize,
    pub diagnostics: Option<Diagnostics>,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.failing_test_case_index, &self.diagnostics) {
            (Some(index), Some(diag)) => write!(
                f,
                "Testcase {} failed for language {} ({})",
                index + 1,
                self.language,
                diag.status_description
            ),
            (Some(index), None) => {
                write!(f, "Testcase {} failed for language {}", index + 1, self.language)
            }
            (None, _) if self.passed => write!(
                f,
                "All {} test cases passed for language {}",
                self.tested, self.language
            ),
            (None, _) => write!(
                f,
                "Language {} was not fully graded ({} test cases)",
                self.language, self.tested
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_id_mapping_is_closed() {
        for id in 1..=14 {
            let status = JudgeStatus::from_id(id).unwrap();
            assert_eq!(status.id(), id);
        }
        assert_eq!(JudgeStatus::from_id(0), None);
        assert_eq!(JudgeStatus::from_id(15), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JudgeStatus::InQueue.is_terminal());
        assert!(!JudgeStatus::Processing.is_terminal());
        assert!(JudgeStatus::Accepted.is_terminal());
        assert!(JudgeStatus::WrongAnswer.is_terminal());
        assert!(JudgeStatus::RuntimeError(RuntimeSignal::Nzec).is_terminal());
        assert!(JudgeStatus::InternalJudgeError.is_terminal());
    }

    #[test]
    fn test_only_accepted_passes() {
        let passing: Vec<u32> = (1..=14)
            .filter(|id| JudgeStatus::from_id(*id).unwrap().is_accepted())
            .collect();
        assert_eq!(passing, vec![3]);
    }

    #[test]
    fn test_candidate_preserves_declaration_order() {
        let json = r#"{
            "title": "Add Two Numbers",
            "difficulty": "EASY",
            "testcases": [{"input": "1 2", "output": "3"}],
            "referenceSolutions": {
                "PYTHON": "print(sum(map(int, input().split())))",
                "JAVA": "class Main {}",
                "JAVASCRIPT": "console.log(3)"
            }
        }"#;

        let candidate: ProblemCandidate = serde_json::from_str(json).unwrap();

        assert_eq!(candidate.languages(), vec!["PYTHON", "JAVA", "JAVASCRIPT"]);
        assert_eq!(candidate.test_cases[0].expected_output, "3");
        assert_eq!(candidate.extra["difficulty"], "EASY");
    }

    #[test]
    fn test_candidate_rejects_duplicate_language() {
        let json = r#"{
            "title": "t",
            "testcases": [],
            "referenceSolutions": {"PYTHON": "a", "PYTHON": "b"}
        }"#;

        assert!(serde_json::from_str::<ProblemCandidate>(json).is_err());
    }

    #[test]
    fn test_candidate_serializes_back_to_original_shape() {
        let candidate = ProblemCandidate::new(
            "Echo",
            vec![TestCase::new("x", "x")],
            vec![
                LanguageSolution::new("rust", "fn main() {}"),
                LanguageSolution::new("go", "package main"),
            ],
        );

        let json = serde_json::to_string(&candidate).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["testcases"][0]["output"], "x");
        assert_eq!(value["referenceSolutions"]["rust"], "fn main() {}");
        let round: ProblemCandidate = serde_json::from_str(&json).unwrap();
        assert_eq!(round.languages(), vec!["rust", "go"]);
    }

    #[test]
    fn test_verdict_display_is_one_based() {
        let verdict = Verdict {
            language: "java".to_string(),
            passed: false,
            failing_test_case_index: Some(1),
            tested: 2,
            diagnostics: None,
        };
        assert_eq!(verdict.to_string(), "Testcase 2 failed for language java");
    }
}
