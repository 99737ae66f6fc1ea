/// Verdict Aggregator - turns judge results into a per-language Verdict
///
/// **Critical Properties:**
/// - Knows nothing about HTTP or the judge's wire format
/// - Pure function: (test cases, terminal results) → Verdict
///
/// **Grading Rules:**
/// - Only `Accepted` counts as a pass; output comparison is the judge's job
/// - Test cases are walked in order and the walk stops at the first failure
/// - The failing case carries expected/actual output, stderr and compile
///   output; later test cases are neither evaluated nor reported

use gavel_common::{Diagnostics, JudgeResult, TestCase, Verdict};
use tracing::{debug, warn};

/// Build the diagnostics for a failing test case
fn diagnose(index: usize, test_case: &TestCase, result: &JudgeResult) -> Diagnostics {
    Diagnostics {
        test_case_index: index,
        status: result.status,
        status_description: result.status_description.clone(),
        input: test_case.input.clone(),
        expected_output: test_case.expected_output.clone(),
        actual_stdout: result.stdout.clone(),
        stderr: result.stderr.clone(),
        compile_output: result.compile_output.clone(),
        message: result.message.clone(),
        time: result.time,
        memory: result.memory,
    }
}

/// Aggregate one language's results into a Verdict
///
/// `results[i]` is the judge's answer for `test_cases[i]`. A language passes
/// only when every test case has an `Accepted` result.
pub fn aggregate(language: &str, test_cases: &[TestCase], results: &[JudgeResult]) -> Verdict {
    for (index, (test_case, result)) in test_cases.iter().zip(results).enumerate() {
        if result.status.is_accepted() {
            debug!(
                language,
                test_case = index + 1,
                time = ?result.time,
                memory = ?result.memory,
                "Testcase passed"
            );
            continue;
        }

        warn!(
            language,
            test_case = index + 1,
            status = %result.status_description,
            "Testcase failed"
        );
        return Verdict {
            language: language.to_string(),
            passed: false,
            failing_test_case_index: Some(index),
            tested: index + 1,
            diagnostics: Some(diagnose(index, test_case, result)),
        };
    }

    let tested = test_cases.len().min(results.len());
    Verdict {
        language: language.to_string(),
        passed: results.len() >= test_cases.len(),
        failing_test_case_index: None,
        tested,
        diagnostics: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_common::{JudgeStatus, RuntimeSignal};

    fn result(status: JudgeStatus, stdout: &str) -> JudgeResult {
        JudgeResult {
            stdout: Some(stdout.to_string()),
            ..JudgeResult::with_status(status)
        }
    }

    fn cases() -> Vec<TestCase> {
        vec![
            TestCase::new("A", "a"),
            TestCase::new("B", "b"),
            TestCase::new("C", "c"),
        ]
    }

    #[test]
    fn test_all_accepted() {
        let results = vec![
            result(JudgeStatus::Accepted, "a"),
            result(JudgeStatus::Accepted, "b"),
            result(JudgeStatus::Accepted, "c"),
        ];

        let verdict = aggregate("python", &cases(), &results);

        assert!(verdict.passed);
        assert_eq!(verdict.failing_test_case_index, None);
        assert_eq!(verdict.tested, 3);
        assert!(verdict.diagnostics.is_none());
    }

    #[test]
    fn test_fail_fast_reports_first_failure_only() {
        let results = vec![
            result(JudgeStatus::Accepted, "a"),
            result(JudgeStatus::WrongAnswer, "x"),
            result(JudgeStatus::Accepted, "c"),
        ];

        let verdict = aggregate("java", &cases(), &results);

        assert!(!verdict.passed);
        assert_eq!(verdict.failing_test_case_index, Some(1));
        assert_eq!(verdict.tested, 2);
        let diag = verdict.diagnostics.unwrap();
        assert_eq!(diag.test_case_index, 1);
        assert_eq!(diag.input, "B");
        assert_eq!(diag.expected_output, "b");
        assert_eq!(diag.actual_stdout.as_deref(), Some("x"));
        assert_eq!(diag.status, JudgeStatus::WrongAnswer);
        // nothing about test case C leaks into the verdict
        assert!(!format!("{:?}", diag).contains("\"C\""));
    }

    #[test]
    fn test_compile_error_keeps_compiler_output() {
        let results = vec![JudgeResult {
            compile_output: Some("Main.java:3: error: ';' expected".to_string()),
            ..JudgeResult::with_status(JudgeStatus::CompileError)
        }];

        let verdict = aggregate("java", &cases()[..1], &results);

        let diag = verdict.diagnostics.unwrap();
        assert_eq!(diag.status, JudgeStatus::CompileError);
        assert_eq!(
            diag.compile_output.as_deref(),
            Some("Main.java:3: error: ';' expected")
        );
        assert_eq!(diag.status_description, "Compilation Error");
    }

    #[test]
    fn test_every_non_accepted_terminal_status_fails() {
        for status in [
            JudgeStatus::WrongAnswer,
            JudgeStatus::TimeLimitExceeded,
            JudgeStatus::CompileError,
            JudgeStatus::RuntimeError(RuntimeSignal::Sigsegv),
            JudgeStatus::RuntimeError(RuntimeSignal::Nzec),
            JudgeStatus::InternalJudgeError,
        ] {
            let verdict = aggregate("c", &cases()[..1], &[result(status, "")]);
            assert!(!verdict.passed, "{:?} must not pass", status);
            assert_eq!(verdict.diagnostics.unwrap().status, status);
        }
    }

    #[test]
    fn test_missing_results_do_not_pass() {
        let results = vec![result(JudgeStatus::Accepted, "a")];

        let verdict = aggregate("go", &cases(), &results);

        assert!(!verdict.passed);
        assert_eq!(verdict.tested, 1);
        assert_eq!(verdict.failing_test_case_index, None);
    }

    #[test]
    fn test_no_test_cases_is_vacuously_passed() {
        let verdict = aggregate("rust", &[], &[]);
        assert!(verdict.passed);
        assert_eq!(verdict.tested, 0);
    }
}
