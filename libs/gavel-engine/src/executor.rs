/// Validation Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Drive one problem candidate through the judge and decide Accept/Reject.
///
/// **Architecture:**
/// 1. Resolve each language through the registry (declaration order)
/// 2. Build and dispatch submissions, single or batch (dispatcher.rs, poller.rs)
/// 3. Turn results into a per-language Verdict (evaluator.rs)
/// 4. AND the verdicts together, stopping at the first failure
///
/// A run-level error carries the failing verdicts graded before it, so a
/// complete-report run that breaks off late still reports them.
///
/// A run is never resumed: every call starts from the first language and
/// the first test case. Independent runs share nothing but the concurrency
/// budget.

use crate::dispatcher::Dispatcher;
use crate::error::{JudgeError, ValidationError};
use crate::evaluator;
use crate::judge0::{Judge0Client, JudgeApi};
use crate::poller::Poller;
use crate::sink::CandidateSink;
use crate::submission::{self, Submission};
use chrono::{DateTime, Utc};
use gavel_common::{
    JudgeConfig, JudgeResult, LanguageId, LanguageRegistry, LanguageSolution, ProblemCandidate,
    TestCase, Verdict,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One synchronous submission at a time, paced by the submission delay
    #[default]
    Single,
    /// All test cases of a language as batches, then poll
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Stop the whole run at the first failing test case of any language
    #[default]
    FailFast,
    /// Grade every language (each still stops at its first failure) and
    /// report all failing languages
    CompleteReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationOptions {
    pub mode: DispatchMode,
    pub policy: ValidationPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptReport {
    pub run_id: Uuid,
    pub title: String,
    pub languages: Vec<String>,
    pub test_cases: usize,
    pub submissions: usize,
    pub mode: DispatchMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub run_id: Uuid,
    pub title: String,
    /// Failing languages in declaration order; exactly one under fail-fast
    pub failures: Vec<Verdict>,
    pub passed_languages: Vec<String>,
    pub submissions: usize,
    pub mode: DispatchMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Rejection {
    pub fn first_failure(&self) -> Option<&Verdict> {
        self.failures.first()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.failures.iter().map(Verdict::to_string).collect();
        f.write_str(&messages.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Accept(AcceptReport),
    Reject(Rejection),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accept(_))
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            ValidationOutcome::Accept(report) => report.run_id,
            ValidationOutcome::Reject(rejection) => rejection.run_id,
        }
    }
}

/// Per-run bookkeeping
#[derive(Debug, Default)]
struct RunState {
    submissions: usize,
}

impl RunState {
    /// Rate limit: pause between consecutive synchronous submissions
    async fn pace(&self, delay: Duration) {
        if self.submissions > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Validates problem candidates against the judge
#[derive(Clone)]
pub struct Validator {
    registry: Arc<LanguageRegistry>,
    dispatcher: Dispatcher,
    poller: Poller,
    submission_delay: Duration,
    budget: Arc<Semaphore>,
}

impl Validator {
    pub fn new(api: Arc<dyn JudgeApi>, registry: LanguageRegistry, config: &JudgeConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            dispatcher: Dispatcher::new(api.clone(), config),
            poller: Poller::new(api, config),
            submission_delay: config.submission_delay,
            budget: Arc::new(Semaphore::new(config.max_concurrent_runs.max(1))),
        }
    }

    /// Validator talking to the Judge0 deployment named in `config`
    pub fn connect(config: &JudgeConfig, registry: LanguageRegistry) -> Result<Self, JudgeError> {
        let client = Judge0Client::new(config)?;
        Ok(Self::new(Arc::new(client), registry, config))
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Accept iff every language passes every test case
    #[instrument(
        skip(self, candidate, options),
        fields(title = %candidate.title, run_id = tracing::field::Empty)
    )]
    pub async fn validate_candidate(
        &self,
        candidate: &ProblemCandidate,
        options: ValidationOptions,
    ) -> Result<ValidationOutcome, ValidationError> {
        let _permit = self.budget.acquire().await.map_err(|_| {
            ValidationError::judge(
                None,
                None,
                JudgeError::Unavailable("validation budget is closed".to_string()),
            )
        })?;

        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();

        check_candidate(candidate)?;

        info!(
            languages = ?candidate.languages(),
            test_cases = candidate.test_cases.len(),
            mode = ?options.mode,
            policy = ?options.policy,
            "Starting candidate validation"
        );

        let mut state = RunState::default();
        let mut passed_languages = Vec::new();
        let mut failures = Vec::new();

        for solution in &candidate.reference_solutions {
            let language_id = self.registry.resolve(&solution.language).map_err(|e| {
                error!(language = %solution.language, "Language not supported, aborting run");
                ValidationError::judge(Some(solution.language.as_str()), None, e.into())
                    .with_failures(std::mem::take(&mut failures))
            })?;

            let verdict = self
                .validate_language(
                    solution,
                    language_id,
                    &candidate.test_cases,
                    options.mode,
                    &mut state,
                )
                .await
                .map_err(|e| e.with_failures(std::mem::take(&mut failures)))?;

            if verdict.passed {
                info!(language = %solution.language, "All test cases passed");
                passed_languages.push(solution.language.clone());
                continue;
            }

            failures.push(verdict);
            if options.policy == ValidationPolicy::FailFast {
                break;
            }
        }

        let finished_at = Utc::now();

        if failures.is_empty() {
            info!(submissions = state.submissions, "All validations passed");
            return Ok(ValidationOutcome::Accept(AcceptReport {
                run_id,
                title: candidate.title.clone(),
                languages: passed_languages,
                test_cases: candidate.test_cases.len(),
                submissions: state.submissions,
                mode: options.mode,
                started_at,
                finished_at,
            }));
        }

        let rejection = Rejection {
            run_id,
            title: candidate.title.clone(),
            failures,
            passed_languages,
            submissions: state.submissions,
            mode: options.mode,
            started_at,
            finished_at,
        };
        info!(submissions = state.submissions, reason = %rejection, "Candidate rejected");
        Ok(ValidationOutcome::Reject(rejection))
    }

    /// Validate, then hand an accepted candidate to the sink
    pub async fn validate_and_store(
        &self,
        candidate: &ProblemCandidate,
        options: ValidationOptions,
        sink: &dyn CandidateSink,
    ) -> Result<ValidationOutcome, ValidationError> {
        let outcome = self.validate_candidate(candidate, options).await?;
        if let ValidationOutcome::Accept(report) = &outcome {
            sink.store(candidate, report).await?;
        }
        Ok(outcome)
    }

    #[instrument(
        skip_all,
        fields(language = %solution.language, language_id = %language_id)
    )]
    async fn validate_language(
        &self,
        solution: &LanguageSolution,
        language_id: LanguageId,
        test_cases: &[TestCase],
        mode: DispatchMode,
        state: &mut RunState,
    ) -> Result<Verdict, ValidationError> {
        info!(test_cases = test_cases.len(), "Testing language");

        let results = match mode {
            DispatchMode::Single => {
                self.run_single(solution, language_id, test_cases, state)
                    .await?
            }
            DispatchMode::Batch => {
                self.run_batch(solution, language_id, test_cases, state)
                    .await?
            }
        };

        Ok(evaluator::aggregate(
            &solution.language,
            &test_cases[..results.len()],
            &results,
        ))
    }

    /// One blocking submission per test case, stopping at the first failure
    async fn run_single(
        &self,
        solution: &LanguageSolution,
        language_id: LanguageId,
        test_cases: &[TestCase],
        state: &mut RunState,
    ) -> Result<Vec<JudgeResult>, ValidationError> {
        let mut results = Vec::with_capacity(test_cases.len());

        for (index, test_case) in test_cases.iter().enumerate() {
            let fail = |e: JudgeError| {
                ValidationError::judge(Some(solution.language.as_str()), Some(index), e)
            };

            let mut submission =
                submission::build(&solution.source_code, test_case, language_id).map_err(fail)?;

            state.pace(self.submission_delay).await;
            info!(
                test_case = index + 1,
                total = test_cases.len(),
                "Dispatching testcase"
            );
            let result = self
                .dispatcher
                .dispatch_single(&mut submission)
                .await
                .map_err(|e| {
                    error!(test_case = index + 1, error = %e, "Judge call failed");
                    fail(e)
                })?;
            state.submissions += 1;

            info!(
                test_case = index + 1,
                status = %result.status_description,
                time = ?result.time,
                memory = ?result.memory,
                "Testcase result"
            );

            let accepted = result.status.is_accepted();
            results.push(result);
            if !accepted {
                break;
            }
        }

        Ok(results)
    }

    /// Batches of at most `max_batch_size`, polled to completion one batch at
    /// a time; no further batch is sent once one contains a failure
    async fn run_batch(
        &self,
        solution: &LanguageSolution,
        language_id: LanguageId,
        test_cases: &[TestCase],
        state: &mut RunState,
    ) -> Result<Vec<JudgeResult>, ValidationError> {
        let language = solution.language.as_str();
        let chunk_size = self.dispatcher.max_batch_size();
        let mut results = Vec::with_capacity(test_cases.len());

        for (chunk_index, chunk) in test_cases.chunks(chunk_size).enumerate() {
            let offset = chunk_index * chunk_size;

            let mut submissions = chunk
                .iter()
                .enumerate()
                .map(|(i, test_case)| {
                    submission::build(&solution.source_code, test_case, language_id)
                        .map_err(|e| ValidationError::judge(Some(language), Some(offset + i), e))
                })
                .collect::<Result<Vec<Submission>, _>>()?;

            let tokens = self
                .dispatcher
                .dispatch_batch(&mut submissions)
                .await
                .map_err(|e| ValidationError::judge(Some(language), None, e))?;
            state.submissions += tokens.len();

            info!(
                first_test_case = offset + 1,
                count = tokens.len(),
                "Batch submitted, polling"
            );

            let chunk_results = self
                .poller
                .poll(&tokens)
                .await
                .map_err(|e| {
                    error!(error = %e, "Polling failed");
                    ValidationError::judge(Some(language), None, e)
                })?;

            for (i, (submission, result)) in submissions.iter_mut().zip(&chunk_results).enumerate() {
                submission
                    .record(result)
                    .map_err(|e| ValidationError::judge(Some(language), Some(offset + i), e))?;
            }

            let failed = chunk_results.iter().any(|r| !r.status.is_accepted());
            results.extend(chunk_results);
            if failed {
                break;
            }
        }

        Ok(results)
    }
}

/// Required fields of a candidate, checked before any judge traffic
fn check_candidate(candidate: &ProblemCandidate) -> Result<(), ValidationError> {
    let missing = if candidate.title.trim().is_empty() {
        Some("title")
    } else if candidate.test_cases.is_empty() {
        Some("testcases")
    } else if candidate.reference_solutions.is_empty() {
        Some("referenceSolutions")
    } else {
        None
    };

    match missing {
        Some(field) => Err(ValidationError::judge(
            None,
            None,
            JudgeError::InvalidSubmission(format!("candidate is missing {}", field)),
        )),
        None => Ok(()),
    }
}
