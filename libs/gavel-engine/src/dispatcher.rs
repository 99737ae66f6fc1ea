/// Dispatcher - sends submissions to the judge
///
/// Two modes:
/// - single: one submission, the judge blocks until it is terminal
/// - batch: many submissions, tokens come back immediately for the poller
///
/// Transport failures are retried within `max_dispatch_attempts` with a
/// linear backoff. Protocol errors are never retried.

use crate::error::JudgeError;
use crate::judge0::{JudgeApi, SubmissionRequest};
use crate::submission::Submission;
use gavel_common::{JudgeConfig, JudgeResult, Token};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn JudgeApi>,
    max_attempts: u32,
    backoff: Duration,
    max_batch_size: usize,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn JudgeApi>, config: &JudgeConfig) -> Self {
        Self {
            api,
            max_attempts: config.max_dispatch_attempts.max(1),
            backoff: config.retry_backoff,
            max_batch_size: config.max_batch_size.max(1),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Send one submission and wait for its terminal result
    pub async fn dispatch_single(
        &self,
        submission: &mut Submission,
    ) -> Result<JudgeResult, JudgeError> {
        let request = SubmissionRequest::from(&*submission);
        submission.mark_dispatched(None)?;

        let api = &self.api;
        let request = &request;
        let result = self
            .with_retry("submit_wait", move || api.submit_wait(request))
            .await?;

        if !result.status.is_terminal() {
            return Err(JudgeError::Protocol(format!(
                "synchronous submission returned non-terminal status '{}'",
                result.status_description
            )));
        }

        submission.record(&result)?;
        Ok(result)
    }

    /// Send up to `max_batch_size` submissions in one call
    ///
    /// Returns one token per submission in input order and stamps each
    /// submission with its token.
    pub async fn dispatch_batch(
        &self,
        submissions: &mut [Submission],
    ) -> Result<Vec<Token>, JudgeError> {
        if submissions.is_empty() {
            return Ok(Vec::new());
        }
        if submissions.len() > self.max_batch_size {
            return Err(JudgeError::BatchTooLarge {
                size: submissions.len(),
                limit: self.max_batch_size,
            });
        }

        let requests: Vec<SubmissionRequest> =
            submissions.iter().map(SubmissionRequest::from).collect();

        let api = &self.api;
        let requests = &requests;
        let tokens = self
            .with_retry("submit_batch", move || api.submit_batch(requests))
            .await?;

        if tokens.len() != submissions.len() {
            return Err(JudgeError::Protocol(format!(
                "judge returned {} tokens for {} submissions",
                tokens.len(),
                submissions.len()
            )));
        }
        let mut seen = HashSet::with_capacity(tokens.len());
        if let Some(duplicate) = tokens.iter().find(|t| !seen.insert(*t)) {
            return Err(JudgeError::Protocol(format!(
                "judge returned duplicate token {}",
                duplicate
            )));
        }

        for (submission, token) in submissions.iter_mut().zip(&tokens) {
            submission.mark_dispatched(Some(token.clone()))?;
        }

        debug!(count = tokens.len(), "Batch dispatched");
        Ok(tokens)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, JudgeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, JudgeError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Judge request failed, retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::{build, SubmissionStatus};
    use async_trait::async_trait;
    use gavel_common::{JudgeStatus, LanguageRegistry, TestCase};
    use std::sync::Mutex;

    /// Fails with a transport error `failures` times, then answers
    struct FlakyJudge {
        failures: Mutex<u32>,
        calls: Mutex<u32>,
        tokens: Vec<&'static str>,
    }

    impl FlakyJudge {
        fn new(failures: u32, tokens: Vec<&'static str>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(0),
                tokens,
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }

        fn fail_once(&self) -> Result<(), JudgeError> {
            *self.calls.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(JudgeError::Unavailable("connection refused".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl JudgeApi for FlakyJudge {
        async fn submit_wait(&self, _: &SubmissionRequest) -> Result<JudgeResult, JudgeError> {
            self.fail_once()?;
            Ok(JudgeResult::with_status(JudgeStatus::Accepted))
        }

        async fn submit_batch(&self, _: &[SubmissionRequest]) -> Result<Vec<Token>, JudgeError> {
            self.fail_once()?;
            Ok(self.tokens.iter().map(|t| Token::new(*t)).collect())
        }

        async fn fetch_batch(&self, _: &[Token]) -> Result<Vec<JudgeResult>, JudgeError> {
            unreachable!("dispatcher never polls")
        }
    }

    fn config(attempts: u32) -> JudgeConfig {
        JudgeConfig {
            max_dispatch_attempts: attempts,
            retry_backoff: Duration::from_millis(1),
            max_batch_size: 3,
            ..JudgeConfig::default()
        }
    }

    fn submissions(n: usize) -> Vec<Submission> {
        let python = LanguageRegistry::builtin().resolve("python").unwrap();
        (0..n)
            .map(|i| build("print(input())", &TestCase::new(i.to_string(), i.to_string()), python).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_batch_recovers_after_two_transport_errors() {
        let judge = Arc::new(FlakyJudge::new(2, vec!["a", "b"]));
        let dispatcher = Dispatcher::new(judge.clone(), &config(3));
        let mut batch = submissions(2);

        let tokens = dispatcher.dispatch_batch(&mut batch).await.unwrap();

        assert_eq!(tokens, vec![Token::new("a"), Token::new("b")]);
        assert_eq!(judge.calls(), 3);
        assert_eq!(batch[1].token(), Some(&Token::new("b")));
        assert_eq!(batch[1].status(), SubmissionStatus::Dispatched);
    }

    #[tokio::test]
    async fn test_batch_gives_up_when_budget_exhausted() {
        let judge = Arc::new(FlakyJudge::new(5, vec!["a"]));
        let dispatcher = Dispatcher::new(judge.clone(), &config(3));

        let err = dispatcher.dispatch_batch(&mut submissions(1)).await.unwrap_err();

        assert!(matches!(err, JudgeError::Unavailable(_)));
        assert_eq!(judge.calls(), 3);
    }

    #[tokio::test]
    async fn test_token_count_mismatch_is_protocol_error() {
        let judge = Arc::new(FlakyJudge::new(0, vec!["a"]));
        let dispatcher = Dispatcher::new(judge.clone(), &config(3));

        let err = dispatcher.dispatch_batch(&mut submissions(2)).await.unwrap_err();

        assert!(matches!(err, JudgeError::Protocol(_)));
        assert_eq!(judge.calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_tokens_are_protocol_error() {
        let judge = Arc::new(FlakyJudge::new(0, vec!["a", "a"]));
        let dispatcher = Dispatcher::new(judge, &config(3));

        let err = dispatcher.dispatch_batch(&mut submissions(2)).await.unwrap_err();

        assert!(matches!(err, JudgeError::Protocol(ref msg) if msg.contains("duplicate")));
    }

    #[tokio::test]
    async fn test_oversized_batch_is_refused_without_network() {
        let judge = Arc::new(FlakyJudge::new(0, vec![]));
        let dispatcher = Dispatcher::new(judge.clone(), &config(3));

        let err = dispatcher.dispatch_batch(&mut submissions(4)).await.unwrap_err();

        assert!(matches!(err, JudgeError::BatchTooLarge { size: 4, limit: 3 }));
        assert_eq!(judge.calls(), 0);
    }

    #[tokio::test]
    async fn test_single_records_terminal_status() {
        let judge = Arc::new(FlakyJudge::new(1, vec![]));
        let dispatcher = Dispatcher::new(judge.clone(), &config(2));
        let mut batch = submissions(1);

        let result = dispatcher.dispatch_single(&mut batch[0]).await.unwrap();

        assert_eq!(result.status, JudgeStatus::Accepted);
        assert_eq!(
            batch[0].status(),
            SubmissionStatus::Finished(JudgeStatus::Accepted)
        );
        assert_eq!(judge.calls(), 2);
    }
}
