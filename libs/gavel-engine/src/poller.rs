/// Result Poller
///
/// Bounded wait loop over a batch of tokens. Each attempt is one batch GET;
/// the loop returns only once every token is terminal (wait for the
/// slowest), sleeping `poll_interval` between attempts. A transport error
/// on one attempt consumes that attempt and the loop carries on.

use crate::error::JudgeError;
use crate::judge0::JudgeApi;
use gavel_common::{JudgeConfig, JudgeResult, Token};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Poller {
    api: Arc<dyn JudgeApi>,
    interval: Duration,
    max_attempts: u32,
}

impl Poller {
    pub fn new(api: Arc<dyn JudgeApi>, config: &JudgeConfig) -> Self {
        Self {
            api,
            interval: config.poll_interval,
            max_attempts: config.max_poll_attempts.max(1),
        }
    }

    pub async fn poll(&self, tokens: &[Token]) -> Result<Vec<JudgeResult>, JudgeError> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut last_error: Option<JudgeError> = None;
        let mut pending = tokens.len();

        for attempt in 1..=self.max_attempts {
            match self.api.fetch_batch(tokens).await {
                Ok(results) => {
                    check_order(tokens, &results)?;
                    pending = results.iter().filter(|r| !r.status.is_terminal()).count();
                    if pending == 0 {
                        debug!(attempt, tokens = tokens.len(), "All submissions terminal");
                        return Ok(results);
                    }
                    debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        pending,
                        "Submissions still queued or processing"
                    );
                    last_error = None;
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Poll attempt failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        match last_error {
            Some(JudgeError::Unavailable(reason)) => Err(JudgeError::Unavailable(format!(
                "{} (after {} poll attempts)",
                reason, self.max_attempts
            ))),
            Some(other) => Err(other),
            None => Err(JudgeError::PollTimeout {
                attempts: self.max_attempts,
                pending,
                total: tokens.len(),
            }),
        }
    }
}

/// One result per token, in token order
fn check_order(tokens: &[Token], results: &[JudgeResult]) -> Result<(), JudgeError> {
    if results.len() != tokens.len() {
        return Err(JudgeError::Protocol(format!(
            "judge returned {} results for {} tokens",
            results.len(),
            tokens.len()
        )));
    }
    for (position, (token, result)) in tokens.iter().zip(results).enumerate() {
        if let Some(returned) = &result.token {
            if returned != token {
                return Err(JudgeError::Protocol(format!(
                    "result at position {} belongs to token {}, expected {}",
                    position, returned, token
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge0::SubmissionRequest;
    use async_trait::async_trait;
    use gavel_common::JudgeStatus;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Replays one scripted response per fetch
    struct ScriptedPolls {
        responses: Mutex<VecDeque<Result<Vec<JudgeStatus>, JudgeError>>>,
        fetches: Mutex<u32>,
    }

    impl ScriptedPolls {
        fn new(responses: Vec<Result<Vec<JudgeStatus>, JudgeError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                fetches: Mutex::new(0),
            })
        }

        fn fetches(&self) -> u32 {
            *self.fetches.lock().unwrap()
        }
    }

    #[async_trait]
    impl JudgeApi for ScriptedPolls {
        async fn submit_wait(&self, _: &SubmissionRequest) -> Result<JudgeResult, JudgeError> {
            unreachable!()
        }

        async fn submit_batch(&self, _: &[SubmissionRequest]) -> Result<Vec<Token>, JudgeError> {
            unreachable!()
        }

        async fn fetch_batch(&self, tokens: &[Token]) -> Result<Vec<JudgeResult>, JudgeError> {
            *self.fetches.lock().unwrap() += 1;
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("poller fetched more often than scripted");
            next.map(|statuses| {
                statuses
                    .into_iter()
                    .zip(tokens)
                    .map(|(status, token)| JudgeResult {
                        token: Some(token.clone()),
                        ..JudgeResult::with_status(status)
                    })
                    .collect()
            })
        }
    }

    fn tokens(n: usize) -> Vec<Token> {
        (0..n).map(|i| Token::new(format!("token-{}", i))).collect()
    }

    fn poller(api: Arc<ScriptedPolls>, interval: Duration, attempts: u32) -> Poller {
        let config = JudgeConfig {
            poll_interval: interval,
            max_poll_attempts: attempts,
            ..JudgeConfig::default()
        };
        Poller::new(api, &config)
    }

    #[tokio::test]
    async fn test_all_accepted_returns_without_sleeping() {
        let api = ScriptedPolls::new(vec![Ok(vec![JudgeStatus::Accepted; 3])]);
        let poller = poller(api.clone(), Duration::from_secs(60), 30);

        let started = Instant::now();
        let results = poller.poll(&tokens(3)).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(results.len(), 3);
        assert_eq!(api.fetches(), 1);
    }

    #[tokio::test]
    async fn test_waits_for_slowest_token() {
        let api = ScriptedPolls::new(vec![
            Ok(vec![JudgeStatus::InQueue, JudgeStatus::InQueue]),
            Ok(vec![JudgeStatus::Accepted, JudgeStatus::Processing]),
            Ok(vec![JudgeStatus::Accepted, JudgeStatus::WrongAnswer]),
        ]);
        let poller = poller(api.clone(), Duration::from_millis(1), 30);

        let results = poller.poll(&tokens(2)).await.unwrap();

        assert_eq!(api.fetches(), 3);
        assert!(results.iter().all(|r| r.status.is_terminal()));
        assert_eq!(results[1].status, JudgeStatus::WrongAnswer);
    }

    #[tokio::test]
    async fn test_timeout_when_budget_exhausted() {
        let api = ScriptedPolls::new(vec![
            Ok(vec![JudgeStatus::Accepted, JudgeStatus::Processing]),
            Ok(vec![JudgeStatus::Accepted, JudgeStatus::Processing]),
            Ok(vec![JudgeStatus::Accepted, JudgeStatus::Processing]),
        ]);
        let poller = poller(api.clone(), Duration::from_millis(1), 3);

        let err = poller.poll(&tokens(2)).await.unwrap_err();

        assert!(matches!(
            err,
            JudgeError::PollTimeout {
                attempts: 3,
                pending: 1,
                total: 2
            }
        ));
        assert_eq!(api.fetches(), 3);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let api = ScriptedPolls::new(vec![
            Err(JudgeError::Unavailable("reset".into())),
            Err(JudgeError::Unavailable("reset".into())),
            Ok(vec![JudgeStatus::Accepted]),
        ]);
        let poller = poller(api.clone(), Duration::from_millis(1), 5);

        let results = poller.poll(&tokens(1)).await.unwrap();

        assert_eq!(results[0].status, JudgeStatus::Accepted);
        assert_eq!(api.fetches(), 3);
    }

    #[tokio::test]
    async fn test_unavailable_when_last_attempt_errors() {
        let api = ScriptedPolls::new(vec![
            Ok(vec![JudgeStatus::Processing]),
            Err(JudgeError::Unavailable("refused".into())),
        ]);
        let poller = poller(api, Duration::from_millis(1), 2);

        let err = poller.poll(&tokens(1)).await.unwrap_err();

        assert!(matches!(err, JudgeError::Unavailable(ref msg) if msg.contains("2 poll attempts")));
    }

    #[tokio::test]
    async fn test_protocol_error_is_not_retried() {
        let api = ScriptedPolls::new(vec![Err(JudgeError::Protocol("garbage".into()))]);
        let poller = poller(api.clone(), Duration::from_millis(1), 5);

        let err = poller.poll(&tokens(1)).await.unwrap_err();

        assert!(matches!(err, JudgeError::Protocol(_)));
        assert_eq!(api.fetches(), 1);
    }

    #[tokio::test]
    async fn test_short_result_list_is_protocol_error() {
        let api = ScriptedPolls::new(vec![Ok(vec![JudgeStatus::Accepted])]);
        let poller = poller(api, Duration::from_millis(1), 5);

        let err = poller.poll(&tokens(2)).await.unwrap_err();

        assert!(matches!(err, JudgeError::Protocol(_)));
    }

    #[test]
    fn test_out_of_order_token_is_rejected() {
        let tokens = tokens(2);
        let results = vec![
            JudgeResult {
                token: Some(tokens[1].clone()),
                ..JudgeResult::with_status(JudgeStatus::Accepted)
            },
            JudgeResult::with_status(JudgeStatus::Accepted),
        ];
        assert!(check_order(&tokens, &results).is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let api = ScriptedPolls::new(vec![]);
        let poller = poller(api.clone(), Duration::from_millis(1), 5);

        assert!(poller.poll(&[]).await.unwrap().is_empty());
        assert_eq!(api.fetches(), 0);
    }
}
