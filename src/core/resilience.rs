//! 弹性执行：超时 + 有界重试 + 指数退避
//!
//! 每次外部调用（模型、工具、整回合）都经由 execute：单次尝试与 deadline 竞速，
//! 超时或可重试错误时按 min(min_backoff × factor^k, max_backoff) 等待后重试，
//! 最多重试 max_retries 次。每次尝试都重新调用 operation 工厂，不复用上次的中间状态。

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout};

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 首次尝试之外的最大重试次数
    pub max_retries: u32,
    /// 单次尝试超时
    pub timeout: Duration,
    /// 退避倍数
    pub factor: f64,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// 模型调用：10s / 3 次重试 / ×2 / [1s, 5s]
    pub fn for_model() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(10),
            factor: 2.0,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        }
    }

    /// 整回合：30s / 2 次重试 / ×2 / [1s, 5s]
    pub fn for_turn() -> Self {
        Self {
            max_retries: 2,
            timeout: Duration::from_secs(30),
            ..Self::for_model()
        }
    }

    /// 工具调用：15s / 2 次重试 / ×2 / [1s, 5s]
    pub fn for_tool() -> Self {
        Self {
            max_retries: 2,
            timeout: Duration::from_secs(15),
            ..Self::for_model()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration, factor: f64) -> Self {
        self.min_backoff = min;
        self.max_backoff = max;
        self.factor = factor;
        self
    }

    /// 第 retry 次重试（从 0 开始）前的等待时长
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = if self.factor.is_finite() && self.factor > 0.0 {
            self.factor
        } else {
            1.0
        };
        let secs = self.min_backoff.as_secs_f64() * factor.powi(retry.min(64) as i32);
        let max = self.max_backoff.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// 退避与服务端提示取较大者；提示最多等一个单次超时
    pub fn retry_wait(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let backoff = self.backoff(retry);
        match hint {
            Some(hint) => backoff.max(hint.min(self.timeout)),
            None => backoff,
        }
    }

    /// 失败 n 次（且都被重试）累计的等待时长
    pub fn total_backoff(&self, failures: u32) -> Duration {
        (0..failures).map(|k| self.backoff(k)).sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_model()
    }
}

/// 可判定是否值得重试的错误
pub trait RetryableError: std::fmt::Display {
    fn is_retryable(&self) -> bool {
        true
    }

    /// 服务端要求的最短等待（如 429 的 Retry-After）
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryableError for String {}

/// 弹性执行失败
#[derive(Error, Debug)]
pub enum ResilienceError<E> {
    /// 最后一次失败为超时
    #[error("Timed out after {attempts} attempt(s) ({timeout:?} each)")]
    TimedOut { attempts: u32, timeout: Duration },

    /// 重试耗尽，最后一次失败为底层错误
    #[error("Failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// 不可重试错误，立即返回
    #[error("Non-retryable error after {attempts} attempt(s): {error}")]
    Rejected { attempts: u32, error: E },
}

impl<E> ResilienceError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            ResilienceError::TimedOut { attempts, .. }
            | ResilienceError::Exhausted { attempts, .. }
            | ResilienceError::Rejected { attempts, .. } => *attempts,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::TimedOut { .. })
    }

    /// 底层错误（超时无底层错误）
    pub fn into_inner(self) -> Option<E> {
        match self {
            ResilienceError::TimedOut { .. } => None,
            ResilienceError::Exhausted { last_error, .. } => Some(last_error),
            ResilienceError::Rejected { error, .. } => Some(error),
        }
    }
}

/// 按策略执行 operation；context 仅用于日志
pub async fn execute<F, Fut, T, E>(
    policy: &RetryPolicy,
    context: &str,
    mut operation: F,
) -> Result<T, ResilienceError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let failure = match timeout(policy.timeout, operation()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    tracing::info!(context = %context, attempt, "succeeded after retries");
                }
                return Ok(value);
            }
            Ok(Err(e)) if !e.is_retryable() => {
                tracing::warn!(context = %context, attempt, error = %e, "non-retryable failure");
                return Err(ResilienceError::Rejected { attempts: attempt, error: e });
            }
            Ok(Err(e)) => Failure::Error(e),
            Err(_) => Failure::Timeout,
        };

        let retry = attempt - 1;
        if retry >= policy.max_retries {
            tracing::warn!(context = %context, attempts = attempt, "retries exhausted");
            return Err(match failure {
                Failure::Timeout => ResilienceError::TimedOut {
                    attempts: attempt,
                    timeout: policy.timeout,
                },
                Failure::Error(e) => ResilienceError::Exhausted {
                    attempts: attempt,
                    last_error: e,
                },
            });
        }

        let wait = match &failure {
            Failure::Error(e) => policy.retry_wait(retry, e.retry_after()),
            Failure::Timeout => policy.backoff(retry),
        };
        match &failure {
            Failure::Timeout => tracing::warn!(
                context = %context,
                attempt,
                max_retries = policy.max_retries,
                wait_ms = wait.as_millis() as u64,
                "attempt timed out, retrying"
            ),
            Failure::Error(e) => tracing::warn!(
                context = %context,
                attempt,
                max_retries = policy.max_retries,
                wait_ms = wait.as_millis() as u64,
                error = %e,
                "attempt failed, retrying"
            ),
        }
        sleep(wait).await;
    }
}

enum Failure<E> {
    Timeout,
    Error(E),
}
