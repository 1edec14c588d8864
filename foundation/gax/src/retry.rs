use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Exponential backoff with jitter.
///
/// Every yielded delay is at least as long as the previous one, even when the
/// jitter draws a smaller factor or the cap is reached.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    multiplier: f64,
    jitter: f64,
    max_delay: Option<Duration>,
    last: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, multiplier: f64) -> ExponentialBackoff {
        ExponentialBackoff {
            current: initial,
            multiplier: multiplier.max(1.0),
            jitter: 0.0,
            max_delay: None,
            last: Duration::ZERO,
        }
    }

    pub fn from_millis(base: u64) -> ExponentialBackoff {
        Self::new(Duration::from_millis(base), 2.0)
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let mut duration = if self.jitter > 0.0 {
            let factor = 1.0 + rand::thread_rng().gen_range(0.0..=self.jitter);
            scale(self.current, factor)
        } else {
            self.current
        };

        // check if we reached max delay
        if let Some(max_delay) = self.max_delay {
            duration = duration.min(max_delay);
        }
        duration = duration.max(self.last);
        self.last = duration;

        self.current = scale(self.current, self.multiplier);
        if let Some(max_delay) = self.max_delay {
            self.current = self.current.min(max_delay);
        }

        Some(duration)
    }
}

fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Labels a failure as worth another attempt or not.
pub trait Predicate<E> {
    fn should_retry(&mut self, error: &E) -> bool;
}

impl<E, F> Predicate<E> for F
where
    F: FnMut(&E) -> bool,
{
    fn should_retry(&mut self, error: &E) -> bool {
        self(error)
    }
}

/// Treats every failure as terminal once the deadline has passed.
///
/// This is the way to bound a call in wall-clock time: the engine has no
/// cancellation signal of its own.
pub struct Deadline<P> {
    inner: P,
    deadline: Instant,
}

impl<P> Deadline<P> {
    pub fn new(inner: P, deadline: Instant) -> Self {
        Self { inner, deadline }
    }

    pub fn after(inner: P, timeout: Duration) -> Self {
        Self::new(inner, Instant::now() + timeout)
    }
}

impl<E, P: Predicate<E>> Predicate<E> for Deadline<P> {
    fn should_retry(&mut self, error: &E) -> bool {
        Instant::now() < self.deadline && self.inner.should_retry(error)
    }
}

#[derive(Clone, Debug)]
pub struct RetrySetting {
    pub initial_delay: Duration,
    pub max_delay: Option<Duration>,
    pub multiplier: f64,
    /// Upper bound of the random extra fraction added to every delay.
    pub jitter: f64,
    /// Total number of attempts, the first one included.
    pub max_attempts: usize,
    /// No new attempt starts after this much time has passed since the first.
    pub max_elapsed: Option<Duration>,
}

impl RetrySetting {
    pub fn strategy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.initial_delay, self.multiplier)
            .with_jitter(self.jitter)
            .with_max_delay(self.max_delay)
    }

    /// A setting that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

impl Default for RetrySetting {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Some(Duration::from_secs(32)),
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: 6,
            max_elapsed: Some(Duration::from_secs(50)),
        }
    }
}

/// The failure of a retried call.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The predicate refused to retry this error.
    Terminal(E),
    /// The setting's ceiling was reached; `last` is the final error observed.
    Exhausted { attempts: usize, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Terminal(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Terminal(e) => e.fmt(f),
            RetryError::Exhausted { attempts, last } => {
                write!(f, "retry exhausted after {attempts} attempts: {last}")
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Terminal(e) => e.source(),
            RetryError::Exhausted { last, .. } => Some(last),
        }
    }
}

struct Attempts<'a> {
    setting: &'a RetrySetting,
    strategy: ExponentialBackoff,
    started: Instant,
    count: usize,
}

impl<'a> Attempts<'a> {
    fn new(setting: &'a RetrySetting) -> Self {
        Self {
            setting,
            strategy: setting.strategy(),
            started: Instant::now(),
            count: 0,
        }
    }

    /// Returns the delay before the next attempt, or `None` when the ceiling is reached.
    fn next_delay(&mut self) -> Option<Duration> {
        if self.count >= self.setting.max_attempts {
            return None;
        }
        let delay = self.strategy.next()?;
        if let Some(max_elapsed) = self.setting.max_elapsed {
            if self.started.elapsed() + delay > max_elapsed {
                return None;
            }
        }
        Some(delay)
    }

    async fn on_error<E: Debug>(&mut self, error: E, retryable: bool) -> Result<E, RetryError<E>> {
        if !retryable {
            return Err(RetryError::Terminal(error));
        }
        match self.next_delay() {
            Some(duration) => {
                tracing::debug!(attempt = self.count, delay_ms = duration.as_millis() as u64, error = ?error, "retrying");
                tokio::time::sleep(duration).await;
                Ok(error)
            }
            None => {
                tracing::info!("the end of retry {:?}", error);
                Err(RetryError::Exhausted {
                    attempts: self.count,
                    last: error,
                })
            }
        }
    }
}

/// Repeats the call while the predicate accepts the error and the setting allows another attempt.
pub async fn invoke<T, E, Fut, P>(
    mut f: impl FnMut() -> Fut,
    setting: &RetrySetting,
    predicate: &mut P,
) -> Result<T, RetryError<E>>
where
    E: Debug,
    Fut: Future<Output = Result<T, E>>,
    P: Predicate<E>,
{
    let mut attempts = Attempts::new(setting);
    loop {
        attempts.count += 1;
        let err = match f().await {
            Ok(s) => return Ok(s),
            Err(e) => e,
        };
        let retryable = predicate.should_retry(&err);
        attempts.on_error(err, retryable).await?;
    }
}

/// Repeats retries when the specified error is detected.
/// The argument specified by 'v' can be reused for each retry.
pub async fn invoke_reuse<T, E, V, Fut, P>(
    mut f: impl FnMut(V) -> Fut,
    mut v: V,
    setting: &RetrySetting,
    predicate: &mut P,
) -> Result<T, RetryError<E>>
where
    E: Debug,
    Fut: Future<Output = Result<T, (E, V)>>,
    P: Predicate<E>,
{
    let mut attempts = Attempts::new(setting);
    loop {
        attempts.count += 1;
        let err = match f(v).await {
            Ok(s) => return Ok(s),
            Err((e, reused)) => {
                v = reused;
                e
            }
        };
        let retryable = predicate.should_retry(&err);
        attempts.on_error(err, retryable).await?;
    }
}
