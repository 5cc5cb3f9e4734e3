//! Bounded retry with an explicit retryable-error predicate.

use tracing::debug;

/// Number of attempts used by both initialization retry sites.
pub const INIT_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The predicate rejected the error; it was not retried.
    Fatal(E),
    /// Every attempt failed with a retryable error; `last` is the final one.
    Exhausted { attempts: u32, last: E },
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub const fn new(attempts: u32) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `op` until it succeeds, fails with an error `retryable` rejects,
    /// or the attempt budget runs out.
    pub fn run<T, E, F, P>(&self, mut op: F, retryable: P) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if !retryable(&e) => return Err(RetryError::Fatal(e)),
                Err(e) if attempt >= self.attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: self.attempts,
                        last: e,
                    });
                }
                Err(e) => {
                    debug!(attempt, attempts = self.attempts, error = %e, "Retryable failure");
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(INIT_ATTEMPTS)
    }
}
