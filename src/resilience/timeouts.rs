//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap dependency calls with a deadline
//! - Cancel operations cleanly on timeout (the inner future is dropped)
//! - Keep timeout errors distinct from the call's own errors

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Failure of a deadline-bounded call.
#[derive(Debug)]
pub enum DeadlineError<E> {
    /// The deadline elapsed before the call completed.
    Elapsed(Duration),
    /// The call completed with its own error.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for DeadlineError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadlineError::Elapsed(d) => write!(f, "timed out after {}ms", d.as_millis()),
            DeadlineError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for DeadlineError<E> {}

/// Run `fut` with a deadline.
pub async fn with_deadline<T, E, F>(deadline: Duration, fut: F) -> Result<T, DeadlineError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DeadlineError::Inner(e)),
        Err(_) => Err(DeadlineError::Elapsed(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_elapsed_is_distinct() {
        let result: Result<(), DeadlineError<String>> = with_deadline(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        assert!(matches!(result, Err(DeadlineError::Elapsed(_))));

        let result: Result<(), DeadlineError<String>> =
            with_deadline(Duration::from_secs(1), async { Err("boom".to_string()) }).await;
        assert_eq!(result.unwrap_err().to_string(), "boom");
    }
}
