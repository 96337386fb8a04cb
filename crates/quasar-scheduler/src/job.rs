//! Job identity and the universal job wrapper.
//!
//! Grounded on `datahub/core.py`'s `safe_job` decorator: any exception thrown inside a
//! scheduled job is caught, logged with context, and discarded — it must never
//! propagate into the reconciliation loop or abort a worker task.

use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// `"{provider}|{interval}|{cron}"`, the scheduler's primary identity for a
/// subscription job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey(String);

impl JobKey {
    pub fn new(provider: &str, interval: &str, cron: &str) -> Self {
        Self(format!("{provider}|{interval}|{cron}"))
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runs `fut`, catching and logging both a returned `Err` and a panic unwinding out of
/// `fut`, so neither ever stalls or kills the task this job loop runs in. A panic is
/// just as fatal to the enclosing `tokio::spawn` as in the untranslated Python original
/// an uncaught exception was to its job thread, so both must be caught here.
pub async fn run_guarded<F, T, E>(job_name: &str, fut: F)
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            tracing::error!(job = job_name, error = %e, "job failed with error");
        }
        Err(panic) => {
            tracing::error!(job = job_name, panic = %panic_message(&panic), "job panicked");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_key_format() {
        assert_eq!(
            JobKey::new("EODHD", "1d", "0 0 * * *").to_string(),
            "EODHD|1d|0 0 * * *"
        );
    }

    #[tokio::test]
    async fn run_guarded_swallows_errors() {
        run_guarded::<_, (), &str>("test", async { Err("boom") }).await;
        // No panic means success: the error never propagated.
    }

    #[tokio::test]
    async fn run_guarded_swallows_panics() {
        run_guarded::<_, (), &str>("test", async { panic!("boom") }).await;
        // Reaching this line means the panic was caught, not unwound past run_guarded.
    }
}
