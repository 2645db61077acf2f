//! Short-lived runtimes for one-off calls from the sync API

use std::future::Future;

use tokio::runtime::{Builder, Handle};
use tracing::Dispatch;

use crate::error::ActionError;

/// Runs one future to completion on a runtime built for that call alone.
///
/// The runtime is torn down when the call returns and is never shared with
/// the listener worker. When the caller is already inside a tokio runtime the
/// call moves to a scoped helper thread, since a runtime can't be started
/// from within another.
#[derive(Clone, Default)]
pub struct TaskRunner {
    log_sink: Option<Dispatch>,
}

impl TaskRunner {
    pub fn new(log_sink: Option<Dispatch>) -> Self {
        Self { log_sink }
    }

    /// Block on `future` and return its output
    pub fn block_on<F>(&self, future: F) -> Result<F::Output, ActionError>
    where
        F: Future + Send,
        F::Output: Send,
    {
        let run = move || self.with_sink(|| run_on_fresh_runtime(future));

        if Handle::try_current().is_err() {
            return run();
        }

        std::thread::scope(|scope| {
            scope
                .spawn(run)
                .join()
                .map_err(|_| ActionError::Runtime("action thread panicked".to_string()))?
        })
    }

    /// Run `f` with this runner's logging sink as the thread default
    pub fn with_sink<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.log_sink {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

fn run_on_fresh_runtime<F: Future>(future: F) -> Result<F::Output, ActionError> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ActionError::Runtime(e.to_string()))?;

    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_outside_runtime() {
        let runner = TaskRunner::default();
        let value = runner.block_on(async { 40 + 2 }).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_block_on_inside_runtime_uses_helper_thread() {
        let runner = TaskRunner::default();
        let caller = std::thread::current().id();

        let worker = runner
            .block_on(async { std::thread::current().id() })
            .unwrap();

        assert_ne!(worker, caller);
    }
}
