//! One-shot completion primitive.
//!
//! A [`Promise`] is the write side, owned by whatever drives the asynchronous
//! operation. A [`Future`] is the read side; it can be cloned and handed to any
//! number of observers. Both share one internally synchronized cell.
//!
//! Continuations run in the thread that completes the promise, or immediately
//! in the registering thread when the outcome is already known. No executor is
//! involved.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

type Continuation<T> = Box<dyn FnOnce(&Result<T>) + Send>;

struct State<T> {
    outcome: Option<Arc<Result<T>>>,
    continuations: Vec<Continuation<T>>,
}

type Shared<T> = Arc<Mutex<State<T>>>;

fn lock<T>(shared: &Shared<T>) -> MutexGuard<'_, State<T>> {
    // A panicking continuation never runs under the lock, so the state is intact.
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Producer side: completes the operation exactly once.
pub struct Promise<T> {
    shared: Shared<T>,
}

/// Consumer side: observes the outcome and registers continuations.
pub struct Future<T> {
    shared: Shared<T>,
}

impl<T> Promise<T> {
    pub fn pending() -> Self {
        Self {
            shared: Arc::new(Mutex::new(State {
                outcome: None,
                continuations: Vec::new(),
            })),
        }
    }

    fn completed(outcome: Result<T>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(State {
                outcome: Some(Arc::new(outcome)),
                continuations: Vec::new(),
            })),
        }
    }

    pub fn succeeded(value: T) -> Self {
        Self::completed(Ok(value))
    }

    pub fn failed(cause: Error) -> Self {
        Self::completed(Err(cause))
    }

    pub fn failed_message(message: impl Into<String>) -> Self {
        Self::failed(Error::Failed(message.into()))
    }

    pub fn future(&self) -> Future<T> {
        Future {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_completed(&self) -> bool {
        lock(&self.shared).outcome.is_some()
    }

    /// Store the outcome and run the continuations registered so far.
    ///
    /// Hands the outcome back when the promise was already completed.
    fn transition(&self, outcome: Result<T>) -> std::result::Result<(), Result<T>> {
        let (outcome, continuations) = {
            let mut state = lock(&self.shared);
            if state.outcome.is_some() {
                return Err(outcome);
            }
            let outcome = Arc::new(outcome);
            state.outcome = Some(Arc::clone(&outcome));
            (outcome, std::mem::take(&mut state.continuations))
        };
        for continuation in continuations {
            continuation(&outcome);
        }
        Ok(())
    }

    /// Complete with `value`, or fail with `AlreadyCompleted`.
    pub fn complete(&self, value: T) -> Result<()> {
        self.transition(Ok(value)).map_err(|_| Error::AlreadyCompleted)
    }

    /// Fail with `cause`, or fail with `AlreadyCompleted`.
    pub fn fail(&self, cause: Error) -> Result<()> {
        self.transition(Err(cause)).map_err(|_| Error::AlreadyCompleted)
    }

    pub fn fail_message(&self, message: impl Into<String>) -> Result<()> {
        self.fail(Error::Failed(message.into()))
    }

    /// Returns false if the promise was already completed.
    pub fn try_complete(&self, value: T) -> bool {
        self.transition(Ok(value)).is_ok()
    }

    /// Returns false if the promise was already completed.
    pub fn try_fail(&self, cause: Error) -> bool {
        self.transition(Err(cause)).is_ok()
    }

    pub fn try_fail_message(&self, message: impl Into<String>) -> bool {
        self.try_fail(Error::Failed(message.into()))
    }
}

impl Promise<()> {
    pub fn succeeded_unit() -> Self {
        Self::succeeded(())
    }

    pub fn complete_unit(&self) -> Result<()> {
        self.complete(())
    }

    pub fn try_complete_unit(&self) -> bool {
        self.try_complete(())
    }
}

impl<T> Future<T> {
    pub fn is_completed(&self) -> bool {
        lock(&self.shared).outcome.is_some()
    }

    pub fn is_success(&self) -> bool {
        matches!(lock(&self.shared).outcome.as_deref(), Some(Ok(_)))
    }

    pub fn is_failure(&self) -> bool {
        matches!(lock(&self.shared).outcome.as_deref(), Some(Err(_)))
    }

    /// The outcome, if the promise has been completed.
    pub fn outcome(&self) -> Option<Arc<Result<T>>> {
        lock(&self.shared).outcome.clone()
    }

    /// Inspect the outcome without cloning it.
    pub fn peek<R>(&self, f: impl FnOnce(&Result<T>) -> R) -> Option<R> {
        self.outcome().map(|outcome| f(&outcome))
    }

    /// Run `continuation` exactly once with the outcome.
    ///
    /// Runs before returning if the outcome is already known, otherwise when
    /// the promise is completed.
    pub fn on_complete(&self, continuation: impl FnOnce(&Result<T>) + Send + 'static) {
        let mut state = lock(&self.shared);
        let Some(outcome) = state.outcome.clone() else {
            state.continuations.push(Box::new(continuation));
            return;
        };
        drop(state);
        continuation(&outcome);
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("completed", &self.is_completed())
            .finish()
    }
}
