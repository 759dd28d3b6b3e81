//! Dry-run gateway for mutating backend operations.
//!
//! Stages call [`Gateway::mutate`] with a closure that performs the backend
//! call given a `dry_run` flag. In simulate mode the backend is asked to
//! validate only, and a "would have succeeded" answer comes back as
//! [`Mutation::Simulated`] carrying a [`Sentinel`] instead of an error.
//! Read-only calls never go through here.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::core::state::DRY_RUN_KEY;
use crate::error::{BackendError, RelayError};

/// Whether mutating operations take effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Apply,
    Simulate,
}

impl ExecutionMode {
    pub fn is_simulate(self) -> bool {
        self == ExecutionMode::Simulate
    }
}

/// Stand-in result for an operation that was validated but not performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinel {
    /// Stage that requested the operation.
    pub caller: String,
    pub operation: String,
}

impl Sentinel {
    /// `{"dry_run": {"caller": ..., "operation": ...}}`, the form written into state.
    pub fn to_value(&self) -> Value {
        json!({ DRY_RUN_KEY: { "caller": self.caller, "operation": self.operation } })
    }
}

/// Outcome of a gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation<T> {
    Applied(T),
    Simulated(Sentinel),
}

impl<T> Mutation<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Mutation::Applied(value) => Some(value),
            Mutation::Simulated(_) => None,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Mutation::Simulated(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Mutation<U> {
        match self {
            Mutation::Applied(value) => Mutation::Applied(f(value)),
            Mutation::Simulated(sentinel) => Mutation::Simulated(sentinel),
        }
    }
}

impl<T: Into<Value>> Mutation<T> {
    /// Value to record in pipeline state: the real result, or the sentinel.
    pub fn into_value(self) -> Value {
        match self {
            Mutation::Applied(value) => value.into(),
            Mutation::Simulated(sentinel) => sentinel.to_value(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Gateway {
    mode: ExecutionMode,
}

impl Gateway {
    pub fn new(mode: ExecutionMode) -> Self {
        Self { mode }
    }

    /// Run a mutating backend call under the current execution mode.
    ///
    /// `call` receives the dry-run flag to forward to the backend. A
    /// `DryRunSucceeded` answer is only accepted in simulate mode; in apply
    /// mode it is a backend error like any other.
    #[instrument(skip(self, call), fields(mode = ?self.mode))]
    pub fn mutate<T, F>(
        &self,
        caller: &str,
        operation: &str,
        call: F,
    ) -> Result<Mutation<T>, RelayError>
    where
        F: FnOnce(bool) -> Result<T, BackendError>,
    {
        let dry_run = self.mode.is_simulate();
        debug!(dry_run, "invoking mutating operation");
        match call(dry_run) {
            Ok(value) => Ok(Mutation::Applied(value)),
            Err(BackendError::DryRunSucceeded { message, .. }) if dry_run => {
                info!(%message, "dry run: operation validated, not performed");
                Ok(Mutation::Simulated(Sentinel {
                    caller: caller.to_string(),
                    operation: operation.to_string(),
                }))
            }
            Err(err) => Err(RelayError::Backend(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::is_sentinel;
    use std::cell::RefCell;

    /// Minimal backend: a list of launched ids that only grows on real calls.
    #[derive(Default)]
    struct Launcher {
        launched: RefCell<Vec<String>>,
    }

    impl Launcher {
        fn launch(&self, dry_run: bool) -> Result<String, BackendError> {
            if dry_run {
                return Err(BackendError::dry_run("run-instances", "would have succeeded"));
            }
            let id = format!("i-{}", self.launched.borrow().len() + 1);
            self.launched.borrow_mut().push(id.clone());
            Ok(id)
        }
    }

    #[test]
    fn simulate_returns_sentinel_without_mutation() {
        let backend = Launcher::default();
        let gateway = Gateway::new(ExecutionMode::Simulate);

        let outcome = gateway
            .mutate("instantiate", "run-instances", |dry_run| backend.launch(dry_run))
            .expect("mutate");

        assert_eq!(
            outcome,
            Mutation::Simulated(Sentinel {
                caller: "instantiate".to_string(),
                operation: "run-instances".to_string(),
            })
        );
        assert!(backend.launched.borrow().is_empty());
    }

    #[test]
    fn apply_returns_real_result() {
        let backend = Launcher::default();
        let gateway = Gateway::new(ExecutionMode::Apply);

        let outcome = gateway
            .mutate("instantiate", "run-instances", |dry_run| backend.launch(dry_run))
            .expect("mutate");

        assert_eq!(outcome, Mutation::Applied("i-1".to_string()));
        assert_eq!(*backend.launched.borrow(), vec!["i-1".to_string()]);
    }

    #[test]
    fn other_errors_propagate_in_simulate_mode() {
        let gateway = Gateway::new(ExecutionMode::Simulate);
        let err = gateway
            .mutate::<(), _>("terminate", "terminate-instances", |_| {
                Err(BackendError::failed("terminate-instances", "UnauthorizedOperation"))
            })
            .expect_err("should fail");
        assert!(matches!(err, RelayError::Backend(BackendError::Failed { .. })));
    }

    #[test]
    fn dry_run_answer_in_apply_mode_is_an_error() {
        let gateway = Gateway::new(ExecutionMode::Apply);
        let err = gateway
            .mutate::<(), _>("stub", "create-tags", |_| {
                Err(BackendError::dry_run("create-tags", "unexpected"))
            })
            .expect_err("should fail");
        assert!(matches!(
            err,
            RelayError::Backend(BackendError::DryRunSucceeded { .. })
        ));
    }

    #[test]
    fn sentinel_value_is_recognisable_in_state() {
        let value = Mutation::<String>::Simulated(Sentinel {
            caller: "instantiate".to_string(),
            operation: "run-instances".to_string(),
        })
        .into_value();
        assert!(is_sentinel(&value));
        assert_eq!(value["dry_run"]["caller"], "instantiate");
    }
}
