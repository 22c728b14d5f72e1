use std::io;

use thiserror::Error;

use crate::harness::LifecycleState;

/// Result alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur while configuring or driving the engine.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("missing or invalid setting: {0}")]
    Configuration(String),
    #[error("engine rejected settings: {0}")]
    EngineInit(String),
    #[error("engine unavailable: {0}")]
    Resource(String),
    #[error("step computation failed at t={time}: {message}")]
    StepComputation { time: f64, message: String },
    #[error("engine has no wave field constructed yet")]
    HandleUnavailable,
    #[error("wave field handle mismatch: {0}")]
    HandleMismatch(String),
    #[error("operation `{operation}` invalid in lifecycle state {state:?}")]
    LifecycleViolation {
        operation: &'static str,
        state: LifecycleState,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl HarnessError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        HarnessError::Configuration(message.into())
    }

    pub(crate) fn engine_init(message: impl Into<String>) -> Self {
        HarnessError::EngineInit(message.into())
    }

    pub(crate) fn resource(message: impl Into<String>) -> Self {
        HarnessError::Resource(message.into())
    }

    pub(crate) fn handle_mismatch(message: impl Into<String>) -> Self {
        HarnessError::HandleMismatch(message.into())
    }

    pub(crate) fn step(time: f64, message: impl Into<String>) -> Self {
        HarnessError::StepComputation {
            time,
            message: message.into(),
        }
    }

    pub(crate) fn lifecycle(operation: &'static str, state: LifecycleState) -> Self {
        HarnessError::LifecycleViolation { operation, state }
    }
}
