//! Error types for the KEDA autoscaler controller

use std::time::Duration;

use thiserror::Error;

/// Main error type for controller operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A read or write of a dependent resource failed
    #[error("error {operation} {kind} {name}: {source}")]
    Resource {
        /// What was being attempted ("getting", "creating", "updating")
        operation: &'static str,
        /// Kind of the dependent resource
        kind: &'static str,
        /// Name of the dependent resource
        name: String,
        /// Underlying failure
        source: Box<Error>,
    },

    /// A dependent resource exists but is controlled by someone else
    #[error("PA: {owner} does not own {kind}: {name}")]
    NotOwned {
        /// Kind of the dependent resource
        kind: &'static str,
        /// Name of the dependent resource
        name: String,
        /// Name of the PA that wanted to own it
        owner: String,
    },

    /// A read-only dependency does not exist (yet)
    #[error("{kind} {name} not found")]
    NotFound {
        /// Kind of the missing resource
        kind: &'static str,
        /// Name of the missing resource
        name: String,
    },

    /// The HPA has not caught up with the ScaledObject's lower bound yet
    #[error("HPA {name} is still initializing: desired replicas {desired} below minimum {min}")]
    ScaleTargetInitializing {
        /// HPA name
        name: String,
        /// Replicas the HPA currently wants
        desired: i32,
        /// Lower bound from the ScaledObject
        min: i32,
    },

    /// Reconcile did not finish within its deadline
    #[error("reconcile timed out after {0:?}")]
    Timeout(Duration),

    /// Autoscaler configuration is invalid
    #[error("config error: {0}")]
    Config(String),

    /// Validation error for resource contents
    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Wrap a failure with the operation and resource it happened on
    pub fn resource(
        operation: &'static str,
        kind: &'static str,
        name: impl Into<String>,
        source: impl Into<Error>,
    ) -> Self {
        Self::Resource {
            operation,
            kind,
            name: name.into(),
            source: Box::new(source.into()),
        }
    }

    /// Create a not-owned error
    pub fn not_owned(kind: &'static str, name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::NotOwned {
            kind,
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a config error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// The innermost error, looking through [`Error::Resource`] wrappers
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Resource { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns true if the error means "wait for the world to catch up"
    /// rather than "something went wrong"
    pub fn is_waiting(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::ScaleTargetInitializing { .. } | Self::NotFound { .. }
        )
    }

    /// Returns true if the error is an ownership conflict
    pub fn is_not_owned(&self) -> bool {
        matches!(self.root_cause(), Self::NotOwned { .. })
    }
}
