//! serving-keda - KEDA-backed autoscaling for Knative Serving
//!
//! Reconciles Knative `PodAutoscaler` resources of the KEDA class into KEDA
//! `ScaledObject`s, and reports the replica counts of the HPA KEDA manages
//! back onto the PodAutoscaler.
//!
//! # Modules
//!
//! - [`crd`] - PodAutoscaler, ScaledObject and ServerlessService types
//! - [`resources`] - Pure builders for the desired dependent resources
//! - [`controller`] - Reconciliation logic and its collaborator traits
//! - [`config`] - Autoscaler configuration and its hot-reloading store
//! - [`kube_utils`] - Typed API wrapper and ownership checks
//! - [`error`] - Error types for the controller

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod resources;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
