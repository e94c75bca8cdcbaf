//! Integration tests for the serving-keda controller
//!
//! These tests run against a kind cluster and tell the story of how the
//! controller treats PodAutoscalers in a real API server.
//!
//! # Test Organization
//!
//! - `crd_operations`: Stories about the CRD types surviving a round trip
//!   through the API server (schemas, status subresource)
//!
//! - `pod_autoscaler_lifecycle`: Stories about reconciling a PodAutoscaler
//!   into a ScaledObject and ServerlessService and reporting back
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored --test-threads=1
//! ```

mod crd_operations;
mod helpers;
mod pod_autoscaler_lifecycle;
