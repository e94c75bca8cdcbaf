//! Desired-state builders for the resources a PodAutoscaler owns
//!
//! Everything here is pure: no API calls, no clocks.

mod quantity;
mod scaled_object;
mod sks;

pub use quantity::{binary_si, decimal_si};
pub use scaled_object::{make_scaled_object, DEPLOYMENT_SUFFIX};
pub use sks::{make_sks, LAST_APPLIED_ANNOTATION};
