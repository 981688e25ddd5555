//! Diurnal load shaping
//!
//! This module provides the pure models that pace synthetic traffic:
//! - A two-peak diurnal request-rate curve with per-call jitter and noise
//! - A user-count curve for compressed runs
//! - Weighted selection of the next synthetic operation
//!
//! All randomness is injected through `rand::Rng`, so a seeded generator
//! reproduces a run exactly.

mod rate;
mod selector;
mod users;

#[cfg(test)]
mod tests;

pub use rate::{compute_rate, RateShaper, ShapeConfig, MINUTES_PER_DAY, SECONDS_PER_DAY};
pub use selector::{EndpointSelector, EndpointWeightTable, Operation};
pub use users::{UserShape, UserTick};

use rand::Rng;
use thiserror::Error;

/// Errors raised while building shaping configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("endpoint weight table is empty")]
    EmptyWeightTable,

    #[error("operation `{0}` has a zero weight")]
    ZeroWeight(Operation),

    #[error("operation `{0}` appears more than once in the weight table")]
    DuplicateOperation(Operation),

    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    #[error("invalid weight entry `{0}`, expected name=weight")]
    MalformedWeight(String),

    #[error("invalid shape parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Gaussian bump with unit height
pub(crate) fn gaussian(x: f64, center: f64, width: f64) -> f64 {
    (-(x - center).powi(2) / (2.0 * width.powi(2))).exp()
}

/// Uniform draw in `[-half_width, half_width]`; a zero range draws nothing
pub(crate) fn symmetric_uniform<R: Rng + ?Sized>(rng: &mut R, half_width: f64) -> f64 {
    if half_width > 0.0 {
        rng.gen_range(-half_width..=half_width)
    } else {
        0.0
    }
}
