//! Spike probability density, used as surrogate derivative of the threshold step.
//!
//! The hard threshold comparison has no usable derivative: it is undefined at the crossing
//! point and zero everywhere else. During backpropagation its local derivative is replaced
//! by a Gaussian density of the distance between the membrane potential and the threshold,
//! so that potentials close to firing receive large gradients and potentials far from the
//! threshold receive vanishing ones.

use std::f64::consts::PI;

use ndarray::Array5;

use super::error::SnnError;
use super::params::NetworkParams;

/// Calculate the spike probability density of a membrane potential trace.
///
/// The density is maximal where the potential equals the firing threshold and decays
/// monotonically with the distance to it; `sigma` is the per-layer width from the
/// activation function parameters.
pub fn calculate_pdf(
    potentials: &Array5<f64>,
    params: &NetworkParams,
    sigma: f64,
) -> Result<Array5<f64>, SnnError> {
    if !(sigma > 0.0) {
        return Err(SnnError::InvalidParameter(format!(
            "sigma must be positive, got {}",
            sigma
        )));
    }

    let theta = params.af_params().theta();
    let norm = 1.0 / (sigma * (2.0 * PI).sqrt());

    Ok(potentials.mapv(|u| {
        let distance = (u - theta) / sigma;
        norm * (-0.5 * distance * distance).exp()
    }))
}
