//! Membrane potential simulation with refractory self-feedback.
//!
//! Each (batch, channel, height, width) unit integrates its weighted synaptic current
//! independently along the time axis. Whenever the potential reaches the firing threshold
//! the unit emits a spike and the refractory kernel is added into all later potentials of
//! that unit, so a spike can never influence an earlier time step. The threshold comparison
//! itself is a hard step; its gradient is handled by [`calculate_current_gradient`] with the
//! surrogate density in place of the step derivative.

use ndarray::{s, Array2, Array3, Array5, ArrayView1, ArrayViewMut1, Axis, Zip};
use rayon::prelude::*;

use super::error::SnnError;
use super::kernel::RefKernel;
use super::params::NetworkParams;

/// Flatten the channel and spatial axes of a trace into one unit axis, giving
/// a (batch, units, time) tensor.
pub(crate) fn flatten_units(trace: &Array5<f64>) -> Result<Array3<f64>, SnnError> {
    let (batch, channels, height, width, num_steps) = trace.dim();
    let data: Vec<f64> = trace.iter().copied().collect();
    Array3::from_shape_vec((batch, channels * height * width, num_steps), data)
        .map_err(|e| SnnError::InvalidOperation(e.to_string()))
}

/// Mix all input units into output units with a (outputs, inputs) weight matrix.
///
/// The result has shape (batch, outputs, 1, 1, time). The number of weight columns must
/// equal channels * height * width of the activation trace.
pub fn apply_weights(
    activation: &Array5<f64>,
    weight: &Array2<f64>,
) -> Result<Array5<f64>, SnnError> {
    let (batch, channels, height, width, num_steps) = activation.dim();
    let num_inputs = channels * height * width;
    let num_outputs = weight.nrows();

    if weight.ncols() != num_inputs {
        return Err(SnnError::ShapeMismatch {
            expected: vec![num_outputs, num_inputs],
            actual: weight.shape().to_vec(),
        });
    }

    let flat = flatten_units(activation)?;
    let products: Vec<Array2<f64>> = (0..batch)
        .into_par_iter()
        .map(|b| weight.dot(&flat.index_axis(Axis(0), b)))
        .collect();

    let mut weighted = Array5::zeros((batch, num_outputs, 1, 1, num_steps));
    for (b, product) in products.iter().enumerate() {
        weighted.slice_mut(s![b, .., 0, 0, ..]).assign(product);
    }

    Ok(weighted)
}

/// Simulate the membrane potentials and the emitted spike train for a weighted current.
///
/// Returns the continuous potential trace and the binary spike train, both with the shape
/// of the input. The time length must match the configured number of simulation steps.
pub fn calculate_membrane_potentials(
    weighted_current: &Array5<f64>,
    params: &NetworkParams,
    ref_kernel: &RefKernel,
) -> Result<(Array5<f64>, Array5<f64>), SnnError> {
    let (batch, channels, height, width, num_steps) = weighted_current.dim();
    let expected_steps = params.num_time_steps()?;
    if num_steps != expected_steps {
        return Err(SnnError::ShapeMismatch {
            expected: vec![batch, channels, height, width, expected_steps],
            actual: weighted_current.shape().to_vec(),
        });
    }

    let theta = params.af_params().theta();
    let ref_values = ref_kernel.as_slice();

    let mut potentials = Array5::zeros(weighted_current.dim());
    let mut spikes = Array5::zeros(weighted_current.dim());

    Zip::from(potentials.lanes_mut(Axis(4)))
        .and(spikes.lanes_mut(Axis(4)))
        .and(weighted_current.lanes(Axis(4)))
        .par_for_each(|mut u_lane, mut s_lane, current_lane| {
            integrate_unit(&current_lane, ref_values, theta, &mut u_lane, &mut s_lane)
        });

    Ok((potentials, spikes))
}

fn integrate_unit(
    current: &ArrayView1<f64>,
    ref_values: &[f64],
    theta: f64,
    potentials: &mut ArrayViewMut1<f64>,
    spikes: &mut ArrayViewMut1<f64>,
) {
    let num_steps = current.len();
    let mut feedback = vec![0.0; num_steps];

    for t in 0..num_steps {
        let potential = current[t] + feedback[t];
        potentials[t] = potential;
        if potential >= theta {
            spikes[t] = 1.0;
            // Refractory feedback applies to strictly later time steps only.
            let horizon = ref_values.len().min(num_steps - t);
            for lag in 1..horizon {
                feedback[t + lag] += ref_values[lag];
            }
        }
    }
}

/// Propagate a gradient with respect to the emitted spikes back to a gradient with respect
/// to the weighted current, substituting the spike probability density for the derivative
/// of the threshold step.
///
/// This is the exact adjoint of the forward recursion: running backwards in time, the
/// gradient of a spike collects the refractory contributions it sent to later potentials
/// before being scaled by the density.
pub fn calculate_current_gradient(
    grad_spikes: &Array5<f64>,
    pdf: &Array5<f64>,
    ref_kernel: &RefKernel,
) -> Result<Array5<f64>, SnnError> {
    if grad_spikes.dim() != pdf.dim() {
        return Err(SnnError::ShapeMismatch {
            expected: grad_spikes.shape().to_vec(),
            actual: pdf.shape().to_vec(),
        });
    }

    let ref_values = ref_kernel.as_slice();
    let mut grad_current = Array5::zeros(grad_spikes.dim());

    Zip::from(grad_current.lanes_mut(Axis(4)))
        .and(grad_spikes.lanes(Axis(4)))
        .and(pdf.lanes(Axis(4)))
        .par_for_each(|mut grad_lane, spike_grad_lane, pdf_lane| {
            backpropagate_unit(&spike_grad_lane, &pdf_lane, ref_values, &mut grad_lane)
        });

    Ok(grad_current)
}

fn backpropagate_unit(
    grad_spikes: &ArrayView1<f64>,
    pdf: &ArrayView1<f64>,
    ref_values: &[f64],
    grad_current: &mut ArrayViewMut1<f64>,
) {
    let num_steps = grad_spikes.len();
    for t in (0..num_steps).rev() {
        let mut acc = grad_spikes[t];
        let horizon = ref_values.len().min(num_steps - t);
        for lag in 1..horizon {
            acc += ref_values[lag] * grad_current[t + lag];
        }
        grad_current[t] = pdf[t] * acc;
    }
}
