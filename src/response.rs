//! Causal temporal convolution of spike trains with the SRM kernel.
//!
//! The convolution is exactly linear, so its gradient is the plain adjoint (transposed
//! channel blocks, anti-causal correlation) with no surrogate involved. Both directions
//! preserve the tensor shape on all axes, truncating boundary effects so the output time
//! length equals the input time length.

use itertools::iproduct;
use ndarray::{Array1, Array5, ArrayView1, ArrayViewMut1, Axis, Zip};

use super::error::SnnError;
use super::kernel::SrmKernel;

/// Apply the SRM kernel to a spike train, producing the post-synaptic activation trace.
///
/// The convolution runs independently per batch element and spatial position; channels are
/// mixed according to the kernel's channel blocks (identically zero off the diagonal for
/// SRM kernels, so in practice each channel is filtered on its own).
pub fn apply_srm_kernel(
    spike_train: &Array5<f64>,
    kernel: &SrmKernel,
) -> Result<Array5<f64>, SnnError> {
    convolve_channels(spike_train, kernel, false)
}

/// Apply the exact adjoint of [`apply_srm_kernel`], mapping a gradient with respect to the
/// activation trace back to a gradient with respect to the spike train.
pub fn apply_srm_kernel_adjoint(
    grad_activation: &Array5<f64>,
    kernel: &SrmKernel,
) -> Result<Array5<f64>, SnnError> {
    convolve_channels(grad_activation, kernel, true)
}

fn convolve_channels(
    input: &Array5<f64>,
    kernel: &SrmKernel,
    adjoint: bool,
) -> Result<Array5<f64>, SnnError> {
    let (batch, channels, height, width, num_steps) = input.dim();
    if channels != kernel.num_channels() {
        return Err(SnnError::ShapeMismatch {
            expected: vec![batch, kernel.num_channels(), height, width, num_steps],
            actual: input.shape().to_vec(),
        });
    }

    let mut output = Array5::zeros(input.dim());
    for (out_ch, in_ch) in iproduct!(0..channels, 0..channels) {
        // The adjoint transposes the channel blocks.
        let response = if adjoint {
            kernel.response(in_ch, out_ch)
        } else {
            kernel.response(out_ch, in_ch)
        };
        if response.iter().all(|v| *v == 0.0) {
            continue;
        }

        let input_channel = input.index_axis(Axis(1), in_ch);
        let mut output_channel = output.index_axis_mut(Axis(1), out_ch);

        // After dropping the channel axis, time is the last of four axes.
        Zip::from(output_channel.lanes_mut(Axis(3)))
            .and(input_channel.lanes(Axis(3)))
            .par_for_each(|mut out_lane, in_lane| {
                if adjoint {
                    accumulate_anti_causal(&mut out_lane, &in_lane, &response);
                } else {
                    accumulate_causal(&mut out_lane, &in_lane, &response);
                }
            });
    }

    Ok(output)
}

// out[t] += sum over lags of response[lag] * input[t - lag]
fn accumulate_causal(
    out: &mut ArrayViewMut1<f64>,
    input: &ArrayView1<f64>,
    response: &Array1<f64>,
) {
    let num_steps = input.len();
    for (lag, value) in response.iter().enumerate() {
        if *value == 0.0 || lag >= num_steps {
            continue;
        }
        for t in lag..num_steps {
            out[t] += value * input[t - lag];
        }
    }
}

// out[t] += sum over lags of response[lag] * input[t + lag]
fn accumulate_anti_causal(
    out: &mut ArrayViewMut1<f64>,
    input: &ArrayView1<f64>,
    response: &Array1<f64>,
) {
    let num_steps = input.len();
    for (lag, value) in response.iter().enumerate() {
        if *value == 0.0 || lag >= num_steps {
            continue;
        }
        for t in 0..num_steps - lag {
            out[t] += value * input[t + lag];
        }
    }
}
