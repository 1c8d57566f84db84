//! Generation of the spike response (SRM) kernel and the refractory kernel.
//!
//! Both kernels sample the peak-normalized alpha response `f(x) = x * exp(1 - x)` at
//! `t_s` intervals on the real time axis (`time_unit` real time per discretized step),
//! with `x = t / tau` for the respective time constant. The sampling stops once the
//! tail has decayed below a negligible cutoff, or once the configured time horizon
//! is exhausted, whichever comes first.

use log::debug;
use ndarray::{Array1, Array5};

use super::error::SnnError;
use super::params::NetworkParams;
use super::{REF_KERNEL_CUTOFF, SRM_KERNEL_CUTOFF};

/// The alpha response, normalized to unit peak at `x = 1`.
fn alpha_response(x: f64) -> f64 {
    x * (1.0 - x).exp()
}

/// Look up a time constant (in real time units) and the sampling step from the configuration.
/// Returns the ratio of real time per sample to the time constant.
fn sample_scale(params: &NetworkParams, tau_key: &str) -> Result<f64, SnnError> {
    let t_s = params.get("t_s")?;
    let time_unit = params.get("time_unit")?;
    let tau = params.get(tau_key)?;

    if !(t_s > 0.0) || !(time_unit > 0.0) || !(tau > 0.0) {
        return Err(SnnError::InvalidParameter(format!(
            "t_s ({}), time_unit ({}) and {} ({}) must be positive",
            t_s, time_unit, tau_key, tau
        )));
    }

    Ok(t_s * time_unit / tau)
}

/// The spike response kernel: a causal, block-diagonal impulse response of shape
/// (channels, channels, 1, 1, time).
///
/// The time layout follows convolution semantics: the causal response sits to the left
/// of the center index, time-reversed, so that correlating a spike train against the
/// kernel with "same" padding yields the causal post-synaptic activation. All entries
/// to the right of the center, and all off-diagonal channel blocks, are zero.
#[derive(Debug, PartialEq, Clone)]
pub struct SrmKernel {
    tensor: Array5<f64>,
    center: usize,
}

impl SrmKernel {
    /// Returns the kernel as a (channels, channels, 1, 1, time) tensor.
    pub fn tensor(&self) -> &Array5<f64> {
        &self.tensor
    }

    /// Returns the number of channels the kernel applies to.
    pub fn num_channels(&self) -> usize {
        self.tensor.dim().0
    }

    /// Returns the length of the kernel along the time axis.
    pub fn time_len(&self) -> usize {
        self.tensor.dim().4
    }

    /// Returns the center index of the time axis, i.e., the zero-lag position.
    pub fn center(&self) -> usize {
        self.center
    }

    /// Returns the causal response between an input and an output channel, ordered by lag:
    /// `response[lag]` is the contribution of an input spike `lag` steps in the past.
    pub fn response(&self, out_channel: usize, in_channel: usize) -> Array1<f64> {
        Array1::from_iter(
            (0..=self.center)
                .map(|lag| self.tensor[[out_channel, in_channel, 0, 0, self.center - lag]]),
        )
    }
}

/// The refractory kernel: the non-positive potential offset following an emitted spike,
/// ordered by lag and decaying toward zero.
#[derive(Debug, PartialEq, Clone)]
pub struct RefKernel {
    values: Array1<f64>,
}

impl RefKernel {
    /// Create a refractory kernel from explicit lag-ordered values.
    pub fn new(values: Array1<f64>) -> Self {
        RefKernel { values }
    }

    /// Returns the number of samples of the kernel.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the kernel has no samples.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the lag-ordered kernel values.
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Returns the kernel values as a slice.
    pub fn as_slice(&self) -> &[f64] {
        self.values.as_slice().unwrap_or(&[])
    }
}

/// Calculate the SRM kernel for the configured number of input channels.
///
/// The response is sampled at `t_s` intervals with time constant `tau_m` until it has
/// decayed below [`SRM_KERNEL_CUTOFF`] past its peak, or until the horizon
/// `(t_end - t_start) / t_s` is reached. The kernel time length is `2 * support - 1`.
pub fn calculate_srm_kernel(params: &NetworkParams) -> Result<SrmKernel, SnnError> {
    let channels = params.get("input_channels")? as usize;
    calculate_srm_kernel_with_channels(params, channels)
}

/// Calculate the SRM kernel for an explicit number of channels, e.g., a single channel
/// for the spike trains exchanged between hidden layers.
pub fn calculate_srm_kernel_with_channels(
    params: &NetworkParams,
    channels: usize,
) -> Result<SrmKernel, SnnError> {
    if channels == 0 {
        return Err(SnnError::InvalidParameter(
            "kernel must have at least one channel".to_string(),
        ));
    }

    let scale = sample_scale(params, "tau_m")?;
    let num_steps = params.num_time_steps()?;

    let mut samples = Vec::new();
    let mut decayed = false;
    for i in 0..num_steps {
        let x = i as f64 * scale;
        let value = alpha_response(x);
        if x > 1.0 && value < SRM_KERNEL_CUTOFF {
            decayed = true;
            break;
        }
        samples.push(value);
    }

    if samples.is_empty() {
        return Err(SnnError::InvalidParameter(
            "time range too short to sample the SRM kernel".to_string(),
        ));
    }

    // When the decay cutoff fired, the first negligible sample is kept as an explicit zero.
    let support = samples.len() + decayed as usize;
    let time_len = 2 * support - 1;
    let center = support - 1;

    let mut tensor = Array5::zeros((channels, channels, 1, 1, time_len));
    for ch in 0..channels {
        for (lag, value) in samples.iter().enumerate() {
            tensor[[ch, ch, 0, 0, center - lag]] = *value;
        }
    }

    debug!(
        "SRM kernel generated: {} channels, support {}, time length {}",
        channels, support, time_len
    );

    Ok(SrmKernel { tensor, center })
}

/// Calculate the refractory kernel.
///
/// The response is sampled at `t_s` intervals with time constant `tau_ref` until it has
/// decayed below [`REF_KERNEL_CUTOFF`] past its peak, and scaled by minus twice the firing
/// threshold. Its length is fixed by the time constant, not by the simulation horizon.
pub fn calculate_ref_kernel(params: &NetworkParams) -> Result<RefKernel, SnnError> {
    let scale = sample_scale(params, "tau_ref")?;
    let theta = params.af_params().theta();

    let mut values = Vec::new();
    let mut i = 0usize;
    loop {
        let x = i as f64 * scale;
        let shape = alpha_response(x);
        if x > 1.0 && shape < REF_KERNEL_CUTOFF {
            break;
        }
        values.push(-2.0 * theta * shape);
        i += 1;
    }

    debug!("refractory kernel generated: {} samples", values.len());

    Ok(RefKernel {
        values: Array1::from(values),
    })
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::params::AfParams;

    const FLOAT_EPS_TOL: f64 = 1e-3;

    fn reference_params() -> NetworkParams {
        NetworkParams::build(
            &[
                ("input_x", 34.0),
                ("input_y", 34.0),
                ("input_channels", 2.0),
                ("t_start", 0.0),
                ("t_end", 350.0),
                ("t_s", 1.0),
                ("time_unit", 1.0),
                ("tau_m", 1.0),
                ("tau_ref", 10.0),
            ],
            AfParams::new(10.0, vec![10.0, 10.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_srm_kernel_truncated_by_t_end() {
        let mut params = reference_params();
        params.set("t_end", 3.0).unwrap();

        let truncated = calculate_srm_kernel(&params).unwrap();
        assert_eq!(truncated.tensor().shape(), &[2, 2, 1, 1, 5]);
        assert_eq!(truncated.center(), 2);
    }

    #[test]
    fn test_srm_kernel_not_truncated() {
        let params = reference_params();
        let srm = calculate_srm_kernel(&params).unwrap();

        // The first entries are the time-reversed causal response, the leading zero included.
        let g_truth = [
            0.0,
            0.0173512652,
            0.040427682,
            0.0915781944,
            0.1991482735,
            0.4060058497,
            0.7357588823,
            1.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
        ];
        assert_eq!(srm.tensor().shape(), &[2, 2, 1, 1, g_truth.len()]);

        // Zero in every out_channel != in_channel block, equal to the ground truth elsewhere
        for out_ch in 0..2 {
            for in_ch in 0..2 {
                let block = srm.tensor().slice(ndarray::s![out_ch, in_ch, 0, 0, ..]);
                if out_ch == in_ch {
                    let max_abs_diff = block
                        .iter()
                        .zip_longest(g_truth.iter())
                        .map(|pair| match pair.both() {
                            Some((a, b)) => (a - b).abs(),
                            None => f64::INFINITY,
                        })
                        .fold(0.0, f64::max);
                    assert!(max_abs_diff < FLOAT_EPS_TOL);
                } else {
                    assert!(block.iter().all(|v| *v == 0.0));
                }
            }
        }
    }

    #[test]
    fn test_srm_kernel_causal_response_accessor() {
        let params = reference_params();
        let srm = calculate_srm_kernel(&params).unwrap();

        let response = srm.response(0, 0);
        assert_eq!(response.len(), srm.center() + 1);
        assert!((response[0]).abs() < FLOAT_EPS_TOL);
        assert!((response[1] - 1.0).abs() < FLOAT_EPS_TOL);
        assert!((response[2] - 0.7357588823).abs() < FLOAT_EPS_TOL);
        assert!(srm.response(0, 1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_srm_kernel_finer_discretization() {
        let mut params = reference_params();
        params.set("t_s", 0.5).unwrap();

        let srm = calculate_srm_kernel(&params).unwrap();
        // Twice as many samples fit before the decay cutoff, minus the sub-cutoff tail.
        assert_eq!(srm.tensor().shape(), &[2, 2, 1, 1, 33]);

        let response = srm.response(0, 0);
        // On-grid samples agree with the coarse kernel.
        assert!((response[2] - 1.0).abs() < FLOAT_EPS_TOL);
        assert!((response[4] - 0.7357588823).abs() < FLOAT_EPS_TOL);
    }

    #[test]
    fn test_srm_kernel_missing_time_constant() {
        let params = NetworkParams::build(
            &[
                ("input_x", 34.0),
                ("input_y", 34.0),
                ("input_channels", 2.0),
                ("t_start", 0.0),
                ("t_end", 350.0),
                ("t_s", 1.0),
                ("time_unit", 1.0),
            ],
            AfParams::new(10.0, vec![10.0]),
        )
        .unwrap();

        assert_eq!(
            calculate_srm_kernel(&params),
            Err(SnnError::MissingParameter("tau_m".to_string()))
        );
    }

    #[test]
    fn test_ref_kernel_generation() {
        let params = reference_params();
        let ref_kernel = calculate_ref_kernel(&params).unwrap();

        assert_eq!(ref_kernel.len(), 110);

        // No lag ever increases the potential
        assert!(ref_kernel.values().iter().all(|v| *v <= 0.0));

        // Zero at lag zero, peak of -2 * theta one time constant after the spike
        assert_eq!(ref_kernel.values()[0], 0.0);
        assert!((ref_kernel.values()[10] + 20.0).abs() < FLOAT_EPS_TOL);

        // Monotone decay toward zero past the peak
        for lag in 10..ref_kernel.len() - 1 {
            assert!(ref_kernel.values()[lag + 1] >= ref_kernel.values()[lag]);
        }
    }

    #[test]
    fn test_ref_kernel_independent_of_horizon() {
        let mut params = reference_params();
        params.set("t_end", 3.0).unwrap();

        let ref_kernel = calculate_ref_kernel(&params).unwrap();
        assert_eq!(ref_kernel.len(), 110);
    }
}
