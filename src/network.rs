//! The feed-forward stack of spiking layers and its training surface.
//!
//! Each layer chains the SRM filter, the learnable linear weighting and the membrane
//! simulation; the spike train emitted by one layer is the input of the next. The forward
//! pass is deterministic. Backward propagation is reverse-mode throughout, with a single
//! non-standard rule: at every spike emission the derivative of the threshold step is
//! replaced by the spike probability density. Convolution, weighting and refractory
//! feedback all use their exact analytic adjoints.

use log::{debug, info};
use ndarray::{s, Array2, Array3, Array5};
use ndarray::Axis;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Normal;

use super::error::SnnError;
use super::kernel::{
    calculate_ref_kernel, calculate_srm_kernel, calculate_srm_kernel_with_channels, RefKernel,
    SrmKernel,
};
use super::membrane::{
    apply_weights, calculate_current_gradient, calculate_membrane_potentials, flatten_units,
};
use super::params::NetworkParams;
use super::response::{apply_srm_kernel, apply_srm_kernel_adjoint};
use super::surrogate::calculate_pdf;

/// A fully connected spiking layer: the learnable synaptic weights, their accumulated
/// gradient, and the density width used during backward propagation.
#[derive(Debug, Clone)]
pub struct Layer {
    weight: Array2<f64>,
    gradient: Array2<f64>,
    sigma: f64,
}

impl Layer {
    fn new(weight: Array2<f64>, sigma: f64) -> Self {
        let gradient = Array2::zeros(weight.raw_dim());
        Layer {
            weight,
            gradient,
            sigma,
        }
    }

    /// Returns the number of input units of the layer.
    pub fn num_inputs(&self) -> usize {
        self.weight.ncols()
    }

    /// Returns the number of output units of the layer.
    pub fn num_outputs(&self) -> usize {
        self.weight.nrows()
    }
}

// Cached per-layer tensors of the latest forward pass, consumed by backward.
struct LayerTrace {
    // SRM-filtered input activation, flattened to (batch, inputs, time)
    input_activation: Array3<f64>,
    // Membrane potentials, (batch, outputs, 1, 1, time)
    potentials: Array5<f64>,
}

/// A layered spiking neural network.
///
/// The stack owns the per-layer weight matrices and exposes them, together with their
/// gradients, to an external optimizer. Weight updates are expected to happen strictly
/// between passes.
pub struct LayerStack {
    params: NetworkParams,
    srm_input: SrmKernel,
    srm_hidden: SrmKernel,
    ref_kernel: RefKernel,
    layers: Vec<Layer>,
    trace: Option<Vec<LayerTrace>>,
}

impl LayerStack {
    /// Build a network from explicit weight matrices, one (outputs, inputs) matrix per layer.
    ///
    /// The first matrix must accept all configured input units; consecutive matrices must
    /// chain, and one density width per layer must be configured.
    pub fn build(params: NetworkParams, weights: Vec<Array2<f64>>) -> Result<Self, SnnError> {
        if weights.is_empty() {
            return Err(SnnError::InvalidParameter(
                "a network needs at least one layer".to_string(),
            ));
        }

        let num_inputs = params.num_input_units()?;
        if weights[0].ncols() != num_inputs {
            return Err(SnnError::InvalidParameter(format!(
                "first layer expects {} inputs, got {}",
                num_inputs,
                weights[0].ncols()
            )));
        }
        for l in 1..weights.len() {
            if weights[l].ncols() != weights[l - 1].nrows() {
                return Err(SnnError::InvalidParameter(format!(
                    "layer {} expects {} inputs, got {}",
                    l,
                    weights[l - 1].nrows(),
                    weights[l].ncols()
                )));
            }
        }

        let srm_input = calculate_srm_kernel(&params)?;
        let srm_hidden = calculate_srm_kernel_with_channels(&params, 1)?;
        let ref_kernel = calculate_ref_kernel(&params)?;

        let layers = weights
            .into_iter()
            .enumerate()
            .map(|(l, weight)| Ok(Layer::new(weight, params.af_params().sigma(l)?)))
            .collect::<Result<Vec<_>, SnnError>>()?;

        info!(
            "spiking network built: {} layers, {} input units",
            layers.len(),
            num_inputs
        );

        Ok(LayerStack {
            params,
            srm_input,
            srm_hidden,
            ref_kernel,
            layers,
            trace: None,
        })
    }

    /// Build a network with random weights for the given unit counts per stage,
    /// e.g., `[250, 25, 1]` for two layers.
    ///
    /// Weights are sampled from a normal distribution with standard deviation
    /// 1 / sqrt(inputs) of the respective layer.
    pub fn rand<R: Rng>(
        params: NetworkParams,
        sizes: &[usize],
        rng: &mut R,
    ) -> Result<Self, SnnError> {
        if sizes.len() < 2 {
            return Err(SnnError::InvalidParameter(
                "a network needs at least an input and an output stage".to_string(),
            ));
        }

        let mut weights = Vec::with_capacity(sizes.len() - 1);
        for stage in sizes.windows(2) {
            let (num_inputs, num_outputs) = (stage[0], stage[1]);
            let normal = Normal::new(0.0, (num_inputs as f64).sqrt().recip())
                .map_err(|e| SnnError::InvalidParameter(e.to_string()))?;
            weights.push(Array2::random_using((num_outputs, num_inputs), normal, rng));
        }

        Self::build(params, weights)
    }

    /// Returns the number of layers.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Returns the network configuration.
    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    fn check_layer(&self, layer: usize) -> Result<(), SnnError> {
        if layer >= self.layers.len() {
            return Err(SnnError::InvalidParameter(format!(
                "no layer {} in a {}-layer network",
                layer,
                self.layers.len()
            )));
        }
        Ok(())
    }

    /// Returns the weight matrix of the given layer.
    pub fn weight(&self, layer: usize) -> Result<&Array2<f64>, SnnError> {
        self.check_layer(layer)?;
        Ok(&self.layers[layer].weight)
    }

    /// Returns the weight matrix of the given layer for in-place updates by an optimizer.
    pub fn weight_mut(&mut self, layer: usize) -> Result<&mut Array2<f64>, SnnError> {
        self.check_layer(layer)?;
        Ok(&mut self.layers[layer].weight)
    }

    /// Replace the weight matrix of the given layer.
    /// The function returns an error if the new matrix has a different shape.
    pub fn set_weight(&mut self, layer: usize, weight: Array2<f64>) -> Result<(), SnnError> {
        self.check_layer(layer)?;
        if weight.raw_dim() != self.layers[layer].weight.raw_dim() {
            return Err(SnnError::ShapeMismatch {
                expected: self.layers[layer].weight.shape().to_vec(),
                actual: weight.shape().to_vec(),
            });
        }
        self.layers[layer].weight = weight;
        Ok(())
    }

    /// Returns the accumulated weight gradient of the given layer.
    pub fn gradient(&self, layer: usize) -> Result<&Array2<f64>, SnnError> {
        self.check_layer(layer)?;
        Ok(&self.layers[layer].gradient)
    }

    /// Reset all accumulated weight gradients to zero.
    pub fn zero_gradients(&mut self) {
        for layer in &mut self.layers {
            layer.gradient.fill(0.0);
        }
    }

    /// Run the forward pass on an input spike train of shape
    /// (batch, channels, height, width, time).
    ///
    /// Returns the spike train of the final layer, shaped (batch, 1, 1, outputs, time).
    /// The pass caches the per-layer activations and potentials needed by [`Self::backward`].
    pub fn forward(&mut self, input: &Array5<f64>) -> Result<Array5<f64>, SnnError> {
        let (batch, channels, height, width, num_steps) = input.dim();
        let expected_channels = self.srm_input.num_channels();
        let expected_steps = self.params.num_time_steps()?;
        if channels != expected_channels
            || num_steps != expected_steps
            || channels * height * width != self.layers[0].num_inputs()
        {
            return Err(SnnError::ShapeMismatch {
                expected: vec![batch, expected_channels, height, width, expected_steps],
                actual: input.shape().to_vec(),
            });
        }

        let mut traces = Vec::with_capacity(self.layers.len());
        let mut spikes = input.clone();

        for (l, layer) in self.layers.iter().enumerate() {
            let kernel = if l == 0 {
                &self.srm_input
            } else {
                &self.srm_hidden
            };

            let activation = apply_srm_kernel(&spikes, kernel)?;
            let weighted = apply_weights(&activation, &layer.weight)?;
            let (potentials, out_spikes) =
                calculate_membrane_potentials(&weighted, &self.params, &self.ref_kernel)?;

            debug!("layer {}: {} spikes emitted", l, out_spikes.sum());

            traces.push(LayerTrace {
                input_activation: flatten_units(&activation)?,
                potentials,
            });
            spikes = as_hidden_layout(out_spikes)?;
        }

        self.trace = Some(traces);
        Ok(spikes)
    }

    /// Run the backward pass for an error trace on the final layer's activation, shaped
    /// like the forward output, accumulating weight gradients on every layer.
    ///
    /// The error trace is the gradient of the loss with respect to the SRM-filtered final
    /// spike train (see [`crate::loss::calculate_error_spiketrain`]). The cached forward
    /// pass is consumed; the function returns an error if none is available.
    pub fn backward(&mut self, error: &Array5<f64>) -> Result<(), SnnError> {
        let traces = self.trace.take().ok_or_else(|| {
            SnnError::InvalidOperation("backward requires a preceding forward pass".to_string())
        })?;

        let (batch, last_units, _, _, num_steps) = traces
            .last()
            .map(|trace| trace.potentials.dim())
            .unwrap_or((0, 0, 0, 0, 0));
        if error.dim() != (batch, 1, 1, last_units, num_steps) {
            return Err(SnnError::ShapeMismatch {
                expected: vec![batch, 1, 1, last_units, num_steps],
                actual: error.shape().to_vec(),
            });
        }

        // Pull the error back through the final SRM filter onto the emitted spikes.
        let mut grad_hidden = apply_srm_kernel_adjoint(error, &self.srm_hidden)?;

        for l in (0..self.layers.len()).rev() {
            let trace = &traces[l];
            let num_outputs = self.layers[l].num_outputs();

            // From hidden layout back to the membrane layout of this layer's output
            let grad_spikes = grad_hidden
                .into_shape_with_order((batch, num_outputs, 1, 1, num_steps))
                .map_err(|e| SnnError::InvalidOperation(e.to_string()))?;

            // Spike emission: surrogate density in place of the step derivative,
            // exact adjoint of the refractory recursion
            let pdf = calculate_pdf(&trace.potentials, &self.params, self.layers[l].sigma)?;
            let grad_current = calculate_current_gradient(&grad_spikes, &pdf, &self.ref_kernel)?;
            let grad_flat = flatten_units(&grad_current)?;

            // Weight gradient, accumulated over the batch
            let mut grad_weight = Array2::zeros(self.layers[l].weight.raw_dim());
            for b in 0..batch {
                let per_sample = grad_flat
                    .index_axis(Axis(0), b)
                    .dot(&trace.input_activation.index_axis(Axis(0), b).t());
                grad_weight += &per_sample;
            }
            debug!("layer {}: gradient accumulated", l);
            self.layers[l].gradient += &grad_weight;

            if l == 0 {
                break;
            }

            // Gradient with respect to this layer's input activation, pulled back
            // through the SRM filter onto the previous layer's spikes
            let num_inputs = self.layers[l].num_inputs();
            let mut grad_activation = Array5::zeros((batch, 1, 1, num_inputs, num_steps));
            for b in 0..batch {
                let per_sample = self.layers[l]
                    .weight
                    .t()
                    .dot(&grad_flat.index_axis(Axis(0), b));
                grad_activation
                    .slice_mut(s![b, 0, 0, .., ..])
                    .assign(&per_sample);
            }
            grad_hidden = apply_srm_kernel_adjoint(&grad_activation, &self.srm_hidden)?;
        }

        Ok(())
    }
}

// (batch, units, 1, 1, time) and (batch, 1, 1, units, time) share the same row-major
// linearization, so moving a layer output into the next layer's input layout is a reshape.
fn as_hidden_layout(trace: Array5<f64>) -> Result<Array5<f64>, SnnError> {
    let (batch, units, _, _, num_steps) = trace.dim();
    trace
        .into_shape_with_order((batch, 1, 1, units, num_steps))
        .map_err(|e| SnnError::InvalidOperation(e.to_string()))
}
