//! This crate provides tools for simulating and training layered spiking neural networks (SNNs)
//! based on the spike response model (SRM).
//!
//! Input spike trains are dense tensors of shape (batch, channel, height, width, time).
//! Each layer filters its input spikes with the SRM kernel, mixes the resulting activation
//! traces with a learnable weight matrix, and integrates the weighted current into membrane
//! potentials with refractory self-feedback. Spike emission is a hard threshold; during
//! training its derivative is replaced by a smooth probability density so that gradients
//! can flow back through the stack.
//!
//! # Generating Kernels
//!
//! ```rust
//! use srm_snn::params::{AfParams, NetworkParams};
//! use srm_snn::kernel::calculate_srm_kernel;
//!
//! let params = NetworkParams::build(
//!     &[
//!         ("input_x", 4.0),
//!         ("input_y", 1.0),
//!         ("input_channels", 1.0),
//!         ("t_start", 0.0),
//!         ("t_end", 100.0),
//!         ("t_s", 1.0),
//!         ("time_unit", 1.0),
//!         ("tau_m", 1.0),
//!         ("tau_ref", 10.0),
//!     ],
//!     AfParams::new(10.0, vec![3.0]),
//! )
//! .unwrap();
//!
//! // The SRM response decays below the cutoff after eight samples here.
//! let srm = calculate_srm_kernel(&params).unwrap();
//! assert_eq!(srm.tensor().shape(), &[1, 1, 1, 1, 17]);
//! ```
//!
//! # Running a Network
//!
//! ```rust
//! use ndarray::Array5;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use srm_snn::network::LayerStack;
//! use srm_snn::params::{AfParams, NetworkParams};
//!
//! let params = NetworkParams::build(
//!     &[
//!         ("input_x", 4.0),
//!         ("input_y", 1.0),
//!         ("input_channels", 1.0),
//!         ("t_start", 0.0),
//!         ("t_end", 100.0),
//!         ("t_s", 1.0),
//!         ("time_unit", 1.0),
//!         ("tau_m", 1.0),
//!         ("tau_ref", 10.0),
//!     ],
//!     AfParams::new(10.0, vec![3.0]),
//! )
//! .unwrap();
//!
//! // A single fully-connected spiking layer with 4 inputs and 2 outputs
//! let mut rng = StdRng::seed_from_u64(42);
//! let mut network = LayerStack::rand(params, &[4, 2], &mut rng).unwrap();
//!
//! let mut input = Array5::<f64>::zeros((1, 1, 1, 4, 100));
//! input[[0, 0, 0, 0, 10]] = 1.0;
//!
//! let output_spikes = network.forward(&input).unwrap();
//! assert_eq!(output_spikes.shape(), &[1, 1, 1, 2, 100]);
//! ```

pub mod error;
pub mod kernel;
pub mod loss;
pub mod membrane;
pub mod network;
pub mod params;
pub mod response;
pub mod surrogate;

/// The relative tail value below which the SRM kernel response is considered negligible.
pub const SRM_KERNEL_CUTOFF: f64 = 1e-2;
/// The relative tail value below which the refractory kernel response is considered negligible.
pub const REF_KERNEL_CUTOFF: f64 = 5e-4;
/// The time axis of all spike train and trace tensors.
pub const TIME_AXIS: usize = 4;
