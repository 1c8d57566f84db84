//! End-to-end training-step test: forward pass, error trace, backward pass, and a manual
//! gradient-descent update on a two-layer spiking network.

use ndarray::Array5;
use rand::rngs::StdRng;
use rand::SeedableRng;

use srm_snn::kernel::calculate_srm_kernel_with_channels;
use srm_snn::loss::{calculate_error_spiketrain, squared_loss};
use srm_snn::network::LayerStack;
use srm_snn::params::{AfParams, NetworkParams};
use srm_snn::response::apply_srm_kernel;

const SEED: u64 = 42;

fn training_params() -> NetworkParams {
    NetworkParams::build(
        &[
            ("input_x", 10.0),
            ("input_y", 1.0),
            ("input_channels", 1.0),
            ("t_start", 0.0),
            ("t_end", 100.0),
            ("t_s", 1.0),
            ("time_unit", 1.0),
            ("tau_m", 1.0),
            ("tau_ref", 10.0),
        ],
        AfParams::new(1.0, vec![1.0, 1.0]),
    )
    .unwrap()
}

fn input_spike_train() -> Array5<f64> {
    let mut input = Array5::<f64>::zeros((1, 1, 1, 10, 100));
    for unit in 0..10 {
        input[[0, 0, 0, unit, 3 + 7 * unit]] = 1.0;
        input[[0, 0, 0, unit, 50 + 4 * unit]] = 1.0;
    }
    input
}

fn desired_spike_train() -> Array5<f64> {
    let mut desired = Array5::<f64>::zeros((1, 1, 1, 1, 100));
    for t in [20, 40, 60] {
        desired[[0, 0, 0, 0, t]] = 1.0;
    }
    desired
}

#[test]
fn test_training_step() {
    let params = training_params();
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut network = LayerStack::rand(params.clone(), &[10, 5, 1], &mut rng).unwrap();
    assert_eq!(network.num_layers(), 2);

    // Forward pass
    let input = input_spike_train();
    let output = network.forward(&input).unwrap();
    assert_eq!(output.shape(), &[1, 1, 1, 1, 100]);
    assert!(output.iter().all(|s| *s == 0.0 || *s == 1.0));

    // Error trace between SRM-filtered actual and desired output
    let srm = calculate_srm_kernel_with_channels(&params, 1).unwrap();
    let actual_activation = apply_srm_kernel(&output, &srm).unwrap();
    let desired_activation = apply_srm_kernel(&desired_spike_train(), &srm).unwrap();
    let error = calculate_error_spiketrain(&actual_activation, &desired_activation).unwrap();
    let loss = squared_loss(&error);
    assert!(loss > 0.0);

    // Backward pass populates both layer gradients
    network.backward(&error).unwrap();

    let grad_output_layer = network.gradient(1).unwrap().clone();
    assert_eq!(grad_output_layer.shape(), &[1, 5]);
    assert!(grad_output_layer.iter().all(|g| g.is_finite()));
    assert!(grad_output_layer.iter().any(|g| *g != 0.0));

    let grad_input_layer = network.gradient(0).unwrap().clone();
    assert_eq!(grad_input_layer.shape(), &[5, 10]);
    assert!(grad_input_layer.iter().all(|g| g.is_finite()));
    assert!(grad_input_layer.iter().any(|g| *g != 0.0));

    // Manual gradient-descent update
    let learning_rate = 0.1;
    for layer in 0..network.num_layers() {
        let update = network.gradient(layer).unwrap() * learning_rate;
        *network.weight_mut(layer).unwrap() -= &update;
    }
    network.zero_gradients();
    assert!(network.gradient(0).unwrap().iter().all(|g| *g == 0.0));

    // The updated network still runs a full pass
    let output = network.forward(&input).unwrap();
    assert_eq!(output.shape(), &[1, 1, 1, 1, 100]);
    let actual_activation = apply_srm_kernel(&output, &srm).unwrap();
    let error = calculate_error_spiketrain(&actual_activation, &desired_activation).unwrap();
    network.backward(&error).unwrap();
}

#[test]
fn test_weights_survive_save_load_of_params() {
    // Rebuilding a network from saved configuration and extracted weights reproduces
    // the forward pass exactly.
    let params = training_params();
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut network = LayerStack::rand(params.clone(), &[10, 5, 1], &mut rng).unwrap();

    let file = tempfile::NamedTempFile::new().unwrap();
    params.save(file.path()).unwrap();
    let loaded = NetworkParams::load(file.path()).unwrap();

    let weights = vec![
        network.weight(0).unwrap().clone(),
        network.weight(1).unwrap().clone(),
    ];
    let mut rebuilt = LayerStack::build(loaded, weights).unwrap();

    let input = input_spike_train();
    let output = network.forward(&input).unwrap();
    let rebuilt_output = rebuilt.forward(&input).unwrap();
    assert_eq!(output, rebuilt_output);
}
