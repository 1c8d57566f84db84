//! Output error signal between actual and desired activity.
//!
//! Both operands must already be SRM-filtered activation traces, not raw spike trains;
//! comparing filtered traces makes the error a smooth function of spike timing. The error
//! trace is the seed for backpropagation through the stack.

use ndarray::Array5;

use super::error::SnnError;

/// Calculate the error trace between the actual and the desired activation.
///
/// The result is the elementwise difference `actual - desired`, which is also the gradient
/// of [`squared_loss`] with respect to the actual activation.
pub fn calculate_error_spiketrain(
    actual: &Array5<f64>,
    desired: &Array5<f64>,
) -> Result<Array5<f64>, SnnError> {
    if actual.dim() != desired.dim() {
        return Err(SnnError::ShapeMismatch {
            expected: actual.shape().to_vec(),
            actual: desired.shape().to_vec(),
        });
    }

    Ok(actual - desired)
}

/// The squared loss of an error trace, i.e., half the sum of its squared entries.
pub fn squared_loss(error: &Array5<f64>) -> f64 {
    0.5 * error.iter().map(|e| e * e).sum::<f64>()
}
