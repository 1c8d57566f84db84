//! Network configuration as a mutable key-value parameter store with typed accessors.
//!
//! The store is created once from explicit entries or from a JSON file, and is read-only
//! afterwards except through [`NetworkParams::set`], which callers use to override a single
//! field between experiments (e.g., rerunning kernel generation with a finer `t_s`).
//! Lookups of absent keys fail; there is no defaulting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::error::SnnError;

/// Keys that every configuration must provide at construction.
pub const REQUIRED_KEYS: [&str; 7] = [
    "input_x",
    "input_y",
    "input_channels",
    "t_start",
    "t_end",
    "t_s",
    "time_unit",
];

/// Per-layer activation function parameters: the firing threshold and the width of the
/// spike probability density used as surrogate derivative, one width per layer.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AfParams {
    theta: f64,
    sigma: Vec<f64>,
}

impl AfParams {
    /// Create activation function parameters with the given threshold and per-layer widths.
    pub fn new(theta: f64, sigma: Vec<f64>) -> Self {
        AfParams { theta, sigma }
    }

    /// Returns the firing threshold.
    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// Returns the density width of the given layer.
    /// The function returns an error if no width is configured for the layer.
    pub fn sigma(&self, layer: usize) -> Result<f64, SnnError> {
        self.sigma
            .get(layer)
            .copied()
            .ok_or_else(|| SnnError::MissingParameter(format!("af_params.sigma[{}]", layer)))
    }

    /// Returns the number of layers for which a density width is configured.
    pub fn num_layers(&self) -> usize {
        self.sigma.len()
    }
}

/// The immutable-by-convention network configuration.
///
/// Numeric options live in a key-value map; recognized keys beyond [`REQUIRED_KEYS`] (such as
/// the time constants `tau_m` and `tau_ref`) are resolved by the operation that needs them,
/// so a missing one surfaces as [`SnnError::MissingParameter`] at that point.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NetworkParams {
    values: BTreeMap<String, f64>,
    af_params: AfParams,
}

impl NetworkParams {
    /// Build a configuration from explicit entries.
    /// The function returns an error if any of the [`REQUIRED_KEYS`] is absent.
    pub fn build(entries: &[(&str, f64)], af_params: AfParams) -> Result<Self, SnnError> {
        let values: BTreeMap<String, f64> = entries
            .iter()
            .map(|(key, value)| (key.to_string(), *value))
            .collect();

        let params = NetworkParams { values, af_params };
        params.check_required_keys()?;
        Ok(params)
    }

    /// Load a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SnnError> {
        let file = File::open(path).map_err(|e| SnnError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        let params: NetworkParams =
            serde_json::from_reader(reader).map_err(|e| SnnError::IOError(e.to_string()))?;
        params.check_required_keys()?;
        Ok(params)
    }

    /// Save the configuration to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SnnError> {
        let file = File::create(path).map_err(|e| SnnError::IOError(e.to_string()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).map_err(|e| SnnError::IOError(e.to_string()))
    }

    fn check_required_keys(&self) -> Result<(), SnnError> {
        for key in REQUIRED_KEYS {
            if !self.values.contains_key(key) {
                return Err(SnnError::MissingParameter(key.to_string()));
            }
        }
        Ok(())
    }

    /// Returns the value of the given key.
    /// The function returns an error if the key is absent; values are never defaulted.
    pub fn get(&self, key: &str) -> Result<f64, SnnError> {
        self.values
            .get(key)
            .copied()
            .ok_or_else(|| SnnError::MissingParameter(key.to_string()))
    }

    /// Override the value of an existing key.
    /// The function returns an error if the key is unknown to the store.
    pub fn set(&mut self, key: &str, value: f64) -> Result<(), SnnError> {
        match self.values.get_mut(key) {
            Some(entry) => {
                *entry = value;
                Ok(())
            }
            None => Err(SnnError::MissingParameter(key.to_string())),
        }
    }

    /// Returns the activation function parameters.
    pub fn af_params(&self) -> &AfParams {
        &self.af_params
    }

    /// Returns the number of simulation time steps, i.e., (t_end - t_start) / t_s truncated.
    /// The function returns an error if the time range or the time step is degenerate.
    pub fn num_time_steps(&self) -> Result<usize, SnnError> {
        let t_start = self.get("t_start")?;
        let t_end = self.get("t_end")?;
        let t_s = self.get("t_s")?;

        if !(t_s > 0.0) {
            return Err(SnnError::InvalidParameter(format!(
                "t_s must be positive, got {}",
                t_s
            )));
        }
        if t_end <= t_start {
            return Err(SnnError::InvalidParameter(format!(
                "t_end ({}) must be greater than t_start ({})",
                t_end, t_start
            )));
        }

        Ok(((t_end - t_start) / t_s) as usize)
    }

    /// Returns the number of input units, i.e., input_channels * input_x * input_y.
    pub fn num_input_units(&self) -> Result<usize, SnnError> {
        let channels = self.get("input_channels")?;
        let x = self.get("input_x")?;
        let y = self.get("input_y")?;

        if channels < 1.0 || x < 1.0 || y < 1.0 {
            return Err(SnnError::InvalidParameter(format!(
                "input dimensions must be at least 1, got {}x{}x{}",
                channels, x, y
            )));
        }

        Ok(channels as usize * x as usize * y as usize)
    }
}
