use std::collections::HashMap;
use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{PallasError, Result};

/// Key of a tabular entry: the feature vector as grid cell indices.
pub type StateKey = Vec<i64>;

/// Snapshot of an approximator's trainable parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Parameters {
    /// Per-layer `(weights, biases)` of a dense network
    Dense(Vec<(Array2<f32>, Array1<f32>)>),
    /// Rows of a lookup table
    Table(HashMap<StateKey, Array1<f32>>),
}

impl Parameters {
    /// Replace `self` by `(1 - tau) * self + tau * live`.
    ///
    /// Table rows missing from `self` blend from zero.
    pub fn blend(&mut self, live: &Parameters, tau: f32) -> Result<()> {
        match (self, live) {
            (Parameters::Dense(old), Parameters::Dense(new)) => {
                if old.len() != new.len() {
                    return Err(PallasError::dimension_mismatch(
                        format!("{} layers", old.len()),
                        format!("{} layers", new.len()),
                    ));
                }
                for ((ow, ob), (nw, nb)) in old.iter_mut().zip(new) {
                    if ow.dim() != nw.dim() || ob.dim() != nb.dim() {
                        return Err(PallasError::dimension_mismatch(
                            format!("{:?}", ow.dim()),
                            format!("{:?}", nw.dim()),
                        ));
                    }
                    ow.zip_mut_with(nw, |o, &n| *o = (1.0 - tau) * *o + tau * n);
                    ob.zip_mut_with(nb, |o, &n| *o = (1.0 - tau) * *o + tau * n);
                }
                Ok(())
            }
            (Parameters::Table(old), Parameters::Table(new)) => {
                for (key, row) in new {
                    let entry = old
                        .entry(key.clone())
                        .or_insert_with(|| Array1::zeros(row.len()));
                    entry.zip_mut_with(row, |o, &n| *o = (1.0 - tau) * *o + tau * n);
                }
                Ok(())
            }
            _ => Err(PallasError::invalid_parameter(
                "parameters",
                "cannot blend dense and tabular parameters",
            )),
        }
    }

    /// Flattened view of all values, in a stable order for dense parameters.
    pub fn flatten(&self) -> Vec<f32> {
        match self {
            Parameters::Dense(layers) => layers
                .iter()
                .flat_map(|(w, b)| w.iter().chain(b.iter()).copied().collect::<Vec<_>>())
                .collect(),
            Parameters::Table(rows) => {
                let mut keys: Vec<_> = rows.keys().collect();
                keys.sort();
                keys.into_iter().flat_map(|k| rows[k].iter().copied()).collect()
            }
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_bytes(&fs::read(path)?)
    }
}
