use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Online mean and standard deviation (Welford).
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub n_vals: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn n_vals(&self) -> usize {
        self.n_vals
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            n_vals: self.n_vals,
            mean: if self.n_vals > 0 { self.mean } else { f64::NAN },
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

/// Named running totals, reset together.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    columns: BTreeMap<String, f64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a column at zero. Registering twice keeps the current value.
    pub fn add_column(&mut self, name: &str) {
        self.columns.entry(name.to_string()).or_insert(0.0);
    }

    pub fn count(&mut self, name: &str, amount: f64) -> Result<()> {
        match self.columns.get_mut(name) {
            Some(value) => {
                *value += amount;
                Ok(())
            }
            None => bail!("unknown counter column {name:?}"),
        }
    }

    pub fn column(&self, name: &str) -> Option<f64> {
        self.columns.get(name).copied()
    }

    pub fn reset(&mut self) {
        self.columns.values_mut().for_each(|value| *value = 0.0);
    }

    pub fn columns(&self) -> &BTreeMap<String, f64> {
        &self.columns
    }
}
