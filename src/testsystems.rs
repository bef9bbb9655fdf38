//! Analytically solvable systems for testing the estimator.

use crate::errors::*;
use ndarray::{array, Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Test cases using harmonic oscillators.
///
/// State `k` has the reduced potential $u_k(x) = \beta K_k (x - O_k)^2 / 2$, so its samples are
/// normally distributed and its log normalizing constant is known exactly.
///
/// # Examples
///
/// Generate samples with default parameters.
///
/// ```
/// use uwham_rs::testsystems::*;
/// use ndarray::array;
///
/// let testcase = HarmonicOscillator::default();
/// let Sample { x_n, log_q, sizes, labels } = testcase.sample_with_seed(array![10, 20, 30, 40, 50], 1).unwrap();
/// assert_eq!(log_q.dim(), (150, 5));
/// ```
///
/// Generate samples with specified parameters, leaving the last state unsampled.
///
/// ```
/// use uwham_rs::testsystems::*;
/// use ndarray::array;
///
/// let testcase = HarmonicOscillator::builder()
///     .o_k(array![0.0, 0.5, 1.0])
///     .k_k(array![1.0, 1.0, 2.0])
///     .build()
///     .unwrap();
/// let sample = testcase.sample_with_seed(array![100, 100, 0], 7).unwrap();
/// let ze = testcase.analytical_free_energies(0);
/// ```
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct HarmonicOscillator {
    /// Offset parameters for each state.
    #[builder(default = "array![0.0, 1.0, 2.0, 3.0, 4.0]")]
    o_k: Array1<f64>,

    /// Force constants for each state.
    #[builder(default = "array![1.0, 2.0, 4.0, 8.0, 16.0]")]
    k_k: Array1<f64>,

    /// Inverse temperature
    #[builder(default = "1.0")]
    beta: f64,
}

impl HarmonicOscillatorBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let (Some(o_k), Some(k_k)) = (&self.o_k, &self.k_k) {
            if o_k.len() != k_k.len() {
                return Err(format!(
                    "o_k and k_k must have equal lengths (not {} and {})",
                    o_k.len(),
                    k_k.len()
                ));
            }
        }
        if let Some(k_k) = &self.k_k {
            if k_k.iter().any(|&k| !(k > 0.0)) {
                return Err("force constants must be positive".to_string());
            }
        }
        if let Some(beta) = self.beta {
            if !(beta > 0.0) {
                return Err(format!("beta must be positive (not {})", beta));
            }
        }

        Ok(())
    }
}

impl HarmonicOscillator {
    /// Get a new builder for the `HarmonicOscillator` struct
    pub fn builder() -> HarmonicOscillatorBuilder {
        HarmonicOscillatorBuilder::default()
    }

    /// $K$, the number of states
    pub fn k(&self) -> usize {
        self.o_k.len()
    }

    /// Reduced potential of position `x` in state `k`
    pub fn reduced_potential(&self, k: usize, x: f64) -> f64 {
        let dx = x - self.o_k[k];
        0.5 * self.beta * self.k_k[k] * dx * dx
    }

    /// `ln_z[k]` is the exact log normalizing constant $\ln \int e^{-u_k(x)} dx$ of state `k`
    pub fn analytical_log_normalizers(&self) -> Array1<f64> {
        self.k_k
            .mapv(|k| 0.5 * (2.0 * std::f64::consts::PI / (self.beta * k)).ln())
    }

    /// Exact log normalizing constants relative to state `base`
    pub fn analytical_free_energies(&self, base: usize) -> Array1<f64> {
        let ln_z = self.analytical_log_normalizers();
        &ln_z - ln_z[base]
    }

    /// Draw `n_k[k]` samples from each state `k` with a specified seed
    ///
    /// Samples are returned in state order.
    pub fn sample_with_seed(&self, n_k: Array1<usize>, seed: u64) -> Result<Sample> {
        if n_k.len() != self.k() {
            return Err(UwhamError::ArrayLengthMismatch(n_k.len(), self.k()));
        }
        let mut rng = StdRng::seed_from_u64(seed);

        let mut x_n = Vec::with_capacity(n_k.sum());
        let mut labels = Vec::with_capacity(n_k.sum());
        for (k, &n) in n_k.iter().enumerate() {
            let sigma = (self.beta * self.k_k[k]).recip().sqrt();
            let normal = Normal::new(self.o_k[k], sigma)
                .map_err(|e| UwhamError::Validation(format!("state {}: {}", k, e)))?;
            for _ in 0..n {
                x_n.push(normal.sample(&mut rng));
                labels.push(k);
            }
        }

        let x_n = Array1::from(x_n);
        let log_q = Array2::from_shape_fn((x_n.len(), self.k()), |(n, k)| {
            -self.reduced_potential(k, x_n[n])
        });

        Ok(Sample {
            x_n,
            log_q,
            sizes: n_k,
            labels: Array1::from(labels),
        })
    }
}

impl Default for HarmonicOscillator {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("HarmonicOscillator should not fail with default params")
    }
}

/// A sample from a test case
#[derive(Debug, Clone)]
pub struct Sample {
    /// `x_n[n]` is sample n (in concatenated indexing)
    pub x_n: Array1<f64>,
    /// `log_q[[n, k]]` is the negative reduced potential of sample `n` evaluated at state `k`
    pub log_q: Array2<f64>,
    /// `sizes[k]` is the number of samples generated from state `k`
    pub sizes: Array1<usize>,
    /// `labels[n]` is the state of origin of `x_n[n]`
    pub labels: Array1<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn builder_rejects_mismatched_parameters() {
        let result = HarmonicOscillator::builder()
            .o_k(array![0.0, 1.0])
            .k_k(array![1.0])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_nonpositive_force_constants() {
        let result = HarmonicOscillator::builder()
            .o_k(array![0.0, 1.0])
            .k_k(array![1.0, 0.0])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn sample_is_in_state_order() {
        let sample = HarmonicOscillator::default().sample_with_seed(array![2, 0, 3, 1, 1], 3).unwrap();
        assert_eq!(sample.labels, array![0, 0, 2, 2, 2, 3, 4]);
        assert_eq!(sample.log_q.dim(), (7, 5));
        assert_eq!(sample.sizes, array![2, 0, 3, 1, 1]);
    }

    #[test]
    fn sample_sizes_must_match_states() {
        let err = HarmonicOscillator::default()
            .sample_with_seed(array![1, 2], 0)
            .unwrap_err();
        assert!(matches!(err, UwhamError::ArrayLengthMismatch(2, 5)));
    }

    #[test]
    fn same_seed_same_sample() {
        let testcase = HarmonicOscillator::default();
        let a = testcase.sample_with_seed(array![5, 5, 5, 5, 5], 42).unwrap();
        let b = testcase.sample_with_seed(array![5, 5, 5, 5, 5], 42).unwrap();
        assert_eq!(a.x_n, b.x_n);
    }

    #[test]
    fn log_q_is_negative_reduced_potential() {
        let testcase = HarmonicOscillator::default();
        let sample = testcase.sample_with_seed(array![1, 1, 1, 1, 1], 0).unwrap();
        for n in 0..5 {
            for k in 0..5 {
                let dx = sample.x_n[n] - k as f64;
                let k_k = [1.0, 2.0, 4.0, 8.0, 16.0][k];
                assert_abs_diff_eq!(sample.log_q[[n, k]], -0.5 * k_k * dx * dx, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn analytical_free_energies_depend_on_force_constants() {
        let testcase = HarmonicOscillator::default();
        let ze = testcase.analytical_free_energies(0);
        assert_eq!(ze[0], 0.0);
        // Doubling the force constant shrinks the normalizer by sqrt(2)
        for k in 1..5 {
            assert_abs_diff_eq!(ze[k] - ze[k - 1], -0.5 * 2.0_f64.ln(), epsilon = 1e-14);
        }
    }
}
