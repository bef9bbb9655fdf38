//! The UWHAM objective: negative profile log-likelihood with exact gradient and Hessian.
//!
//! For sampled states $m$ with mixture proportions $\rho_m = N_m / N$ and free energies $\zeta_m$
//! (the baseline pinned to zero), the objective is
//!
//! $$
//!     \kappa(\zeta) = \frac{1}{N} \sum_{n=1}^N \ln \sum_m \rho_m q_m(x_n) e^{-\zeta_m}
//!         + \sum_m \rho_m \zeta_m
//! $$
//!
//! which is convex in the non-baseline free energies and minimised by the self-consistent UWHAM
//! solution.

use crate::optimizer::{Evaluation, TwiceDifferentiable};
use crate::remap::IndexMap;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

/// Objective over the free energies of the sampled states, with the baseline coordinate removed
#[derive(Debug)]
pub struct Likelihood<'a> {
    /// `log_q[m, n]` is the log density of sample `n` under sampled state `m`, relative to the
    /// baseline state's log density for the same sample
    log_q: ArrayView2<'a, f64>,
    /// `rho[m]` is the fraction of all samples drawn from sampled state `m`
    rho: Array1<f64>,
    /// Maps the free energies of the sampled states to the optimizer's coordinates
    map: IndexMap,
}

impl<'a> Likelihood<'a> {
    /// Set up the objective for `log_q` (sampled states × samples) drawn with `sizes[m]` samples
    /// from each sampled state, with `base` the baseline's position among the sampled states
    ///
    /// `log_q` should already be shifted by the baseline state's log density; the objective is
    /// invariant to that shift, but the exponentials are much better conditioned after it.
    pub fn new(log_q: ArrayView2<'a, f64>, sizes: ArrayView1<'_, usize>, base: usize) -> Self {
        debug_assert_eq!(log_q.nrows(), sizes.len());
        let n_tot = log_q.ncols() as f64;
        let rho = sizes.mapv(|n| n as f64 / n_tot);
        Self {
            log_q,
            rho,
            map: IndexMap::new(sizes.len(), base),
        }
    }

    /// Number of samples
    pub fn n_tot(&self) -> usize {
        self.log_q.ncols()
    }

    /// Mixture proportions of the sampled states
    pub fn rho(&self) -> &Array1<f64> {
        &self.rho
    }

    /// The full free energy vector of the sampled states for reduced coordinates `ze`
    pub fn full_free_energies(&self, ze: &Array1<f64>) -> Array1<f64> {
        self.map.insert(ze.view(), 0.0)
    }

    /// Mixture-weighted densities `rho[m] exp(log_q[m, n] - ze[m])`
    fn normalised_densities(&self, ze: &Array1<f64>) -> Array2<f64> {
        let mut q_norm = Array2::zeros(self.log_q.raw_dim());
        Zip::from(q_norm.rows_mut())
            .and(self.log_q.rows())
            .and(ze)
            .and(&self.rho)
            .for_each(|mut q_row, log_q_row, &z, &rho| {
                q_row.zip_mut_with(&log_q_row, |q, &lq| *q = (lq - z).exp() * rho);
            });
        q_norm
    }
}

impl TwiceDifferentiable for Likelihood<'_> {
    fn dim(&self) -> usize {
        self.map.reduced_len()
    }

    fn evaluate(&self, x: &Array1<f64>) -> Evaluation {
        let n_tot = self.n_tot() as f64;
        let ze = self.full_free_energies(x);

        let q_norm = self.normalised_densities(&ze);
        let q_sum = q_norm.sum_axis(Axis(0));

        let value = q_sum.mapv(f64::ln).sum() / n_tot + ze.dot(&self.rho);

        // Responsibilities of the non-baseline states, samples × states
        let mut w = self.map.delete_axis(q_norm.view(), Axis(0)).reversed_axes();
        for (mut row, &s) in w.rows_mut().into_iter().zip(q_sum.iter()) {
            row /= s;
        }

        let w_sum = w.sum_axis(Axis(0)) / n_tot;
        let gradient = -&w_sum + &self.map.delete(self.rho.view());

        let outer = w.t().dot(&w) / n_tot;
        let hessian = Array2::from_diag(&w_sum) - outer;

        Evaluation {
            value,
            gradient,
            hessian,
        }
    }
}
