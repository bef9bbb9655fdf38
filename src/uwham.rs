//! The UWHAM estimator, its configuration and its results.

use crate::errors::*;
use crate::likelihood::Likelihood;
use crate::linalg::solve;
use crate::optimizer::{Minimizer, Minimum, TerminationStatus, TrustRegionNewton};
use crate::remap::IndexMap;
use ndarray::{Array1, Array2, Axis, Zip};

/// Define the initial guess for free energies
#[derive(Debug, Clone, PartialEq)]
pub enum InitialFreeEnergies {
    /// Use the specified free energy values, one per state
    Specified(Vec<f64>),
    /// Initialize all free energies to zero
    Zeros,
}

impl Default for InitialFreeEnergies {
    fn default() -> Self {
        Self::Zeros
    }
}

impl From<&[f64]> for InitialFreeEnergies {
    fn from(slice: &[f64]) -> Self {
        Self::Specified(Vec::from(slice))
    }
}

impl InitialFreeEnergies {
    fn to_array(&self, k: usize) -> Array1<f64> {
        match self {
            Self::Specified(energies) => Array1::from(energies.clone()),
            Self::Zeros => Array1::zeros(k),
        }
    }
}

/// Method used to compute the asymptotic covariance of the free energies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarianceMethod {
    /// Use the Fisher information of the pooled sample
    ///
    /// Treats the samples as drawn from the mixture of all sampled states and needs no labels.
    Fisher,
    /// Use the empirical per-state moments of the weights (a sandwich estimator)
    ///
    /// Accounts for the sample sizes of the states being fixed by design. Requires labels; if
    /// none are given the samples are assumed to be ordered by state.
    Labels,
    /// Skip variance estimation
    None,
}

impl Default for VarianceMethod {
    fn default() -> Self {
        Self::Fisher
    }
}

/// Conditions worth a caller's attention that do not stop the estimate
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Labels were not given, so samples were assumed to be ordered by state
    ///
    /// The first `sizes[0]` samples are taken to be from state 0, the next `sizes[1]` from
    /// state 1, and so forth.
    LabelsAssumedOrdered,
    /// The minimiser stopped before meeting its convergence criterion
    NotConverged {
        /// Why the minimiser stopped
        status: TerminationStatus,
        /// Iterations performed
        iterations: usize,
        /// Gradient norm at the returned free energies
        gradient_norm: f64,
    },
    /// The Jacobian of the self-consistency equations could not be solved, so no variances were
    /// computed
    SingularVariance(&'static str),
}

/// Asymptotic variances of the free energies
#[derive(Debug, Clone, PartialEq)]
pub struct Variance {
    /// `ve[k]` is the variance of `ze[k]`; zero for the baseline
    pub ve: Array1<f64>,
    /// `covariance[[i, j]]` is the covariance of `ze[i]` and `ze[j]`; the baseline's row and
    /// column are zero
    pub covariance: Array2<f64>,
}

/// Outcome of variance estimation
#[derive(Debug, Clone, PartialEq)]
pub enum VarianceEstimate {
    /// Variance estimation was switched off with [`VarianceMethod::None`]
    NotRequested,
    /// Variances were computed
    Estimated(Variance),
    /// The named linear system was singular
    Singular {
        /// Which system failed
        system: &'static str,
    },
}

/// Free energy differences between every pair of states
#[derive(Debug, Clone, PartialEq)]
pub struct FreeEnergyDifferences {
    /// `delta_f[[i, j]]` is the free energy difference `ze[j] - ze[i]`
    pub delta_f: Array2<f64>,
    /// `d_delta_f[[i, j]]` is the standard error of `delta_f[[i, j]]`
    pub d_delta_f: Array2<f64>,
}

/// Result of a UWHAM fit
#[derive(Debug, Clone)]
pub struct UwhamResult {
    /// `ze[k]` is the log normalizing constant of state `k` relative to the baseline
    pub ze: Array1<f64>,
    /// `w[[n, k]]` is the weight of sample `n` under the normalized density of state `k`; every
    /// column has unit mean
    pub w: Array2<f64>,
    /// Column means of `w` for the sampled states before any rescaling; all should be 1
    pub check: Array1<f64>,
    /// Asymptotic variances, if requested and computable
    pub variance: VarianceEstimate,
    /// Report from the minimiser
    pub solver: Minimum,
    /// State of origin of each sample, if given or assumed
    pub labels: Option<Array1<usize>>,
    /// `sizes[k]` is the number of samples from state `k`
    pub sizes: Array1<usize>,
    /// State whose free energy is fixed at zero
    pub base: usize,
    /// Non-fatal conditions encountered during the fit
    pub diagnostics: Vec<Diagnostic>,
}

impl UwhamResult {
    /// Variances of the free energies
    pub fn ve(&self) -> Result<&Array1<f64>> {
        self.estimated().map(|v| &v.ve)
    }

    /// Covariance matrix of the free energies
    pub fn covariance(&self) -> Result<&Array2<f64>> {
        self.estimated().map(|v| &v.covariance)
    }

    fn estimated(&self) -> Result<&Variance> {
        match &self.variance {
            VarianceEstimate::Estimated(v) => Ok(v),
            VarianceEstimate::Singular { system } => Err(UwhamError::Singular(*system)),
            VarianceEstimate::NotRequested => Err(UwhamError::VarianceNotComputed),
        }
    }

    /// Whether every sampled state's weights averaged to one within `tolerance`
    pub fn is_self_consistent(&self, tolerance: f64) -> bool {
        self.max_check_deviation() <= tolerance
    }

    /// Largest deviation of [`UwhamResult::check`] from one
    pub fn max_check_deviation(&self) -> f64 {
        self.check.iter().fold(0.0, |acc, c| f64::max(acc, (c - 1.0).abs()))
    }

    /// Compute free energy differences and their uncertainties between all pairs of states
    ///
    /// The uncertainty of $\zeta_j - \zeta_i$ is
    /// $\sqrt{\mathrm{Var}(\zeta_i) + \mathrm{Var}(\zeta_j) - 2\,\mathrm{cov}(\zeta_i, \zeta_j)}$,
    /// with small negative values from rounding clamped to zero.
    pub fn free_energy_differences(&self) -> Result<FreeEnergyDifferences> {
        let cov = self.covariance()?;
        let k = self.ze.len();
        let delta_f = Array2::from_shape_fn((k, k), |(i, j)| self.ze[j] - self.ze[i]);
        let d_delta_f = Array2::from_shape_fn((k, k), |(i, j)| {
            (cov[[i, i]] + cov[[j, j]] - 2.0 * cov[[i, j]]).max(0.0).sqrt()
        });
        Ok(FreeEnergyDifferences { delta_f, d_delta_f })
    }

    /// Compute the effective sample number of each state
    ///
    /// The effective sample number $n_\mathrm{eff}(k)$ estimates how many samples contribute to
    /// averages at state $k$, using the Kish (1965) formula
    ///
    /// $$
    ///     n_\mathrm{eff}(k) = \frac{(\sum_{n=1}^N W_{nk})^2}{\sum_{n=1}^N W_{nk}^2}
    /// $$
    ///
    /// It is valid for both sampled and unsampled states, and is most useful to diagnose when
    /// only a few samples dominate an extrapolated state.
    pub fn n_eff(&self) -> Array1<f64> {
        self.w
            .columns()
            .into_iter()
            .map(|col| {
                let sum = col.sum();
                sum * sum / col.dot(&col)
            })
            .collect()
    }
}

/// Inputs resolved during building
#[derive(Debug, Clone, Default)]
struct Resolved {
    sizes: Array1<usize>,
    labels: Option<Array1<usize>>,
    base: usize,
    diagnostics: Vec<Diagnostic>,
}

/// Unbinned weighted histogram analysis method (UWHAM) for the analysis of samples drawn from
/// several distributions.
///
/// # Notes
///
/// Note that this method assumes the data are uncorrelated.
///
/// States without samples are extrapolated by reweighting the samples of the other states. This
/// is only reliable when those states overlap well with the sampled ones; poor overlap is not
/// detected, though [`UwhamResult::n_eff`] gives a hint.
///
/// # References
///
/// 1. Tan Z, Gallicchio E, Lapelosa M, Levy RM. Theory of binless multi-state free energy
/// estimation with applications to protein-ligand binding. J. Chem. Phys. 136:144102, 2012
/// <http://dx.doi.org/10.1063/1.3701175>
#[derive(Builder, Debug)]
#[builder(build_fn(validate = "Self::validate", name = "build_inner", private))]
pub struct Uwham {
    /// `log_q[[n, k]]` is the log unnormalized density of sample `n` under state `k`
    ///
    /// Usually the negative reduced potential energy. Every entry must be finite.
    log_q: Array2<f64>,

    /// `sizes[k]` is the number of samples drawn from state `k`
    ///
    /// Computed from the labels if not given.
    #[builder(setter(strip_option), default)]
    sizes: Option<Array1<usize>>,

    /// Which state is each sample from?
    ///
    /// Only the variance estimate with [`VarianceMethod::Labels`] uses these. Without them the
    /// samples are assumed to be in state order: the first `sizes[0]` samples are from state 0,
    /// the next `sizes[1]` from state 1, and so forth.
    #[builder(setter(strip_option), default)]
    labels: Option<Array1<usize>>,

    /// State whose free energy is fixed at zero; defaults to the first sampled state
    #[builder(setter(strip_option), default)]
    base: Option<usize>,

    /// Set to the initial free energies to use as a guess
    #[builder(default)]
    initial_free_energies: InitialFreeEnergies,

    /// How to estimate the variances of the free energies
    #[builder(default)]
    variance: VarianceMethod,

    /// The minimiser and its convergence settings
    #[builder(default)]
    solver: TrustRegionNewton,

    /// Validated and derived inputs
    ///
    /// Always consistent with the other fields after `init`, which is enforced by `Uwham` only
    /// being constructable via the builder.
    #[builder(setter(skip), default)]
    resolved: Resolved,
}

impl UwhamBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(log_q) = &self.log_q {
            if log_q.is_empty() {
                return Err("log_q must have at least one sample and one state".to_string());
            }
        }

        let has_sizes = matches!(self.sizes, Some(Some(_)));
        let has_labels = matches!(self.labels, Some(Some(_)));
        if !has_sizes && !has_labels {
            return Err("Either labels or sizes must be provided".to_string());
        }

        Ok(())
    }

    /// Build the UWHAM estimator, validating the inputs
    pub fn build(&self) -> Result<Uwham> {
        self.build_inner()?.init()
    }
}

/// Count the samples with each label
fn bincount(labels: &Array1<usize>, k: usize) -> Array1<usize> {
    let mut counts = Array1::zeros(k);
    for &label in labels {
        counts[label] += 1;
    }
    counts
}

/// Labels for samples stored in state order
fn ordered_labels(sizes: &Array1<usize>) -> Array1<usize> {
    sizes
        .iter()
        .enumerate()
        .flat_map(|(k, &n)| std::iter::repeat(k).take(n))
        .collect()
}

impl Uwham {
    /// Get a new builder for the `Uwham` struct. `Uwham` can only be constructed via the builder.
    pub fn builder() -> UwhamBuilder {
        UwhamBuilder::default()
    }

    /// Validate the inputs and derive sizes, labels and baseline; called by build methods
    fn init(mut self) -> Result<Self> {
        let (n_tot, k) = self.log_q.dim();

        if self.log_q.iter().any(|v| !v.is_finite()) {
            return Err(UwhamError::Validation(
                "log_q must contain only finite values".to_string(),
            ));
        }

        if let Some(labels) = &self.labels {
            if labels.len() != n_tot {
                return Err(UwhamError::ArrayLengthMismatch(labels.len(), n_tot));
            }
            if let Some(&label) = labels.iter().find(|&&label| label >= k) {
                return Err(UwhamError::Validation(format!(
                    "label {} is not one of the {} states",
                    label, k
                )));
            }
        }

        let sizes = match (&self.sizes, &self.labels) {
            (Some(sizes), _) => sizes.clone(),
            (None, Some(labels)) => bincount(labels, k),
            (None, None) => {
                return Err(UwhamError::Validation(
                    "Either labels or sizes must be provided".to_string(),
                ))
            }
        };

        if sizes.sum() != n_tot {
            return Err(UwhamError::Validation(format!(
                "Inconsistent sum of sizes ({}) and number of samples ({})",
                sizes.sum(),
                n_tot
            )));
        }
        if sizes.len() != k {
            return Err(UwhamError::Validation(format!(
                "Inconsistent length of sizes ({}) and number of states ({})",
                sizes.len(),
                k
            )));
        }
        if let Some(labels) = &self.labels {
            if bincount(labels, k) != sizes {
                return Err(UwhamError::Validation(
                    "Inconsistent labels and sizes".to_string(),
                ));
            }
        }

        let base = match self.base {
            Some(base) if base >= k => return Err(UwhamError::BaselineOutOfRange(base, k)),
            Some(base) if sizes[base] == 0 => return Err(UwhamError::UnsampledBaseline(base)),
            Some(base) => base,
            None => sizes.iter().position(|&n| n > 0).ok_or_else(|| {
                UwhamError::Validation("No state has any samples".to_string())
            })?,
        };

        if let InitialFreeEnergies::Specified(energies) = &self.initial_free_energies {
            if energies.len() != k {
                return Err(UwhamError::ArrayLengthMismatch(energies.len(), k));
            }
            if energies.iter().any(|f| !f.is_finite()) {
                return Err(UwhamError::Validation(
                    "initial free energies must be finite".to_string(),
                ));
            }
        }

        let mut diagnostics = Vec::new();
        let labels = match &self.labels {
            Some(labels) => Some(labels.clone()),
            None if self.variance == VarianceMethod::Labels => {
                log::warn!("Assuming samples are ordered by state, as no labels were given");
                diagnostics.push(Diagnostic::LabelsAssumedOrdered);
                Some(ordered_labels(&sizes))
            }
            None => None,
        };

        self.resolved = Resolved {
            sizes,
            labels,
            base,
            diagnostics,
        };
        Ok(self)
    }

    /// $N$, the total number of samples from all states
    pub fn n_tot(&self) -> usize {
        self.log_q.nrows()
    }

    /// $K$, the total number of states
    pub fn k(&self) -> usize {
        self.log_q.ncols()
    }

    /// `log_q[[n, k]]` is the log unnormalized density of sample `n` under state `k`
    pub fn log_q(&self) -> &Array2<f64> {
        &self.log_q
    }

    /// `sizes[k]` is the number of samples drawn from state `k`
    pub fn sizes(&self) -> &Array1<usize> {
        &self.resolved.sizes
    }

    /// Which state is each sample from, if known or assumed
    pub fn labels(&self) -> Option<&Array1<usize>> {
        self.resolved.labels.as_ref()
    }

    /// State whose free energy is fixed at zero
    pub fn base(&self) -> usize {
        self.resolved.base
    }

    /// Estimate free energies, weights and variances with the configured minimiser
    pub fn estimate(&self) -> Result<UwhamResult> {
        self.estimate_with(&self.solver)
    }

    /// Estimate free energies, weights and variances with a custom minimiser
    pub fn estimate_with<S: Minimizer>(&self, minimizer: &S) -> Result<UwhamResult> {
        let Resolved {
            sizes,
            labels,
            base,
            diagnostics,
        } = &self.resolved;
        let base = *base;
        let mut diagnostics = diagnostics.clone();
        let k = self.k();

        let sampled: Vec<usize> = (0..k).filter(|&i| sizes[i] > 0).collect();
        let sampled_base = sampled
            .iter()
            .position(|&i| i == base)
            .ok_or(UwhamError::UnsampledBaseline(base))?;
        let map = IndexMap::new(sampled.len(), sampled_base);

        // Densities relative to the baseline keep the exponentials in range
        let shifted = &self.log_q - &self.log_q.column(base).insert_axis(Axis(1));
        let log_q_kn = shifted.t().select(Axis(0), &sampled);
        let sampled_sizes = sizes.select(Axis(0), &sampled);
        let likelihood = Likelihood::new(log_q_kn.view(), sampled_sizes.view(), sampled_base);

        let init = self.initial_free_energies.to_array(k);
        let x0 = map.delete(init.select(Axis(0), &sampled).view());
        let solver = minimizer.minimize(&likelihood, x0)?;
        if !solver.converged {
            diagnostics.push(Diagnostic::NotConverged {
                status: solver.status,
                iterations: solver.iterations,
                gradient_norm: solver.gradient_norm,
            });
        }

        let mut ze = Array1::zeros(k);
        for (&i, &z) in sampled
            .iter()
            .zip(likelihood.full_free_energies(&solver.x).iter())
        {
            ze[i] = z;
        }

        let rho = likelihood.rho();
        let mut w = weights(&shifted, &ze, &sampled, rho);
        let z = w.sum_axis(Axis(0)) / self.n_tot() as f64;
        let check = z.select(Axis(0), &sampled);

        // Extrapolate the unsampled states by reweighting
        for i in (0..k).filter(|&i| sizes[i] == 0) {
            ze[i] = z[i].ln();
            w.column_mut(i).mapv_inplace(|v| v / z[i]);
        }

        let variance = match self.variance {
            VarianceMethod::None => VarianceEstimate::NotRequested,
            method => match covariance(method, &w, rho, &sampled, base, labels.as_ref()) {
                Ok(variance) => VarianceEstimate::Estimated(variance),
                Err(UwhamError::Singular(system)) => {
                    log::warn!("Could not estimate variances: {} is singular", system);
                    diagnostics.push(Diagnostic::SingularVariance(system));
                    VarianceEstimate::Singular { system }
                }
                Err(e) => return Err(e),
            },
        };

        Ok(UwhamResult {
            ze,
            w,
            check,
            variance,
            solver,
            labels: labels.clone(),
            sizes: sizes.clone(),
            base,
            diagnostics,
        })
    }

    /// Estimate free energies by fitting successively finer subsamples of the data
    ///
    /// The first fit uses every `ufactormax`-th sample. The stride is halved (rounding down) after
    /// each fit, with each fit's free energies the initial guess of the next, until it drops below
    /// `ufactormin` or 1. The last fit always uses every sample. Coarse fits are cheap and give
    /// the minimiser a well-conditioned start on large data sets.
    ///
    /// With `ufactormax == ufactormin == 1.0` this is a single fit, identical to
    /// [`Uwham::estimate`].
    ///
    /// Subsampling uses the labels, or labels assumed from state order if none were given. The
    /// final full-data fit keeps the original sizes and labels.
    pub fn estimate_multiresolution(&self, ufactormax: f64, ufactormin: f64) -> Result<UwhamResult> {
        if !(ufactormin > 0.0) || !ufactormax.is_finite() || ufactormax < ufactormin {
            return Err(UwhamError::Validation(format!(
                "Invalid stride range [{}, {}]",
                ufactormin, ufactormax
            )));
        }

        // The first stage has the largest stride, so below 2 nothing is subsampled
        if ufactormax < 2.0 {
            return self.estimate();
        }

        let mut diagnostics = Vec::new();
        let labels = match &self.resolved.labels {
            Some(labels) => labels.clone(),
            None => {
                log::warn!("Assuming samples are ordered by state, as no labels were given");
                diagnostics.push(Diagnostic::LabelsAssumedOrdered);
                ordered_labels(&self.resolved.sizes)
            }
        };

        let mut init = self.initial_free_energies.clone();
        let mut last = None;
        let mut ufactor = ufactormax;
        while ufactor >= ufactormin && ufactor >= 1.0 {
            let stride = ufactor as usize;
            let result = self.subsample(stride, &labels, init)?.estimate()?;
            init = InitialFreeEnergies::Specified(result.ze.to_vec());
            last = Some((stride, result));
            ufactor /= 2.0;
        }

        let mut result = match last {
            Some((1, result)) => result,
            _ => self.subsample(1, &labels, init)?.estimate()?,
        };
        for diagnostic in diagnostics {
            if !result.diagnostics.contains(&diagnostic) {
                result.diagnostics.insert(0, diagnostic);
            }
        }
        Ok(result)
    }

    /// Every `stride`-th sample, with the same settings and the given initial guess
    ///
    /// A unit stride keeps the original sizes and labels.
    fn subsample(
        &self,
        stride: usize,
        labels: &Array1<usize>,
        initial_free_energies: InitialFreeEnergies,
    ) -> Result<Self> {
        let (log_q, sizes, labels) = if stride == 1 {
            (self.log_q.clone(), self.sizes.clone(), self.labels.clone())
        } else {
            let rows: Vec<usize> = (0..self.n_tot()).step_by(stride).collect();
            (
                self.log_q.select(Axis(0), &rows),
                None,
                Some(labels.select(Axis(0), &rows)),
            )
        };
        log::info!(
            "Fitting every {} sample(s): {} of {}",
            stride,
            log_q.nrows(),
            self.n_tot()
        );
        Uwham {
            log_q,
            sizes,
            labels,
            base: self.base,
            initial_free_energies,
            variance: self.variance,
            solver: self.solver.clone(),
            resolved: Resolved::default(),
        }
        .init()
    }
}

/// Normalized weights `w[[n, k]] = q_k(x_n) e^{-ze[k]} / Σ_j rho[j] q_j(x_n) e^{-ze[j]}`, with the
/// sum running over sampled states only
fn weights(
    log_q: &Array2<f64>,
    ze: &Array1<f64>,
    sampled: &[usize],
    rho: &Array1<f64>,
) -> Array2<f64> {
    let mut w = Array2::<f64>::zeros(log_q.raw_dim());
    Zip::from(w.rows_mut())
        .and(log_q.rows())
        .for_each(|mut w_row, log_q_row| {
            Zip::from(&mut w_row)
                .and(&log_q_row)
                .and(ze)
                .for_each(|w, &lq, &z| *w = (lq - z).exp());
            let q_sum: f64 = sampled
                .iter()
                .zip(rho.iter())
                .map(|(&i, &r)| w_row[i] * r)
                .sum();
            w_row /= q_sum;
        });
    w
}

/// Asymptotic covariance of the free energies from the Jacobian of the self-consistency equations
fn covariance(
    method: VarianceMethod,
    w: &Array2<f64>,
    rho: &Array1<f64>,
    sampled: &[usize],
    base: usize,
    labels: Option<&Array1<usize>>,
) -> Result<Variance> {
    let (n_tot, k) = w.dim();
    let n = n_tot as f64;
    let map = IndexMap::new(k, base);

    let o = w.t().dot(w) / n;
    let mut d = Array2::<f64>::zeros((k, k));
    for (&i, &r) in sampled.iter().zip(rho.iter()) {
        d.column_mut(i).assign(&(&o.column(i) * r));
    }
    let h = map.delete_square((d - Array2::<f64>::eye(k)).view());

    let cov = match (method, labels) {
        (VarianceMethod::Fisher, _) => {
            // H⁻¹G in closed form at the solution: -O + 1 O[base, :]
            let mut ihg = -&o;
            for mut row in ihg.rows_mut() {
                row += &o.row(base);
            }
            let ihg = map.delete_square(ihg.view());
            // iHG H⁻ᵀ = (H⁻¹ iHGᵀ)ᵀ
            solve(h.view(), ihg.t())
                .ok_or(UwhamError::Singular("fixed-point Jacobian"))?
                .reversed_axes()
        }
        (VarianceMethod::Labels, Some(labels)) => {
            // Mean weights of the samples from each sampled state; sums would put CᵀDiag(ρ)C on
            // an O(N²) scale against the O(1) entries of O
            let mut row_of = vec![None; k];
            for (r, &i) in sampled.iter().enumerate() {
                row_of[i] = Some(r);
            }
            let mut c = Array2::<f64>::zeros((sampled.len(), k));
            for (w_row, &label) in w.rows().into_iter().zip(labels.iter()) {
                if let Some(r) = row_of[label] {
                    let mut c_row = c.row_mut(r);
                    c_row += &w_row;
                }
            }
            for (mut c_row, &r) in c.rows_mut().into_iter().zip(rho.iter()) {
                c_row /= r * n;
            }

            let rho_c = &c * &rho.view().insert_axis(Axis(1));
            let g = map.delete_square((&o - &c.t().dot(&rho_c)).view());

            let h_inv_g = solve(h.view(), g.view())
                .ok_or(UwhamError::Singular("fixed-point Jacobian"))?;
            solve(h.view(), h_inv_g.t())
                .ok_or(UwhamError::Singular("fixed-point Jacobian"))?
                .reversed_axes()
        }
        (VarianceMethod::Labels, None) => {
            return Err(UwhamError::Validation(
                "Labels are required for the label-based variance".to_string(),
            ))
        }
        (VarianceMethod::None, _) => {
            return Err(UwhamError::Validation(
                "No variance method was requested".to_string(),
            ))
        }
    } / n;

    Ok(Variance {
        ve: map.insert(cov.diag(), 0.0),
        covariance: map.insert_square(cov.view(), 0.0),
    })
}
