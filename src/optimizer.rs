//! Unconstrained minimisation of smooth convex objectives with exact second derivatives.
//!
//! [`Minimizer`] is the contract the estimator relies on; [`TrustRegionNewton`] is the bundled
//! implementation, an exact trust-region Newton method that solves each subproblem through an
//! eigendecomposition of the Hessian (Nocedal & Wright, *Numerical Optimization*, ch. 4).

use crate::errors::*;
use crate::linalg::{norm, symmetric_eigen};
use ndarray::{Array1, Array2};
use std::fmt;

/// Objective value, gradient and Hessian at one point
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Objective value
    pub value: f64,
    /// Gradient of the objective
    pub gradient: Array1<f64>,
    /// Hessian of the objective
    pub hessian: Array2<f64>,
}

/// An objective with analytic gradient and Hessian
pub trait TwiceDifferentiable {
    /// Number of free coordinates
    fn dim(&self) -> usize;

    /// Evaluate the objective and its first two derivatives at `x`
    fn evaluate(&self, x: &Array1<f64>) -> Evaluation;
}

/// Anything that can minimise a [`TwiceDifferentiable`] objective
///
/// Failing to converge is not an error: the best iterate is returned with
/// [`Minimum::converged`] unset.
pub trait Minimizer {
    /// Minimise `objective` starting from `x0`
    fn minimize<F: TwiceDifferentiable>(&self, objective: &F, x0: Array1<f64>) -> Result<Minimum>;
}

/// Why a minimisation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStatus {
    /// The gradient norm fell below the tolerance
    GradientTolerance,
    /// The iteration limit was reached
    MaxIterations,
    /// The quadratic model stopped predicting any decrease of the objective
    Stalled,
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GradientTolerance => write!(f, "gradient norm below tolerance"),
            Self::MaxIterations => write!(f, "maximum number of iterations reached"),
            Self::Stalled => write!(f, "quadratic model failed to predict improvement"),
        }
    }
}

/// Result of a minimisation
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    /// Best point found
    pub x: Array1<f64>,
    /// Objective value at `x`
    pub value: f64,
    /// Euclidean norm of the gradient at `x`
    pub gradient_norm: f64,
    /// Whether the convergence criterion was met
    pub converged: bool,
    /// Why the minimisation stopped
    pub status: TerminationStatus,
    /// Number of iterations performed
    pub iterations: usize,
}

/// Exact trust-region Newton minimiser
///
/// Each step minimises the local quadratic model within a ball of the current trust radius. The
/// radius shrinks when the model predicts the objective badly and grows when a boundary step
/// predicts it well.
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct TrustRegionNewton {
    /// Set to limit the maximum number of iterations performed
    #[builder(default = "1000")]
    max_iterations: usize,

    /// Converge when the Euclidean norm of the gradient falls below this
    #[builder(default = "1.0e-10")]
    gradient_tolerance: f64,

    /// Trust radius of the first step
    #[builder(default = "1.0")]
    initial_trust_radius: f64,

    /// Upper bound on the trust radius
    #[builder(default = "1000.0")]
    max_trust_radius: f64,

    /// Accept a step when the ratio of actual to predicted decrease exceeds this
    #[builder(default = "0.15")]
    eta: f64,
}

impl Default for TrustRegionNewton {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            gradient_tolerance: 1.0e-10,
            initial_trust_radius: 1.0,
            max_trust_radius: 1000.0,
            eta: 0.15,
        }
    }
}

impl TrustRegionNewton {
    /// Get a new builder for the `TrustRegionNewton` struct
    pub fn builder() -> TrustRegionNewtonBuilder {
        TrustRegionNewtonBuilder::default()
    }

    /// The iteration limit
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// The gradient norm convergence tolerance
    pub fn gradient_tolerance(&self) -> f64 {
        self.gradient_tolerance
    }
}

impl Minimizer for TrustRegionNewton {
    fn minimize<F: TwiceDifferentiable>(&self, objective: &F, x0: Array1<f64>) -> Result<Minimum> {
        let mut x = x0;
        let mut current = objective.evaluate(&x);
        if !current.value.is_finite() {
            return Err(UwhamError::NonFiniteObjective);
        }
        let mut gradient_norm = norm(current.gradient.view());
        let mut radius = self.initial_trust_radius;
        let mut iterations = 0;

        let status = loop {
            if gradient_norm < self.gradient_tolerance {
                break TerminationStatus::GradientTolerance;
            }
            if iterations >= self.max_iterations {
                break TerminationStatus::MaxIterations;
            }
            iterations += 1;

            let (step, hits_boundary) =
                solve_subproblem(&current.gradient, &current.hessian, radius);
            let predicted = -(current.gradient.dot(&step)
                + 0.5 * step.dot(&current.hessian.dot(&step)));
            if !(predicted > 0.0) {
                break TerminationStatus::Stalled;
            }

            let candidate_x = &x + &step;
            let candidate = objective.evaluate(&candidate_x);
            let candidate_norm = norm(candidate.gradient.view());

            // Close to the optimum the predicted decrease drops below the rounding error of the
            // objective, so the ratio test is meaningless; judge the step on the gradient instead.
            let noise = 64.0 * f64::EPSILON * current.value.abs().max(1.0);
            let accept = if !candidate.value.is_finite() {
                radius *= 0.25;
                false
            } else if predicted <= noise {
                candidate_norm < gradient_norm
            } else {
                let ratio = (current.value - candidate.value) / predicted;
                if ratio < 0.25 {
                    radius *= 0.25;
                } else if ratio > 0.75 && hits_boundary {
                    radius = (2.0 * radius).min(self.max_trust_radius);
                }
                ratio > self.eta
            };

            log::debug!(
                "trust-region iteration {}: value {:.12e}, |g| {:.3e}, radius {:.3e}, accepted {}",
                iterations,
                candidate.value,
                candidate_norm,
                radius,
                accept
            );

            if accept {
                x = candidate_x;
                current = candidate;
                gradient_norm = candidate_norm;
            } else if predicted <= noise {
                break TerminationStatus::Stalled;
            }
        };

        let converged = status == TerminationStatus::GradientTolerance;
        if converged {
            log::info!(
                "Minimisation converged after {} iterations (|g| = {:.3e})",
                iterations,
                gradient_norm
            );
        } else {
            log::warn!(
                "Minimisation stopped after {} iterations without converging: {} (|g| = {:.3e})",
                iterations,
                status,
                gradient_norm
            );
        }

        Ok(Minimum {
            x,
            value: current.value,
            gradient_norm,
            converged,
            status,
            iterations,
        })
    }
}

/// Minimise `g·p + ½ pᵀHp` subject to `|p| ≤ radius`
///
/// Returns the step and whether it lies on the trust-region boundary. The solution satisfies
/// `(H + λI) p = -g` with `H + λI` positive semidefinite and `λ (radius - |p|) = 0`.
fn solve_subproblem(g: &Array1<f64>, h: &Array2<f64>, radius: f64) -> (Array1<f64>, bool) {
    let (values, vectors) = symmetric_eigen(h.view());
    // Gradient in the eigenbasis
    let g_eig = vectors.t().dot(g);

    let scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0);
    let degenerate = 1e-12 * scale;
    let lambda_min = values.get(0).copied().unwrap_or(0.0);

    let step_norm = |lambda: f64| -> f64 {
        g_eig
            .iter()
            .zip(values.iter())
            .map(|(gi, vi)| (gi / (vi + lambda)).powi(2))
            .sum::<f64>()
            .sqrt()
    };
    let step_at = |lambda: f64| -> Array1<f64> {
        let coeffs: Array1<f64> = g_eig
            .iter()
            .zip(values.iter())
            .map(|(gi, vi)| {
                let d = vi + lambda;
                if d.abs() > degenerate {
                    -gi / d
                } else {
                    0.0
                }
            })
            .collect();
        vectors.dot(&coeffs)
    };

    // Interior Newton step
    if lambda_min > degenerate && step_norm(0.0) <= radius {
        return (step_at(0.0), false);
    }

    let lower = (-lambda_min).max(0.0);

    // Hard case: the gradient has no component along the lowest eigenvectors, so no multiplier
    // above `lower` reaches the boundary. Move along the lowest eigenvector to fill the ball.
    let shifted_norm = step_norm(lower + degenerate);
    if !(shifted_norm > radius) {
        let mut step = step_at(lower);
        let remaining = radius * radius - step.dot(&step);
        if remaining > 0.0 {
            step.scaled_add(remaining.sqrt(), &vectors.column(0));
        }
        return (step, true);
    }

    // Newton iteration on the secular equation 1/radius - 1/|p(λ)| = 0, which is monotone from
    // the left of its root.
    let mut lambda = if lambda_min > degenerate {
        0.0
    } else {
        lower + degenerate
    };
    for _ in 0..200 {
        let p_norm = step_norm(lambda);
        if (p_norm - radius).abs() <= 1e-10 * radius {
            break;
        }
        let curvature: f64 = g_eig
            .iter()
            .zip(values.iter())
            .map(|(gi, vi)| gi * gi / (vi + lambda).powi(3))
            .sum();
        let next = lambda + (1.0 / radius - 1.0 / p_norm) * p_norm.powi(3) / curvature;
        lambda = if next > lower { next } else { 0.5 * (lambda + lower) };
    }

    (step_at(lambda), true)
}
