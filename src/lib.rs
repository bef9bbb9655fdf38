#![warn(rust_2018_idioms, missing_docs, missing_debug_implementations)]

//! The unbinned weighted histogram analysis method (UWHAM) for estimating the log normalizing
//! constants (free energies) of multiple unnormalized densities from samples drawn from some of
//! them.
//!
//! Given the log unnormalized density of every sample under every state, UWHAM finds the free
//! energies $\zeta$ that make the mixture weights of each sampled state average to one, by
//! minimising a convex profile likelihood. States without samples are estimated by reweighting.
//! Asymptotic variances are available either from the Fisher information of the pooled sample or
//! from a sandwich estimator that accounts for the per-state sample sizes.
//!
//! ```
//! use uwham_rs::*;
//! use uwham_rs::testsystems::HarmonicOscillator;
//! use ndarray::array;
//!
//! let testcase = HarmonicOscillator::default();
//! let sample = testcase.sample_with_seed(array![100, 100, 100, 100, 100], 0).unwrap();
//!
//! let result = Uwham::builder()
//!     .log_q(sample.log_q)
//!     .labels(sample.labels)
//!     .variance(VarianceMethod::Labels)
//!     .build()
//!     .unwrap()
//!     .estimate()
//!     .unwrap();
//!
//! assert_eq!(result.ze[0], 0.0);
//! assert!(result.is_self_consistent(1e-6));
//! ```
//!
//! Please reference the following if you use this code in your research:
//!
//! [1] Tan Z, Gallicchio E, Lapelosa M, Levy RM. Theory of binless multi-state free energy
//! estimation with applications to protein-ligand binding. J. Chem. Phys. 136:144102, 2012.
//! <http://dx.doi.org/10.1063/1.3701175>

#[macro_use]
extern crate derive_builder;

pub mod errors;
pub mod likelihood;
mod linalg;
pub mod optimizer;
pub mod remap;
pub mod testsystems;
pub mod uwham;

pub use errors::*;
pub use optimizer::{
    Evaluation, Minimizer, Minimum, TerminationStatus, TrustRegionNewton,
    TrustRegionNewtonBuilder, TwiceDifferentiable,
};
pub use uwham::*;
