use approx::{assert_abs_diff_eq, assert_relative_eq};
use itertools::izip;
use nalgebra::{DMatrix, DVector};
use ndarray::{array, Array1, Axis};
use uwham_rs::testsystems::{HarmonicOscillator, Sample};
use uwham_rs::*;

fn oscillator_sample(n_k: &[usize], seed: u64) -> Result<Sample> {
    HarmonicOscillator::default().sample_with_seed(Array1::from(n_k.to_vec()), seed)
}

fn fit(sample: &Sample, variance: VarianceMethod, base: Option<usize>) -> Result<UwhamResult> {
    let mut builder = Uwham::builder();
    builder
        .log_q(sample.log_q.clone())
        .labels(sample.labels.clone())
        .variance(variance);
    if let Some(base) = base {
        builder.base(base);
    }
    builder.build()?.estimate()
}

#[test]
fn baseline_is_pinned_to_zero() -> anyhow::Result<()> {
    let sample = oscillator_sample(&[200; 5], 11)?;
    let result = fit(&sample, VarianceMethod::Fisher, Some(2))?;

    assert_eq!(result.base, 2);
    assert_eq!(result.ze[2], 0.0);
    assert_eq!(result.ve()?[2], 0.0);
    let cov = result.covariance()?;
    for k in 0..5 {
        assert_eq!(cov[[2, k]], 0.0);
        assert_eq!(cov[[k, 2]], 0.0);
    }
    Ok(())
}

#[test]
fn default_baseline_is_first_sampled_state() -> anyhow::Result<()> {
    let sample = oscillator_sample(&[0, 100, 100, 100, 100], 5)?;
    let result = fit(&sample, VarianceMethod::Fisher, None)?;
    assert_eq!(result.base, 1);
    assert_eq!(result.ze[1], 0.0);
    Ok(())
}

#[test]
fn weights_have_unit_column_means() -> anyhow::Result<()> {
    let sample = oscillator_sample(&[150, 150, 0, 150, 150], 3)?;
    let result = fit(&sample, VarianceMethod::None, None)?;

    assert!(result.solver.converged);
    assert!(result.is_self_consistent(1e-6));
    assert_eq!(result.check.len(), 4);
    let means = result.w.mean_axis(Axis(0)).unwrap();
    for mean in means.iter() {
        assert_abs_diff_eq!(*mean, 1.0, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn changing_the_baseline_shifts_free_energies() -> anyhow::Result<()> {
    let sample = oscillator_sample(&[200; 5], 17)?;
    let first = fit(&sample, VarianceMethod::Labels, Some(0))?;
    let third = fit(&sample, VarianceMethod::Labels, Some(3))?;

    for k in 0..5 {
        assert_abs_diff_eq!(third.ze[k], first.ze[k] - first.ze[3], epsilon = 1e-6);
    }
    for (a, b) in first.w.iter().zip(third.w.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-9, max_relative = 1e-6);
    }

    // The uncertainty of a difference does not depend on which state is pinned
    let diffs = first.free_energy_differences()?;
    let ve = third.ve()?;
    for k in 0..5 {
        assert_relative_eq!(diffs.d_delta_f[[3, k]], ve[k].sqrt(), epsilon = 1e-9, max_relative = 1e-6);
    }
    Ok(())
}

#[test]
fn single_state_is_trivial() -> anyhow::Result<()> {
    let result = Uwham::builder()
        .log_q(array![[0.3], [-1.2], [2.0]])
        .sizes(array![3])
        .build()?
        .estimate()?;

    assert_eq!(result.ze, array![0.0]);
    assert_eq!(result.ve()?, &array![0.0]);
    for w in result.w.iter() {
        assert_abs_diff_eq!(*w, 1.0, epsilon = 1e-15);
    }
    Ok(())
}

#[test]
fn free_energies_match_analytical_values() -> anyhow::Result<()> {
    let testcase = HarmonicOscillator::default();
    let sample = testcase.sample_with_seed(array![500, 500, 500, 500, 500], 2)?;
    let result = fit(&sample, VarianceMethod::Labels, None)?;
    let exact = testcase.analytical_free_energies(result.base);

    for (k, (ze, exact, ve)) in izip!(result.ze.iter(), exact.iter(), result.ve()?.iter()).enumerate() {
        if k == result.base {
            continue;
        }
        let se = ve.sqrt();
        assert!(se > 0.0);
        assert!(
            (ze - exact).abs() < 6.0 * se,
            "state {}: {} vs {} (se {})",
            k,
            ze,
            exact,
            se
        );
    }
    Ok(())
}

#[test]
fn unsampled_states_are_extrapolated() -> anyhow::Result<()> {
    let testcase = HarmonicOscillator::builder()
        .o_k(array![0.0, 0.5, 1.0])
        .k_k(array![1.0, 1.0, 1.0])
        .build()
        .map_err(anyhow::Error::msg)?;
    let sample = testcase.sample_with_seed(array![500, 500, 0], 8)?;
    let result = fit(&sample, VarianceMethod::Fisher, None)?;

    // Equal force constants give equal normalizers
    let se = result.ve()?[2].sqrt();
    assert!(se > 0.0);
    assert!(result.ze[2].abs() < 6.0 * se);
    assert_abs_diff_eq!(result.w.column(2).mean().unwrap(), 1.0, epsilon = 1e-12);
    assert!(result.n_eff()[2] < 1000.0);
    Ok(())
}

#[test]
fn both_variance_methods_give_comparable_errors() -> anyhow::Result<()> {
    let sample = oscillator_sample(&[300; 5], 23)?;
    let fisher = fit(&sample, VarianceMethod::Fisher, None)?;
    let labels = fit(&sample, VarianceMethod::Labels, None)?;

    assert_eq!(fisher.ze, labels.ze);
    for (f, l) in fisher.ve()?.iter().zip(labels.ve()?.iter()).skip(1) {
        assert!(*f > 0.0 && *l > 0.0);
        let ratio = f / l;
        assert!(ratio > 0.1 && ratio < 10.0, "fisher {} labels {}", f, l);
    }
    Ok(())
}

#[test]
fn label_variance_matches_replicate_spread() -> anyhow::Result<()> {
    let testcase = HarmonicOscillator::builder()
        .o_k(array![0.0, 1.0])
        .k_k(array![1.0, 1.0])
        .build()
        .map_err(anyhow::Error::msg)?;

    let replicates = 50;
    let mut estimates = Vec::with_capacity(replicates);
    let mut predicted = 0.0;
    for seed in 0..replicates as u64 {
        let sample = testcase.sample_with_seed(array![200, 200], 100 + seed)?;
        let result = fit(&sample, VarianceMethod::Labels, None)?;
        estimates.push(result.ze[1]);
        predicted += result.ve()?[1] / replicates as f64;
    }

    let estimates = Array1::from(estimates);
    let observed = estimates.var(1.0);
    let ratio = observed / predicted;
    assert!(ratio > 0.5 && ratio < 2.0, "observed {} predicted {}", observed, predicted);
    Ok(())
}

#[test]
fn multiresolution_with_unit_stride_is_a_single_fit() -> anyhow::Result<()> {
    let sample = oscillator_sample(&[100; 5], 4)?;
    let uwham = Uwham::builder()
        .log_q(sample.log_q.clone())
        .labels(sample.labels.clone())
        .build()?;

    let direct = uwham.estimate()?;
    let multi = uwham.estimate_multiresolution(1.0, 1.0)?;
    for (a, b) in direct.ze.iter().zip(multi.ze.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
    assert_eq!(direct.w.dim(), multi.w.dim());
    Ok(())
}

#[test]
fn multiresolution_with_unit_stride_matches_a_sizes_only_fit() -> anyhow::Result<()> {
    let sample = oscillator_sample(&[50; 5], 13)?;
    let uwham = Uwham::builder()
        .log_q(sample.log_q.clone())
        .sizes(sample.sizes.clone())
        .build()?;

    let direct = uwham.estimate()?;
    let multi = uwham.estimate_multiresolution(1.0, 1.0)?;
    assert_eq!(direct.ze, multi.ze);
    assert_eq!(direct.ve()?, multi.ve()?);
    assert_eq!(direct.labels, None);
    assert_eq!(multi.labels, None);
    assert_eq!(direct.diagnostics, multi.diagnostics);
    assert!(!multi.diagnostics.contains(&Diagnostic::LabelsAssumedOrdered));
    Ok(())
}

#[test]
fn multiresolution_ends_with_the_full_data() -> anyhow::Result<()> {
    let sample = oscillator_sample(&[100; 5], 9)?;
    let uwham = Uwham::builder()
        .log_q(sample.log_q.clone())
        .sizes(sample.sizes.clone())
        .build()?;

    let direct = uwham.estimate()?;
    let multi = uwham.estimate_multiresolution(4.0, 1.0)?;
    assert_eq!(multi.w.nrows(), 500);
    for (a, b) in direct.ze.iter().zip(multi.ze.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }
    // Sizes only, so subsampling assumed the samples were in state order
    assert!(multi.diagnostics.contains(&Diagnostic::LabelsAssumedOrdered));
    Ok(())
}

#[test]
fn multiresolution_appends_a_full_fit() -> anyhow::Result<()> {
    let sample = oscillator_sample(&[100; 5], 10)?;
    let uwham = Uwham::builder()
        .log_q(sample.log_q.clone())
        .labels(sample.labels.clone())
        .build()?;

    // Strides 6 and 3 only; the full data is still fitted last
    let multi = uwham.estimate_multiresolution(6.0, 2.0)?;
    assert_eq!(multi.w.nrows(), 500);
    assert!(multi.is_self_consistent(1e-6));
    Ok(())
}

#[test]
fn multiresolution_rejects_invalid_strides() -> anyhow::Result<()> {
    let sample = oscillator_sample(&[10; 5], 0)?;
    let uwham = Uwham::builder()
        .log_q(sample.log_q)
        .labels(sample.labels)
        .build()?;

    assert!(matches!(
        uwham.estimate_multiresolution(1.0, 2.0),
        Err(UwhamError::Validation(_))
    ));
    assert!(matches!(
        uwham.estimate_multiresolution(2.0, 0.0),
        Err(UwhamError::Validation(_))
    ));
    Ok(())
}

#[test]
fn non_convergence_is_reported_not_raised() -> anyhow::Result<()> {
    let sample = oscillator_sample(&[100; 5], 6)?;
    let solver = TrustRegionNewton::builder()
        .max_iterations(1)
        .build()
        .map_err(anyhow::Error::msg)?;
    let result = Uwham::builder()
        .log_q(sample.log_q)
        .labels(sample.labels)
        .solver(solver)
        .build()?
        .estimate()?;

    assert!(!result.solver.converged);
    assert_eq!(result.solver.status, TerminationStatus::MaxIterations);
    assert!(result.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::NotConverged {
            status: TerminationStatus::MaxIterations,
            ..
        }
    )));
    Ok(())
}

#[test]
fn initial_guess_does_not_change_the_solution() -> anyhow::Result<()> {
    let testcase = HarmonicOscillator::default();
    let sample = testcase.sample_with_seed(array![100, 100, 100, 100, 100], 12)?;
    let guess = testcase.analytical_free_energies(0);

    let from_zero = fit(&sample, VarianceMethod::None, None)?;
    let from_guess = Uwham::builder()
        .log_q(sample.log_q.clone())
        .labels(sample.labels.clone())
        .initial_free_energies(InitialFreeEnergies::from(guess.as_slice().unwrap()))
        .variance(VarianceMethod::None)
        .build()?
        .estimate()?;

    for (a, b) in from_zero.ze.iter().zip(from_guess.ze.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
    }
    Ok(())
}

/// Undamped Newton iteration, fine for well-overlapping states
#[derive(Debug)]
struct Newton;

impl Minimizer for Newton {
    fn minimize<F: TwiceDifferentiable>(&self, objective: &F, x0: Array1<f64>) -> Result<Minimum> {
        let n = objective.dim();
        let mut x = x0;
        for iteration in 0..50 {
            let eval = objective.evaluate(&x);
            let gradient_norm = eval.gradient.dot(&eval.gradient).sqrt();
            if gradient_norm < 1e-12 {
                return Ok(Minimum {
                    x,
                    value: eval.value,
                    gradient_norm,
                    converged: true,
                    status: TerminationStatus::GradientTolerance,
                    iterations: iteration,
                });
            }
            let h = DMatrix::from_fn(n, n, |i, j| eval.hessian[[i, j]]);
            let g = DVector::from_fn(n, |i, _| eval.gradient[i]);
            let step = h.lu().solve(&g).ok_or(UwhamError::Singular("Newton step"))?;
            for i in 0..n {
                x[i] -= step[i];
            }
        }
        let eval = objective.evaluate(&x);
        Ok(Minimum {
            gradient_norm: eval.gradient.dot(&eval.gradient).sqrt(),
            x,
            value: eval.value,
            converged: false,
            status: TerminationStatus::MaxIterations,
            iterations: 50,
        })
    }
}

#[test]
fn custom_minimizer_reaches_the_same_solution() -> anyhow::Result<()> {
    let testcase = HarmonicOscillator::builder()
        .o_k(array![0.0, 0.5, 1.0])
        .k_k(array![1.0, 1.0, 1.0])
        .build()
        .map_err(anyhow::Error::msg)?;
    let sample = testcase.sample_with_seed(array![100, 100, 100], 21)?;
    let uwham = Uwham::builder()
        .log_q(sample.log_q)
        .sizes(sample.sizes)
        .build()?;

    let newton = uwham.estimate_with(&Newton)?;
    let default = uwham.estimate()?;
    assert!(newton.solver.converged);
    for (a, b) in newton.ze.iter().zip(default.ze.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
    }
    Ok(())
}

#[test]
fn singular_variance_keeps_the_fit() -> anyhow::Result<()> {
    // The second state has no samples and no overlap with the first
    let result = Uwham::builder()
        .log_q(array![[0.0, -1e4], [0.1, -1e4], [0.2, -1e4]])
        .sizes(array![3, 0])
        .build()?
        .estimate()?;

    assert_eq!(result.ze[0], 0.0);
    assert_eq!(result.w.dim(), (3, 2));
    for w in result.w.column(0).iter() {
        assert_abs_diff_eq!(*w, 1.0, epsilon = 1e-15);
    }
    assert_eq!(
        result.variance,
        VarianceEstimate::Singular {
            system: "fixed-point Jacobian"
        }
    );
    assert!(result
        .diagnostics
        .contains(&Diagnostic::SingularVariance("fixed-point Jacobian")));
    assert!(matches!(
        result.ve(),
        Err(UwhamError::Singular("fixed-point Jacobian"))
    ));
    assert!(matches!(result.covariance(), Err(UwhamError::Singular(_))));
    assert!(matches!(
        result.free_energy_differences(),
        Err(UwhamError::Singular(_))
    ));
    Ok(())
}
