use ndarray::array;
use uwham_rs::testsystems::HarmonicOscillator;
use uwham_rs::*;

fn main() -> Result<()> {
    let testcase = HarmonicOscillator::default();
    // The last state is left unsampled and is extrapolated
    let sample = testcase.sample_with_seed(array![200, 200, 200, 200, 0], 1)?;

    let result = Uwham::builder()
        .log_q(sample.log_q)
        .labels(sample.labels)
        .variance(VarianceMethod::Labels)
        .build()?
        .estimate()?;

    let analytical = testcase.analytical_free_energies(result.base);
    let ve = result.ve()?;
    println!("state       ze       se    exact");
    for k in 0..result.ze.len() {
        println!(
            "{:>5} {:>8.4} {:>8.4} {:>8.4}",
            k,
            result.ze[k],
            ve[k].sqrt(),
            analytical[k]
        );
    }
    println!("check: {}", result.check);
    println!("n_eff: {}", result.n_eff());
    for diagnostic in &result.diagnostics {
        println!("{:?}", diagnostic);
    }

    Ok(())
}
