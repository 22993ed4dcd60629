use seirhcd::{
    Ensemble, SeirhcdResult, aggregate,
    environment::RunEnvironment,
    output::{BAND_HEADERS, SCALAR_HEADERS, band_rows, scalar_rows},
};
use simple_logger::SimpleLogger;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> SeirhcdResult<()> {
    let env = RunEnvironment::from_stdin()?;

    let level = env.config.log_level_filter()?;
    // Logs go to stderr so stdout stays free for CSV output.
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("Logger unavailable: {e}");
    }
    log::info!("Replicate {}", env.replicate);

    // Run simulation
    let ensemble = Ensemble::new(env.config.clone())?;
    let output = ensemble.run();
    let summary = aggregate::summarize(&output)?;

    env.write_csv("seirhcd_bands.csv", &BAND_HEADERS, &band_rows(&summary))?;
    env.write_csv("seirhcd_scalars.csv", &SCALAR_HEADERS, &scalar_rows(&summary))?;
    Ok(())
}
