use anyhow::Result;
use sandpit::cli;
use tokio::io::BufReader;
use tokio::runtime::Runtime;

fn main() -> Result<()> {
    // Process CLI arguments first (before logging init for cleaner output)
    let options = match cli::process_cli() {
        cli::CliResult::Exit(code) => {
            if code == 0 {
                return Ok(());
            }
            std::process::exit(code);
        }
        cli::CliResult::Continue(options) => options,
    };
    sandpit::debug::init_log_bridge(options.log_level);

    log::info!("Starting sandpit controller v{}", sandpit::VERSION);
    // The controller routes by ids only and needs nothing from the config.
    // Loading it here still rejects a bad file before a renderer connects.
    let config = cli::load_config(options.config.as_deref())?;
    log::info!(
        "Query functions: {} / {}",
        config.bridge.query_function,
        config.bridge.cancel_function
    );

    let runtime = Runtime::new()?;
    let stats = runtime.block_on(sandpit::controller::run_controller(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    ))?;
    log::info!("Controller exited after {} envelopes", stats.received);
    Ok(())
}
