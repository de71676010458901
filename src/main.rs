use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use tabletop_runtime::config::Options;

/// RUST_LOG directives when set, otherwise info (debug with -v)
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(rust_log.unwrap_or_default())
}

fn main() {
    let options = Options::parse();

    // Setup logging
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(options.verbose, rust_log.as_deref()))
        .with_writer(std::io::stderr) // keep stdout for reports
        .init();

    match tabletop_runtime::runtime::run(&options) {
        Ok(message) => println!("{}", message),
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("exiting...");
            std::process::exit(e.code());
        }
    }
}
