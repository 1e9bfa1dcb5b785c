use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize tracing; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = stepstore::cli::run_cli() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
