use anyhow::Result;
use clap::Parser;
use flowlens::{cli::Cli, pipeline};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let config = args.to_config()?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    pipeline::run(&config, args.format, &mut out)?;

    Ok(())
}
