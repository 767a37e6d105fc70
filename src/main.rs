use clap::Parser;
use ring_pipeline::{
    logging, ConsoleReader, ConsoleSink, PipelineBuilder, PipelineConfig, ShutdownMode,
};
use std::io;

/// Filter integers typed on stdin and print survivors at a fixed pace
#[derive(Parser, Debug)]
#[command(name = "ring-pipeline", version)]
struct Cli {
    /// Circular buffer capacity; prompted for when omitted
    #[arg(short, long, allow_negative_numbers = true)]
    capacity: Option<i64>,

    /// Seconds between two buffer drains; prompted for when omitted
    #[arg(short, long, allow_negative_numbers = true)]
    interval: Option<i64>,

    /// Emit retained values on exit instead of discarding them
    #[arg(long)]
    flush_on_exit: bool,

    /// Log every value at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> ring_pipeline::Result<()> {
    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout();

    let mut config =
        PipelineConfig::prompt(&mut stdin, &mut stdout, cli.capacity, cli.interval)?;
    if cli.flush_on_exit {
        config = config.with_shutdown_mode(ShutdownMode::Flush);
    }

    let mut running = PipelineBuilder::filter_chain(config)
        .build()?
        .start(ConsoleSink::stdout())?;
    let input = running.take_input().ok_or_else(|| {
        ring_pipeline::PipelineError::ConfigError("pipeline input already taken".into())
    })?;

    match ConsoleReader::new(stdin, io::stdout()).run(input) {
        Ok(outcome) => {
            tracing::info!(?outcome, "input reader finished");
            running.wait()
        }
        Err(error) => {
            tracing::error!(%error, "input reader failed, stopping pipeline");
            running.shutdown()?;
            Err(error)
        }
    }
}
