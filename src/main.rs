use std::io::{self, Read, Write};

use clap::Parser;

use cardstream::config::{load_config, AssemblerConfig};
use cardstream::observability::init_tracing;
use cardstream::{AssemblerEvent, StartOptions, StreamStage, StreamingAssembler};

/// Stream a card JSON document and print every assembler event as one
/// JSON line.
#[derive(Debug, Parser)]
#[command(name = "cardstream", version, about)]
struct Cli {
    /// YAML configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
    /// Skip every delay and assemble the document in one tick.
    #[arg(long)]
    instant: bool,
    /// Seed for the chunk-size sequence.
    #[arg(long, value_name = "N")]
    seed: Option<u64>,
    /// Input document; stdin when absent or `-`.
    #[arg(value_name = "FILE")]
    input: Option<String>,
}

impl Cli {
    fn start_options(&self) -> StartOptions {
        StartOptions {
            instant: self.instant,
            seed: self.seed,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => load_config(path).unwrap_or_else(|e| {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }),
        None => AssemblerConfig::default(),
    };
    init_tracing(&config.log_level);

    let source = read_source(cli.input.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to read input: {e}");
        std::process::exit(1);
    });

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    let code = runtime.block_on(run(config, source, cli.start_options()));
    std::process::exit(code);
}

fn read_source(input: Option<&str>) -> io::Result<String> {
    match input {
        None | Some("-") => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
        Some(path) => std::fs::read_to_string(path),
    }
}

/// Stream `source` and print every event as one JSON line. Returns the
/// process exit code.
async fn run(config: AssemblerConfig, source: String, options: StartOptions) -> i32 {
    let assembler = match StreamingAssembler::new(config) {
        Ok(assembler) => assembler,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            return 1;
        }
    };
    let mut events = assembler.subscribe();
    if let Err(err) = assembler.start(source, options) {
        eprintln!("Failed to start session: {err}");
        return 1;
    }

    while let Some(event) = events.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => {
                if writeln!(io::stdout().lock(), "{line}").is_err() {
                    // Downstream closed the pipe.
                    assembler.stop();
                    return 1;
                }
            }
            Err(err) => tracing::error!("failed to encode event: {err}"),
        }
        if let AssemblerEvent::Stage(transition) = &event {
            if transition.to.is_terminal() {
                if let Some(err) = assembler.last_error() {
                    eprintln!("Session failed: {err}");
                }
                return i32::from(transition.to != StreamStage::Complete);
            }
        }
    }
    1
}
