// Melody RNN CLI entry point.
//
// Trains on the given MIDI files and writes one generated melody.
// The pipeline: extract notes → build windows → train → sample → MIDI output.
//
// Usage:
//   cargo run -p melody_rnn -- INPUT.mid [INPUT.mid ...] [--output PATH]
//     [--config PATH] [--seed N] [--temperature T] [--epochs N]
//
// Set RUST_LOG=debug to see per-file note counts and every sampled note.

use melody_rnn::config::GeneratorConfig;
use melody_rnn::pipeline::run;
use std::path::{Path, PathBuf};

struct Args {
    inputs: Vec<PathBuf>,
    output: PathBuf,
    config: Option<PathBuf>,
    seed: Option<u64>,
    temperature: Option<f64>,
    epochs: Option<usize>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();

    let mut config = match &args.config {
        Some(path) => GeneratorConfig::load(path).unwrap_or_else(|e| {
            eprintln!("{e}");
            std::process::exit(1);
        }),
        None => GeneratorConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(t) = args.temperature {
        config.sampling.temperature = t;
    }
    if let Some(epochs) = args.epochs {
        config.model.epochs = epochs;
    }

    println!("=== Melody RNN ===");
    println!("Inputs: {}", args.inputs.len());
    println!("Output: {}", args.output.display());
    println!(
        "Window: {}..={} notes, hidden {}, {} epochs, temperature {}",
        config.sequence.min_seq_length,
        config.sequence.max_seq_length,
        config.model.hidden_size,
        config.model.epochs,
        config.sampling.temperature
    );
    println!();

    match run(&config, &args.inputs, &args.output) {
        Ok(summary) => {
            println!();
            println!("Seed: {}", summary.seed);
            println!(
                "Trained on {} notes ({} pitches), window {}, {} examples",
                summary.notes_extracted,
                summary.vocab_size,
                summary.window_length,
                summary.training_examples
            );
            if let Some(loss) = summary.final_loss {
                println!("Final loss: {loss:.4}");
            }
            println!(
                "Generated {} notes, {:.1}s ({:?})",
                summary.generated.len(),
                summary.total_duration,
                summary.stop_reason
            );
            println!();
            println!("Play with: timidity {} (or any MIDI player)", args.output.display());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Hand-rolled `std::env::args()` parsing, no clap.
fn parse_args() -> Args {
    let mut parsed = Args {
        inputs: Vec::new(),
        output: PathBuf::from("generated.mid"),
        config: None,
        seed: None,
        temperature: None,
        epochs: None,
    };
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--output" | "-o" => {
                i += 1;
                parsed.output = PathBuf::from(require(&args, i, "--output"));
            }
            "--config" => {
                i += 1;
                parsed.config = Some(PathBuf::from(require(&args, i, "--config")));
            }
            "--seed" => {
                i += 1;
                parsed.seed = Some(parse_value(&args, i, "--seed"));
            }
            "--temperature" => {
                i += 1;
                parsed.temperature = Some(parse_value(&args, i, "--temperature"));
            }
            "--epochs" => {
                i += 1;
                parsed.epochs = Some(parse_value(&args, i, "--epochs"));
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if other.starts_with("--") => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
            input => parsed.inputs.push(Path::new(input).to_path_buf()),
        }
        i += 1;
    }

    if parsed.inputs.is_empty() {
        eprintln!("At least one input MIDI file is required.");
        print_usage();
        std::process::exit(1);
    }
    parsed
}

fn require<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    args.get(i).map(String::as_str).unwrap_or_else(|| {
        eprintln!("{flag} requires a value");
        std::process::exit(1);
    })
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    args.get(i).and_then(|v| v.parse().ok()).unwrap_or_else(|| {
        eprintln!("{flag} requires a valid value");
        std::process::exit(1);
    })
}

fn print_usage() {
    println!("Usage: generate INPUT.mid [INPUT.mid ...] [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --output, -o <PATH>     Output MIDI file (default: generated.mid)");
    println!("  --config <PATH>         JSON config file (missing fields use defaults)");
    println!("  --seed <N>              PRNG seed for a reproducible run");
    println!("  --temperature <T>       Sampling temperature (default: 1.5)");
    println!("  --epochs <N>            Training epochs (default: 10)");
    println!("  --help, -h              Show this help");
}
