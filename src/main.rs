//! CortexKey Agent CLI
//!
//! Encrypted neural signatures from a single biosignal channel.

use clap::{Parser, Subcommand};
use cortexkey_agent::{
    collector::{MockMode, SampleSource, SourceMode, SystemClock},
    config::Config,
    core::{
        ConsoleSink, FileSink, OutputFormat, Passphrase, Pipeline, PipelineContext,
        SignatureCipher,
    },
    session::{SessionSummary, StopToken, Watchdog, LAST_SESSION_FILE},
    SECURITY_DECLARATION, VERSION,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "cortexkey")]
#[command(author = "CortexKey")]
#[command(version = VERSION)]
#[command(about = "Encrypted neural signatures from a single biosignal channel", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a signing session
    Start {
        /// Passphrase the signatures are sealed with
        #[arg(long, env = "CORTEXKEY_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,

        /// Skip hardware and use synthetic data only
        #[arg(long)]
        mock: bool,

        /// Synthetic identity pattern (authenticated or impostor)
        #[arg(long)]
        mode: Option<MockMode>,

        /// Serial port of the acquisition board
        #[arg(long)]
        device: Option<PathBuf>,

        /// Serial line speed (default 115200)
        #[arg(long)]
        baud: Option<u32>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Append signature records to this file
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Record format for --output (csv or jsonl)
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Hardware connection attempts before falling back to synthetic data
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Print signal quality every second
        #[arg(long)]
        show_quality: bool,
    },

    /// Decrypt a signature and print its feature vector
    Verify {
        /// Base64 signature as printed by `start`
        signature: String,

        #[arg(long, env = "CORTEXKEY_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },

    /// Show configuration and the last session
    Status,

    /// Display the data-handling declaration
    Security,

    /// Show configuration
    Config,
}

struct StartArgs {
    passphrase: Option<String>,
    mock: bool,
    mode: Option<MockMode>,
    device: Option<PathBuf>,
    baud: Option<u32>,
    duration: Option<u64>,
    output: Option<PathBuf>,
    format: Option<OutputFormat>,
    max_attempts: Option<u32>,
    show_quality: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Start {
            passphrase,
            mock,
            mode,
            device,
            baud,
            duration,
            output,
            format,
            max_attempts,
            show_quality,
        } => {
            cmd_start(StartArgs {
                passphrase,
                mock,
                mode,
                device,
                baud,
                duration,
                output,
                format,
                max_attempts,
                show_quality,
            });
        }
        Commands::Verify {
            signature,
            passphrase,
        } => {
            cmd_verify(&signature, passphrase);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Security => {
            cmd_security();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "cortexkey_agent=debug,cortexkey=debug"
    } else {
        "cortexkey_agent=info,cortexkey=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn cmd_start(args: StartArgs) {
    println!("CortexKey Agent v{VERSION}");
    println!();

    // Load configuration; CLI flags take precedence
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config ({e}), using defaults");
        Config::default()
    });
    config.passphrase = args.passphrase.map(Passphrase::new);
    if args.mock {
        config.force_mock = true;
    }
    if let Some(mode) = args.mode {
        config.mock_mode = mode;
    }
    if let Some(device) = args.device {
        config.device_path = Some(device);
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(secs) = args.duration {
        config.max_duration_secs = Some(secs);
    }
    if let Some(output) = args.output {
        config.output_path = Some(output);
    }
    if let Some(format) = args.format {
        config.output_format = format;
    }
    if let Some(attempts) = args.max_attempts {
        config.max_reconnect_attempts = attempts;
    }

    let context = match PipelineContext::new(&config) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!();
            eprintln!("Provide a passphrase with --passphrase or CORTEXKEY_PASSPHRASE.");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let stop = StopToken::new();
    ctrlc_handler(stop.clone());

    let clock = SystemClock::shared();
    let source = SampleSource::from_config(&config, clock.clone(), stop.clone());

    println!("Starting session...");
    match source.mode() {
        SourceMode::Hardware => {
            if let Some(path) = &config.device_path {
                println!(
                    "  Source: hardware ({} @ {} baud)",
                    path.display(),
                    config.baud_rate
                );
            }
            println!(
                "  Fallback: synthetic ({}) after {} failed attempts",
                config.mock_mode, config.max_reconnect_attempts
            );
        }
        SourceMode::Mock => println!("  Source: synthetic ({})", config.mock_mode),
    }
    println!("  Sample rate: {} Hz", config.sample_rate_hz);
    println!(
        "  Window: {} samples, step {} samples",
        config.window_size, config.step_size
    );
    println!(
        "  Filters: {} Hz notch, {}-{} Hz band-pass",
        config.notch_hz, config.bandpass_low_hz, config.bandpass_high_hz
    );
    if let Some(secs) = config.max_duration_secs {
        println!("  Auto-stop after {secs}s");
    }

    let mut pipeline = Pipeline::new(context, source, clock, config.sample_rate_hz, stop.clone());
    pipeline.add_sink(Box::new(ConsoleSink::new(args.show_quality)));

    if let Some(path) = &config.output_path {
        match FileSink::open(path, config.output_format) {
            Ok(sink) => {
                println!("  Output: {} ({:?})", path.display(), config.output_format);
                pipeline.add_sink(Box::new(sink));
            }
            Err(e) => eprintln!("Warning: Could not open {}: {e}", path.display()),
        }
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let mut watchdog = config
        .max_duration()
        .map(|limit| Watchdog::spawn(limit, stop.clone()));

    let summary = pipeline.run();

    if let Some(watchdog) = watchdog.as_mut() {
        watchdog.cancel();
    }

    let summary_path = config.data_path.join(LAST_SESSION_FILE);
    if let Err(e) = summary.save(&summary_path) {
        eprintln!("Warning: Could not save session summary: {e}");
    }

    // Final stats
    println!();
    println!("{}", summary.summary());
}

fn cmd_verify(signature: &str, passphrase: Option<String>) {
    let passphrase = match passphrase.map(Passphrase::new) {
        Some(p) if !p.is_blank() => p,
        _ => {
            eprintln!("Error: A passphrase is required (--passphrase or CORTEXKEY_PASSPHRASE)");
            std::process::exit(1);
        }
    };

    let cipher = SignatureCipher::new(passphrase);
    match cipher.open_base64(signature) {
        Ok(features) => {
            println!("Signature verified");
            println!();
            println!("  Theta power (4-8 Hz):   {:.4}", features.theta_power);
            println!("  Alpha power (8-13 Hz):  {:.4}", features.alpha_power);
            println!("  Beta power (13-30 Hz):  {:.4}", features.beta_power);
            println!("  Alpha/Theta ratio:      {:.4}", features.alpha_theta_ratio);
            println!("  Alpha/Beta ratio:       {:.4}", features.alpha_beta_ratio);
            println!("  Total power:            {:.4}", features.total_power);
        }
        Err(e) => {
            eprintln!("Verification failed: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("CortexKey Agent Status");
    println!("======================");
    println!();

    println!("Configuration:");
    match (&config.device_path, config.force_mock) {
        (Some(path), false) => println!("  Source: hardware ({})", path.display()),
        _ => println!("  Source: synthetic ({})", config.mock_mode),
    }
    println!("  Sample rate: {} Hz", config.sample_rate_hz);
    println!(
        "  Window: {} samples, step {} samples",
        config.window_size, config.step_size
    );
    match config.max_duration_secs {
        Some(secs) => println!("  Auto-stop: {secs}s"),
        None => println!("  Auto-stop: disabled"),
    }
    println!();

    let summary_path = config.data_path.join(LAST_SESSION_FILE);
    match SessionSummary::load(&summary_path) {
        Ok(Some(summary)) => {
            println!("Last session (started {}):", summary.started_at.format("%Y-%m-%d %H:%M:%S"));
            println!("{}", summary.summary());
        }
        Ok(None) => println!("No previous session data found."),
        Err(e) => eprintln!("Warning: Could not read {}: {e}", summary_path.display()),
    }
}

fn cmd_security() {
    println!("{SECURITY_DECLARATION}");
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(stop: StopToken) {
    let result = ctrlc::set_handler(move || {
        if stop.request_stop() {
            eprintln!();
            eprintln!("Stopping after the current sample...");
        }
    });
    if let Err(e) = result {
        eprintln!("Warning: Could not install Ctrl+C handler: {e}");
    }
}
