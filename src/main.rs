//! sandbox-filter CLI
//!
//! ```text
//! sandbox-filter <config.json> [--install] [--json-logs]
//! ```
//!
//! Without `--install` the policy is only assembled and its summary printed
//! as JSON. With `--install` the filter is applied to this process, which
//! then exits; useful to check that the host kernel accepts it.

use sandbox_filter::filter::{self, SyscallFilter};
use sandbox_filter::logging::init_logging;
use sandbox_filter::FilterConfig;
use std::env;
use std::process::ExitCode;

const USAGE: &str = "usage: sandbox-filter <config.json> [--install] [--json-logs]";

struct Args {
    config_path: String,
    install: bool,
    json_logs: bool,
}

fn parse_args() -> Option<Args> {
    let mut config_path = None;
    let mut install = false;
    let mut json_logs = false;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--install" => install = true,
            "--json-logs" => json_logs = true,
            _ if arg.starts_with("--") => return None,
            _ if config_path.is_none() => config_path = Some(arg),
            _ => return None,
        }
    }

    Some(Args {
        config_path: config_path?,
        install,
        json_logs,
    })
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = FilterConfig::from_file(&args.config_path)?;
    tracing::debug!(path = %args.config_path, ?config, "Loaded filter config");

    if args.install {
        filter::install(&config)?;
        tracing::info!("Syscall filters installed");
        return Ok(());
    }

    let policy = SyscallFilter::new()
        .with_violation_mode(config.violation)
        .assemble(&config.backend(), config.trust_flags())?;
    println!("{}", serde_json::to_string_pretty(&policy.summary())?);

    Ok(())
}

fn main() -> ExitCode {
    let Some(args) = parse_args() else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };

    if let Err(e) = init_logging(args.json_logs) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Syscall filter setup failed");
            ExitCode::FAILURE
        }
    }
}
