use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use drift::{list_systems, Config, System};

#[derive(Parser, Debug)]
#[command(name = "drift", version, about = "Checks theorems of axiomatic systems")]
struct Cli {
    /// Directory containing `systems/`
    #[arg(long, default_value = ".", env = "DRIFT_ROOT")]
    root: PathBuf,

    /// Maximum number of case applications per reduction
    #[arg(long, env = "DRIFT_REDUCTION_LIMIT")]
    reduction_limit: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify a theorem and the theorems it depends on
    Verify { system: String, theorem: String },
    /// Verify every theorem of a system
    VerifyAll { system: String },
    /// Print the normal form of a ground expression
    Reduce { system: String, expr: String },
    /// Forget which theorems of a system are verified
    Clear { system: String },
    /// List the systems under the root directory
    Systems,
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = Config {
        root: cli.root,
        reduction_limit: cli.reduction_limit,
    };
    match cli.command {
        Command::Verify { system, theorem } => {
            let mut system = System::open(&config, &system)?;
            let report = system.verify(&theorem)?;
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
            if report.verified.is_empty() {
                println!("{theorem}: already verified");
            }
            for name in &report.verified {
                println!("{name}: verified");
            }
            Ok(true)
        }
        Command::VerifyAll { system } => {
            let mut system = System::open(&config, &system)?;
            let all = system.verify_all()?;
            for warning in &all.report.warnings {
                println!("warning: {warning}");
            }
            for name in &all.report.verified {
                println!("{name}: verified");
            }
            for (name, e) in &all.failures {
                println!("{name}: failed");
                eprintln!("error: {e:?}");
            }
            println!(
                "{} verified, {} already verified, {} failed",
                all.report.verified.len(),
                all.skipped.len(),
                all.failures.len()
            );
            Ok(all.is_success())
        }
        Command::Reduce { system, expr } => {
            let mut system = System::open(&config, &system)?;
            let normal = system
                .reduce(&expr)
                .with_context(|| format!("failed to reduce `{expr}`"))?;
            println!("{normal}");
            Ok(true)
        }
        Command::Clear { system } => {
            System::open(&config, &system)?.clear_verified()?;
            Ok(true)
        }
        Command::Systems => {
            for name in list_systems(&config)? {
                println!("{name}");
            }
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:?}");
            ExitCode::FAILURE
        }
    }
}
