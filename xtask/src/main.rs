use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the workspace
    Build,
    /// Run every crate's tests
    Test,
    /// Check formatting and clippy lints
    Lint,
    /// Run the s20 CLI with the given arguments
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn cargo(step: &str, args: &[&str]) -> Result<()> {
    println!("{step}...");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{step} failed");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => cargo("Building workspace", &["build", "--workspace"])?,
        Commands::Test => cargo("Running tests", &["test", "--workspace"])?,
        Commands::Lint => {
            cargo("Checking formatting", &["fmt", "--all", "--check"])?;
            cargo(
                "Running clippy",
                &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
            )?;
        }
        Commands::Run { args } => {
            let mut full = vec!["run", "-p", "s20-cli", "--"];
            full.extend(args.iter().map(String::as_str));
            cargo("Running CLI", &full)?;
        }
    }

    Ok(())
}
