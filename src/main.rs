// chainvault - command-line entry point
// =======================================================
// Parses the arguments, obtains the password, and hands the targets to the
// orchestrator. Exits with an error when any file failed or was skipped.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use chainvault::{CredentialContext, Mode, Options, Orchestrator, Reporter};

/// Encrypt and decrypt files and directory trees
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log per-file details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt files, writing `<name>.cvlt` next to each one
    Encrypt(RunArgs),

    /// Decrypt `.cvlt` files, writing the original name next to each one
    Decrypt(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Files and directories to process, in order
    #[arg(required = true)]
    targets: Vec<PathBuf>,

    /// Password; prompted for when not given
    #[arg(short, long, env = "CHAINVAULT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Maximum number of files processed at once (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Do not descend into subdirectories of directory targets
    #[arg(long)]
    no_recursive: bool,

    /// Only print failures
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (mode, args) = match cli.command {
        Commands::Encrypt(args) => (Mode::Encrypt, args),
        Commands::Decrypt(args) => (Mode::Decrypt, args),
    };

    let password = match args.password {
        Some(password) => password,
        None => prompt_password(mode)?,
    };

    let mut options = Options::default();
    if let Some(jobs) = args.jobs {
        options.jobs = jobs;
    }
    options.recursive = !args.no_recursive;

    let ctx = CredentialContext::new(password, args.targets);
    let orchestrator = Orchestrator::new(mode, options, Reporter::new(args.quiet))
        .context("Failed to start worker pool")?;
    let summary = orchestrator.process_targets(&ctx);

    if !summary.is_success() {
        bail!(
            "{} finished with {} failed and {} skipped entries",
            mode.verb(),
            summary.failed,
            summary.skipped
        );
    }
    Ok(())
}

// Logs go to stderr; RUST_LOG overrides the level chosen here
fn init_tracing(verbose: bool) {
    let default = if verbose { "chainvault=debug" } else { "chainvault=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn prompt_password(mode: Mode) -> Result<String> {
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    if mode == Mode::Encrypt {
        let confirm =
            rpassword::prompt_password("Confirm password: ").context("Failed to read password")?;
        if confirm != password {
            bail!("Passwords do not match");
        }
    }
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}
