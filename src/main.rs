use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use shelver::config::Config;
use shelver::pipeline::{self, PipelineSummary, VersionOutcome};
use shelver::publisher::Publisher;
use shelver::{log_status, manifest, toolchain};

mod output;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "shelver")]
#[command(version = VERSION)]
#[command(about = "Regenerate a versioned archive repository from its manifest")]
struct Cli {
    /// Reprocess versions whose branch is already published
    #[arg(long)]
    force: bool,

    /// Manifest path (defaults to versions.json inside the archive repository)
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// Archive repository path (defaults to REPO_PATH or ./versions)
    #[arg(long, value_name = "PATH")]
    repo: Option<PathBuf>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunOutput {
    command: String,
    repo: String,
    manifest: String,
    force: bool,
    results: Vec<VersionOutcome>,
    summary: PipelineSummary,
}

fn run(cli: &Cli) -> shelver::Result<(RunOutput, i32)> {
    let mut config = Config::from_env()?;
    config.apply_overrides(cli.repo.as_deref(), cli.manifest.as_deref());

    let tools = toolchain::ensure(&config)?;
    let entries = manifest::load(&config.manifest_path())?;
    let publisher = Publisher::open(&config)?;

    log_status!(
        "pipeline",
        "Processing {} versions from {}",
        entries.len(),
        config.manifest_path().display()
    );

    let result = pipeline::run(&config, &publisher, &tools, &entries, cli.force);

    // The batch completing is not the same as every version succeeding.
    let exit_code = if result.summary.failed > 0 { 20 } else { 0 };

    Ok((
        RunOutput {
            command: "run".to_string(),
            repo: config.repo_path.to_string_lossy().into_owned(),
            manifest: config.manifest_path().to_string_lossy().into_owned(),
            force: cli.force,
            results: result.results,
            summary: result.summary,
        },
        exit_code,
    ))
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let result = run(&cli);
    let exit_code = match &result {
        Ok((_, code)) => *code,
        Err(err) => output::exit_code_for_error(err.code),
    };

    let _ = output::print_result(&result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
