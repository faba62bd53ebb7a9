use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use swc_mixin_patcher::{init_tracing, run, PatchConfig};

/// Patch a generated bundle with mixins located through its source map.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Run configuration (YAML or JSON).
    #[arg(short, long, default_value = "mixins.yaml")]
    config: PathBuf,

    /// Skip failing mixins and injections instead of aborting.
    #[arg(long)]
    continue_on_error: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let mut config = match PatchConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if args.continue_on_error {
        config.fail_on_error = false;
    }

    match run(&config).await {
        Ok(report) => {
            for stage in &report.stages {
                println!(
                    "{:?}: {} ok, {} failed",
                    stage.stage, stage.succeeded, stage.failed
                );
            }
            for skip in &report.skipped {
                eprintln!("skipped {}: {}", skip.item, skip.error);
            }
            println!("wrote {}", report.output.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
