use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use ktoolhu::cli::{Cli, Command};
use ktoolhu::cluster::client::create_client;
use ktoolhu::cluster::{ControlPlane, KubeControlPlane};
use ktoolhu::configuration::get_configuration;
use ktoolhu::errors::AppError;
use ktoolhu::ops::finalizers::PromptConfirm;
use ktoolhu::ops::{evicted, finalizers, perf, restart, secret};
use ktoolhu::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(why) => {
            tracing::error!("{:#}", why);
            eprintln!("Error: {why:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = get_configuration(cli.config.as_deref()).map_err(AppError::Config)?;
    cli.apply_to(&mut settings);

    let subscriber = get_subscriber(settings.name.clone(), settings.log_level.clone(), std::io::stderr);
    init_subscriber(subscriber)?;
    tracing::debug!("Configuration loaded: {:?}", settings);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if let Command::Secret(args) = &cli.command {
        secret::run(&args.resolve(), &mut std::io::stdin().lock(), &mut out)?;
        return Ok(());
    }

    let client = create_client(&settings.kube).await.map_err(AppError::Connection)?;
    let control_plane: Arc<dyn ControlPlane> = Arc::new(KubeControlPlane::new(client));

    match &cli.command {
        Command::PerfConfigmaps(args) => {
            perf::run(control_plane, &args.resolve(&settings)).await?;
        }
        Command::RestartAll(args) => {
            let summary = restart::restart_all(control_plane.as_ref(), &args.resolve(&settings), &mut out).await?;
            if summary.failed > 0 {
                let total = summary.restarted + summary.failed;
                return Err(AppError::partial("workload restarts", summary.failed, total).into());
            }
        }
        Command::TerminatingNs(args) => {
            finalizers::run(control_plane.as_ref(), &args.resolve(), &mut PromptConfirm::stdin(), &mut out).await?;
        }
        Command::EvictedPods(args) => {
            evicted::run(control_plane.as_ref(), &args.resolve(), &mut out).await?;
        }
        Command::Secret(_) => {}
    }

    Ok(())
}
