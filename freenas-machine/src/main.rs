use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use freenas_machine::{Entity, EntityKind, FixtureService, Machine, MachineOptions};

#[derive(Parser)]
#[command(name = "freenas-watch")]
#[command(about = "Poll an appliance dump and report entity availability")]
struct Args {
    /// Directory holding pool.query.json, disk.query.json and vm.query.json
    #[arg(short, long)]
    fixtures: PathBuf,

    /// Seconds between refreshes
    #[arg(short, long, default_value = "10")]
    interval: u64,

    /// Stop after this many refreshes (runs until Ctrl-C if unset)
    #[arg(short, long)]
    passes: Option<u64>,

    /// Per-query timeout in seconds
    #[arg(short, long, default_value = "5")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "freenas_machine=info".into()),
        )
        .init();

    let args = Args::parse();

    info!(fixtures = %args.fixtures.display(), interval = args.interval, "Starting freenas-watch");

    let service = Arc::new(FixtureService::new(
        args.fixtures.clone(),
        Duration::from_secs(args.timeout),
    ));
    let machine = Machine::create(service, MachineOptions { refresh_on_create: false })
        .await
        .context("Failed to create machine session")?;

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }

        match machine.refresh().await {
            Ok(()) => {}
            Err(e) if machine.is_closed() => {
                error!(error = %e, "Session closed");
                return Err(e).context("Lost connection to appliance");
            }
            Err(e) => warn!(error = %e, "Refresh incomplete"),
        }

        report::<freenas_machine::Pool>(&machine)?;
        report::<freenas_machine::Disk>(&machine)?;
        report::<freenas_machine::VirtualMachine>(&machine)?;

        if args.passes.is_some_and(|n| machine.passes() >= n) {
            break;
        }
    }

    machine.close().await.context("Failed to close session")?;
    Ok(())
}

fn report<E: Entity>(machine: &Machine) -> Result<()> {
    let handles = machine.entities_of::<E>()?;
    let available = handles.iter().filter(|h| h.available()).count();
    let kind: EntityKind = E::KIND;
    info!(
        kind = %kind,
        known = handles.len(),
        available,
        unavailable = handles.len() - available,
        "Entities"
    );
    Ok(())
}
