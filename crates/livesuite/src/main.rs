//! Runs the bundled live test cases across an in-process connection.
//!
//! Usage:
//!   livesuite                      # run every case
//!   livesuite --list               # print the registered names
//!   livesuite Live.Tests.WidgetIsATable --deadline-ms 500

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use livebridge::PeerConfig;
use livebridge::connected_pair_with;
use livebridge::environment::LoadedBefore;
use livebridge::suite::TestRegistry;
use livebridge::suite::register_builtin;

#[derive(Parser)]
#[command(name = "livesuite")]
#[command(about = "Run live remote-call test cases between two in-process peers")]
struct Cli {
    /// Qualified case names to run (default: all)
    cases: Vec<String>,

    /// Print the registered case names and exit
    #[arg(long)]
    list: bool,

    /// Per-call deadline in milliseconds
    #[arg(long, env = "LIVESUITE_DEADLINE_MS")]
    deadline_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    livebridge::telemetry::init();

    let registry = TestRegistry::global();
    register_builtin(registry)?;

    if cli.list {
        for name in registry.names() {
            println!("{}", name);
        }
        return Ok(());
    }

    // Stands in for the script loader, which runs before any case.
    LoadedBefore::mark();

    let mut config = PeerConfig::new();
    if let Some(ms) = cli.deadline_ms {
        config = config.default_deadline(Duration::from_millis(ms));
    }
    let (initiator, responder) = connected_pair_with(config);

    let names = if cli.cases.is_empty() { registry.names() } else { cli.cases };
    let mut failed = 0;
    for name in &names {
        match registry.run(name, &initiator, &responder).await {
            Ok(()) => println!("ok     {}", name),
            Err(e) => {
                failed += 1;
                println!("FAILED {}", name);
                tracing::error!(case = %name, error = %e, "live test failed");
            }
        }
    }

    println!("\n{} passed, {} failed", names.len() - failed, failed);
    initiator.close();
    if failed > 0 {
        anyhow::bail!("{} live test case(s) failed", failed);
    }
    Ok(())
}
