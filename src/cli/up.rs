//! `stasis up`.

use crate::cli::{connect_runtime, load_environment};
use crate::config::Config;
use crate::reconcile::{Orchestrator, UpReport};

/// Bring every declared service up, aborting on the first failure.
pub async fn run_up_command(config: &Config) -> anyhow::Result<()> {
    let env = load_environment(config)?;
    let runtime = connect_runtime().await?;

    let orchestrator = Orchestrator::new(&runtime, config.volume_root());
    let report = orchestrator.up(&env).await?;

    print_summary(&env.name, &report);
    Ok(())
}

fn print_summary(project: &str, report: &UpReport) {
    println!();
    println!(
        "Environment '{}' is up ({} service{}).",
        project,
        report.services.len(),
        if report.services.len() == 1 { "" } else { "s" }
    );
    for started in &report.services {
        println!("  {:<16} {}", started.service, started.container);
    }
}
