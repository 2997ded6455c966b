//! `stasis down`.

use crate::cli::{connect_runtime, load_environment};
use crate::config::Config;
use crate::reconcile::{Orchestrator, TeardownReport};

/// Stop and remove every declared service and the project network.
///
/// Teardown always runs to the end; the command fails afterwards if any
/// step could not be completed.
pub async fn run_down_command(config: &Config, remove_orphans: bool) -> anyhow::Result<()> {
    let env = load_environment(config)?;
    let runtime = connect_runtime().await?;

    let orchestrator = Orchestrator::new(&runtime, config.volume_root())
        .with_stop_timeout(config.stop_timeout_secs);
    let report = orchestrator.down(&env, remove_orphans).await;

    println!("{}", summarize(&env.name, &report));

    if !report.is_clean() {
        anyhow::bail!(
            "teardown of '{}' finished with {} error(s)",
            env.name,
            report.failures.len()
        );
    }
    Ok(())
}

fn summarize(project: &str, report: &TeardownReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Removed {} container(s) for '{}'{}.",
        report.removed.len(),
        project,
        if report.network_removed {
            " and its network"
        } else {
            ""
        }
    ));
    if !report.missing.is_empty() {
        lines.push(format!("Not running: {}", report.missing.join(", ")));
    }
    for failure in &report.failures {
        lines.push(format!("  failed: {}: {}", failure.target, failure.error));
    }
    lines.join("\n")
}
