//! `stasis status`.

use crate::cli::{connect_runtime, load_environment};
use crate::config::Config;
use crate::reconcile::Orchestrator;
use crate::runtime::{ContainerSummary, PublishedPort};

const COLUMN_GAP: usize = 3;

/// List every container labelled with the project.
pub async fn run_status_command(config: &Config) -> anyhow::Result<()> {
    let env = load_environment(config)?;
    let runtime = connect_runtime().await?;

    let orchestrator = Orchestrator::new(&runtime, config.volume_root());
    let containers = orchestrator.status(&env.name).await?;

    print!("{}", render_status_table(&containers));
    Ok(())
}

/// Render containers as an aligned `NAME IMAGE STATUS PORTS` table.
pub fn render_status_table(containers: &[ContainerSummary]) -> String {
    if containers.is_empty() {
        return "No stasis services found.\n".to_string();
    }

    let header = ["NAME", "IMAGE", "STATUS", "PORTS"].map(String::from);
    let rows: Vec<[String; 4]> = containers
        .iter()
        .map(|c| {
            [
                c.name.clone(),
                c.image.clone(),
                c.status.clone(),
                format_ports(&c.ports),
            ]
        })
        .collect();

    let mut widths = header.clone().map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in std::iter::once(&header).chain(&rows) {
        let mut line = String::new();
        for (i, cell) in row.iter().enumerate() {
            if i + 1 == row.len() {
                line.push_str(cell);
            } else {
                line.push_str(&format!("{:<width$}", cell, width = widths[i] + COLUMN_GAP));
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn format_ports(ports: &[PublishedPort]) -> String {
    ports
        .iter()
        .map(|p| match p.host_port {
            Some(host) => format!(
                "{}:{}->{}/{}",
                p.host_ip.as_deref().unwrap_or("0.0.0.0"),
                host,
                p.container_port,
                p.protocol
            ),
            None => format!("{}/{}", p.container_port, p.protocol),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
