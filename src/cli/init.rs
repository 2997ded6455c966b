//! `stasis init`.

use std::path::Path;

use crate::config::Config;
use crate::manifest::write_starter;

/// Write a starter manifest at the configured path.
pub fn run_init_command(config: &Config, name: Option<String>) -> anyhow::Result<()> {
    let project = match name {
        Some(name) => name,
        None => default_project_name(&std::env::current_dir()?),
    };

    write_starter(&config.manifest_path, &project)?;
    println!(
        "Created {} for project '{}'. Run 'stasis up' to start it.",
        config.manifest_path.display(),
        project
    );
    Ok(())
}

/// Derive a valid project name from a directory name.
fn default_project_name(dir: &Path) -> String {
    let raw = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches(['_', '.', '-']);

    if cleaned.is_empty() {
        "app".to_string()
    } else {
        cleaned.to_string()
    }
}
