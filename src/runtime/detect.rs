//! Docker availability detection with platform-specific guidance.
//!
//! Used when the runtime cannot be reached, to tell the user whether Docker
//! is missing entirely or merely not running, and what to do about it.
//!
//! - **macOS**: Docker Desktop's per-user socket (`~/.docker/run/docker.sock`)
//!   is tried after `/var/run/docker.sock`.
//! - **Linux**: rootless Docker (`$XDG_RUNTIME_DIR/docker.sock`) is tried after
//!   the system socket. `DOCKER_HOST`, when set, always wins.
//! - **Windows**: the default named pipe only; binary detection uses `where`.

/// Why the Docker daemon could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerStatus {
    /// `docker` binary not found on PATH.
    NotInstalled,
    /// Binary found but daemon not responding.
    NotRunning,
}

/// Host platform for install guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::MacOS,
            "windows" => Platform::Windows,
            _ => Platform::Linux,
        }
    }

    pub fn install_hint(&self) -> &'static str {
        match self {
            Platform::MacOS => {
                "Install Docker Desktop: https://docs.docker.com/desktop/install/mac-install/"
            }
            Platform::Linux => "Install Docker Engine: https://docs.docker.com/engine/install/",
            Platform::Windows => {
                "Install Docker Desktop: https://docs.docker.com/desktop/install/windows-install/"
            }
        }
    }

    pub fn start_hint(&self) -> &'static str {
        match self {
            Platform::MacOS => "Start Docker Desktop from Applications, or run: open -a Docker",
            Platform::Linux => "Start the Docker daemon: sudo systemctl start docker",
            Platform::Windows => "Start Docker Desktop from the Start menu",
        }
    }
}

/// Result of a Docker detection check.
#[derive(Debug, Clone, Copy)]
pub struct DockerDetection {
    pub status: DockerStatus,
    pub platform: Platform,
}

impl DockerDetection {
    /// What the user should do next.
    pub fn hint(&self) -> &'static str {
        match self.status {
            DockerStatus::NotInstalled => self.platform.install_hint(),
            DockerStatus::NotRunning => self.platform.start_hint(),
        }
    }
}

/// Classify a daemon that could not be reached.
pub fn diagnose_unreachable() -> DockerDetection {
    let status = if docker_binary_exists() {
        DockerStatus::NotRunning
    } else {
        DockerStatus::NotInstalled
    };

    DockerDetection {
        status,
        platform: Platform::current(),
    }
}

fn docker_binary_exists() -> bool {
    let finder = if cfg!(windows) { "where" } else { "which" };
    std::process::Command::new(finder)
        .arg("docker")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
