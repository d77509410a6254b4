//! External capacity hints used to cap the default concurrency.
//!
//! When builds run inside a container backend the host may report more
//! processors than the backend can actually use. A [`CapacityProbe`] asks the
//! backend for its own CPU count so the runner can take the smaller of the two.

use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunnerError};

/// CPU capacity reported by an external executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityHint {
    /// Number of CPUs the executor reports
    pub cpus: usize,
    /// Whether the executor runs embedded in a lightweight VM (e.g. boot2docker)
    pub embedded: bool,
}

/// Source of an optional capacity hint.
pub trait CapacityProbe: Send + Sync {
    /// Query the executor for its capacity.
    ///
    /// # Errors
    /// Returns an error when the executor is unavailable or its answer cannot be parsed.
    fn probe(&self) -> Result<CapacityHint>;
}

/// Subset of `docker info` output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerInfo {
    /// Operating system of the docker host
    #[serde(rename = "OperatingSystem", default)]
    pub operating_system: String,
    /// Daemon labels
    #[serde(rename = "Labels", default)]
    pub labels: Option<Vec<String>>,
    /// Number of CPUs available to the daemon
    #[serde(rename = "NCPU", default)]
    pub ncpu: usize,
    /// Total memory in bytes
    #[serde(rename = "MemTotal", default)]
    pub mem_total: u64,
}

impl DockerInfo {
    /// Parse the JSON emitted by `docker info -f '{{ json .}}'`.
    ///
    /// # Errors
    /// Returns an error if the text is not valid JSON for this shape.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text.trim())?)
    }

    /// True if the docker host OS is boot2docker.
    pub fn is_boot2docker(&self) -> bool {
        self.operating_system.to_lowercase().contains("boot2docker")
    }

    /// Convert into a capacity hint.
    pub fn hint(&self) -> CapacityHint {
        CapacityHint {
            cpus: self.ncpu,
            embedded: self.is_boot2docker(),
        }
    }
}

/// Probes the local docker daemon.
#[derive(Debug, Clone)]
pub struct DockerProbe {
    program: String,
}

impl DockerProbe {
    /// Probe using the `docker` binary found on `PATH`.
    pub fn new() -> Self {
        Self {
            program: "docker".to_owned(),
        }
    }

    /// Probe using a specific docker-compatible binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `docker info` and parse its JSON output.
    ///
    /// # Errors
    /// Returns an error if the command cannot be started, exits unsuccessfully,
    /// or prints something other than the expected JSON.
    pub fn info(&self) -> Result<DockerInfo> {
        let output = Command::new(&self.program)
            .args(["info", "-f", "{{ json .}}"])
            .output()
            .map_err(|err| RunnerError::Probe(format!("failed to run {}: {err}", self.program)))?;

        if !output.status.success() {
            return Err(RunnerError::Probe(format!(
                "{} info exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        DockerInfo::from_json(&String::from_utf8_lossy(&output.stdout))
    }

    /// Returns an error if docker is unavailable.
    ///
    /// # Errors
    /// Returns [`RunnerError::Probe`] describing why docker could not be queried.
    pub fn have_docker(&self) -> Result<()> {
        self.info()
            .map(|_| ())
            .map_err(|err| RunnerError::Probe(format!("docker is not available: {err}")))
    }
}

impl Default for DockerProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl CapacityProbe for DockerProbe {
    fn probe(&self) -> Result<CapacityHint> {
        let info = self.info()?;
        if info.ncpu == 0 {
            return Err(RunnerError::Probe("docker reported zero CPUs".to_owned()));
        }
        tracing::debug!(
            "docker reports {} CPUs (os: {}, boot2docker: {})",
            info.ncpu,
            info.operating_system,
            info.is_boot2docker()
        );
        Ok(info.hint())
    }
}

/// Probe that never produces a hint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl CapacityProbe for NoProbe {
    fn probe(&self) -> Result<CapacityHint> {
        Err(RunnerError::Probe("no capacity probe configured".to_owned()))
    }
}

/// Probe returning a fixed hint.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub CapacityHint);

impl CapacityProbe for FixedProbe {
    fn probe(&self) -> Result<CapacityHint> {
        Ok(self.0)
    }
}

/// Number of logical processors on this machine.
pub fn local_cpus() -> usize {
    num_cpus::get().max(1)
}
