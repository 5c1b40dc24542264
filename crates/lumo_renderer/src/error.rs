//! Errors surfaced by the render engine.

use std::fmt;

use lumo_core::ConfigError;
use thiserror::Error;

use crate::engine::RenderState;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("Invalid render configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Cannot {action} while the engine is {state}")]
    InvalidState {
        action: &'static str,
        state: RenderState,
    },

    #[error("{message} ({})", describe_memory(.memory))]
    Resource {
        message: String,
        memory: Option<MemoryInfo>,
    },

    #[error("Render worker panicked: {0}")]
    WorkerPanic(String),
}

impl RenderError {
    /// True for errors rejected synchronously before any work starts.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            RenderError::InvalidConfig(_) | RenderError::InvalidState { .. }
        )
    }

    /// Resource failure annotated with the current memory figures.
    pub fn resource(message: impl Into<String>) -> Self {
        RenderError::Resource {
            message: message.into(),
            memory: MemoryInfo::probe(),
        }
    }
}

fn describe_memory(memory: &Option<MemoryInfo>) -> String {
    match memory {
        Some(info) => info.to_string(),
        None => "memory usage unavailable".to_string(),
    }
}

/// System memory figures in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_mib: u64,
    pub available_mib: u64,
}

impl MemoryInfo {
    /// Read `/proc/meminfo`; `None` where it does not exist or cannot be parsed.
    pub fn probe() -> Option<Self> {
        let text = std::fs::read_to_string("/proc/meminfo").ok()?;
        Self::parse(&text)
    }

    fn parse(meminfo: &str) -> Option<Self> {
        let field = |name: &str| -> Option<u64> {
            meminfo
                .lines()
                .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|kib| kib.parse::<u64>().ok())
                .map(|kib| kib / 1024)
        };

        let total_mib = field("MemTotal")?;
        let available_mib = field("MemAvailable").or_else(|| field("MemFree"))?;
        Some(Self {
            total_mib,
            available_mib,
        })
    }
}

impl fmt::Display for MemoryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} MiB available of {} MiB",
            self.available_mib, self.total_mib
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "MemTotal:       16315424 kB\n\
                          MemFree:         1141908 kB\n\
                          MemAvailable:    9436596 kB\n";

    #[test]
    fn test_parse_meminfo() {
        let info = MemoryInfo::parse(SAMPLE).unwrap();
        assert_eq!(info.total_mib, 15933);
        assert_eq!(info.available_mib, 9215);
    }

    #[test]
    fn test_parse_meminfo_without_available() {
        let info = MemoryInfo::parse("MemTotal: 2048 kB\nMemFree: 1024 kB\n").unwrap();
        assert_eq!(info, MemoryInfo { total_mib: 2, available_mib: 1 });
        assert!(MemoryInfo::parse("garbage").is_none());
    }

    #[test]
    fn test_resource_error_message() {
        let err = RenderError::Resource {
            message: "Accelerator build failed".into(),
            memory: Some(MemoryInfo { total_mib: 100, available_mib: 10 }),
        };
        assert_eq!(err.to_string(), "Accelerator build failed (10 MiB available of 100 MiB)");
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_config_errors_are_configuration_errors() {
        let err: RenderError = ConfigError::Threads.into();
        assert!(err.is_configuration_error());
        let busy = RenderError::InvalidState {
            action: "start",
            state: RenderState::Busy,
        };
        assert!(busy.is_configuration_error());
    }
}
