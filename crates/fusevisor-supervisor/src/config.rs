//! Supervisor configuration
//!
//! Loaded from YAML. A minimal file only needs the program and the mount
//! target:
//!
//! ```yaml
//! supervisor:
//!   program: ../bcachefs
//!   args: [fusemount, -f, /tmp/dev-1g, /tmp/mnt]
//!   target:
//!     device: /tmp/dev-1g
//!     mountpoint: /tmp/mnt
//!   shutdown_timeout: 10s
//! ```

use anyhow::{Context, Result};
use fusevisor_common::{MountTarget, SupervisorError, SupervisorResult};
use fusevisor_diagnostics::DiagnosticTool;
use fusevisor_process::{parse_signal, validate_executable, validate_mount_id};
use fusevisor_readiness::{ReadinessPattern, FUSE_READY_LINE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detach::{DetachRequest, FusermountDetach, SignalDetach};

/// Top-level configuration file used by the `fusevisor` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusevisorConfig {
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// How long the CLI holds the mount.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Unmount after this long; absent means "until SIGINT/SIGTERM".
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub duration: Option<Duration>,
}

/// One supervised daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_id")]
    pub id: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    pub target: MountTarget,
    #[serde(default = "default_readiness_pattern")]
    pub readiness_pattern: String,
    /// Treat `readiness_pattern` as a regex instead of one literal line.
    #[serde(default)]
    pub readiness_is_regex: bool,
    /// Bound on the detach request plus the join; absent waits forever.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub shutdown_timeout: Option<Duration>,
    #[serde(default)]
    pub expected_exit_code: i32,
    /// Leak-check wrapper; `null` runs the program directly and skips
    /// log verification.
    #[serde(default = "default_diagnostics")]
    pub diagnostics: Option<DiagnosticTool>,
    #[serde(default)]
    pub detach: DetachConfig,
}

/// How `unmount()` asks the daemon to go away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetachConfig {
    /// Lazily unmount the mountpoint; the daemon exits once detached.
    Fusermount {
        #[serde(default = "default_fusermount_program")]
        program: String,
        #[serde(default = "default_fusermount_args")]
        args: Vec<String>,
    },
    /// Deliver a signal to the supervised process.
    Signal {
        #[serde(default = "default_detach_signal")]
        signal: String,
    },
}

impl Default for DetachConfig {
    fn default() -> Self {
        DetachConfig::Fusermount {
            program: default_fusermount_program(),
            args: default_fusermount_args(),
        }
    }
}

impl DetachConfig {
    pub fn signal(name: impl Into<String>) -> Self {
        DetachConfig::Signal {
            signal: name.into(),
        }
    }

    /// Build the detach strategy this configuration describes.
    pub fn build(&self) -> SupervisorResult<Box<dyn DetachRequest>> {
        match self {
            DetachConfig::Fusermount { program, args } => {
                validate_executable(program)?;
                Ok(Box::new(FusermountDetach::new(program.clone(), args.clone())))
            }
            DetachConfig::Signal { signal } => Ok(Box::new(SignalDetach::new(parse_signal(signal)?))),
        }
    }
}

impl SupervisorConfig {
    /// `<binary> fusemount -f <device> <mountpoint>` with default settings.
    pub fn fusemount(
        binary: impl Into<String>,
        device: impl Into<PathBuf>,
        mountpoint: impl Into<PathBuf>,
    ) -> Self {
        let target = MountTarget::new(device, mountpoint);
        let args = vec![
            "fusemount".to_string(),
            "-f".to_string(),
            target.device.to_string_lossy().into_owned(),
            target.mountpoint.to_string_lossy().into_owned(),
        ];
        Self::new(binary, args, target)
    }

    /// Run `program args...` against `target` with default settings.
    pub fn new(program: impl Into<String>, args: Vec<String>, target: MountTarget) -> Self {
        Self {
            id: default_id(),
            program: program.into(),
            args,
            working_directory: None,
            environment: HashMap::new(),
            target,
            readiness_pattern: default_readiness_pattern(),
            readiness_is_regex: false,
            shutdown_timeout: None,
            expected_exit_code: 0,
            diagnostics: default_diagnostics(),
            detach: DetachConfig::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_diagnostics(mut self, tool: Option<DiagnosticTool>) -> Self {
        self.diagnostics = tool;
        self
    }

    pub fn with_detach(mut self, detach: DetachConfig) -> Self {
        self.detach = detach;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Readiness regex; `readiness_is_regex` false means one literal line.
    pub fn with_readiness_regex(mut self, pattern: impl Into<String>) -> Self {
        self.readiness_pattern = pattern.into();
        self.readiness_is_regex = true;
        self
    }

    /// Compile the readiness pattern.
    pub fn pattern(&self) -> SupervisorResult<ReadinessPattern> {
        if self.readiness_is_regex {
            ReadinessPattern::new(&self.readiness_pattern)
        } else {
            ReadinessPattern::literal(&self.readiness_pattern)
        }
    }

    pub fn validate(&self) -> SupervisorResult<()> {
        validate_mount_id(&self.id)?;
        validate_executable(&self.program)?;

        if self.readiness_pattern.is_empty() {
            return Err(SupervisorError::configuration("readiness_pattern cannot be empty"));
        }
        self.pattern()?;

        if let Some(ref tool) = self.diagnostics {
            validate_executable(&tool.program)?;
        }
        if let DetachConfig::Signal { ref signal } = self.detach {
            parse_signal(signal)?;
        }

        Ok(())
    }
}

impl FusevisorConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_str(content: &str) -> Result<Self> {
        let config: FusevisorConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config
            .supervisor
            .validate()
            .context("Invalid supervisor configuration")?;
        Ok(config)
    }
}

// Default value functions
fn default_id() -> String {
    "fusemount".to_string()
}

fn default_readiness_pattern() -> String {
    FUSE_READY_LINE.to_string()
}

fn default_diagnostics() -> Option<DiagnosticTool> {
    Some(DiagnosticTool::memcheck())
}

fn default_fusermount_program() -> String {
    "fusermount3".to_string()
}

fn default_fusermount_args() -> Vec<String> {
    vec!["-zu".to_string()]
}

fn default_detach_signal() -> String {
    "SIGTERM".to_string()
}

// Custom serialization for Duration
mod duration_serde {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Round up to whole milliseconds
        let millis = duration.as_nanos().div_ceil(1_000_000);
        if millis % 1000 == 0 {
            serializer.serialize_str(&format!("{}s", millis / 1000))
        } else {
            serializer.serialize_str(&format!("{}ms", millis))
        }
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num) = s.strip_suffix("ms") {
            let millis: u64 = num.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num) = s.strip_suffix('s') {
            let secs: u64 = num.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num) = s.strip_suffix('m') {
            let mins: u64 = num.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            let secs = mins
                .checked_mul(60)
                .ok_or_else(|| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

// Custom serialization for Option<Duration>
mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::duration_serde::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => super::duration_serde::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
