use crate::workload::{Workload, WorkloadConfig};
use benchvisor_common::{ConfigError, CrashPolicy};
use benchvisor_readiness::ProberConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod validation;

pub use duration_serde::parse_duration;

/// Environment variable consulted when no server binary is given
pub const COCKROACH_BIN_ENV: &str = "COCKROACH_BIN";

/// Name of the single launched instance
pub const DEFAULT_INSTANCE_NAME: &str = "roach-node";

/// Run parameters as given on the command line or in a YAML file.
///
/// Nothing here is trusted: [`HarnessConfig::resolve`] validates it and
/// fills in detected values, producing an immutable [`ResolvedConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Server binary; when absent `COCKROACH_BIN` is consulted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cockroach_bin: Option<PathBuf>,

    /// Base for the ephemeral directories; OS temp dir when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmp_dir: Option<PathBuf>,

    /// GOMAXPROCS for the server; zero or negative means detect
    #[serde(default)]
    pub procs_per_inst: i64,

    #[serde(default = "default_base_port")]
    pub base_port: u16,

    #[serde(default = "default_probe_interval", with = "duration_serde")]
    pub probe_interval: Duration,

    #[serde(default = "default_check_timeout", with = "duration_serde")]
    pub check_timeout: Duration,

    #[serde(default = "default_readiness_timeout", with = "duration_serde")]
    pub readiness_timeout: Duration,

    #[serde(default = "default_grace_period", with = "duration_serde")]
    pub grace_period: Duration,

    #[serde(default)]
    pub crash_policy: CrashPolicy,

    /// Extra environment for every subprocess (server, probes, driver)
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub workload: WorkloadConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            cockroach_bin: None,
            tmp_dir: None,
            procs_per_inst: 0,
            base_port: default_base_port(),
            probe_interval: default_probe_interval(),
            check_timeout: default_check_timeout(),
            readiness_timeout: default_readiness_timeout(),
            grace_period: default_grace_period(),
            crash_policy: CrashPolicy::default(),
            env: BTreeMap::new(),
            workload: WorkloadConfig::default(),
        }
    }
}

/// Validated, immutable run parameters
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub host: String,
    pub binary: PathBuf,
    pub tmp_root: PathBuf,
    pub procs_per_inst: usize,
    pub host_parallelism: usize,
    pub base_port: u16,
    pub prober: ProberConfig,
    pub readiness_timeout: Duration,
    pub grace_period: Duration,
    pub extra_env: Vec<(String, String)>,
    pub workload: WorkloadConfig,
}

impl ResolvedConfig {
    pub fn workload(&self) -> &dyn Workload {
        self.workload.as_workload()
    }
}

impl HarnessConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::load_from_string(&content).map_err(|e| match e {
            ConfigError::File { reason, .. } => ConfigError::File {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self, ConfigError> {
        let config: HarnessConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::File {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }

    /// Validate and resolve against the real environment: `COCKROACH_BIN`
    /// and the host's available parallelism.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let env_binary = std::env::var_os(COCKROACH_BIN_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        self.resolve_with(env_binary, std::thread::available_parallelism().ok())
    }

    /// Resolution with the environment lookups supplied by the caller
    pub fn resolve_with(
        &self,
        env_binary: Option<PathBuf>,
        detected: Option<NonZeroUsize>,
    ) -> Result<ResolvedConfig, ConfigError> {
        self.validate()?;

        let binary = validation::resolve_binary(self.cockroach_bin.as_deref(), env_binary)?;
        let procs_per_inst = validation::resolve_parallelism(self.procs_per_inst, detected)?;
        let host_parallelism = detected.map_or(1, NonZeroUsize::get);

        // Surface overflow now, before anything is launched
        self.workload.as_workload().scale(procs_per_inst)?;

        Ok(ResolvedConfig {
            host: self.host.clone(),
            binary,
            tmp_root: self.tmp_dir.clone().unwrap_or_else(std::env::temp_dir),
            procs_per_inst,
            host_parallelism,
            base_port: self.base_port,
            prober: ProberConfig {
                interval: self.probe_interval,
                check_timeout: self.check_timeout,
                crash_policy: self.crash_policy,
            },
            readiness_timeout: self.readiness_timeout,
            grace_period: self.grace_period,
            extra_env: self.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            workload: self.workload.clone(),
        })
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_base_port() -> u16 {
    26257
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_readiness_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_grace_period() -> Duration {
    Duration::from_secs(60)
}

// Durations are written as "500ms", "2s" or "1m"
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num_str) = s.strip_suffix("ms") {
            let millis: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num_str) = s.strip_suffix('s') {
            let secs: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num_str) = s.strip_suffix('m') {
            let mins: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("Invalid duration: {}", s))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}
