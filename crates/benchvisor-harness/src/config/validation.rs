use super::*;
use crate::workload::ALLOWED_READ_PERCENTS;
use benchvisor_process::is_executable_file;

/// Validate the complete configuration
pub fn validate_config(config: &HarnessConfig) -> Result<(), ConfigError> {
    validate_workload(&config.workload)?;
    validate_network(config)?;
    validate_timeouts(config)?;
    validate_env(&config.env)?;
    Ok(())
}

/// Validate workload parameters
fn validate_workload(workload: &WorkloadConfig) -> Result<(), ConfigError> {
    match workload {
        WorkloadConfig::Kv(kv) => {
            if !ALLOWED_READ_PERCENTS.contains(&kv.read_percent) {
                return Err(ConfigError::InvalidReadPercent {
                    value: kv.read_percent,
                    allowed: ALLOWED_READ_PERCENTS,
                });
            }
        }
        WorkloadConfig::Tpcc(tpcc) => {
            if tpcc.warehouses == 0 {
                return Err(ConfigError::invalid_value("warehouses", "must be at least 1"));
            }
            if tpcc.concurrency == 0 {
                return Err(ConfigError::invalid_value("concurrency", "must be at least 1"));
            }
        }
    }
    Ok(())
}

/// Validate host and port layout
fn validate_network(config: &HarnessConfig) -> Result<(), ConfigError> {
    if config.host.trim().is_empty() {
        return Err(ConfigError::invalid_value("host", "cannot be empty"));
    }

    if config.base_port == 0 {
        return Err(ConfigError::invalid_value("base_port", "must be between 1 and 65534"));
    }

    // The diagnostics port sits right above the SQL port
    if config.base_port == u16::MAX {
        return Err(ConfigError::invalid_value(
            "base_port",
            format!("no room for the diagnostics port above {}", config.base_port),
        ));
    }

    Ok(())
}

fn validate_timeouts(config: &HarnessConfig) -> Result<(), ConfigError> {
    if config.probe_interval.is_zero() {
        return Err(ConfigError::invalid_value("probe_interval", "must be greater than 0"));
    }
    if config.check_timeout.is_zero() {
        return Err(ConfigError::invalid_value("check_timeout", "must be greater than 0"));
    }
    if config.readiness_timeout.is_zero() {
        return Err(ConfigError::invalid_value("readiness_timeout", "must be greater than 0"));
    }
    Ok(())
}

fn validate_env(env: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    for key in env.keys() {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return Err(ConfigError::invalid_value(
                "env",
                format!("invalid variable name: {:?}", key),
            ));
        }
    }
    Ok(())
}

/// Pick the server binary.
///
/// An explicit path is taken as given; a bad one surfaces as a launch
/// failure. A path taken from `COCKROACH_BIN` must name an executable
/// regular file.
pub fn resolve_binary(
    explicit: Option<&Path>,
    env_value: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::invalid_value("cockroach_bin", "cannot be empty"));
        }
        return Ok(path.to_path_buf());
    }

    match env_value {
        Some(path) if is_executable_file(&path) => {
            tracing::info!("Using server binary from {}: {}", COCKROACH_BIN_ENV, path.display());
            Ok(path)
        }
        Some(path) => Err(ConfigError::BinaryNotExecutable {
            env_var: COCKROACH_BIN_ENV,
            path: path.display().to_string(),
        }),
        None => Err(ConfigError::MissingBinary {
            env_var: COCKROACH_BIN_ENV,
        }),
    }
}

/// Resolve `procs_per_inst`: a positive value is kept, anything else means
/// the detected parallelism, floored at 1.
pub fn resolve_parallelism(
    configured: i64,
    detected: Option<NonZeroUsize>,
) -> Result<usize, ConfigError> {
    if configured > 0 {
        return usize::try_from(configured).map_err(|_| {
            ConfigError::invalid_value("procs_per_inst", format!("{} is too large", configured))
        });
    }
    Ok(detected.map_or(1, NonZeroUsize::get))
}
