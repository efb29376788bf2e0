//! Hub service configuration (§10.4), env/file-backed since this binary
//! runs under an OS rather than on flash like the node side.

use std::env;
use std::time::Duration;

/// Environment variable names, kept together so `Config::from_env`'s body
/// reads as a list rather than scattered string literals.
const ENV_SERIAL_PORT: &str = "BRAMBLE_HUB_SERIAL_PORT";
const ENV_BAUD_RATE: &str = "BRAMBLE_HUB_BAUD_RATE";
const ENV_INACTIVE_TIMEOUT_S: &str = "BRAMBLE_HUB_INACTIVE_TIMEOUT_S";
const ENV_DEREGISTER_TIMEOUT_S: &str = "BRAMBLE_HUB_DEREGISTER_TIMEOUT_S";
const ENV_SWEEP_INTERVAL: &str = "BRAMBLE_HUB_SWEEP_INTERVAL_SECS";

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the serial device the LoRa radio module is attached to, e.g.
    /// `/dev/ttyUSB0`.
    pub serial_port: String,
    pub baud_rate: u32,
    pub inactive_timeout_s: u64,
    pub deregister_timeout_s: u64,
    /// How often the background task runs `check_inactive` /
    /// `deregister_inactive` / `process_queued_messages` / `clear_old_routes`.
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            inactive_timeout_s: bramble_hub_runtime::DEFAULT_INACTIVE_TIMEOUT_S,
            deregister_timeout_s: bramble_hub_runtime::DEFAULT_DEREGISTER_TIMEOUT_S,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Build a `Config` from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            serial_port: env::var(ENV_SERIAL_PORT).unwrap_or(defaults.serial_port),
            baud_rate: env::var(ENV_BAUD_RATE)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.baud_rate),
            inactive_timeout_s: env::var(ENV_INACTIVE_TIMEOUT_S)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.inactive_timeout_s),
            deregister_timeout_s: env::var(ENV_DEREGISTER_TIMEOUT_S)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.deregister_timeout_s),
            sweep_interval: env::var(ENV_SWEEP_INTERVAL)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_address_managers_own_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.inactive_timeout_s, bramble_hub_runtime::DEFAULT_INACTIVE_TIMEOUT_S);
        assert_eq!(cfg.deregister_timeout_s, bramble_hub_runtime::DEFAULT_DEREGISTER_TIMEOUT_S);
    }
}
