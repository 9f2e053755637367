use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_local_files_dir() -> PathBuf {
    PathBuf::from("./local")
}

fn default_ingress_path() -> String {
    "/ws".to_owned()
}

fn default_ingress_port() -> u16 {
    8081
}

fn default_locale() -> String {
    "en".to_owned()
}

fn default_protocol_version() -> String {
    "2.0.0".to_owned()
}

fn default_max_binary_frame_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_subscriber_queue_depth() -> usize {
    16
}

fn default_coalesce_window_ms() -> u64 {
    100
}

/// Relay-wide configuration, read from the environment with the
/// `LIFTBOARD_` prefix over these defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default = "default_local_files_dir")]
    pub local_files_dir: PathBuf,
    #[serde(default = "default_ingress_path")]
    pub ingress_path: String,
    #[serde(default = "default_ingress_port")]
    pub ingress_port: u16,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default = "default_protocol_version")]
    pub min_protocol_version: String,
    #[serde(default = "default_protocol_version")]
    pub current_protocol_version: String,
    #[serde(default = "default_max_binary_frame_bytes")]
    pub max_binary_frame_bytes: usize,
    #[serde(default = "default_subscriber_queue_depth")]
    pub subscriber_queue_depth: usize,
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            local_files_dir: default_local_files_dir(),
            ingress_path: default_ingress_path(),
            ingress_port: default_ingress_port(),
            default_locale: default_locale(),
            min_protocol_version: default_protocol_version(),
            current_protocol_version: default_protocol_version(),
            max_binary_frame_bytes: default_max_binary_frame_bytes(),
            subscriber_queue_depth: default_subscriber_queue_depth(),
            coalesce_window_ms: default_coalesce_window_ms(),
        }
    }
}

impl RelayConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed("LIFTBOARD_"))
    }

    pub fn config() -> figment::Result<Self> {
        Self::figment().extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = RelayConfig::default();
        assert_eq!(config.ingress_path, "/ws");
        assert_eq!(config.default_locale, "en");
        assert_eq!(config.min_protocol_version, "2.0.0");
        assert!(config.max_binary_frame_bytes > 0);
    }

    #[test]
    fn environment_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LIFTBOARD_INGRESS_PORT", "9999");
            jail.set_env("LIFTBOARD_DEFAULT_LOCALE", "fr");
            let config: RelayConfig = RelayConfig::figment().extract()?;
            assert_eq!(config.ingress_port, 9999);
            assert_eq!(config.default_locale, "fr");
            assert_eq!(config.ingress_path, "/ws");
            Ok(())
        });
    }
}
