use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and retry policy for one controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Interval between status queries
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    /// Delay before the next pairing-code attempt after a miss
    #[serde(default = "default_pairing_retry_delay_ms")]
    pub pairing_retry_delay_ms: u64,
    /// Pairing-code attempts before giving up
    #[serde(default = "default_max_pairing_attempts")]
    pub max_pairing_attempts: u32,
    /// Prefix a pairing artifact must carry to be accepted
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,
}

fn default_status_interval_ms() -> u64 {
    10_000
}

fn default_pairing_retry_delay_ms() -> u64 {
    10_000
}

fn default_max_pairing_attempts() -> u32 {
    10
}

fn default_artifact_prefix() -> String {
    "data:image/png;base64,".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
            pairing_retry_delay_ms: default_pairing_retry_delay_ms(),
            max_pairing_attempts: default_max_pairing_attempts(),
            artifact_prefix: default_artifact_prefix(),
        }
    }
}

impl ControllerConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms.max(1))
    }

    pub fn pairing_retry_delay(&self) -> Duration {
        Duration::from_millis(self.pairing_retry_delay_ms)
    }

    /// At least one attempt is always made.
    pub fn max_pairing_attempts(&self) -> u32 {
        self.max_pairing_attempts.max(1)
    }
}

/// Where the remote connection service lives and how to talk to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteServiceConfig {
    /// Base URL of the session endpoints (`{base_url}/session/...`)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Base URL of the profile listing (`{profiles_url}/prompts`)
    #[serde(default = "default_profiles_url")]
    pub profiles_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Opaque session cookie forwarded on every request
    #[serde(default)]
    pub cookie: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:3000/api/whatsapp".to_string()
}

fn default_profiles_url() -> String {
    "http://localhost:3000/chat".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for RemoteServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            profiles_url: default_profiles_url(),
            request_timeout_secs: default_request_timeout_secs(),
            cookie: None,
        }
    }
}

impl RemoteServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let config: ControllerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.status_interval(), Duration::from_secs(10));
        assert_eq!(config.pairing_retry_delay(), Duration::from_secs(10));
        assert_eq!(config.max_pairing_attempts(), 10);
        assert_eq!(config.artifact_prefix, "data:image/png;base64,");
    }

    #[test]
    fn partial_override() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"max_pairing_attempts": 3, "status_interval_ms": 500}"#)
                .unwrap();
        assert_eq!(config.max_pairing_attempts(), 3);
        assert_eq!(config.status_interval(), Duration::from_millis(500));
        assert_eq!(config.pairing_retry_delay_ms, 10_000);
    }

    #[test]
    fn zero_values_are_clamped() {
        let config = ControllerConfig {
            status_interval_ms: 0,
            max_pairing_attempts: 0,
            ..ControllerConfig::default()
        };
        assert_eq!(config.status_interval(), Duration::from_millis(1));
        assert_eq!(config.max_pairing_attempts(), 1);
    }

    #[test]
    fn remote_config_defaults() {
        let config: RemoteServiceConfig =
            serde_json::from_str(r#"{"base_url":"https://console.example/api/whatsapp"}"#)
                .unwrap();
        assert_eq!(config.base_url, "https://console.example/api/whatsapp");
        assert_eq!(config.profiles_url, "http://localhost:3000/chat");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.cookie.is_none());
    }
}
