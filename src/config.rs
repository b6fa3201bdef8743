use std::{env, net::SocketAddr, path::PathBuf};

use crate::error::ConfigError;
use crate::inference::OutputPolicy;
use crate::preprocess::TensorLayout;

const DEFAULT_MODEL_PATH: &str = "./model/frozen_graph.pb";
const DEFAULT_CLASS_LIST_PATH: &str = "./model/class_list.txt";

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
    pub model_path: PathBuf,
    pub class_list_path: PathBuf,
    pub model_url: Option<String>,
    pub class_list_url: Option<String>,
    pub github_token: Option<String>,
    pub input_op: String,
    pub output_op: String,
    pub layout: TensorLayout,
    pub policy: OutputPolicy,
    pub upload_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup so tests don't touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let body_limit_bytes = {
            let raw = get("BODY_LIMIT_MB", "5");
            let invalid = || ConfigError::Invalid {
                name: "BODY_LIMIT_MB",
                expected: "a valid integer of megabytes",
                value: raw.clone(),
            };
            raw.parse::<usize>()
                .map_err(|_| invalid())?
                .checked_mul(1024 * 1024)
                .ok_or_else(invalid)?
        };

        let raw_port = get("PORT", "5020");
        let port = raw_port.parse::<u16>().map_err(|_| ConfigError::Invalid {
            name: "PORT",
            expected: "a valid number between 0 and 65535",
            value: raw_port.clone(),
        })?;

        let raw_layout = get("MODEL_INPUT_LAYOUT", "nchw");
        let layout = raw_layout
            .parse::<TensorLayout>()
            .map_err(|_| ConfigError::Invalid {
                name: "MODEL_INPUT_LAYOUT",
                expected: "one of nchw, nhwc",
                value: raw_layout.clone(),
            })?;

        let raw_policy = get("OUTPUT_POLICY", "confidence");
        let policy = raw_policy
            .parse::<OutputPolicy>()
            .map_err(|_| ConfigError::Invalid {
                name: "OUTPUT_POLICY",
                expected: "one of argmax, confidence",
                value: raw_policy.clone(),
            })?;

        Ok(Settings {
            host: get("HOST", "0.0.0.0"),
            port,
            body_limit_bytes,
            model_path: PathBuf::from(get("MODEL_PATH", DEFAULT_MODEL_PATH)),
            class_list_path: PathBuf::from(get("CLASS_LIST_PATH", DEFAULT_CLASS_LIST_PATH)),
            model_url: lookup("MODEL_URL"),
            class_list_url: lookup("CLASS_LIST_URL"),
            github_token: lookup("GITHUB_TOKEN"),
            input_op: get("MODEL_INPUT_OP", "x"),
            output_op: get("MODEL_OUTPUT_OP", "Identity"),
            layout,
            policy,
            upload_dir: PathBuf::from(get("UPLOAD_DIR", "uploads")),
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            name: "HOST",
            expected: "an IP address",
            value: self.host.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_with(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = settings_with(&[]).unwrap();
        assert_eq!(settings.port, 5020);
        assert_eq!(settings.body_limit_bytes, 5 * 1024 * 1024);
        assert_eq!(settings.layout, TensorLayout::Nchw);
        assert_eq!(settings.policy, OutputPolicy::Confidence);
        assert_eq!(settings.input_op, "x");
        assert_eq!(settings.output_op, "Identity");
        assert!(settings.model_url.is_none());
        assert_eq!(
            settings.socket_addr().unwrap(),
            "0.0.0.0:5020".parse().unwrap()
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = settings_with(&[
            ("PORT", "8000"),
            ("BODY_LIMIT_MB", "12"),
            ("OUTPUT_POLICY", "argmax"),
            ("MODEL_INPUT_LAYOUT", "NHWC"),
            ("UPLOAD_DIR", "/tmp/up"),
        ])
        .unwrap();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.body_limit_bytes, 12 * 1024 * 1024);
        assert_eq!(settings.policy, OutputPolicy::Argmax);
        assert_eq!(settings.layout, TensorLayout::Nhwc);
        assert_eq!(settings.upload_dir, PathBuf::from("/tmp/up"));
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = settings_with(&[("PORT", "99999")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn overflowing_body_limit_is_rejected() {
        let err = settings_with(&[("BODY_LIMIT_MB", "18446744073709551")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "BODY_LIMIT_MB",
                ..
            }
        ));
    }

    #[test]
    fn non_numeric_body_limit_is_rejected() {
        assert!(settings_with(&[("BODY_LIMIT_MB", "five")]).is_err());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = settings_with(&[("OUTPUT_POLICY", "top5")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "OUTPUT_POLICY",
                ..
            }
        ));
    }
}
