use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_API_KEY: &str = "CHANGE_ME_GENERATE_A_SECURE_KEY";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub printer: PrinterConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    pub api_key: String,
}

// Keep the secret out of `{:?}` output in startup logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrinterConfig {
    /// Pinned printer. `None` means ask CUPS for its default destination.
    pub name: Option<String>,
    /// Extra `lp -o` options, passed through verbatim.
    pub options: Vec<String>,
    pub max_copies: u32,
    pub lp_command: String,
    pub lpstat_command: String,
    pub use_mock: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. `from_env` is the
    /// production entry point; tests pass a map instead of touching the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let server = ServerConfig {
            host: var("PRINT_SERVER_HOST", "0.0.0.0"),
            port: var("PRINT_SERVER_PORT", "3000")
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            debug: parse_flag(&var("PRINT_SERVER_DEBUG", "false")),
        };

        let auth = AuthConfig {
            api_key: var("PRINT_API_KEY", DEFAULT_API_KEY),
        };

        let name = var("PRINTER_NAME", "");
        let printer = PrinterConfig {
            name: if name.trim().is_empty() {
                None
            } else {
                Some(name.trim().to_string())
            },
            options: var("PRINT_OPTIONS", "fit-to-page,media=A4.Borderless")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_copies: var("PRINT_MAX_COPIES", "10")
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidMaxCopies)?,
            lp_command: var("PRINT_LP_COMMAND", "lp"),
            lpstat_command: var("PRINT_LPSTAT_COMMAND", "lpstat"),
            use_mock: parse_flag(&var("PRINT_USE_MOCK", "false")),
        };

        let upload = UploadConfig {
            max_bytes: match lookup("PRINT_MAX_UPLOAD_BYTES") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidUploadLimit)?,
                None => DEFAULT_MAX_UPLOAD_BYTES,
            },
            dir: lookup("PRINT_UPLOAD_DIR")
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
        };

        let config = Config {
            server,
            auth,
            printer,
            upload,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        if self.printer.max_copies == 0 {
            return Err(ConfigError::InvalidMaxCopies);
        }

        if self.auth.api_key.is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }

        if self.upload.max_bytes == 0 {
            return Err(ConfigError::InvalidUploadLimit);
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| ConfigError::InvalidSocketAddr {
                host: self.server.host.clone(),
            })
    }

    pub fn uses_default_api_key(&self) -> bool {
        self.auth.api_key == DEFAULT_API_KEY
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        if self.server.debug {
            "debug"
        } else {
            "info"
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("PRINT_MAX_COPIES must be a positive integer")]
    InvalidMaxCopies,

    #[error("PRINT_MAX_UPLOAD_BYTES must be a positive integer")]
    InvalidUploadLimit,

    #[error("PRINT_API_KEY must not be empty")]
    EmptyApiKey,

    #[error("Invalid bind address: {host}")]
    InvalidSocketAddr { host: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]).expect("Failed to create config");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.server.debug);
        assert!(config.printer.name.is_none());
        assert_eq!(
            config.printer.options,
            vec!["fit-to-page".to_string(), "media=A4.Borderless".to_string()]
        );
        assert_eq!(config.printer.max_copies, 10);
        assert_eq!(config.upload.max_bytes, 16 * 1024 * 1024);
        assert!(config.uses_default_api_key());
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_invalid_port() {
        let result = config_from(&[("PRINT_SERVER_PORT", "invalid")]);
        assert!(matches!(result, Err(ConfigError::InvalidPort)));

        let result = config_from(&[("PRINT_SERVER_PORT", "0")]);
        assert!(matches!(result, Err(ConfigError::InvalidPort)));
    }

    #[test]
    fn test_printer_overrides() {
        let config = config_from(&[
            ("PRINTER_NAME", " Office_Laser "),
            ("PRINT_OPTIONS", "media=Letter, ,orientation-requested=4"),
            ("PRINT_MAX_COPIES", "3"),
            ("PRINT_SERVER_DEBUG", "TRUE"),
        ])
        .unwrap();

        assert_eq!(config.printer.name.as_deref(), Some("Office_Laser"));
        assert_eq!(
            config.printer.options,
            vec!["media=Letter".to_string(), "orientation-requested=4".to_string()]
        );
        assert_eq!(config.printer.max_copies, 3);
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_blank_printer_name_means_autodiscover() {
        let config = config_from(&[("PRINTER_NAME", "   ")]).unwrap();
        assert!(config.printer.name.is_none());
    }

    #[test]
    fn test_rejects_zero_copies_and_empty_key() {
        assert!(matches!(
            config_from(&[("PRINT_MAX_COPIES", "0")]),
            Err(ConfigError::InvalidMaxCopies)
        ));
        assert!(matches!(
            config_from(&[("PRINT_API_KEY", "")]),
            Err(ConfigError::EmptyApiKey)
        ));
    }

    #[test]
    fn test_socket_addr() {
        let config = config_from(&[("PRINT_SERVER_HOST", "127.0.0.1")]).unwrap();
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:3000");

        let config = config_from(&[("PRINT_SERVER_HOST", "not a host")]).unwrap();
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_debug_output_redacts_api_key() {
        let config = config_from(&[("PRINT_API_KEY", "s3cret")]).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("s3cret"));
    }
}
