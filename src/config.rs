use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .agent-stats.toml.
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// GitHub-specific settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Which agent the statistics are about
    #[serde(default)]
    pub agent: AgentConfig,

    /// Cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    /// Default agent login, used when --agent is not given
    pub login: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Cache directory override; defaults to the per-user cache dir
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from .agent-stats.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(".agent-stats.toml");
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert!(config.agent.login.is_none());
        assert!(config.cache.dir.is_none());
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[github]
token = "ghp_example"

[agent]
login = "copilot-swe-agent"

[cache]
dir = "/tmp/agent-stats-cache"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github.token.as_deref(), Some("ghp_example"));
        assert_eq!(config.agent.login.as_deref(), Some("copilot-swe-agent"));
        assert_eq!(
            config.cache.dir.as_deref(),
            Some(Path::new("/tmp/agent-stats-cache"))
        );
    }
}
