use anyhow::{bail, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use barkeep_supabase::SupabaseConfig;

pub const CONFIG_ENV: &str = "BARKEEP_CONFIG";
pub const URL_ENV: &str = "SUPABASE_URL";
pub const KEY_ENV: &str = "SUPABASE_ANON_KEY";

/// Which gateway the CLI talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Supabase,
    Memory,
}

fn default_images_bucket() -> String {
    barkeep::IMAGES_BUCKET.to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_recent_orders_limit() -> usize {
    barkeep::dashboard::DEFAULT_RECENT_ORDERS
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// `supabase:` section; url and key may also come from the environment
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupabaseSection {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default = "default_images_bucket")]
    pub images_bucket: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SupabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            images_bucket: default_images_bucket(),
            schema: default_schema(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Configuration for the CLI
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub supabase: SupabaseSection,
    #[serde(default = "default_recent_orders_limit")]
    pub recent_orders_limit: usize,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            supabase: SupabaseSection::default(),
            recent_orders_limit: default_recent_orders_limit(),
            log_filter: default_log_filter(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file. A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e)
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: AppConfig = serde_yaml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config YAML {}: {}", path.display(), e)
        })?;

        Ok(config)
    }

    /// Let `SUPABASE_URL` and `SUPABASE_ANON_KEY` override the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(URL_ENV).filter(|v| !v.is_empty()) {
            self.supabase.url = Some(url);
        }
        if let Some(key) = lookup(KEY_ENV).filter(|v| !v.is_empty()) {
            self.supabase.anon_key = Some(key);
        }
    }

    pub fn supabase_config(&self) -> Result<SupabaseConfig> {
        let (Some(url), Some(anon_key)) = (&self.supabase.url, &self.supabase.anon_key) else {
            bail!(
                "backend `supabase` needs supabase.url and supabase.anon_key (or {} and {})",
                URL_ENV,
                KEY_ENV
            );
        };
        Ok(SupabaseConfig {
            url: url.clone(),
            anon_key: anon_key.clone(),
            images_bucket: self.supabase.images_bucket.clone(),
            schema: self.supabase.schema.clone(),
            request_timeout_secs: self.supabase.request_timeout_secs,
        })
    }
}

/// Config file to read: `--config`, then `BARKEEP_CONFIG`, then
/// `~/.config/barkeep/config.yaml`.
pub fn resolve_config_path(
    cli_path: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    if cli_path.is_some() {
        return cli_path;
    }
    if let Some(env_path) = lookup(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }
    lookup("HOME").map(|home| {
        let mut path = PathBuf::from(home);
        path.push(".config");
        path.push("barkeep");
        path.push("config.yaml");
        path
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from_file(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.recent_orders_limit, 10);
        assert_eq!(config.supabase.images_bucket, "images");
    }

    #[test]
    fn reads_yaml_and_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "backend: supabase\nsupabase:\n  url: https://abcd.supabase.co\n  anon_key: anon\nrecent_orders_limit: 5"
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.recent_orders_limit, 5);
        assert_eq!(config.log_filter, "info");

        let supabase = config.supabase_config().unwrap();
        assert_eq!(supabase.url, "https://abcd.supabase.co");
        assert_eq!(supabase.schema, "public");
        assert_eq!(supabase.request_timeout_secs, 30);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend: [not, a, backend]").unwrap();
        let err = AppConfig::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config YAML"));
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = AppConfig::default();
        config.supabase.url = Some("https://old.supabase.co".into());
        config.apply_env(env(&[
            (URL_ENV, "https://new.supabase.co"),
            (KEY_ENV, "secret"),
        ]));
        let supabase = config.supabase_config().unwrap();
        assert_eq!(supabase.url, "https://new.supabase.co");
        assert_eq!(supabase.anon_key, "secret");
    }

    #[test]
    fn supabase_without_key_is_an_error() {
        let mut config = AppConfig::default();
        config.supabase.url = Some("https://abcd.supabase.co".into());
        assert!(config.supabase_config().is_err());
    }

    #[test]
    fn config_path_precedence() {
        let vars = env(&[(CONFIG_ENV, "/etc/barkeep.yaml"), ("HOME", "/home/bar")]);
        assert_eq!(
            resolve_config_path(Some("local.yaml".into()), &vars),
            Some(PathBuf::from("local.yaml"))
        );
        assert_eq!(
            resolve_config_path(None, &vars),
            Some(PathBuf::from("/etc/barkeep.yaml"))
        );
        assert_eq!(
            resolve_config_path(None, env(&[("HOME", "/home/bar")])),
            Some(PathBuf::from("/home/bar/.config/barkeep/config.yaml"))
        );
    }
}
