//! Site configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. The file lives in
//! the content root and is sparse: stock defaults are overridden key by key.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [site]
//! title = "Stacks"
//! welcome = "Welcome Learner"
//! description = "Subject by experience"
//! site_url = "http://localhost:8000"
//! author = "Nikhil Rustagi"
//! copyright = "© 2025"
//!
//! [auth]                        # Omit the whole section to publish notes openly
//! domain = "example.eu.auth0.com"
//! client_id = "abc123"
//! allowed_family_name = "Rustagi"
//!
//! [catalog]
//! cover_seed = 7                # Omit for a fresh cover shuffle on every render
//!
//! [serve]
//! interface = "127.0.0.1"
//! port = 8000
//! origin = "https://notes.example.com"  # Public origin, defaults to http://interface:port
//!
//! [colors.light]
//! background = "#fdfcf8"
//! ...
//!
//! [processing]
//! max_processes = 4             # Max parallel render workers (omit for auto = CPU cores)
//! ```
//!
//! ## Environment
//!
//! `AUTH0_DOMAIN` and `AUTH0_CLIENTID` are read once at startup and override
//! (or create) the `[auth]` section; see [`apply_env`].
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Environment variable carrying the identity provider domain.
pub const ENV_AUTH_DOMAIN: &str = "AUTH0_DOMAIN";
/// Environment variable carrying the identity provider client id.
pub const ENV_AUTH_CLIENT_ID: &str = "AUTH0_CLIENTID";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Site metadata shown on the home page and in page titles.
    pub site: SiteMetadata,
    /// Hosted login. Notes are public when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    /// Books index settings.
    pub catalog: CatalogConfig,
    /// Reading server settings.
    pub serve: ServeConfig,
    /// Color schemes for light and dark modes.
    pub colors: ColorConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.title.trim().is_empty() {
            return Err(ConfigError::Validation(
                "site.title must not be empty".into(),
            ));
        }
        if let Some(auth) = &self.auth {
            if auth.domain.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "auth.domain must not be empty".into(),
                ));
            }
            if auth.client_id.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "auth.client_id must not be empty".into(),
                ));
            }
            if auth.domain.contains("://") || auth.domain.contains('/') {
                return Err(ConfigError::Validation(
                    "auth.domain must be a bare host name, e.g. \"example.eu.auth0.com\"".into(),
                ));
            }
        }
        if self.serve.port == 0 {
            return Err(ConfigError::Validation("serve.port must be non-zero".into()));
        }
        if self.serve.interface.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "serve.interface is not an IP address: {}",
                self.serve.interface
            )));
        }
        Ok(())
    }

    /// The public origin used as the post-logout target and login callback base.
    pub fn origin(&self) -> String {
        match &self.serve.origin {
            Some(origin) => origin.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.serve.interface, self.serve.port),
        }
    }
}

/// Site metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteMetadata {
    pub title: String,
    /// Home page greeting.
    pub welcome: String,
    pub description: String,
    /// Absolute URL the site is published under; used by `sitemap.xml`.
    pub site_url: String,
    pub author: String,
    pub copyright: String,
}

impl Default for SiteMetadata {
    fn default() -> Self {
        Self {
            title: "Stacks".to_string(),
            welcome: "Welcome Learner".to_string(),
            description: "Subject by experience".to_string(),
            site_url: "http://localhost:8000".to_string(),
            author: "Nikhil Rustagi".to_string(),
            copyright: "© 2025".to_string(),
        }
    }
}

/// Hosted identity provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Provider tenant host, e.g. `example.eu.auth0.com`.
    pub domain: String,
    pub client_id: String,
    /// The only family name allowed to stay logged in.
    #[serde(default = "default_allowed_family_name")]
    pub allowed_family_name: String,
}

fn default_allowed_family_name() -> String {
    "Rustagi".to_string()
}

/// Books index settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Seed for the cover colour picker. Covers are reshuffled on every render
    /// when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_seed: Option<u64>,
}

/// Reading server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeConfig {
    pub interface: String,
    pub port: u16,
    /// Public origin (scheme://host[:port]) when running behind a proxy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: "127.0.0.1".to_string(),
            port: 8000,
            origin: None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel markdown render workers.
    /// When absent, defaults to the number of CPU cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.clamp(1, cores)).unwrap_or(cores)
}

/// Color configuration for light and dark modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorConfig {
    pub light: ColorScheme,
    pub dark: ColorScheme,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            light: ColorScheme::default_light(),
            dark: ColorScheme::default_dark(),
        }
    }
}

/// Individual color scheme (light or dark).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorScheme {
    pub background: String,
    pub text: String,
    /// Citations, footers, table of contents.
    pub text_muted: String,
    /// Links and the active menu entry.
    pub accent: String,
    /// Background of fenced code blocks.
    pub code_background: String,
    /// Ruled page behind each book cover.
    pub page: String,
}

impl ColorScheme {
    pub fn default_light() -> Self {
        Self {
            background: "#fdfcf8".to_string(),
            text: "#1d1d1f".to_string(),
            text_muted: "#6e6e73".to_string(),
            accent: "#b4424b".to_string(),
            code_background: "#282a36".to_string(),
            page: "#fffef6".to_string(),
        }
    }

    pub fn default_dark() -> Self {
        Self {
            background: "#121212".to_string(),
            text: "#ececec".to_string(),
            text_muted: "#9a9aa0".to_string(),
            accent: "#ff8a8a".to_string(),
            code_background: "#1e1f29".to_string(),
            page: "#2a2a2a".to_string(),
        }
    }
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::default_light()
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SiteConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the content root.
///
/// Merges user values on top of stock defaults, applies the process
/// environment, rejects unknown keys, and validates the result.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    let config = resolve_config(base, overlay)?;
    let config = apply_env(config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Overlay identity provider settings from the environment.
///
/// Either variable alone updates an existing `[auth]` section. A new section
/// is only created when both are present.
pub fn apply_env(mut config: SiteConfig, lookup: impl Fn(&str) -> Option<String>) -> SiteConfig {
    let domain = lookup(ENV_AUTH_DOMAIN).filter(|v| !v.trim().is_empty());
    let client_id = lookup(ENV_AUTH_CLIENT_ID).filter(|v| !v.trim().is_empty());

    if let Some(auth) = config.auth.as_mut() {
        if let Some(domain) = domain {
            auth.domain = domain;
        }
        if let Some(client_id) = client_id {
            auth.client_id = client_id;
        }
    } else if let (Some(domain), Some(client_id)) = (domain, client_id) {
        config.auth = Some(AuthConfig {
            domain,
            client_id,
            allowed_family_name: default_allowed_family_name(),
        });
    }
    config
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Stacks Configuration
# ====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Site metadata
# ---------------------------------------------------------------------------
[site]
title = "Stacks"
welcome = "Welcome Learner"
description = "Subject by experience"
# Absolute URL the site is published under (used in sitemap.xml).
site_url = "http://localhost:8000"
author = "Nikhil Rustagi"
copyright = "© 2025"

# ---------------------------------------------------------------------------
# Hosted login
# ---------------------------------------------------------------------------
# Uncomment to put note pages behind a login. Notes are then only served by
# `stacks serve`; `stacks build` skips them. AUTH0_DOMAIN and AUTH0_CLIENTID
# in the environment override these values.
# [auth]
# domain = "example.eu.auth0.com"
# client_id = "your-client-id"
# allowed_family_name = "Rustagi"

# ---------------------------------------------------------------------------
# Books index
# ---------------------------------------------------------------------------
[catalog]
# Seed for the cover colours. Omit to reshuffle covers on every render.
# cover_seed = 7

# ---------------------------------------------------------------------------
# Reading server
# ---------------------------------------------------------------------------
[serve]
interface = "127.0.0.1"
port = 8000
# Public origin when running behind a proxy. Defaults to http://interface:port.
# origin = "https://notes.example.com"

# ---------------------------------------------------------------------------
# Colors - Light mode (prefers-color-scheme: light)
# ---------------------------------------------------------------------------
[colors.light]
background = "#fdfcf8"
text = "#1d1d1f"
text_muted = "#6e6e73"      # Citations, footers, table of contents
accent = "#b4424b"          # Links, active menu entry
code_background = "#282a36"
page = "#fffef6"            # Ruled page behind each book cover

# ---------------------------------------------------------------------------
# Colors - Dark mode (prefers-color-scheme: dark)
# ---------------------------------------------------------------------------
[colors.dark]
background = "#121212"
text = "#ececec"
text_muted = "#9a9aa0"
accent = "#ff8a8a"
code_background = "#1e1f29"
page = "#2a2a2a"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel markdown render workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

/// Generate CSS custom properties from color config.
pub fn generate_color_css(colors: &ColorConfig) -> String {
    fn scheme_vars(s: &ColorScheme, indent: &str) -> String {
        [
            ("bg", &s.background),
            ("text", &s.text),
            ("text-muted", &s.text_muted),
            ("accent", &s.accent),
            ("code-bg", &s.code_background),
            ("page", &s.page),
        ]
        .iter()
        .map(|(name, value)| format!("{indent}--color-{name}: {value};"))
        .collect::<Vec<_>>()
        .join("\n")
    }

    format!(
        ":root {{\n{light}\n}}\n\n@media (prefers-color-scheme: dark) {{\n    :root {{\n{dark}\n    }}\n}}",
        light = scheme_vars(&colors.light, "    "),
        dark = scheme_vars(&colors.dark, "        "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_has_site_metadata() {
        let config = SiteConfig::default();
        assert_eq!(config.site.title, "Stacks");
        assert_eq!(config.site.welcome, "Welcome Learner");
        assert!(config.auth.is_none());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[site]
title = "Notebook"
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.site.title, "Notebook");
        assert_eq!(config.site.welcome, "Welcome Learner");
        assert_eq!(config.serve.port, 8000);
    }

    #[test]
    fn parse_auth_section_with_default_allow_list() {
        let toml = r#"
[auth]
domain = "tenant.eu.auth0.com"
client_id = "abc"
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        let auth = config.auth.unwrap();
        assert_eq!(auth.domain, "tenant.eu.auth0.com");
        assert_eq!(auth.allowed_family_name, "Rustagi");
    }

    #[test]
    fn generate_css_uses_config_colors() {
        let mut colors = ColorConfig::default();
        colors.light.background = "#f0f0f0".to_string();
        colors.dark.background = "#1a1a1a".to_string();

        let css = generate_color_css(&colors);
        assert!(css.contains("--color-bg: #f0f0f0;"));
        assert!(css.contains("--color-bg: #1a1a1a;"));
        assert!(css.contains("@media (prefers-color-scheme: dark)"));
        assert!(css.contains("--color-code-bg:"));
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = resolve_config(
            stock_defaults_value().unwrap(),
            load_raw_config(tmp.path()).unwrap(),
        )
        .unwrap();
        assert_eq!(config.site.title, "Stacks");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r##"
[site]
author = "Someone"

[colors.light]
accent = "#123456"
"##,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.site.author, "Someone");
        assert_eq!(config.colors.light.accent, "#123456");
        assert_eq!(config.colors.dark.background, "#121212");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "this is not valid toml [[[").unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_key_rejected() {
        let result: Result<SiteConfig, _> = toml::from_str("[site]\ntitel = \"x\"\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<SiteConfig, _> = toml::from_str("[images]\nquality = 90\n");
        assert!(result.is_err());
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(SiteConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_empty_auth_domain() {
        let mut config = SiteConfig::default();
        config.auth = Some(AuthConfig {
            domain: "".into(),
            client_id: "abc".into(),
            allowed_family_name: "Rustagi".into(),
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth.domain"));
    }

    #[test]
    fn validate_auth_domain_with_scheme() {
        let mut config = SiteConfig::default();
        config.auth = Some(AuthConfig {
            domain: "https://tenant.auth0.com".into(),
            client_id: "abc".into(),
            allowed_family_name: "Rustagi".into(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_bad_interface() {
        let mut config = SiteConfig::default();
        config.serve.interface = "localhost".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "[serve]\nport = 0\n").unwrap();
        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // Environment overlay
    // =========================================================================

    #[test]
    fn env_creates_auth_section_when_both_present() {
        let config = apply_env(SiteConfig::default(), |key| match key {
            ENV_AUTH_DOMAIN => Some("tenant.auth0.com".to_string()),
            ENV_AUTH_CLIENT_ID => Some("client".to_string()),
            _ => None,
        });
        let auth = config.auth.unwrap();
        assert_eq!(auth.domain, "tenant.auth0.com");
        assert_eq!(auth.client_id, "client");
        assert_eq!(auth.allowed_family_name, "Rustagi");
    }

    #[test]
    fn env_needs_both_values_to_create_auth() {
        let config = apply_env(SiteConfig::default(), |key| {
            (key == ENV_AUTH_DOMAIN).then(|| "tenant.auth0.com".to_string())
        });
        assert!(config.auth.is_none());
    }

    #[test]
    fn env_overrides_existing_auth_values() {
        let mut base = SiteConfig::default();
        base.auth = Some(AuthConfig {
            domain: "old.auth0.com".into(),
            client_id: "old".into(),
            allowed_family_name: "Owner".into(),
        });
        let config = apply_env(base, |key| {
            (key == ENV_AUTH_CLIENT_ID).then(|| "new".to_string())
        });
        let auth = config.auth.unwrap();
        assert_eq!(auth.domain, "old.auth0.com");
        assert_eq!(auth.client_id, "new");
        assert_eq!(auth.allowed_family_name, "Owner");
    }

    #[test]
    fn env_without_values_is_noop() {
        let config = apply_env(SiteConfig::default(), no_env);
        assert!(config.auth.is_none());
    }

    // =========================================================================
    // Origin and threads
    // =========================================================================

    #[test]
    fn origin_defaults_to_listen_address() {
        assert_eq!(SiteConfig::default().origin(), "http://127.0.0.1:8000");
    }

    #[test]
    fn origin_override_drops_trailing_slash() {
        let mut config = SiteConfig::default();
        config.serve.origin = Some("https://notes.example.com/".into());
        assert_eq!(config.origin(), "https://notes.example.com");
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        assert_eq!(effective_threads(&config), cores);
    }

    // =========================================================================
    // merge_toml / stock config
    // =========================================================================

    #[test]
    fn merge_toml_deep_nested() {
        let base: toml::Value = toml::from_str(
            r##"
[colors.light]
background = "#fff"
text = "#000"
"##,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r##"
[colors.light]
background = "#fafafa"
"##,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let light = merged.get("colors").unwrap().get("light").unwrap();
        assert_eq!(light.get("background").unwrap().as_str(), Some("#fafafa"));
        assert_eq!(light.get("text").unwrap().as_str(), Some("#000"));
    }

    #[test]
    fn resolve_config_merges_auth_over_defaults() {
        let overlay: toml::Value = toml::from_str(
            r#"
[auth]
domain = "tenant.auth0.com"
client_id = "abc"
"#,
        )
        .unwrap();
        let config = resolve_config(stock_defaults_value().unwrap(), Some(overlay)).unwrap();
        assert_eq!(config.auth.unwrap().client_id, "abc");
        assert_eq!(config.site.title, "Stacks");
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config.site.title, "Stacks");
        assert!(config.auth.is_none());
        assert_eq!(config.catalog.cover_seed, None);
        assert_eq!(config.serve.port, 8000);
        assert_eq!(config.colors.light.background, "#fdfcf8");
        assert_eq!(config.colors.dark.background, "#121212");
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        assert!(val.get("site").is_some());
        assert!(val.get("serve").is_some());
        assert!(val.get("colors").is_some());
        assert!(val.get("auth").is_none());
    }
}
