// src/config.rs
//! Runtime configuration: listening port, CORS origins, per-provider
//! verification secrets, and content-source credentials.
//!
//! Layering: `.env` (loaded in main via dotenvy), plain env vars, and an
//! optional TOML/JSON file for the origin list.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::webhooks::Provider;

const ENV_ORIGINS_PATH: &str = "RELAY_ORIGINS_PATH";
const DEFAULT_PORT: u16 = 5000;

/// The marketing site's own origins; used when nothing else is configured.
const DEFAULT_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:3001"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Origins allowed on the HTTP API and the live channel.
    pub allowed_origins: Vec<String>,
    pub instagram_verify_token: Option<String>,
    pub facebook_verify_token: Option<String>,
    pub linkedin_verify_token: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            allowed_origins: load_origins_default()?,
            instagram_verify_token: non_empty_env("INSTAGRAM_WEBHOOK_TOKEN"),
            facebook_verify_token: non_empty_env("FACEBOOK_WEBHOOK_TOKEN"),
            linkedin_verify_token: non_empty_env("LINKEDIN_WEBHOOK_TOKEN"),
        })
    }

    /// The handshake secret for a provider; `None` means verification can
    /// never succeed for it.
    pub fn verify_token_for(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Instagram => self.instagram_verify_token.as_deref(),
            Provider::Facebook => self.facebook_verify_token.as_deref(),
            Provider::Linkedin => self.linkedin_verify_token.as_deref(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origins: DEFAULT_ORIGINS.map(str::to_string).to_vec(),
            instagram_verify_token: None,
            facebook_verify_token: None,
            linkedin_verify_token: None,
        }
    }
}

/// Credentials for the content-source snapshot fetchers. Opaque to the hub;
/// only the client-side polling fallback reads them.
#[derive(Debug, Clone, Default)]
pub struct SnapshotConfig {
    pub instagram_token: Option<String>,
    pub facebook_token: Option<String>,
    pub facebook_page: Option<String>,
    pub linkedin_token: Option<String>,
    pub linkedin_org: Option<String>,
}

impl SnapshotConfig {
    pub fn from_env() -> Self {
        Self {
            instagram_token: non_empty_env("INSTAGRAM_ACCESS_TOKEN"),
            facebook_token: non_empty_env("FACEBOOK_ACCESS_TOKEN"),
            facebook_page: non_empty_env("FACEBOOK_PAGE"),
            linkedin_token: non_empty_env("LINKEDIN_ACCESS_TOKEN"),
            linkedin_org: non_empty_env("LINKEDIN_ORG_ID"),
        }
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Load allowed origins using env + fallbacks:
/// 1) $ALLOWED_ORIGINS (comma-separated)
/// 2) $RELAY_ORIGINS_PATH (TOML or JSON file)
/// 3) config/allowed_origins.toml
/// 4) config/allowed_origins.json
/// 5) the site's default localhost origins
pub fn load_origins_default() -> Result<Vec<String>> {
    if let Some(csv) = non_empty_env("ALLOWED_ORIGINS") {
        return Ok(clean_list(csv.split(',').map(str::to_string).collect()));
    }
    if let Ok(p) = std::env::var(ENV_ORIGINS_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_origins_from(&pb);
        }
        return Err(anyhow!("RELAY_ORIGINS_PATH points to non-existent path"));
    }
    let toml_p = PathBuf::from("config/allowed_origins.toml");
    if toml_p.exists() {
        return load_origins_from(&toml_p);
    }
    let json_p = PathBuf::from("config/allowed_origins.json");
    if json_p.exists() {
        return load_origins_from(&json_p);
    }
    Ok(DEFAULT_ORIGINS.map(str::to_string).to_vec())
}

/// Load origins from an explicit path. Supports TOML or JSON formats.
pub fn load_origins_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading origins from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_origins(&content, ext.as_str())
}

fn parse_origins(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("origins");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported origins format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlOrigins {
        origins: Vec<String>,
    }
    let v: TomlOrigins = toml::from_str(s)?;
    Ok(clean_list(v.origins))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() {
            set.insert(t.to_string());
        }
    }
    set.into_iter().collect()
}
