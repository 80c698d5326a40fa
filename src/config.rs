// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Mount options, configuration loading and project-name detection.

use serde::Deserialize;

/// Options controlling how the probe mounts into the host application.
#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    /// URL prefix the probe's own API is served under.
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    /// Owner id stamped on captured collections and history.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Port the host listens on; seeds `BASE_URL` in the default environment.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether the traffic interceptor records live requests.
    #[serde(default = "default_true")]
    pub auto_capture: bool,

    /// Whether response bodies are retained in history entries.
    #[serde(default = "default_true")]
    pub capture_response: bool,

    /// Path prefixes the interceptor never records.
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// Backing file for the system-owned cache layer.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,

    /// Optional backing file for the user-owned overlay layer.
    #[serde(default)]
    pub customization_path: Option<String>,

    /// Path segments the dashboard treats as noise when grouping routes.
    #[serde(default = "default_ignore_segments")]
    pub ignore_segments: Vec<String>,

    /// Execution-mode label seeded into the default environment.
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mount_path() -> String {
    "/api-probe".to_string()
}

fn default_user_id() -> String {
    "system".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_storage_path() -> String {
    ".api-probe/cache.json".to_string()
}

fn default_ignore_segments() -> Vec<String> {
    vec!["api".to_string(), "v1".to_string()]
}

fn default_mode() -> String {
    std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string())
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mount_path: default_mount_path(),
            user_id: default_user_id(),
            port: default_port(),
            auto_capture: default_true(),
            capture_response: default_true(),
            exclude_paths: Vec::new(),
            storage_path: default_storage_path(),
            customization_path: None,
            ignore_segments: default_ignore_segments(),
            mode: default_mode(),
        }
    }
}

impl Options {
    /// Load options from a TOML file. Every field is optional; absent fields
    /// fall back to their defaults, and a missing file yields plain defaults.
    pub async fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let s = match tokio::fs::read_to_string(path.as_ref()).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let opts: Self = toml::from_str(&s)?;
        Ok(opts)
    }
}

/// Derive the auto-capture collection name from the host project's manifest.
///
/// Reads `Cargo.toml` in the working directory, takes `package.name`, strips a
/// namespace prefix up to `/` if present, and title-cases the remaining words
/// (`-` and `_` both split words). Any failure falls back to "Auto-Captured".
pub fn project_name() -> String {
    project_name_from_manifest("Cargo.toml")
}

pub(crate) fn project_name_from_manifest<P: AsRef<std::path::Path>>(path: P) -> String {
    let fallback = "Auto-Captured".to_string();
    let raw = match std::fs::read_to_string(path.as_ref()) {
        Ok(s) => s,
        Err(_) => return fallback,
    };
    let parsed: toml::Value = match toml::from_str(&raw) {
        Ok(v) => v,
        Err(_) => return fallback,
    };
    match parsed
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
    {
        Some(name) if !name.is_empty() => title_case_name(name),
        _ => fallback,
    }
}

fn title_case_name(name: &str) -> String {
    let stripped = name.rsplit_once('/').map(|(_, tail)| tail).unwrap_or(name);
    stripped
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
