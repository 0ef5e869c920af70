//! Site configuration loaded from YAML.
//!
//! The config file describes one site: where its content lives, where
//! durable artifacts go, and how the server presents it. Defaults follow
//! the deployment layout (`/var/lib/notepub`, `/var/cache/notepub`) so a
//! minimal config only needs `site.base_url` and a content source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_FILE_ROOT: &str = "/var/lib/notepub";
const DEFAULT_CACHE_ROOT: &str = "/var/cache/notepub";
const DEFAULT_THEMES_DIR: &str = "/opt/notepub/themes";
const DEFAULT_THEME_NAME: &str = "seo-minimal";
const DEFAULT_LOCAL_DIR: &str = "markdown";

/// Which content source backs the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub content: ContentConfig,
    pub remote: RemoteConfig,
    /// Per-type `og:type` values (e.g. `post: article`).
    pub og_type_by_type: BTreeMap<String, String>,
    pub paths: PathsConfig,
    pub theme: ThemeConfig,
    pub robots: RobotsConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub media: MediaConfig,
    pub rules_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub id: String,
    pub base_url: String,
    pub title: String,
    pub description: String,
    pub default_og_image: String,
    pub media_base_url: String,
    pub host: String,
    pub host_aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// `local` or `remote`; inferred from `remote.bucket` when empty.
    pub source: String,
    pub local_dir: String,
    /// Key prefix the markdown corpus lives under (e.g. `notes/`).
    pub prefix: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub region: String,
    pub force_path_style: bool,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub anonymous: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub file_root: String,
    pub artifacts_dir: String,
    pub snapshot_file: String,
    pub cache_root: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub dir: String,
    pub name: String,
    pub assets_subdir: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RobotsConfig {
    pub extra: String,
    pub disallow: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub html_ttl_seconds: u64,
    pub stale_if_error_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Serve any key under the content prefix instead of only keys
    /// referenced by indexed notes.
    pub expose_all_under_prefix: bool,
}

impl Config {
    /// Load, default-fill, and validate a config file.
    ///
    /// `path` falls back to `CONFIG_PATH`, then `config.yaml`.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("CONFIG_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("read config {}", path.display()))?;
        let mut cfg: Config = serde_yaml::from_str(&data).context("parse config")?;

        if cfg.rules_path.is_empty() {
            cfg.rules_path = path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("rules.yaml")
                .to_string_lossy()
                .into_owned();
        }
        cfg.apply_defaults();
        if cfg.site.id.is_empty() {
            cfg.site.id = "default".to_string();
        }
        cfg.site.base_url = normalize_base_url(&cfg.site.base_url);
        cfg.site.media_base_url = normalize_base_url(&cfg.site.media_base_url);
        cfg.content.prefix = normalize_prefix(&cfg.content.prefix);
        cfg.content.source = cfg.content.source.trim().to_ascii_lowercase();

        if cfg.content.source == "local" && !Path::new(&cfg.content.local_dir).is_absolute() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            cfg.content.local_dir = base
                .join(&cfg.content.local_dir)
                .to_string_lossy()
                .into_owned();
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// The resolved source kind. Only valid after `load`.
    pub fn source_kind(&self) -> SourceKind {
        if self.content.source == "remote" {
            SourceKind::Remote
        } else {
            SourceKind::Local
        }
    }

    /// Path of the persisted resolve index.
    pub fn resolve_path(&self) -> PathBuf {
        Path::new(&self.paths.artifacts_dir).join("resolve.json")
    }

    fn apply_defaults(&mut self) {
        if self.content.source.is_empty() {
            self.content.source = if self.remote.bucket.is_empty() {
                "local".to_string()
            } else {
                "remote".to_string()
            };
        }
        if self.content.local_dir.is_empty() {
            self.content.local_dir = DEFAULT_LOCAL_DIR.to_string();
        }
        if self.paths.file_root.is_empty() {
            self.paths.file_root = DEFAULT_FILE_ROOT.to_string();
        }
        if self.paths.artifacts_dir.is_empty() {
            self.paths.artifacts_dir = join(&self.paths.file_root, "artifacts");
        }
        if self.paths.snapshot_file.is_empty() {
            self.paths.snapshot_file = join(&join(&self.paths.file_root, "snapshot"), "objects.json");
        }
        if self.paths.cache_root.is_empty() {
            self.paths.cache_root = DEFAULT_CACHE_ROOT.to_string();
        }
        if self.theme.dir.is_empty() {
            self.theme.dir = DEFAULT_THEMES_DIR.to_string();
        }
        if self.theme.name.is_empty() {
            self.theme.name = DEFAULT_THEME_NAME.to_string();
        }
        if self.theme.assets_subdir.is_empty() {
            self.theme.assets_subdir = "assets".to_string();
        }
        if self.cache.html_ttl_seconds == 0 {
            self.cache.html_ttl_seconds = 600;
        }
        if self.cache.stale_if_error_seconds == 0 {
            self.cache.stale_if_error_seconds = 604_800;
        }
        if self.server.listen.is_empty() {
            self.server.listen = "0.0.0.0:8081".to_string();
        }
        if self.remote.region.is_empty() {
            self.remote.region = "us-east-1".to_string();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.site.base_url.is_empty() {
            bail!("site.base_url is required");
        }
        match self.content.source.as_str() {
            "remote" => {
                if self.remote.bucket.is_empty() {
                    bail!("remote.bucket is required");
                }
                let has_access = !self.remote.access_key.is_empty();
                let has_secret = !self.remote.secret_key.is_empty();
                if has_access != has_secret {
                    bail!("remote.access_key and remote.secret_key must be set together");
                }
            }
            "local" => {
                if self.content.local_dir.is_empty() {
                    bail!("content.local_dir is required for local source");
                }
            }
            other => bail!("content.source must be \"local\" or \"remote\", got {other:?}"),
        }
        Ok(())
    }
}

fn join(base: &str, child: &str) -> String {
    Path::new(base).join(child).to_string_lossy().into_owned()
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

fn normalize_prefix(prefix: &str) -> String {
    let prefix = prefix.trim().trim_start_matches('/');
    if prefix.is_empty() {
        return String::new();
    }
    if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load_from(yaml: &str) -> Result<Config> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        Config::load(Some(path.as_path()))
    }

    #[test]
    fn test_minimal_local_config() {
        let cfg = load_from("site:\n  base_url: \"https://example.com/\"\n").unwrap();
        assert_eq!(cfg.site.base_url, "https://example.com");
        assert_eq!(cfg.source_kind(), SourceKind::Local);
        assert_eq!(cfg.site.id, "default");
        assert_eq!(cfg.cache.html_ttl_seconds, 600);
        assert!(cfg.content.local_dir.ends_with(DEFAULT_LOCAL_DIR));
        assert!(cfg.rules_path.ends_with("rules.yaml"));
    }

    #[test]
    fn test_remote_inferred_from_bucket() {
        let cfg = load_from(
            "site:\n  base_url: https://example.com\nremote:\n  bucket: notes\n",
        )
        .unwrap();
        assert_eq!(cfg.source_kind(), SourceKind::Remote);
        assert_eq!(cfg.remote.region, "us-east-1");
    }

    #[test]
    fn test_missing_base_url_rejected() {
        assert!(load_from("site:\n  title: x\n").is_err());
    }

    #[test]
    fn test_unpaired_credentials_rejected() {
        let err = load_from(
            "site:\n  base_url: https://example.com\nremote:\n  bucket: b\n  access_key: only\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("set together"));
    }

    #[test]
    fn test_prefix_normalized() {
        let cfg = load_from(
            "site:\n  base_url: https://example.com\ncontent:\n  prefix: /notes\n",
        )
        .unwrap();
        assert_eq!(cfg.content.prefix, "notes/");
    }
}
