use crate::catalog::{CatalogBackend, RecordDefaults};
use crate::error::AppError;
use crate::orientation::OrientationStrategy;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_originals_directory")]
    pub originals_directory: PathBuf,
    #[serde(default = "default_thumbnail_directory")]
    pub thumbnail_directory: PathBuf,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default)]
    pub catalog_backend: CatalogBackend,
    #[serde(default)]
    pub backup_directory: Option<PathBuf>,
    /// Size name to edge length in pixels.
    #[serde(default = "default_sizes")]
    pub sizes: BTreeMap<String, u32>,
    /// Size names rendered as centered squares rather than scaled to fit.
    #[serde(default = "default_square_sizes")]
    pub square_sizes: BTreeSet<String>,
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: BTreeSet<String>,
    #[serde(default = "default_author")]
    pub default_author: String,
    #[serde(default = "default_license")]
    pub default_license: String,
    #[serde(default)]
    pub orientation_strategy: OrientationStrategy,
    #[serde(default = "default_square_dpi")]
    pub square_dpi: Option<u16>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_originals_directory() -> PathBuf {
    PathBuf::from("originals")
}

fn default_thumbnail_directory() -> PathBuf {
    PathBuf::from("photos")
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("gallery.db")
}

fn default_sizes() -> BTreeMap<String, u32> {
    [("thumbnail", 150), ("thumbsquare", 400), ("medium", 600), ("large", 1200)]
        .into_iter()
        .map(|(name, edge)| (name.to_string(), edge))
        .collect()
}

fn default_square_sizes() -> BTreeSet<String> {
    BTreeSet::from(["thumbsquare".to_string()])
}

fn default_supported_extensions() -> BTreeSet<String> {
    ["jpg", "jpeg", "png", "gif"].iter().map(|e| e.to_string()).collect()
}

fn default_author() -> String {
    RecordDefaults::default().author
}

fn default_license() -> String {
    RecordDefaults::default().license
}

fn default_square_dpi() -> Option<u16> {
    Some(144)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            originals_directory: default_originals_directory(),
            thumbnail_directory: default_thumbnail_directory(),
            catalog_path: default_catalog_path(),
            catalog_backend: CatalogBackend::default(),
            backup_directory: None,
            sizes: default_sizes(),
            square_sizes: default_square_sizes(),
            supported_extensions: default_supported_extensions(),
            default_author: default_author(),
            default_license: default_license(),
            orientation_strategy: OrientationStrategy::default(),
            square_dpi: default_square_dpi(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Layers `config/default`, `config/{RUN_MODE}`, `config/local`, the
    /// explicit file if any, then `GALLERY_*` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self, AppError> {
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false));
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path));
        }

        let s = builder
            .add_source(Environment::with_prefix("GALLERY").try_parsing(true))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.supported_extensions = config
            .supported_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        Ok(config)
    }

    pub fn record_defaults(&self) -> RecordDefaults {
        RecordDefaults {
            author: self.default_author.clone(),
            license: self.default_license.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_configuration_uses_defaults() {
        let s = Config::builder().build().unwrap();
        let config: AppConfig = s.try_deserialize().unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.sizes["large"], 1200);
        assert_eq!(config.catalog_backend, CatalogBackend::Sqlite);
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.toml");
        std::fs::write(
            &path,
            r#"
originals_directory = "/srv/originals"
catalog_backend = "json"
catalog_path = "catalog.json"
orientation_strategy = "manual"
supported_extensions = [".JPG", "png"]

[sizes]
small = 100
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.originals_directory, PathBuf::from("/srv/originals"));
        assert_eq!(config.catalog_backend, CatalogBackend::Json);
        assert_eq!(config.orientation_strategy, OrientationStrategy::Manual);
        assert_eq!(config.sizes.get("small"), Some(&100));
        assert!(config.supported_extensions.contains("jpg"));
        assert_eq!(config.thumbnail_directory, PathBuf::from("photos"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(AppConfig::load(Some(Path::new("/no/such/gallery.toml"))).is_err());
    }
}
