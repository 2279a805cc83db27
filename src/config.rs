use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

pub const DEFAULT_BOUNDARY_URL: &str =
    "https://raw.githubusercontent.com/macoymejia/geojsonph/master/Regions/Regions.json";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub boundaries: BoundaryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Workbook (.xlsx, .xls, .ods, ...) or a directory holding `<sheet>.csv` files
    pub workbook: PathBuf,
    #[serde(default = "default_region_column")]
    pub region_column: String,
    #[serde(default)]
    pub sheets: SheetNames,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SheetNames {
    pub mean: String,
    pub min: String,
    pub max: String,
    pub annual: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BoundaryConfig {
    pub url: String,
    /// Local pinned copy; read instead of the network once it exists
    pub cache: PathBuf,
    /// Feature property matched against the region column
    pub join_key: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub max_sessions: usize,
}

fn default_region_column() -> String {
    "REGION".to_string()
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            mean: "mean-temp".to_string(),
            min: "min-temp".to_string(),
            max: "max-temp".to_string(),
            annual: "annual_temp".to_string(),
        }
    }
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BOUNDARY_URL.to_string(),
            cache: PathBuf::from("data/regions.geojson"),
            join_key: "REGION".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8050,
            static_dir: PathBuf::from("static"),
            max_sessions: 10_000,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
