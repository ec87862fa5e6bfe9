//! Configuration loading and root folder resolution
//!
//! Bootstrap settings come from a TOML file. Every field has a compiled
//! default, so a missing file or a partial file is never fatal.

use crate::geo::BoundingBox;
use crate::proximity::{ExplorerMode, ProximityConfig};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "POLARIS_ROOT_FOLDER";
/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "POLARIS_CONFIG";
/// Environment variable overriding `[openai] api_key`
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable overriding `[tiles] api_key`
pub const MAPTILER_KEY_ENV: &str = "MAPTILER_API_KEY";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a knowledgeable and friendly tour guide for Harvard Yard. \
Answer visitors' questions about the landmark they are looking at in a warm, engaging way. \
Keep answers concise, two or three short paragraphs at most, and suitable for being read aloud.";

/// Top-level TOML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub port: u16,
    pub logging: LoggingConfig,
    pub content: ContentConfig,
    pub proximity: ProximitySection,
    pub narration: NarrationConfig,
    pub openai: OpenAiConfig,
    pub speech_cache: SpeechCacheConfig,
    pub tiles: TilesConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: 5750,
            logging: LoggingConfig::default(),
            content: ContentConfig::default(),
            proximity: ProximitySection::default(),
            narration: NarrationConfig::default(),
            openai: OpenAiConfig::default(),
            speech_cache: SpeechCacheConfig::default(),
            tiles: TilesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "polaris_guide=info,polaris_tiles=info,polaris_common=info,tower_http=info"
                .to_string(),
        }
    }
}

/// Where landmark content lives, relative paths resolved against the root folder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub landmarks_csv: PathBuf,
    pub places: PathBuf,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            landmarks_csv: PathBuf::from("landmarks.csv"),
            places: PathBuf::from("places.toml"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximitySection {
    pub mode: ExplorerMode,
    pub discovery_radius_m: f64,
    pub interaction_radius_m: f64,
    pub min_opacity: f64,
    pub max_blur_px: f64,
}

impl Default for ProximitySection {
    fn default() -> Self {
        let thresholds = ProximityConfig::default();
        Self {
            mode: ExplorerMode::Explorer,
            discovery_radius_m: thresholds.discovery_radius_m,
            interaction_radius_m: thresholds.interaction_radius_m,
            min_opacity: thresholds.min_opacity,
            max_blur_px: thresholds.max_blur_px,
        }
    }
}

impl ProximitySection {
    pub fn thresholds(&self) -> ProximityConfig {
        ProximityConfig {
            discovery_radius_m: self.discovery_radius_m,
            interaction_radius_m: self.interaction_radius_m,
            min_opacity: self.min_opacity,
            max_blur_px: self.max_blur_px,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Interval between revealed characters
    pub reveal_tick_ms: u64,
    /// Text written into the narrator entry when an answer cannot be fetched
    pub error_message: String,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            reveal_tick_ms: 30,
            error_message: "Sorry, I encountered an error. Please try again.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub tts_model: String,
    pub voice: String,
    pub system_prompt: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            chat_model: "gpt-4-turbo-preview".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            tts_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechCacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for SpeechCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            max_entries: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TilesConfig {
    pub port: u16,
    /// Upstream URL template with `{layer}`, `{z}`, `{x}`, `{y}` and `{key}` placeholders
    pub upstream_url: String,
    pub api_key: Option<String>,
    pub layer: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub bounds: BoundingBox,
    pub prefetch_zooms: Vec<u8>,
    pub requests_per_second: u32,
    pub batch_size: usize,
}

impl Default for TilesConfig {
    fn default() -> Self {
        Self {
            port: 5751,
            upstream_url: "https://api.maptiler.com/maps/{layer}/{z}/{x}/{y}.png?key={key}"
                .to_string(),
            api_key: None,
            layer: "aquarelle".to_string(),
            min_zoom: 14,
            max_zoom: 19,
            bounds: BoundingBox {
                north: 42.392885,
                south: 42.346177,
                east: -71.109761,
                west: -71.135884,
            },
            prefetch_zooms: (14..=18).collect(),
            requests_per_second: 2,
            batch_size: 4,
        }
    }
}

impl TomlConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let p = &self.proximity;
        if !(p.interaction_radius_m > 0.0) {
            return Err(Error::Config(format!(
                "proximity.interaction_radius_m must be positive (got {})",
                p.interaction_radius_m
            )));
        }
        if !(p.discovery_radius_m > p.interaction_radius_m) {
            return Err(Error::Config(format!(
                "proximity.discovery_radius_m ({}) must exceed interaction_radius_m ({})",
                p.discovery_radius_m, p.interaction_radius_m
            )));
        }
        if !(p.min_opacity > 0.0 && p.min_opacity <= 1.0) {
            return Err(Error::Config(format!(
                "proximity.min_opacity must be in (0, 1] (got {})",
                p.min_opacity
            )));
        }
        if !(p.max_blur_px >= 0.0) {
            return Err(Error::Config(format!(
                "proximity.max_blur_px must not be negative (got {})",
                p.max_blur_px
            )));
        }
        if self.narration.reveal_tick_ms == 0 {
            return Err(Error::Config("narration.reveal_tick_ms must be positive".to_string()));
        }

        let t = &self.tiles;
        if t.min_zoom > t.max_zoom {
            return Err(Error::Config(format!(
                "tiles.min_zoom ({}) must not exceed max_zoom ({})",
                t.min_zoom, t.max_zoom
            )));
        }
        if let Some(z) = t
            .prefetch_zooms
            .iter()
            .find(|z| **z < t.min_zoom || **z > t.max_zoom)
        {
            return Err(Error::Config(format!(
                "tiles.prefetch_zooms entry {} outside [{}, {}]",
                z, t.min_zoom, t.max_zoom
            )));
        }
        let layer_ok = !t.layer.is_empty()
            && t
                .layer
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !layer_ok {
            return Err(Error::Config(format!(
                "tiles.layer must be a plain name of letters, digits, '-' or '_' (got {:?})",
                t.layer
            )));
        }
        if t.requests_per_second == 0 || t.batch_size == 0 {
            return Err(Error::Config(
                "tiles.requests_per_second and tiles.batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Replace API keys with values from the environment when set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(OPENAI_KEY_ENV) {
            if !key.trim().is_empty() {
                self.openai.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var(MAPTILER_KEY_ENV) {
            if !key.trim().is_empty() {
                self.tiles.api_key = Some(key);
            }
        }
    }

    /// Resolve a content path against the root folder
    pub fn content_path(&self, root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

/// Load configuration
///
/// Priority for locating the file: explicit path (CLI), `POLARIS_CONFIG`,
/// then the platform config locations. A missing file yields defaults with a
/// warning; an unreadable or invalid file is an error.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => std::env::var(CONFIG_PATH_ENV)
            .ok()
            .map(PathBuf::from)
            .or_else(|| find_config_file().ok()),
    };

    let mut config = match path {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            TomlConfig::from_toml_str(&content)?
        }
        Some(path) => {
            warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            );
            TomlConfig::default()
        }
        None => {
            warn!("No config file found, using compiled defaults");
            TomlConfig::default()
        }
    };

    config.apply_env_overrides();
    Ok(config)
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Platform config file locations, user before system
fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("polaris").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/polaris/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("polaris"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\polaris"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("polaris"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/polaris"))
    } else {
        // ~/.local/share/polaris
        dirs::data_local_dir()
            .map(|d| d.join("polaris"))
            .unwrap_or_else(|| PathBuf::from("./polaris_data"))
    }
}
