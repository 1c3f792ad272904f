//! Settings file and effect chain presets
//!
//! Both are plain TOML on disk. [`ConfigManager`] owns `config.toml` and
//! falls back to factory defaults when it is missing or unreadable;
//! [`PresetManager`] keeps one `<name>.toml` per saved [`EffectChain`].

use crate::domain::analysis::AnalysisSettings;
use crate::domain::audio::AudioError;
use crate::domain::chain::EffectChain;
use crate::domain::render::RenderSettings;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("cannot write TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid setting: {0}")]
    Audio(#[from] AudioError),

    #[error("no preset named {0:?}")]
    PresetNotFound(String),
}

async fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).await?;
    Ok(toml::from_str(&text)?)
}

async fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = toml::to_string_pretty(value)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }
    fs::write(path, text).await?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// File name offered when exporting the processed buffer
    pub default_file_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_file_name: "processed_audio.wav".to_string(),
        }
    }
}

/// Contents of `config.toml`
///
/// Every section is optional in the file; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResonareConfig {
    pub render: RenderSettings,
    pub analysis: AnalysisSettings,
    pub export: ExportConfig,
}

impl ResonareConfig {
    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        self.analysis.validate()?;
        if self.export.default_file_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "export.default_file_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = read_toml(path.as_ref()).await?;
        config.validate()?;
        debug!(fft_size = config.analysis.fft_size, "config read");
        Ok(config)
    }

    /// Write the config, creating parent directories as needed
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_toml(path.as_ref(), self).await?;
        debug!("config written");
        Ok(())
    }
}

/// Named effect chains stored as `<name>.toml`
#[derive(Debug, Clone)]
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    pub fn preset_dir(&self) -> &Path {
        &self.preset_dir
    }

    /// Names may not start with a dot or contain path separators
    fn preset_path(&self, name: &str) -> Result<PathBuf> {
        let allowed = |c: char| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ');
        if name.is_empty() || name.starts_with('.') || !name.chars().all(allowed) {
            return Err(ConfigError::Invalid(format!(
                "invalid preset name: {:?}",
                name
            )));
        }
        Ok(self.preset_dir.join(format!("{}.toml", name)))
    }

    fn not_found(name: &str, e: ConfigError) -> ConfigError {
        match e {
            ConfigError::Io(io) if io.kind() == ErrorKind::NotFound => {
                ConfigError::PresetNotFound(name.to_string())
            }
            other => other,
        }
    }

    /// Preset names sorted alphabetically; a missing directory lists as empty
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.preset_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_owned());
            }
        }
        names.sort();
        debug!(count = names.len(), "presets listed");
        Ok(names)
    }

    /// Read a preset; every request in it is validated
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<EffectChain> {
        let path = self.preset_path(name)?;
        let chain: EffectChain = read_toml(&path)
            .await
            .map_err(|e| Self::not_found(name, e))?;
        chain.validate()?;
        debug!(effects = chain.len(), "preset read");
        Ok(chain)
    }

    #[instrument(skip(self, chain))]
    pub async fn save_preset(&self, name: &str, chain: &EffectChain) -> Result<()> {
        let path = self.preset_path(name)?;
        chain.validate()?;
        write_toml(&path, chain).await?;
        info!(effects = chain.len(), "preset stored");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| Self::not_found(name, e.into()))?;
        info!("preset removed");
        Ok(())
    }

    pub async fn preset_exists(&self, name: &str) -> bool {
        let Ok(path) = self.preset_path(name) else {
            return false;
        };
        fs::try_exists(path).await.unwrap_or(false)
    }
}

/// Owner of the main `config.toml`
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// `config.toml` inside `config_dir`
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Manager for an explicit config file path
    pub fn with_file(config_path: PathBuf) -> Self {
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            config_dir,
            config_path,
        }
    }

    /// `<platform config dir>/resonare`
    pub fn default_config_dir() -> Result<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| {
            ConfigError::Invalid("no platform config directory available".to_string())
        })?;
        Ok(base.join("resonare"))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Sibling `presets/` directory of the config file
    pub fn preset_dir(&self) -> PathBuf {
        self.config_dir.join("presets")
    }

    /// Read the config, never failing
    ///
    /// A missing file yields (and writes) the factory default. A corrupt or
    /// invalid file is copied to `config.toml.corrupt` and the factory
    /// default is returned.
    #[instrument(skip(self), fields(path = %self.config_path.display()))]
    pub async fn load(&self) -> ResonareConfig {
        if !self.exists() {
            info!("no config file yet, writing factory default");
            let config = ResonareConfig::default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                warn!(error = %e, "factory default not written");
            }
            return config;
        }

        let e = match ResonareConfig::load_from_file(&self.config_path).await {
            Ok(config) => return config,
            Err(e) => e,
        };
        error!(error = %e, "unreadable config, falling back to factory default");

        let backup = self.config_path.with_extension("toml.corrupt");
        match fs::copy(&self.config_path, &backup).await {
            Ok(_) => info!(backup = %backup.display(), "corrupt config kept"),
            Err(copy_err) => {
                error!(backup = %backup.display(), error = %copy_err, "corrupt config not backed up")
            }
        }
        ResonareConfig::default()
    }

    /// Validate and write `config`
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &ResonareConfig) -> Result<()> {
        config.validate()?;
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Remove the config file; a missing file is not an error
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.config_path).await {
            Ok(()) => {
                info!(path = %self.config_path.display(), "config removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::effects::EffectRequest;
    use crate::domain::render::ChannelPolicy;
    use tempfile::TempDir;

    fn sample_chain() -> EffectChain {
        vec![
            EffectRequest::parse("highpass", 120.0).unwrap(),
            EffectRequest::parse("compression", 0.5).unwrap(),
            EffectRequest::parse("eq", [2.0_f32, -1.0, 3.0]).unwrap(),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_config_serialization() {
        let config = ResonareConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = ResonareConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed = ResonareConfig::from_toml_str(
            r#"
            [render]
            channel_policy = "first_channel"
            pitch_block_size = 4096
            "#,
        )
        .unwrap();
        assert_eq!(parsed.render.channel_policy, ChannelPolicy::FirstChannel);
        assert_eq!(parsed.render.pitch_block_size, Some(4096));
        assert_eq!(parsed.render.max_render_seconds, 600);
        assert!(parsed.render.reverb_normalize);
        assert_eq!(parsed.analysis.fft_size, 2048);
        assert_eq!(parsed.export.default_file_name, "processed_audio.wav");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ResonareConfig::from_toml_str("[analysis]\nfft_size = 1000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Audio(_)));

        let err = ResonareConfig::from_toml_str("[export]\ndefault_file_name = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_preset_manager() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PresetManager::new(temp_dir.path().join("presets"));
        let chain = sample_chain();

        assert!(manager.list_presets().await.unwrap().is_empty());

        manager.save_preset("voice cleanup", &chain).await.unwrap();
        assert!(manager.preset_exists("voice cleanup").await);

        let presets = manager.list_presets().await.unwrap();
        assert_eq!(presets, vec!["voice cleanup"]);

        let loaded = manager.load_preset("voice cleanup").await.unwrap();
        assert_eq!(loaded, chain);

        manager.delete_preset("voice cleanup").await.unwrap();
        assert!(!manager.preset_exists("voice cleanup").await);
    }

    #[tokio::test]
    async fn test_missing_preset() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PresetManager::new(temp_dir.path().to_path_buf());
        assert!(matches!(
            manager.load_preset("nope").await,
            Err(ConfigError::PresetNotFound(_))
        ));
        assert!(matches!(
            manager.delete_preset("nope").await,
            Err(ConfigError::PresetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_preset_name_cannot_escape_dir() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PresetManager::new(temp_dir.path().to_path_buf());
        let err = manager
            .save_preset("../outside", &sample_chain())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(!manager.preset_exists("../outside").await);
    }

    #[tokio::test]
    async fn test_invalid_preset_contents() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PresetManager::new(temp_dir.path().to_path_buf());
        tokio::fs::write(
            temp_dir.path().join("loud.toml"),
            "[[effects]]\ntype = \"reverb\"\n\n[effects.params]\namount = 4.0\n",
        )
        .await
        .unwrap();
        assert!(matches!(
            manager.load_preset("loud").await,
            Err(ConfigError::Audio(AudioError::InvalidParameter(_)))
        ));
    }

    #[tokio::test]
    async fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = ResonareConfig::default();
        config.render.filter_q = Some(2.0);
        config.save_to_file(&config_path).await.unwrap();

        let loaded = ResonareConfig::load_from_file(&config_path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_manager_creates_factory_default() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().join("resonare"));

        assert!(!manager.exists());
        let config = manager.load().await;
        assert_eq!(config, ResonareConfig::default());
        assert!(manager.exists());
        assert_eq!(manager.preset_dir(), temp_dir.path().join("resonare").join("presets"));
    }

    #[tokio::test]
    async fn test_manager_backs_up_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().to_path_buf());
        tokio::fs::write(manager.config_path(), "render = [not toml")
            .await
            .unwrap();

        let config = manager.load().await;
        assert_eq!(config, ResonareConfig::default());
        assert!(temp_dir.path().join("config.toml.corrupt").exists());
    }

    #[tokio::test]
    async fn test_manager_save_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_file(temp_dir.path().join("custom.toml"));

        let mut config = ResonareConfig::default();
        config.analysis.smoothing = 0.5;
        manager.save(&config).await.unwrap();
        assert_eq!(manager.load().await, config);

        manager.clear().await.unwrap();
        assert!(!manager.exists());
    }
}
