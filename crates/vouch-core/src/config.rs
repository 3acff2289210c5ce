use crate::errors::ConfigError;
use crate::pricing::{PricingEntry, DEFAULT_PRICING_MODEL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_TOOL_DIR: &str = ".vouch";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    #[serde(alias = "open_ai")]
    OpenAI,
    /// Deterministic offline embeddings (feature hashing).
    Fake,
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum JudgeProviderKind {
    #[serde(alias = "open_ai")]
    OpenAI,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub base_url: String,
    pub cache: bool,
    pub cache_entries: u64,
    /// SQLite file for the persistent cache layer.
    pub cache_path: Option<PathBuf>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::OpenAI,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            cache: true,
            cache_entries: 10_000,
            cache_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JudgeSettings {
    pub provider: JudgeProviderKind,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            provider: JudgeProviderKind::None,
            model: "gpt-4o-mini".to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PricingSettings {
    pub default_model: String,
    pub models: Vec<PricingEntry>,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_PRICING_MODEL.to_string(),
            models: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    pub timeout_seconds: u64,
    pub parallel: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            parallel: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub tool_dir: PathBuf,
    pub baseline_dir: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
    pub embedding: EmbeddingSettings,
    pub judge: JudgeSettings,
    pub pricing: PricingSettings,
    pub session: SessionSettings,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool_dir: PathBuf::from(DEFAULT_TOOL_DIR),
            baseline_dir: None,
            snapshot_dir: None,
            embedding: EmbeddingSettings::default(),
            judge: JudgeSettings::default(),
            pricing: PricingSettings::default(),
            session: SessionSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn baseline_dir(&self) -> PathBuf {
        self.baseline_dir
            .clone()
            .unwrap_or_else(|| self.tool_dir.join("baselines"))
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(|| self.tool_dir.join("snapshots"))
    }

    /// Defaults, then `path` if given, then `VOUCH_*` environment overrides.
    pub fn load(path: Option<&Path>, strict: bool) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => load_config(p, strict)?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = var("VOUCH_TOOL_DIR") {
            self.tool_dir = PathBuf::from(v);
        }
        if let Some(v) = var("VOUCH_EMBEDDING_PROVIDER") {
            self.embedding.provider = parse_enum("VOUCH_EMBEDDING_PROVIDER", &v)?;
        }
        if let Some(v) = var("VOUCH_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = var("VOUCH_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Some(v) = var("VOUCH_JUDGE_PROVIDER") {
            self.judge.provider = parse_enum("VOUCH_JUDGE_PROVIDER", &v)?;
        }
        if let Some(v) = var("VOUCH_JUDGE_MODEL") {
            self.judge.model = v;
        }
        if let Some(v) = var("VOUCH_TIMEOUT_SECONDS") {
            self.session.timeout_seconds = v
                .parse()
                .map_err(|_| ConfigError(format!("VOUCH_TIMEOUT_SECONDS is not a number: {}", v)))?;
        }
        if let Some(v) = var("VOUCH_PARALLEL") {
            self.session.parallel = v
                .parse()
                .map_err(|_| ConfigError(format!("VOUCH_PARALLEL is not a number: {}", v)))?;
        }
        if let Some(v) = var("VOUCH_LOG") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.timeout_seconds == 0 {
            return Err(ConfigError("session.timeout_seconds must be > 0".into()));
        }
        if self.session.parallel == 0 {
            return Err(ConfigError("session.parallel must be >= 1".into()));
        }
        if self.embedding.cache_entries == 0 {
            return Err(ConfigError("embedding.cache_entries must be >= 1".into()));
        }
        Ok(())
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Result<T, ConfigError> {
    serde_yaml::from_str(&raw.trim().to_ascii_lowercase())
        .map_err(|_| ConfigError(format!("invalid value for {}: '{}'", key, raw)))
}

/// API keys. Only ever read from the environment, never from config files.
#[derive(Clone, Default, PartialEq)]
pub struct Credentials {
    pub embedding_api_key: Option<String>,
    pub judge_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |k: &Option<String>| if k.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("embedding_api_key", &mask(&self.embedding_api_key))
            .field("judge_api_key", &mask(&self.judge_api_key))
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |k: &str| var(k).filter(|v| !v.trim().is_empty());
        let shared = non_empty("OPENAI_API_KEY");
        Self {
            embedding_api_key: non_empty("VOUCH_EMBEDDING_API_KEY").or_else(|| shared.clone()),
            judge_api_key: non_empty("VOUCH_JUDGE_API_KEY").or(shared),
        }
    }
}

pub fn load_config(path: &Path, strict: bool) -> Result<EngineConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;

    let mut ignored = BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(&raw);
    let cfg: EngineConfig = serde_ignored::deserialize(deserializer, |p| {
        ignored.insert(p.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML {}: {}", path.display(), e)))?;

    let unknown: Vec<&String> = ignored
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();
    if !unknown.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "unknown config fields: {:?} (file: {})",
                unknown,
                path.display()
            )));
        }
        tracing::warn!(
            event = "vouch.config.unknown_fields",
            fields = ?unknown,
            file = %path.display(),
        );
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn write(dir: &Path, body: &str) -> PathBuf {
        let p = dir.join("vouch.yaml");
        std::fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn defaults_derive_dirs_from_tool_dir() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.baseline_dir(), PathBuf::from(".vouch/baselines"));
        assert_eq!(cfg.snapshot_dir(), PathBuf::from(".vouch/snapshots"));
        assert_eq!(cfg.session.timeout_seconds, 30);
        assert_eq!(cfg.judge.provider, JudgeProviderKind::None);
    }

    #[test]
    fn yaml_partial_file_keeps_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = write(
            dir.path(),
            "tool_dir: out\nembedding:\n  provider: fake\npricing:\n  models:\n    - model: local-llm\n      input_per_million: 0.0\n      output_per_million: 0.0\n      provider: local\n",
        );
        let cfg = load_config(&p, true)?;
        assert_eq!(cfg.embedding.provider, EmbeddingProviderKind::Fake);
        assert_eq!(cfg.embedding.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(cfg.baseline_dir(), PathBuf::from("out/baselines"));
        assert_eq!(cfg.pricing.models[0].model, "local-llm");
        Ok(())
    }

    #[test]
    fn strict_mode_rejects_unknown_keys() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = write(dir.path(), "sesion:\n  parallel: 2\n_anchor: 1\n");
        let err = load_config(&p, true).unwrap_err();
        assert!(err.0.contains("sesion"));
        assert!(!err.0.contains("_anchor"));
        assert!(load_config(&p, false).is_ok());
        Ok(())
    }

    #[test]
    fn env_overrides_and_validation() {
        let env: HashMap<&str, &str> = [
            ("VOUCH_EMBEDDING_PROVIDER", "None"),
            ("VOUCH_JUDGE_PROVIDER", "openai"),
            ("VOUCH_PARALLEL", "8"),
        ]
        .into_iter()
        .collect();
        let mut cfg = EngineConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.embedding.provider, EmbeddingProviderKind::None);
        assert_eq!(cfg.judge.provider, JudgeProviderKind::OpenAI);
        assert_eq!(cfg.session.parallel, 8);

        let err = cfg
            .apply_env(|k| (k == "VOUCH_TIMEOUT_SECONDS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.0.contains("VOUCH_TIMEOUT_SECONDS"));

        cfg.session.parallel = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn credentials_fall_back_to_shared_key() {
        let c = Credentials::from_lookup(|k| match k {
            "OPENAI_API_KEY" => Some("sk-shared".into()),
            "VOUCH_JUDGE_API_KEY" => Some("sk-judge".into()),
            "VOUCH_EMBEDDING_API_KEY" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(c.embedding_api_key.as_deref(), Some("sk-shared"));
        assert_eq!(c.judge_api_key.as_deref(), Some("sk-judge"));
        assert!(!format!("{:?}", c).contains("sk-"));
    }
}
