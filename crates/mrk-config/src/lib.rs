use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

/// Typed view of the effective (merged) configuration.
///
/// Every field has a default, so a partial file (or no file at all) yields a
/// usable configuration. Later layers override earlier ones key-by-key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub evaluation: EvaluationConfig,
    pub registry: RegistrySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            evaluation: EvaluationConfig::default(),
            registry: RegistrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub models: PathBuf,
    pub metrics: PathBuf,
    pub artifacts: PathBuf,
    /// Registry directory. When absent, defaults to `<artifacts>/registry`
    /// (works unchanged in local and container layouts).
    pub registry: Option<PathBuf>,
    /// File name of the stable production alias inside `paths.models`.
    pub production_alias: String,
}

impl PathsConfig {
    pub fn registry_dir(&self) -> PathBuf {
        self.registry
            .clone()
            .unwrap_or_else(|| self.artifacts.join("registry"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            models: PathBuf::from("models"),
            metrics: PathBuf::from("metrics"),
            artifacts: PathBuf::from("artifacts"),
            registry: None,
            production_alias: "production_latest.bin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Metric used to rank candidates for promotion.
    pub primary_metric: String,
    /// Candidate names considered for promotion, in tie-break priority order.
    pub candidates: Vec<String>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            primary_metric: "pr_auc".to_string(),
            candidates: vec![
                "baseline_logreg".to_string(),
                "candidate_hgb".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Upper bound on waiting for the registry lock before giving up.
    pub lock_wait_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self { lock_wait_ms: 5_000 }
    }
}

/// Result of loading and merging configuration layers.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    /// SHA-256 over the canonical JSON of the merged layers.
    pub config_hash: String,
    pub canonical_json: String,
}

/// Load YAML layers from disk and merge them in order (earlier = base,
/// later = override).
pub fn load_layered(paths: &[PathBuf]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw = fs::read_to_string(p)
            .with_context(|| format!("failed to read config: {}", p.display()))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_from_strings(&doc_refs)
}

/// Merge YAML documents in order and produce the typed config plus its
/// canonical hash.
pub fn load_layered_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());

    let config: Config =
        serde_json::from_value(merged).context("config does not match expected schema")?;

    Ok(LoadedConfig {
        config,
        config_hash,
        canonical_json,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Compact JSON with deterministic key order (serde_json's map is sorted).
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
