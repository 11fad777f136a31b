//! TOML configuration.
//!
//! Loaded once by the binary (or a test) with [`load_config`], which parses
//! the file and rejects out-of-range values with a message naming the key.
//!
//! ```toml
//! [store]
//! url = "http://localhost:9200"
//! index = "chunks"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```
//!
//! Every other section and key has a default; see
//! `config/chunkseek.example.toml`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use chunkseek_core::reconstruct::ReconstructConfig;
use chunkseek_core::search::{DEFAULT_LEXICAL_FIELDS, DEFAULT_MAX_TOP_K, DEFAULT_TOP_K};
use chunkseek_core::store::{parse_field_spec, Operator};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reconstruction: ReconstructConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Base URL of the OpenSearch cluster.
    pub url: String,
    #[serde(default = "default_index")]
    pub index: String,
    /// Chunks per scroll page when fetching a whole file.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How long the cluster keeps a scroll context alive between pages.
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,
    /// Dimensionality of `embedding_vector` in the index, if known.
    #[serde(default)]
    pub vector_dims: Option<usize>,
    /// Document field holding the normalized file type.
    #[serde(default = "default_file_type_field")]
    pub file_type_field: String,
    /// Document field searched by the regex candidate query.
    #[serde(default = "default_pattern_field")]
    pub pattern_field: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Environment variable holding the basic-auth password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

fn default_index() -> String {
    "chunks".to_string()
}
fn default_page_size() -> usize {
    500
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_scroll_keep_alive() -> String {
    "1m".to_string()
}
fn default_file_type_field() -> String {
    "metadata.file_type".to_string()
}
fn default_pattern_field() -> String {
    "content".to_string()
}
fn default_password_env() -> String {
    "CHUNKSEEK_STORE_PASSWORD".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, or `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Provider base URL. Defaults per provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: i64,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default)]
    pub default_min_score: f64,
    #[serde(default = "default_lexical_fields")]
    pub lexical_fields: Vec<String>,
    #[serde(default = "default_operator")]
    pub lexical_operator: String,
    #[serde(default = "default_candidate_limit")]
    pub regex_candidate_limit: usize,
    #[serde(default = "default_max_matches")]
    pub max_matches_per_file: usize,
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
    /// Deadline for a whole-file fetch. `0` disables it.
    #[serde(default = "default_content_timeout")]
    pub content_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            default_min_score: 0.0,
            lexical_fields: default_lexical_fields(),
            lexical_operator: default_operator(),
            regex_candidate_limit: default_candidate_limit(),
            max_matches_per_file: default_max_matches(),
            context_lines: default_context_lines(),
            content_timeout_secs: default_content_timeout(),
        }
    }
}

fn default_top_k() -> i64 {
    DEFAULT_TOP_K
}
fn default_max_top_k() -> usize {
    DEFAULT_MAX_TOP_K
}
fn default_lexical_fields() -> Vec<String> {
    DEFAULT_LEXICAL_FIELDS.iter().map(|f| f.to_string()).collect()
}
fn default_operator() -> String {
    "OR".to_string()
}
fn default_candidate_limit() -> usize {
    100
}
fn default_max_matches() -> usize {
    10
}
fn default_context_lines() -> usize {
    2
}
fn default_content_timeout() -> u64 {
    60
}

impl RetrievalConfig {
    /// The configured lexical operator. Validated by [`load_config`].
    pub fn operator(&self) -> Operator {
        self.lexical_operator.parse().unwrap_or(Operator::Or)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate store
    if config.store.url.trim().is_empty() {
        bail!("store.url must not be empty");
    }
    if config.store.index.trim().is_empty() {
        bail!("store.index must not be empty");
    }
    if config.store.page_size == 0 {
        bail!("store.page_size must be > 0");
    }
    if config.store.timeout_secs == 0 {
        bail!("store.timeout_secs must be > 0");
    }
    if config.store.vector_dims == Some(0) {
        bail!("store.vector_dims must be > 0 when set");
    }

    // Validate retrieval
    let retrieval = &config.retrieval;
    if retrieval.max_top_k == 0 {
        bail!("retrieval.max_top_k must be >= 1");
    }
    if retrieval.default_top_k < 1 || retrieval.default_top_k as usize > retrieval.max_top_k {
        bail!(
            "retrieval.default_top_k must be in [1, {}], got {}",
            retrieval.max_top_k,
            retrieval.default_top_k
        );
    }
    if !(0.0..=1.0).contains(&retrieval.default_min_score) {
        bail!("retrieval.default_min_score must be in [0.0, 1.0]");
    }
    if retrieval.lexical_fields.is_empty() {
        bail!("retrieval.lexical_fields must not be empty");
    }
    if let Some(bad) = retrieval
        .lexical_fields
        .iter()
        .find(|f| parse_field_spec(f).is_none())
    {
        bail!("retrieval.lexical_fields: malformed field spec '{}'", bad);
    }
    if let Err(e) = retrieval.lexical_operator.parse::<Operator>() {
        bail!("retrieval.lexical_operator: {}", e);
    }
    if retrieval.regex_candidate_limit == 0 {
        bail!("retrieval.regex_candidate_limit must be >= 1");
    }
    if !(1..=1000).contains(&retrieval.max_matches_per_file) {
        bail!("retrieval.max_matches_per_file must be in [1, 1000]");
    }
    if retrieval.context_lines > 20 {
        bail!("retrieval.context_lines must be <= 20");
    }

    // Validate reconstruction
    if let Err(e) = config.reconstruction.validate() {
        bail!("reconstruction: {}", e);
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if embedding.is_enabled() {
        if embedding.dims.is_none() || embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                embedding.provider
            );
        }
        if embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                embedding.provider
            );
        }
        if embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be > 0");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[store]
url = "http://localhost:9200"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.store.index, "chunks");
        assert_eq!(cfg.store.page_size, 500);
        assert_eq!(cfg.store.scroll_keep_alive, "1m");
        assert_eq!(cfg.store.pattern_field, "content");
        assert_eq!(cfg.retrieval.default_top_k, 10);
        assert_eq!(cfg.retrieval.max_top_k, 100);
        assert_eq!(cfg.retrieval.operator(), Operator::Or);
        assert_eq!(cfg.reconstruction.min_overlap, 50);
        assert_eq!(cfg.reconstruction.max_overlap, 500);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn reconstruction_section_overrides() {
        let cfg = parse_config(&format!(
            "{}\n[reconstruction]\nmin_overlap = 20\nsimilarity_threshold = 0.9\n",
            MINIMAL
        ))
        .unwrap();
        assert_eq!(cfg.reconstruction.min_overlap, 20);
        assert_eq!(cfg.reconstruction.max_overlap, 500);
        assert!(cfg.reconstruction.allow_short_overlaps);
    }

    #[test]
    fn rejects_bad_values() {
        let cases = [
            ("[retrieval]\ndefault_top_k = 0\n", "default_top_k"),
            ("[retrieval]\nlexical_operator = \"XOR\"\n", "lexical_operator"),
            ("[retrieval]\ncontext_lines = 50\n", "context_lines"),
            ("[reconstruction]\nmax_overlap = 10\n", "max_overlap"),
            ("[embedding]\nprovider = \"openai\"\n", "embedding.dims"),
            ("[embedding]\nprovider = \"magic\"\n", "Unknown embedding provider"),
        ];
        for (extra, needle) in cases {
            let err = parse_config(&format!("{}\n{}", MINIMAL, extra)).unwrap_err();
            assert!(
                format!("{:#}", err).contains(needle),
                "expected '{}' in: {:#}",
                needle,
                err
            );
        }
    }
}
