use crate::config::{parse_duration, Config};
use crate::embedding::SUPPORTED_MODELS;
use crate::error::{PagechatError, Result, ValidationError};
use crate::generation::BUILTIN_TEMPLATES;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_reranker(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_sessions(config, &mut errors);
        Self::validate_prompt(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PagechatError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;

        if chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        if chunking.chunk_overlap >= chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.chunk_overlap",
                format!(
                    "Overlap ({}) must be smaller than chunk size ({})",
                    chunking.chunk_overlap, chunking.chunk_size
                ),
            ));
        }

        if chunking.separators.is_empty() {
            errors.push(ValidationError::new(
                "chunking.separators",
                "At least one separator is required",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.k == 0 {
            errors.push(ValidationError::new(
                "retrieval.k",
                "k must be greater than 0",
            ));
        }

        if retrieval.fetch_k < retrieval.k {
            errors.push(ValidationError::new(
                "retrieval.fetch_k",
                format!(
                    "fetch_k ({}) must be at least k ({})",
                    retrieval.fetch_k, retrieval.k
                ),
            ));
        }

        if !(0.0..=1.0).contains(&retrieval.mmr_lambda) {
            errors.push(ValidationError::new(
                "retrieval.mmr_lambda",
                format!(
                    "MMR lambda must be between 0.0 and 1.0, got {}",
                    retrieval.mmr_lambda
                ),
            ));
        }

        if retrieval.lexical_weight < 0.0 || retrieval.semantic_weight < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.weights",
                "Ensemble weights cannot be negative",
            ));
        } else if retrieval.lexical_weight + retrieval.semantic_weight == 0.0 {
            errors.push(ValidationError::new(
                "retrieval.weights",
                "At least one ensemble weight must be positive",
            ));
        }

        if retrieval.rrf_k < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                "Rank fusion constant cannot be negative",
            ));
        }

        if retrieval.top_n == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_n",
                "top_n must be greater than 0",
            ));
        }

        if retrieval.hnsw_m == 0 || retrieval.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "retrieval.hnsw",
                "HNSW M and ef_construction must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let model = &config.embedding.model;
        if !SUPPORTED_MODELS.contains(&model.as_str()) {
            errors.push(ValidationError::new(
                "embedding.model",
                format!(
                    "Model must be one of {:?}, got '{}'",
                    SUPPORTED_MODELS, model
                ),
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.max_concurrent == 0 {
            errors.push(ValidationError::new(
                "embedding.max_concurrent",
                "Concurrency must be greater than 0",
            ));
        }
    }

    fn validate_reranker(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.reranker.enabled && config.reranker.model.is_empty() {
            errors.push(ValidationError::new(
                "reranker.model",
                "Model name cannot be empty when reranking is enabled",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["ollama"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if config.llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        if parse_duration(&config.llm.request_timeout).is_none() {
            errors.push(ValidationError::new(
                "llm.request_timeout",
                format!("Invalid duration format: {}", config.llm.request_timeout),
            ));
        }
    }

    fn validate_sessions(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.sessions.max_sessions == 0 {
            errors.push(ValidationError::new(
                "sessions.max_sessions",
                "Session limit must be greater than 0",
            ));
        }

        if parse_duration(&config.sessions.idle_ttl).is_none() {
            errors.push(ValidationError::new(
                "sessions.idle_ttl",
                format!("Invalid duration format: {}", config.sessions.idle_ttl),
            ));
        }
    }

    fn validate_prompt(config: &Config, errors: &mut Vec<ValidationError>) {
        let template = &config.prompt.template;
        if config.prompt.template_file.is_none() && !BUILTIN_TEMPLATES.contains(&template.as_str()) {
            errors.push(ValidationError::new(
                "prompt.template",
                format!(
                    "Template must be one of {:?}, got '{}'",
                    BUILTIN_TEMPLATES, template
                ),
            ));
        }
    }
}
