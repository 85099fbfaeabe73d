//! Streaming generation against an Ollama server

use super::{FragmentStream, GenerationError, Generator};
use crate::config::LlmConfig;
use async_stream::try_stream;
use futures::StreamExt;
use serde::Deserialize;

/// Ollama `/api/generate` client
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

/// One NDJSON line of a streamed `/api/generate` response
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, PartialEq)]
struct ParsedLine {
    fragment: String,
    done: bool,
}

fn parse_ndjson_line(line: &str) -> Result<Option<ParsedLine>, GenerationError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: GenerateChunk = serde_json::from_str(line)
        .map_err(|e| GenerationError::InvalidResponse(format!("{}: {}", e, line)))?;

    if let Some(error) = chunk.error {
        return Err(GenerationError::Upstream(error));
    }

    Ok(Some(ParsedLine {
        fragment: chunk.response,
        done: chunk.done,
    }))
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self, GenerationError> {
        let connect_timeout = config
            .request_timeout()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        // Only connecting is bounded; a long answer may stream for minutes
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        tracing::info!(
            "Using Ollama model {} at {}",
            config.model,
            config.base_url
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    async fn start(
        client: &reqwest::Client,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, GenerationError> {
        let response = client.post(url).json(body).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                GenerationError::Unavailable(e.to_string())
            } else {
                GenerationError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream(format!(
                "HTTP {}: {}",
                status,
                text.trim()
            )));
        }

        Ok(response)
    }
}

impl Generator for OllamaGenerator {
    fn generate_stream(&self, prompt: String) -> FragmentStream {
        let client = self.client.clone();
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": true,
            "options": { "temperature": self.temperature },
        });

        let stream = try_stream! {
            let response = OllamaGenerator::start(&client, &url, &body).await?;
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut finished = false;

            while let Some(next) = bytes.next().await {
                let data = next.map_err(|e| GenerationError::Interrupted(e.to_string()))?;
                buffer.extend_from_slice(&data);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw).into_owned();
                    if let Some(parsed) = parse_ndjson_line(&line)? {
                        if !parsed.fragment.is_empty() {
                            yield parsed.fragment;
                        }
                        if parsed.done {
                            finished = true;
                            break;
                        }
                    }
                }

                if finished {
                    break;
                }
            }

            if !finished {
                // Final line may arrive without a trailing newline
                let tail = String::from_utf8_lossy(&buffer).into_owned();
                let parsed = parse_ndjson_line(&tail)?;
                let done = parsed.as_ref().map(|p| p.done).unwrap_or(false);
                if let Some(parsed) = parsed {
                    if !parsed.fragment.is_empty() {
                        yield parsed.fragment;
                    }
                }
                if !done {
                    Err::<(), _>(GenerationError::Interrupted(
                        "connection closed before the answer completed".to_string(),
                    ))?;
                }
            }
        };

        Box::pin(stream)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
