//! Blocking Ollama API client.
//!
//! `GET /api/tags` doubles as the liveness probe and the model listing;
//! `POST /api/generate` is always sent with `stream: false`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{GenerateRequest, ModelInfo, ModelService};
use crate::config::ServiceConfig;
use crate::error::{Result, ShellmindError};

pub struct OllamaClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<String>,
}

impl OllamaClient {
    pub fn new(settings: &ServiceConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .build()
            .map_err(|e| ShellmindError::Http {
                context: "building HTTP client".to_string(),
                source: e,
            })?;
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn classify(&self, err: reqwest::Error, timeout: Duration, context: &str) -> ShellmindError {
        if err.is_timeout() {
            ShellmindError::Timeout(timeout)
        } else if err.is_connect() {
            ShellmindError::ServiceUnreachable {
                url: self.base_url.clone(),
                details: err.to_string(),
            }
        } else {
            ShellmindError::Http {
                context: context.to_string(),
                source: err,
            }
        }
    }

    fn tags(&self, timeout: Duration) -> Result<OllamaTagsResponse> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(timeout)
            .send()
            .map_err(|e| self.classify(e, timeout, "GET /api/tags"))?;

        if !response.status().is_success() {
            return Err(ShellmindError::ServiceUnreachable {
                url: self.base_url.clone(),
                details: format!("/api/tags returned {}", response.status()),
            });
        }

        response
            .json::<OllamaTagsResponse>()
            .map_err(|e| ShellmindError::InvalidResponse(format!("/api/tags: {}", e)))
    }
}

impl ModelService for OllamaClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn ping(&self, timeout: Duration) -> Result<()> {
        self.tags(timeout).map(|_| ())
    }

    fn list_models(&self, timeout: Duration) -> Result<Vec<ModelInfo>> {
        Ok(self
            .tags(timeout)?
            .models
            .into_iter()
            .map(|m| ModelInfo {
                name: m.name,
                size: m.size,
                modified_at: m.modified_at,
            })
            .collect())
    }

    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let body = OllamaRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.url("/api/generate"))
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(|e| self.classify(e, request.timeout, "POST /api/generate"))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ShellmindError::ModelAbsent(request.model.clone()));
        }
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(ShellmindError::InvalidResponse(format!("{}: {}", status, text)));
        }

        let parsed: OllamaResponse = response
            .json()
            .map_err(|e| self.classify(e, request.timeout, "decoding /api/generate"))?;
        if let Some(error) = parsed.error {
            return Err(ShellmindError::InvalidResponse(error));
        }
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash_from_endpoint() {
        let settings = ServiceConfig {
            url: "http://127.0.0.1:11434/".to_string(),
            ..ServiceConfig::default()
        };
        let client = OllamaClient::new(&settings).expect("client");
        assert_eq!(client.endpoint(), "http://127.0.0.1:11434");
        assert_eq!(client.url("/api/tags"), "http://127.0.0.1:11434/api/tags");
    }

    #[test]
    fn request_body_is_non_streaming_with_token_cap() {
        let body = OllamaRequest {
            model: "zsh-assistant",
            prompt: "Complete this command: git sta",
            system: None,
            stream: false,
            options: OllamaOptions {
                temperature: 0.1,
                top_p: 0.9,
                num_predict: 64,
            },
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 64);
        assert!(json.get("system").is_none());
    }

    #[test]
    fn tags_response_tolerates_missing_fields() {
        let parsed: OllamaTagsResponse =
            serde_json::from_str(r#"{"models":[{"name":"zsh-assistant:latest"}]}"#)
                .expect("parse");
        assert_eq!(parsed.models.len(), 1);
        assert_eq!(parsed.models[0].name, "zsh-assistant:latest");
        assert!(parsed.models[0].size.is_none());
    }

    #[test]
    fn unreachable_port_maps_to_unreachable_error() {
        // Port 9 (discard) is closed on test hosts; connection is refused fast.
        let settings = ServiceConfig {
            url: "http://127.0.0.1:9".to_string(),
            ..ServiceConfig::default()
        };
        let client = OllamaClient::new(&settings).expect("client");
        let err = client.ping(Duration::from_millis(300)).unwrap_err();
        assert!(err.is_unreachable(), "unexpected error: {err}");
    }
}
