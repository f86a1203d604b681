//! Chat-completion backends.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

pub const OPENAI_ENDPOINT_ENV: &str = "JOULETUNE_OPENAI_ENDPOINT";
pub const OPENAI_API_KEY_ENV: &str = "JOULETUNE_OPENAI_API_KEY";
pub const OPENAI_MODEL_ENV: &str = "JOULETUNE_OPENAI_MODEL";
pub const OLLAMA_HOST_ENV: &str = "JOULETUNE_OLLAMA_HOST";

const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-2024-08-06";
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

// Reasoning over a whole program can take minutes on local models.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// One prompt message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// JSON schema a completion must conform to, for backends that support
/// constrained decoding.
#[derive(Debug, Clone)]
pub struct ResponseFormat {
    pub name: &'static str,
    pub schema: serde_json::Value,
}

/// Seam between prompt builders and a concrete model service.
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Sends one chat completion and returns the raw content of the first
    /// choice.
    fn generate(&self, messages: &[ChatMessage], format: Option<&ResponseFormat>)
        -> Result<String>;
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Hosted OpenAI-compatible chat completions.
pub struct OpenAiBackend {
    endpoint: String,
    api_key: String,
    model: String,
    agent: ureq::Agent,
}

impl OpenAiBackend {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    /// Builds a backend from `JOULETUNE_OPENAI_*`, falling back to
    /// `OPENAI_API_KEY` for the key.
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var(OPENAI_ENDPOINT_ENV)
            .unwrap_or_else(|_| DEFAULT_OPENAI_ENDPOINT.to_string());
        let api_key = std::env::var(OPENAI_API_KEY_ENV)
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| anyhow!("{} is not set", OPENAI_API_KEY_ENV))?;
        let model =
            std::env::var(OPENAI_MODEL_ENV).unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string());
        Ok(Self::new(endpoint, api_key, model))
    }
}

impl GenerationBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(
        &self,
        messages: &[ChatMessage],
        format: Option<&ResponseFormat>,
    ) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(format) = format {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": format.name,
                    "strict": true,
                    "schema": format.schema,
                },
            });
        }
        tracing::debug!(model = %self.model, messages = messages.len(), "requesting completion");
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(&body);
        let completion: ChatCompletion = match response {
            Ok(resp) => resp.into_json()?,
            Err(ureq::Error::Status(code, resp)) => {
                let detail = resp.into_string().unwrap_or_default();
                bail!("completion request failed with status {}: {}", code, detail);
            }
            Err(e) => bail!("completion request to {} failed: {}", self.endpoint, e),
        };
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("completion response contained no content"))
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
}

#[derive(Deserialize)]
struct OllamaChatMessage {
    content: String,
}

/// Local Ollama service speaking its native chat API.
pub struct OllamaBackend {
    host: String,
    model: String,
    agent: ureq::Agent,
}

impl OllamaBackend {
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            model: model.into(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Self {
        let host =
            std::env::var(OLLAMA_HOST_ENV).unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
        Self::new(host, model)
    }

    /// Host this backend talks to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Confirms the model is present before a run burns iterations on it.
    pub fn ensure_model(&self) -> Result<()> {
        let url = format!("{}/api/show", self.host);
        let response = self.agent.post(&url).send_json(&json!({ "name": self.model }));
        match response {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(404, _)) => bail!(
                "model '{}' is not available on {}, pull it first with `ollama pull {}`",
                self.model,
                self.host,
                self.model
            ),
            Err(ureq::Error::Status(code, resp)) => {
                let detail = resp.into_string().unwrap_or_default();
                bail!("ollama rejected the model check with status {}: {}", code, detail);
            }
            Err(e) => bail!("cannot reach ollama at {}: {}", self.host, e),
        }
    }
}

impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate(
        &self,
        messages: &[ChatMessage],
        format: Option<&ResponseFormat>,
    ) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        if let Some(format) = format {
            // Ollama takes the bare schema as its format field.
            body["format"] = format.schema.clone();
        }
        let url = format!("{}/api/chat", self.host);
        tracing::debug!(model = %self.model, messages = messages.len(), "requesting completion");
        let response = self.agent.post(&url).send_json(&body);
        let completion: OllamaChatResponse = match response {
            Ok(resp) => resp.into_json()?,
            Err(ureq::Error::Status(code, resp)) => {
                let detail = resp.into_string().unwrap_or_default();
                bail!("ollama chat failed with status {}: {}", code, detail);
            }
            Err(e) => bail!("ollama chat request to {} failed: {}", url, e),
        };
        Ok(completion.message.content)
    }
}

/// Picks the backend for a model argument. `openai` selects the hosted
/// endpoint, anything else is treated as a local Ollama model and checked
/// for availability up front.
pub fn backend_for(model: &str) -> Result<Box<dyn GenerationBackend>> {
    if model == "openai" {
        Ok(Box::new(OpenAiBackend::from_env()?))
    } else {
        let backend = OllamaBackend::from_env(model);
        backend.ensure_model()?;
        Ok(Box::new(backend))
    }
}
