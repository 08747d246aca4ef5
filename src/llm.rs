use crate::config::LlmConfig;
use crate::knowledge::{ExemplarLabel, KnowledgeBase};
use crate::message::Message;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Reason string appended to a verdict whenever the model could not be
/// consulted.
pub const UNAVAILABLE_REASON: &str = "LLM analysis unavailable";

/// Structured verdict from the content model. `available = false` means
/// the model was not consulted or failed; the other fields are then inert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVerdict {
    pub available: bool,
    pub is_suspicious: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub tactics: Vec<String>,
    pub brand: Option<String>,
}

impl ModelVerdict {
    pub fn unavailable() -> Self {
        ModelVerdict {
            available: false,
            is_suspicious: false,
            confidence: 0.0,
            reasons: Vec::new(),
            tactics: Vec::new(),
            brand: None,
        }
    }
}

/// External language-model capability. One call per analysis, bounded by
/// the given timeout; implementations must not retry internally.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String>;
}

/// OpenAI-compatible chat-completions client.
pub struct HttpLanguageModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpLanguageModel {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for the language model")?;
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            log::warn!(
                "Environment variable {} not set; model calls may be rejected",
                config.api_key_env
            );
        }
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };

        let mut builder = self.client.post(&self.endpoint).timeout(timeout).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .context("Failed to call the language model endpoint")?;

        if !response.status().is_success() {
            anyhow::bail!("Language model endpoint returned {}", response.status());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to decode the language model response")?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .context("Language model response contained no choices")?;
        Ok(choice.message.content)
    }
}

/// What the model is asked to emit; missing optional fields default.
#[derive(Deserialize)]
struct RawVerdict {
    is_suspicious: bool,
    confidence: f64,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    tactics: Vec<String>,
    #[serde(default)]
    brand: Option<String>,
}

/// Retrieval-augmented content analyzer. Builds a prompt from the message
/// plus the closest knowledge-base exemplars, makes exactly one bounded
/// model call, and validates the reply against the verdict schema. Every
/// failure mode degrades to `ModelVerdict::unavailable()`; this component
/// never fails the pipeline.
pub struct LlmAnalyzer {
    model: Option<Arc<dyn LanguageModel>>,
    kb: Arc<KnowledgeBase>,
    timeout: Duration,
    exemplar_count: usize,
}

impl LlmAnalyzer {
    pub fn new(
        model: Option<Arc<dyn LanguageModel>>,
        kb: Arc<KnowledgeBase>,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            kb,
            timeout,
            exemplar_count: 3,
        }
    }

    pub async fn analyze(&self, message: &Message) -> ModelVerdict {
        let model = match &self.model {
            Some(m) => m,
            None => {
                log::debug!("Content model disabled; skipping");
                return ModelVerdict::unavailable();
            }
        };

        let prompt = self.build_prompt(message);

        // The outer timeout also covers implementations that ignore the
        // timeout they were handed.
        let raw = match tokio::time::timeout(self.timeout, model.complete(&prompt, self.timeout))
            .await
        {
            Err(_) => {
                log::warn!("Model call exceeded {:?}; degrading", self.timeout);
                return ModelVerdict::unavailable();
            }
            Ok(Err(e)) => {
                log::warn!("Model call failed: {e:#}; degrading");
                return ModelVerdict::unavailable();
            }
            Ok(Ok(raw)) => raw,
        };

        match parse_verdict(&raw) {
            Ok(verdict) => verdict,
            Err(e) => {
                log::warn!("Model reply failed schema validation: {e:#}; degrading");
                ModelVerdict::unavailable()
            }
        }
    }

    fn build_prompt(&self, message: &Message) -> String {
        let mut prompt = String::from(
            "You are an email security analyst. Assess whether the message below is a \
             phishing attempt.\n",
        );

        let exemplars = self
            .kb
            .retrieve_exemplars(&message.combined_text(), self.exemplar_count);
        if !exemplars.is_empty() {
            prompt.push_str("\nReference examples:\n");
            for exemplar in exemplars {
                let label = match exemplar.label {
                    ExemplarLabel::Phishing => "phishing",
                    ExemplarLabel::Legitimate => "legitimate",
                };
                prompt.push_str(&format!("[{label}] {}\n", exemplar.text));
            }
        }

        prompt.push_str("\nMessage to assess:\n");
        prompt.push_str(&format!("Sender: {}\n", message.sender));
        prompt.push_str(&format!(
            "Subject: {}\n",
            message.subject.as_deref().unwrap_or("(none)")
        ));
        prompt.push_str(&format!("Body: {}\n", message.content));

        prompt.push_str(
            "\nRespond with a single JSON object and no other text:\n\
             {\"is_suspicious\": true|false, \"confidence\": 0.0-1.0, \
             \"reasons\": [\"...\"], \"tactics\": [\"...\"], \"brand\": \"...\" or null}\n",
        );
        prompt
    }
}

/// Extract and validate the JSON object in a model reply. Models wrap
/// JSON in prose or code fences often enough that we scan for the braces.
fn parse_verdict(raw: &str) -> Result<ModelVerdict> {
    let start = raw.find('{').context("no JSON object in model reply")?;
    let end = raw.rfind('}').context("no closing brace in model reply")?;
    if end < start {
        anyhow::bail!("malformed JSON object in model reply");
    }

    let parsed: RawVerdict = serde_json::from_str(&raw[start..=end])
        .context("model reply did not match the verdict schema")?;

    if !(0.0..=1.0).contains(&parsed.confidence) {
        anyhow::bail!("confidence {} outside [0, 1]", parsed.confidence);
    }

    Ok(ModelVerdict {
        available: true,
        is_suspicious: parsed.is_suspicious,
        confidence: parsed.confidence,
        reasons: parsed.reasons,
        tactics: parsed.tactics,
        brand: parsed.brand.filter(|b| !b.trim().is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedModel {
        reply: String,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<String> {
            Ok(self.reply.clone())
        }
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("{\"is_suspicious\": false, \"confidence\": 0.1}".to_string())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    fn analyzer(model: Option<Arc<dyn LanguageModel>>) -> LlmAnalyzer {
        LlmAnalyzer::new(
            model,
            Arc::new(KnowledgeBase::builtin()),
            Duration::from_millis(100),
        )
    }

    fn sample_message() -> Message {
        Message::new(
            "support@paypa1-secure.com",
            Some("Account limited"),
            "Your PayPal account has been limited, verify your information now",
        )
    }

    #[tokio::test]
    async fn test_valid_reply_becomes_available_verdict() {
        let reply = r#"{"is_suspicious": true, "confidence": 0.92,
            "reasons": ["credential harvesting"], "tactics": ["urgency"],
            "brand": "PayPal"}"#;
        let analyzer = analyzer(Some(Arc::new(ScriptedModel {
            reply: reply.to_string(),
        })));
        let verdict = analyzer.analyze(&sample_message()).await;
        assert!(verdict.available);
        assert!(verdict.is_suspicious);
        assert!((verdict.confidence - 0.92).abs() < 1e-9);
        assert_eq!(verdict.brand.as_deref(), Some("PayPal"));
    }

    #[tokio::test]
    async fn test_json_wrapped_in_prose_still_parses() {
        let reply = "Here is my assessment:\n```json\n{\"is_suspicious\": false, \
                     \"confidence\": 0.2}\n```";
        let analyzer = analyzer(Some(Arc::new(ScriptedModel {
            reply: reply.to_string(),
        })));
        let verdict = analyzer.analyze(&sample_message()).await;
        assert!(verdict.available);
        assert!(!verdict.is_suspicious);
    }

    #[tokio::test]
    async fn test_malformed_reply_degrades() {
        let analyzer = analyzer(Some(Arc::new(ScriptedModel {
            reply: "I think it's probably phishing".to_string(),
        })));
        let verdict = analyzer.analyze(&sample_message()).await;
        assert_eq!(verdict, ModelVerdict::unavailable());
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_degrades() {
        let analyzer = analyzer(Some(Arc::new(ScriptedModel {
            reply: "{\"is_suspicious\": true, \"confidence\": 3.5}".to_string(),
        })));
        let verdict = analyzer.analyze(&sample_message()).await;
        assert!(!verdict.available);
    }

    #[tokio::test]
    async fn test_timeout_degrades() {
        let analyzer = analyzer(Some(Arc::new(SlowModel)));
        let verdict = analyzer.analyze(&sample_message()).await;
        assert!(!verdict.available);
    }

    #[tokio::test]
    async fn test_transport_error_degrades() {
        let analyzer = analyzer(Some(Arc::new(FailingModel)));
        let verdict = analyzer.analyze(&sample_message()).await;
        assert!(!verdict.available);
    }

    #[tokio::test]
    async fn test_disabled_model_degrades() {
        let verdict = analyzer(None).analyze(&sample_message()).await;
        assert!(!verdict.available);
    }

    #[test]
    fn test_empty_brand_string_is_none() {
        let verdict =
            parse_verdict("{\"is_suspicious\": true, \"confidence\": 0.8, \"brand\": \"\"}")
                .unwrap();
        assert_eq!(verdict.brand, None);
    }

    #[test]
    fn test_prompt_embeds_exemplars_and_message_fields() {
        let analyzer = analyzer(None);
        let prompt = analyzer.build_prompt(&sample_message());
        assert!(prompt.contains("Reference examples:"));
        assert!(prompt.contains("[phishing]"));
        assert!(prompt.contains("Sender: support@paypa1-secure.com"));
        assert!(prompt.contains("Subject: Account limited"));
    }
}
