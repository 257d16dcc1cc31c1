//! services/api/src/adapters/contract_llm.rs
//!
//! This module contains the adapter for document analysis, field detection,
//! and contract generation. It implements the `ContractAnalysisService` port
//! from the `core` crate using an OpenAI-compatible LLM.
//!
//! All three operations are best-effort: when the model returns something
//! that is not the requested JSON shape, the adapter degrades to a valid
//! structured fallback instead of surfacing a parse error. Only a failed or
//! timed-out API call becomes a `Dependency` error.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use signflow_core::domain::{DocumentAnalysis, FieldSuggestion};
use signflow_core::ports::{ContractAnalysisService, PortError, PortResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are a legal document analysis expert. Provide thorough but concise analysis.";

const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze the following legal document and provide:
1. A concise summary
2. Risk analysis (potential issues, missing clauses)
3. Compliance considerations
4. Suggestions for improvement

Document text:
{document}

Please respond in JSON format with the following structure:
{
  "summary": "Brief summary of the document",
  "risks": ["risk1", "risk2"],
  "compliance": ["compliance issue 1", "compliance issue 2"],
  "suggestions": ["suggestion 1", "suggestion 2"]
}"#;

const FIELD_DETECTION_SYSTEM_PROMPT: &str =
    "You are a document processing expert. Identify appropriate locations for form fields.";

const FIELD_DETECTION_PROMPT_TEMPLATE: &str = r#"Analyze the following document text and identify locations where signature fields, date fields, and text input fields should be placed.

Document text:
{document}

Please respond in JSON format with an array of suggested fields:
{
  "fields": [
    {
      "type": "SIGNATURE|DATE|TEXT|INITIAL",
      "label": "Field label",
      "required": true|false,
      "suggested_position": "description of where this field should be placed"
    }
  ]
}"#;

const GENERATION_SYSTEM_PROMPT: &str =
    "You are a legal contract drafting expert. Create professional, legally compliant contracts.";

const GENERATION_PROMPT_TEMPLATE: &str = r#"Generate a {contract_type} contract based on the following requirements:
{prompt}

Please create a professional, legally sound document with:
- Proper legal structure and formatting
- Standard clauses for this type of contract
- Placeholders for signatures, dates, and custom fields marked with [FIELD_NAME]
- Clear terms and conditions

The contract should be ready for electronic signature processing."#;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ContractAnalysisService` using an
/// OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiContractAdapter {
    client: Client<OpenAIConfig>,
    analysis_model: String,
    generation_model: String,
    timeout: Duration,
}

impl OpenAiContractAdapter {
    /// Creates a new `OpenAiContractAdapter`.
    pub fn new(
        client: Client<OpenAIConfig>,
        analysis_model: String,
        generation_model: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            analysis_model,
            generation_model,
            timeout,
        }
    }

    /// Runs one chat completion and returns the text of the first choice.
    /// Bounded by the configured timeout so a stalled provider can never
    /// block the owning document operation indefinitely.
    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: String,
        temperature: f32,
    ) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(temperature)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = bounded(self.timeout, self.client.chat().create(request))
            .await?
            .map_err(|e: OpenAIError| PortError::Dependency(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);

        match content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(PortError::Dependency(
                "LLM response contained no text content".to_string(),
            )),
        }
    }
}

/// Wraps a provider call in the adapter's timeout.
async fn bounded<F, T>(limit: Duration, fut: F) -> PortResult<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| PortError::Dependency("LLM call timed out".to_string()))
}

/// Attempts to parse the model output as JSON, tolerating prose or code
/// fences around the object by retrying on the outermost `{...}` span.
fn extract_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    if let Ok(parsed) = serde_json::from_str(text) {
        return Some(parsed);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[derive(Deserialize)]
struct FieldSuggestions {
    #[serde(default)]
    fields: Vec<FieldSuggestion>,
}

//=========================================================================================
// `ContractAnalysisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContractAnalysisService for OpenAiContractAdapter {
    /// Analyzes a document's text for risks, compliance issues, and
    /// suggestions. Falls back to the raw model text as the summary when the
    /// output is not the requested JSON shape.
    async fn analyze(&self, document_text: &str) -> PortResult<DocumentAnalysis> {
        let prompt = ANALYSIS_PROMPT_TEMPLATE.replace("{document}", document_text);
        let raw = self
            .complete(&self.analysis_model, ANALYSIS_SYSTEM_PROMPT, prompt, 0.3)
            .await?;

        Ok(extract_json::<DocumentAnalysis>(&raw).unwrap_or_else(|| {
            warn!("Analysis output was not valid JSON; using raw text as summary");
            DocumentAnalysis {
                summary: raw.trim().to_string(),
                risks: Vec::new(),
                compliance: Vec::new(),
                suggestions: Vec::new(),
            }
        }))
    }

    /// Suggests field placements for a document. An unparseable model
    /// response degrades to an empty suggestion list.
    async fn detect_fields(&self, document_text: &str) -> PortResult<Vec<FieldSuggestion>> {
        let prompt = FIELD_DETECTION_PROMPT_TEMPLATE.replace("{document}", document_text);
        let raw = self
            .complete(
                &self.analysis_model,
                FIELD_DETECTION_SYSTEM_PROMPT,
                prompt,
                0.1,
            )
            .await?;

        Ok(extract_json::<FieldSuggestions>(&raw)
            .map(|s| s.fields)
            .unwrap_or_else(|| {
                warn!("Field detection output was not valid JSON; returning no suggestions");
                Vec::new()
            }))
    }

    /// Generates contract text from a prompt. The output is free text, so
    /// there is no structured fallback; an empty response is a dependency
    /// failure.
    async fn generate_contract(&self, prompt: &str, contract_type: &str) -> PortResult<String> {
        let user = GENERATION_PROMPT_TEMPLATE
            .replace("{contract_type}", contract_type)
            .replace("{prompt}", prompt);
        self.complete(&self.generation_model, GENERATION_SYSTEM_PROMPT, user, 0.2)
            .await
    }
}
