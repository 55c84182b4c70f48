//! Schema-constrained extraction of facts from the brain's notes.
//!
//! Extraction never fails the session: a provider error or an answer that
//! does not fit the schema yields an empty [`ExtractionResult`].

use citycode_core::message::Message;
use citycode_core::provider::{Provider, ProviderRequest, StructuredSchema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::prompts::EXTRACTION_SYSTEM_PROMPT;

pub const SCHEMA_NAME: &str = "target_state_extraction";

/// One step of the model's reasoning: why it believes a datum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub justification: String,
    pub datum: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub port: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub reasoning_steps: Vec<ReasoningStep>,
    /// Raw numbers as the model wrote them; see [`ports`](Self::ports).
    #[serde(default)]
    pub open_ports: Vec<i64>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub vulnerabilities: Vec<String>,
    #[serde(default)]
    pub key_findings: Vec<String>,
}

impl ExtractionResult {
    /// Open ports that are valid TCP/UDP port numbers.
    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.open_ports.iter().filter_map(|p| valid_port(*p))
    }

    pub fn service_map(&self) -> impl Iterator<Item = (u16, String)> + '_ {
        self.services
            .iter()
            .filter_map(|s| valid_port(s.port).map(|p| (p, s.name.clone())))
    }

    pub fn is_empty(&self) -> bool {
        self.open_ports.is_empty()
            && self.services.is_empty()
            && self.vulnerabilities.is_empty()
            && self.key_findings.is_empty()
    }
}

fn valid_port(n: i64) -> Option<u16> {
    u16::try_from(n).ok().filter(|p| *p != 0)
}

/// The JSON schema handed to the provider. Strict mode wants every property
/// required and no extras.
pub fn extraction_schema() -> StructuredSchema {
    let string_list = serde_json::json!({ "type": "array", "items": { "type": "string" } });
    StructuredSchema {
        name: SCHEMA_NAME.into(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "reasoning_steps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "justification": { "type": "string" },
                            "datum": { "type": "string" }
                        },
                        "required": ["justification", "datum"],
                        "additionalProperties": false
                    }
                },
                "open_ports": { "type": "array", "items": { "type": "integer" } },
                "services": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "port": { "type": "integer" },
                            "name": { "type": "string" }
                        },
                        "required": ["port", "name"],
                        "additionalProperties": false
                    }
                },
                "vulnerabilities": string_list,
                "key_findings": string_list
            },
            "required": ["reasoning_steps", "open_ports", "services", "vulnerabilities", "key_findings"],
            "additionalProperties": false
        }),
    }
}

/// Turns freeform notes into an [`ExtractionResult`].
pub struct Extractor {
    provider: Arc<dyn Provider>,
    model: String,
}

impl Extractor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub async fn extract(&self, notes: &str) -> ExtractionResult {
        let messages = vec![Message::system(EXTRACTION_SYSTEM_PROMPT), Message::user(notes)];
        let mut request = ProviderRequest::new(self.model.clone(), messages);
        request.temperature = 0.0;

        let value = match self.provider.complete_structured(request, &extraction_schema()).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Extraction request failed, continuing with no new facts");
                return ExtractionResult::default();
            }
        };

        match serde_json::from_value::<ExtractionResult>(value) {
            Ok(result) => {
                debug!(
                    ports = result.open_ports.len(),
                    services = result.services.len(),
                    vulnerabilities = result.vulnerabilities.len(),
                    findings = result.key_findings.len(),
                    "Extracted facts from notes"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "Extraction answer did not match the schema");
                ExtractionResult::default()
            }
        }
    }
}
