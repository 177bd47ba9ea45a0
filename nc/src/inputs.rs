//! Step input store
//!
//! Operator-supplied execution inputs, keyed by step identity. Entries are
//! created on first edit and merged field by field. The store belongs to the
//! flow controller of one selected plan and is dropped with it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use crate::domain::StepKey;

/// Operator inputs for one step
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInput {
    pub instruction: String,
    pub configuration: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl StepInput {
    /// Any external-integration field is set
    pub fn has_credentials(&self) -> bool {
        self.external_api_url.is_some() || self.api_key.is_some() || self.client_id.is_some() || self.client_secret.is_some()
    }
}

fn redact(value: &Option<String>) -> &'static str {
    if value.is_some() { "<redacted>" } else { "<unset>" }
}

impl std::fmt::Debug for StepInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepInput")
            .field("instruction", &self.instruction)
            .field("configuration", &self.configuration)
            .field("external_api_url", &self.external_api_url)
            .field("api_key", &redact(&self.api_key))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .finish()
    }
}

/// Editable field of a [`StepInput`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepInputField {
    Instruction,
    /// JSON object text
    Configuration,
    ExternalApiUrl,
    ApiKey,
    ClientId,
    ClientSecret,
}

impl StepInputField {
    pub const ALL: [StepInputField; 6] = [
        Self::Instruction,
        Self::Configuration,
        Self::ExternalApiUrl,
        Self::ApiKey,
        Self::ClientId,
        Self::ClientSecret,
    ];

    /// Secrets are masked wherever they are displayed
    pub fn is_secret(self) -> bool {
        matches!(self, Self::ApiKey | Self::ClientSecret)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Instruction => "Instruction",
            Self::Configuration => "Configuration (JSON)",
            Self::ExternalApiUrl => "External API URL",
            Self::ApiKey => "API Key",
            Self::ClientId => "Client ID",
            Self::ClientSecret => "Client Secret",
        }
    }
}

impl std::fmt::Display for StepInputField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instruction => write!(f, "instruction"),
            Self::Configuration => write!(f, "configuration"),
            Self::ExternalApiUrl => write!(f, "externalApiUrl"),
            Self::ApiKey => write!(f, "apiKey"),
            Self::ClientId => write!(f, "clientId"),
            Self::ClientSecret => write!(f, "clientSecret"),
        }
    }
}

impl FromStr for StepInputField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instruction" => Ok(Self::Instruction),
            "configuration" | "config" => Ok(Self::Configuration),
            "externalApiUrl" | "external-api-url" => Ok(Self::ExternalApiUrl),
            "apiKey" | "api-key" => Ok(Self::ApiKey),
            "clientId" | "client-id" => Ok(Self::ClientId),
            "clientSecret" | "client-secret" => Ok(Self::ClientSecret),
            _ => Err(format!("Unknown step input field: {}", s)),
        }
    }
}

/// Result of one edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// Configuration text did not parse as a JSON object; the last valid
    /// configuration is kept and the text is held as a draft
    Retained { error: String },
}

#[derive(Debug, Clone, Default)]
struct Entry {
    input: StepInput,
    configuration_edited: bool,
    configuration_draft: Option<String>,
}

/// Per-step operator inputs for one plan
#[derive(Debug, Clone, Default)]
pub struct StepInputStore {
    entries: HashMap<StepKey, Entry>,
}

impl StepInputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored input, or the canonical empty one for an untouched step
    pub fn get(&self, key: &StepKey) -> StepInput {
        self.entries.get(key).map(|e| e.input.clone()).unwrap_or_default()
    }

    /// Merge one field into the step's input, creating the entry if absent
    ///
    /// Empty text clears an optional credential field.
    pub fn set(&mut self, key: &StepKey, field: StepInputField, value: &str) -> EditOutcome {
        debug!(%key, %field, "StepInputStore::set: called");
        let entry = self.entries.entry(key.clone()).or_default();
        let optional = |value: &str| if value.is_empty() { None } else { Some(value.to_string()) };

        match field {
            StepInputField::Instruction => entry.input.instruction = value.to_string(),
            StepInputField::Configuration => match parse_configuration(value) {
                Ok(configuration) => {
                    entry.input.configuration = configuration;
                    entry.configuration_edited = true;
                    entry.configuration_draft = None;
                }
                Err(error) => {
                    debug!(%key, %error, "StepInputStore::set: configuration kept at last valid value");
                    entry.configuration_draft = Some(value.to_string());
                    return EditOutcome::Retained { error };
                }
            },
            StepInputField::ExternalApiUrl => entry.input.external_api_url = optional(value),
            StepInputField::ApiKey => entry.input.api_key = optional(value),
            StepInputField::ClientId => entry.input.client_id = optional(value),
            StepInputField::ClientSecret => entry.input.client_secret = optional(value),
        }
        EditOutcome::Applied
    }

    /// Replace the configuration with an already-parsed object
    pub fn set_configuration(&mut self, key: &StepKey, configuration: Map<String, Value>) {
        let entry = self.entries.entry(key.clone()).or_default();
        entry.input.configuration = configuration;
        entry.configuration_edited = true;
        entry.configuration_draft = None;
    }

    /// Whether the operator has set a configuration for this step
    pub fn has_configuration(&self, key: &StepKey) -> bool {
        self.entries.get(key).is_some_and(|e| e.configuration_edited)
    }

    /// Unparsed configuration text awaiting correction
    pub fn draft(&self, key: &StepKey) -> Option<&str> {
        self.entries.get(key).and_then(|e| e.configuration_draft.as_deref())
    }

    pub fn is_touched(&self, key: &StepKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse configuration editor text; blank text means an empty object
pub fn parse_configuration(text: &str) -> Result<Map<String, Value>, String> {
    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("configuration must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {}", e)),
    }
}
