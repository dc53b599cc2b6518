//! Assistant definitions and their content fingerprint.

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::AssistantSettings;
use crate::error::Result;
use crate::openai::types::AssistantRequest;
use crate::tools::{ToolDefinition, ToolRegistry};

/// Local definition of an assistant, compared against the cached copy to
/// decide whether the remote one needs updating.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantConfig {
    pub name: String,
    pub description: String,
    pub model: String,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
}

impl AssistantConfig {
    pub fn new(settings: &AssistantSettings, registry: &ToolRegistry) -> Self {
        Self {
            name: settings.name.clone(),
            description: settings.description.clone(),
            model: settings.model.clone(),
            instructions: settings.instructions.clone(),
            tools: registry.definitions(),
        }
    }

    /// JSON form stored in the cache and sent (with a versioned name) to the remote.
    pub fn serialized(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "description": self.description,
            "model": self.model,
            "instructions": self.instructions,
            "tools": self.assistant_tools(),
        })
    }

    /// Hex sha256 of [`Self::serialized`].
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.serialized())?;
        Ok(hex_encode(&Sha256::digest(&bytes)))
    }

    pub fn to_request(&self, remote_name: impl Into<String>) -> AssistantRequest {
        AssistantRequest {
            name: remote_name.into(),
            description: self.description.clone(),
            model: self.model.clone(),
            instructions: self.instructions.clone(),
            tools: self.assistant_tools(),
        }
    }

    /// Remote display name for a given cache version.
    pub fn remote_name(&self, version: u32) -> String {
        format!("{} - v{version}", self.name)
    }

    fn assistant_tools(&self) -> Vec<serde_json::Value> {
        self.tools.iter().map(ToolDefinition::to_assistant_tool).collect()
    }
}

fn hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
