//! Wire description: the JSON document a client loads to learn an extension's blocks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// `{"extensionName": .., "extensionPort": .., "blockSpecs": [[tag, description, name, ..]], "menus": {..}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDescription {
    pub extension_name: String,
    pub extension_port: u16,
    pub block_specs: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub menus: BTreeMap<String, Vec<String>>,
}

/// Encode a description as pretty-printed JSON.
pub fn encode_description(desc: &WireDescription) -> Result<String, DescriptionError> {
    serde_json::to_string_pretty(desc).map_err(DescriptionError::Encode)
}

pub fn decode_description(text: &str) -> Result<WireDescription, DescriptionError> {
    serde_json::from_str(text).map_err(DescriptionError::Decode)
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptionError {
    #[error("encode error: {0}")]
    Encode(serde_json::Error),
    #[error("decode error: {0}")]
    Decode(serde_json::Error),
}
