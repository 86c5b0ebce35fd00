//! Data model shared by the store, the registry and the sync queue
//!
//! Ids and registry group names are pure functions of the attribute's
//! key and value; nothing links the two systems except these derivations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Separator between key and value inside an attribute id
pub const ID_SEPARATOR: char = ':';

/// Separator between segments of a registry group name
pub const GROUP_NAME_SEPARATOR: char = '.';

/// Tag key marking a registry group as owned by the synchronizer
pub const MANAGED_BY_TAG: &str = "managedBy";

pub const PAYLOAD_ATTRIBUTE_NAME: &str = "attributeName";
pub const PAYLOAD_ATTRIBUTE_KEY: &str = "attributeKey";
pub const PAYLOAD_ATTRIBUTE_VALUE: &str = "attributeValue";
pub const PAYLOAD_ATTRIBUTE_CREATE_TIME: &str = "attributeCreateTime";
pub const PAYLOAD_ATTRIBUTE_LAST_UPDATE_TIME: &str = "attributeLastUpdateTime";

/// Normalize an attribute id (upper-cased)
///
/// Whitespace is part of a key or value, so it is kept: trimming here would
/// map `Env:Prod ` onto the id of `Env:Prod`.
pub fn normalize_id(id: &str) -> String {
    id.to_uppercase()
}

/// Whether an id carries nothing but whitespace
pub fn is_blank_id(id: &str) -> bool {
    id.trim().is_empty()
}

/// Build the attribute id from its key and value
pub fn attribute_id(key: &str, value: &str) -> String {
    format!("{}{}{}", key.to_uppercase(), ID_SEPARATOR, value.to_uppercase())
}

/// Build the display name from its key and value
pub fn attribute_name(key: &str, value: &str) -> String {
    format!("{}{}{}", key, ID_SEPARATOR, value)
}

/// Derive the registry group name for an attribute id
///
/// `ENV:PROD` with prefix `PREFIX` becomes `PREFIX.ENV.PROD`. Only the first
/// separator splits key from value.
pub fn group_name(prefix: &str, id: &str) -> String {
    let id = normalize_id(id);
    let prefix = prefix.trim().to_uppercase();
    match id.split_once(ID_SEPARATOR) {
        Some((key, value)) => format!(
            "{prefix}{sep}{key}{sep}{value}",
            sep = GROUP_NAME_SEPARATOR
        ),
        None => format!("{}{}{}", prefix, GROUP_NAME_SEPARATOR, id),
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// An attribute as held by the canonical store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub id: String,
    pub key: String,
    pub value: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub create_time: String,
    pub last_update_time: String,
}

impl Attribute {
    pub fn new(
        key: &str,
        value: &str,
        description: &str,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            id: attribute_id(key, value),
            key: key.to_string(),
            value: value.to_string(),
            name: attribute_name(key, value),
            description: description.to_string(),
            metadata,
            create_time: now.clone(),
            last_update_time: now,
        }
    }

    /// Replace description and metadata, bumping `last_update_time`
    pub fn touch(&mut self, description: &str, metadata: BTreeMap<String, String>) {
        self.description = description.to_string();
        self.metadata = metadata;
        self.last_update_time = now_rfc3339();
    }
}

/// Serialize the registry payload for an attribute
///
/// Metadata entries are merged with the fixed `attribute*` fields; the fixed
/// fields win on collision. Keys are emitted sorted so an unchanged attribute
/// always yields byte-identical output.
pub fn build_payload(attribute: &Attribute) -> Result<String, serde_json::Error> {
    let mut payload = attribute.metadata.clone();
    payload.insert(PAYLOAD_ATTRIBUTE_NAME.to_string(), attribute.name.clone());
    payload.insert(PAYLOAD_ATTRIBUTE_KEY.to_string(), attribute.key.clone());
    payload.insert(PAYLOAD_ATTRIBUTE_VALUE.to_string(), attribute.value.clone());
    payload.insert(
        PAYLOAD_ATTRIBUTE_CREATE_TIME.to_string(),
        attribute.create_time.clone(),
    );
    payload.insert(
        PAYLOAD_ATTRIBUTE_LAST_UPDATE_TIME.to_string(),
        attribute.last_update_time.clone(),
    );
    serde_json::to_string(&payload)
}

/// The external registry's representation of one attribute
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes_payload: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Opaque identifier assigned by the registry, required for tagging
    #[serde(default, alias = "arn")]
    pub identifier: Option<String>,
}

impl RegistryGroup {
    /// The identifier if present and non-blank
    pub fn usable_identifier(&self) -> Option<&str> {
        self.identifier
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Required tags absent from `existing`, or present with a different value
pub fn missing_tags(
    required: &BTreeMap<String, String>,
    existing: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    required
        .iter()
        .filter(|(k, v)| existing.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Queue message body, `{"id": "..."}` on the wire
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub id: String,
}

impl SyncMessage {
    pub fn new(id: &str) -> Self {
        Self {
            id: normalize_id(id),
        }
    }

    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// One page of a store listing
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributePage {
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub next_token: Option<String>,
}

impl AttributePage {
    /// The continuation token, treating an empty string as end of listing
    pub fn continuation(&self) -> Option<&str> {
        self.next_token.as_deref().filter(|t| !t.is_empty())
    }
}
