//! HTTP-backed registry client
//!
//! Groups are addressed by name under `/groups`; tags are attached by
//! registry identifier through `/tags`. Create and update answer with the
//! group's identifier, which the reconciler needs for tagging.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use attrsync_common::{RegistryClient, RegistryError, RegistryGroup};

use crate::config::HttpClientConfig;
use crate::error::ClientError;
use crate::http::SyncHttpClient;

const GROUPS_PATH: &str = "groups";
const TAGS_PATH: &str = "tags";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupRequest<'a> {
    name: &'a str,
    description: &'a str,
    attributes_payload: &'a str,
    tags: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateGroupRequest<'a> {
    description: &'a str,
    attributes_payload: &'a str,
}

#[derive(Serialize)]
struct TagRequest<'a> {
    identifier: &'a str,
    tags: &'a BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct GroupIdentifier {
    #[serde(default, alias = "arn")]
    identifier: Option<String>,
}

/// Talks to the external registry over HTTP
pub struct HttpRegistryClient {
    http: SyncHttpClient,
}

impl HttpRegistryClient {
    pub fn new(config: &HttpClientConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: SyncHttpClient::new(config)?,
        })
    }

    /// An empty body means the registry returned no identifier
    fn identifier(body: &[u8]) -> Result<Option<String>, ClientError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let parsed: GroupIdentifier = serde_json::from_slice(body)?;
        Ok(parsed.identifier)
    }
}

#[async_trait::async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn get(&self, name: &str) -> Result<RegistryGroup, RegistryError> {
        self.http
            .get(&[GROUPS_PATH, name])
            .await
            .map_err(|e| e.into_registry_error(name))
    }

    async fn create(
        &self,
        name: &str,
        description: &str,
        payload: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Option<String>, RegistryError> {
        let request = CreateGroupRequest {
            name,
            description,
            attributes_payload: payload,
            tags,
        };
        let body = self
            .http
            .post_json(&[GROUPS_PATH], &request)
            .await
            .map_err(|e| e.into_registry_error(name))?;
        debug!("Registry created group {}", name);
        Self::identifier(&body).map_err(|e| e.into_registry_error(name))
    }

    async fn update(
        &self,
        name: &str,
        description: &str,
        payload: &str,
    ) -> Result<Option<String>, RegistryError> {
        let request = UpdateGroupRequest {
            description,
            attributes_payload: payload,
        };
        let body = self
            .http
            .put_json(&[GROUPS_PATH, name], &request)
            .await
            .map_err(|e| e.into_registry_error(name))?;
        debug!("Registry updated group {}", name);
        Self::identifier(&body).map_err(|e| e.into_registry_error(name))
    }

    async fn tag(
        &self,
        identifier: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), RegistryError> {
        self.http
            .post_json(&[TAGS_PATH], &TagRequest { identifier, tags })
            .await
            .map(|_| ())
            .map_err(|e| e.into_registry_error(identifier))
    }

    async fn delete(&self, name: &str) -> Result<(), RegistryError> {
        self.http
            .delete(&[GROUPS_PATH, name])
            .await
            .map_err(|e| e.into_registry_error(name))
    }
}
