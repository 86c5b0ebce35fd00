// HTTP-backed attribute store

use serde::Serialize;
use tracing::warn;

use attrsync_common::{Attribute, AttributePage, AttributeStore, StoreError};

use crate::config::HttpClientConfig;
use crate::http::SyncHttpClient;

const ATTRIBUTES_PATH: &str = "attributes";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageQuery<'a> {
    page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

/// Reads attributes from a remote store service
pub struct HttpAttributeStore {
    http: SyncHttpClient,
}

impl HttpAttributeStore {
    pub fn new(config: &HttpClientConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: SyncHttpClient::new(config)?,
        })
    }
}

#[async_trait::async_trait]
impl AttributeStore for HttpAttributeStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<Attribute>, StoreError> {
        match self.http.get::<Attribute>(&[ATTRIBUTES_PATH, id]).await {
            Ok(attribute) => Ok(Some(attribute)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => {
                warn!("Failed to read attribute {} from store: {}", id, e);
                Err(e.into_store_error())
            }
        }
    }

    async fn list_page(
        &self,
        page_size: usize,
        token: Option<&str>,
    ) -> Result<AttributePage, StoreError> {
        let query = PageQuery {
            page_size,
            next_token: token,
        };
        self.http
            .get_with_query(&[ATTRIBUTES_PATH], &query)
            .await
            .map_err(|e| {
                warn!("Failed to list attribute page from store: {}", e);
                e.into_store_error()
            })
    }
}
