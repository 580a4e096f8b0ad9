//! Workspace listing and lookup.

use crate::cache::Cache;
use crate::devices::list_paged;
use std::sync::Arc;
use wsi_http::{ApiClient, TransportError, Workspace};

/// Workspaces visible to the integration.
#[derive(Clone)]
pub struct Workspaces {
    api: ApiClient,
    cache: Arc<Cache<Workspace>>,
}

impl Workspaces {
    pub(crate) fn new(api: ApiClient) -> Self {
        Self {
            api,
            cache: Arc::new(Cache::default()),
        }
    }

    /// List workspaces, optionally filtered, e.g. `[("type", "meetingRoom")]`.
    ///
    /// # Errors
    ///
    /// Returns error if any page request fails.
    pub async fn list(&self, filters: &[(&str, &str)]) -> Result<Vec<Workspace>, TransportError> {
        list_paged(&self.api, "workspaces", filters).await
    }

    /// Look up one workspace. Results are cached for an hour.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn get(&self, workspace_id: &str) -> Result<Workspace, TransportError> {
        let path = format!("workspaces/{workspace_id}");
        self.cache
            .fetch(&path, || self.api.get_as::<Workspace>(&path))
            .await
    }
}

impl std::fmt::Debug for Workspaces {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspaces")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{token_store, FakeCloud};
    use serde_json::json;

    #[tokio::test]
    async fn list_single_page() {
        let cloud = FakeCloud::new();
        cloud.reply(
            "GET",
            "workspaces?",
            Ok(json!({ "items": [
                { "id": "ws-1", "displayName": "Oslo", "type": "meetingRoom", "capacity": 8 },
                { "id": "ws-2", "displayName": "Bergen", "type": "huddle" }
            ]})),
        );
        let workspaces = Workspaces::new(cloud.api("https://webexapis.com/v1", token_store()));

        let all = workspaces.list(&[]).await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].capacity, Some(8));
        assert_eq!(
            cloud.urls(),
            vec!["https://webexapis.com/v1/workspaces?max=999&start=0".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_lookup_is_retried() {
        let cloud = FakeCloud::new();
        cloud.reply(
            "GET",
            "workspaces/ws-9",
            Err(TransportError::Status {
                status: 404,
                body: String::new(),
            }),
        );
        cloud.reply("GET", "workspaces/ws-9", Ok(json!({ "id": "ws-9" })));
        let workspaces = Workspaces::new(cloud.api("https://webexapis.com/v1", token_store()));

        assert!(workspaces.get("ws-9").await.is_err());
        assert_eq!(workspaces.get("ws-9").await.unwrap().id, "ws-9");
    }
}
