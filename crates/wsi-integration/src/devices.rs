//! Device listing and lookup.

use crate::cache::Cache;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use wsi_http::{query_string, ApiClient, Device, Page, TransportError};

/// Largest page the listing endpoints return.
pub const PAGE_SIZE: usize = 999;

/// Fetch every entry of a paged listing endpoint.
///
/// Pages are requested until one comes back shorter than [`PAGE_SIZE`].
pub(crate) async fn list_paged<T: DeserializeOwned>(
    api: &ApiClient,
    resource: &str,
    filters: &[(&str, &str)],
) -> Result<Vec<T>, TransportError> {
    let mut all = Vec::new();
    let filters = query_string(filters);

    loop {
        let mut url = format!("{resource}?max={PAGE_SIZE}&start={}", all.len());
        if !filters.is_empty() {
            url.push('&');
            url.push_str(&filters);
        }

        let page: Page<T> = api.get_as(&url).await?;
        let count = page.items.len();
        all.extend(page.items);
        tracing::debug!(resource, count, total = all.len(), "Fetched page");

        if count < PAGE_SIZE {
            return Ok(all);
        }
    }
}

/// Devices visible to the integration.
#[derive(Clone)]
pub struct Devices {
    api: ApiClient,
    cache: Arc<Cache<Device>>,
}

impl Devices {
    pub(crate) fn new(api: ApiClient) -> Self {
        Self {
            api,
            cache: Arc::new(Cache::default()),
        }
    }

    /// List devices, optionally filtered, e.g. `[("tag", "lobby")]`.
    ///
    /// # Errors
    ///
    /// Returns error if any page request fails.
    pub async fn list(&self, filters: &[(&str, &str)]) -> Result<Vec<Device>, TransportError> {
        list_paged(&self.api, "devices", filters).await
    }

    /// Look up one device. Results are cached for an hour.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn get(&self, device_id: &str) -> Result<Device, TransportError> {
        let path = format!("devices/{device_id}");
        self.cache
            .fetch(&path, || self.api.get_as::<Device>(&path))
            .await
    }
}

impl std::fmt::Debug for Devices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Devices")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}
