//! xAPI facade: commands, status, configurations and events of devices.
//!
//! Paths may be written dot- or space-separated (`Audio.Volume` or
//! `Audio Volume`); they are normalized before use.

use crate::error::{ValidationError, XapiError};
use serde_json::Value;
use std::sync::Arc;
use wsi_core::tree::{is_empty, remove_path, to_tree};
use wsi_core::{normalize_path, ListenerId, Notification, NotificationRouter};
use wsi_http::ApiClient;

fn require(
    operation: &'static str,
    device_id: &str,
    path: &str,
) -> Result<String, ValidationError> {
    let path = normalize_path(path);
    if device_id.trim().is_empty() || path.is_empty() {
        return Err(ValidationError::MissingDeviceOrPath(operation));
    }
    Ok(path)
}

/// Device API access bound to a session.
#[derive(Clone)]
pub struct Xapi {
    api: ApiClient,
    router: Arc<NotificationRouter>,
}

impl Xapi {
    pub(crate) fn new(api: ApiClient, router: Arc<NotificationRouter>) -> Self {
        Self { api, router }
    }

    /// Invoke a command, e.g. `("Audio.Volume.Set", {"Level": 40})`.
    ///
    /// `multiline` is sent as the command body, for commands such as
    /// `UserInterface.Extensions.Panel.Save`.
    ///
    /// # Errors
    ///
    /// Returns error if the device id or path is missing, `params` is not an
    /// object, or the request fails.
    pub async fn command(
        &self,
        device_id: &str,
        path: &str,
        params: Option<Value>,
        multiline: Option<&str>,
    ) -> Result<Value, XapiError> {
        let path = require("xCommand", device_id, path)?;
        if params.as_ref().is_some_and(|p| !p.is_object()) {
            return Err(ValidationError::ParamsNotObject("xCommand").into());
        }

        let response = self
            .api
            .x_command(device_id, &path, params, multiline)
            .await?;
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Status reads and subscriptions.
    #[must_use]
    pub fn status(&self) -> Status<'_> {
        Status { xapi: self }
    }

    /// Configuration reads and writes.
    #[must_use]
    pub fn config(&self) -> Config<'_> {
        Config { xapi: self }
    }

    /// Event subscriptions.
    #[must_use]
    pub fn event(&self) -> Event<'_> {
        Event { xapi: self }
    }

    /// Remove a status or event listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.router.remove(id)
    }
}

impl std::fmt::Debug for Xapi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Xapi")
            .field("base_url", &self.api.base_url())
            .finish_non_exhaustive()
    }
}

/// Status operations, see [`Xapi::status`].
#[derive(Debug, Clone, Copy)]
pub struct Status<'a> {
    xapi: &'a Xapi,
}

impl Status<'_> {
    /// Read the status value or subtree at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`XapiError::NotFound`] if the device reports nothing for the
    /// path, or error if validation or the request fails.
    pub async fn get(&self, device_id: &str, path: &str) -> Result<Value, XapiError> {
        let path = require("xStatus", device_id, path)?;
        let response = self.xapi.api.x_status(device_id, &path).await?;

        let result = response.get("result").unwrap_or(&Value::Null);
        if is_empty(result) {
            return Err(XapiError::NotFound(format!("xStatus {path}")));
        }
        remove_path(&path, result)
            .cloned()
            .ok_or_else(|| XapiError::NotFound(format!("xStatus {path}")))
    }

    /// Subscribe to status changes matching `pattern` on any device.
    pub fn on<F>(&self, pattern: &str, listener: F) -> ListenerId
    where
        F: Fn(&str, &str, &Value, &Notification) + Send + Sync + 'static,
    {
        self.xapi.router.on_status(normalize_path(pattern), listener)
    }
}

/// Configuration operations, see [`Xapi::config`].
#[derive(Debug, Clone, Copy)]
pub struct Config<'a> {
    xapi: &'a Xapi,
}

impl Config<'_> {
    /// Read the configured value or subtree at `path`.
    ///
    /// List entries such as `Microphone[1]` come back as arrays of objects
    /// with an `id`.
    ///
    /// # Errors
    ///
    /// Returns [`XapiError::NotFound`] if the device has no configuration
    /// under `path`, or error if validation or the request fails.
    pub async fn get(&self, device_id: &str, path: &str) -> Result<Value, XapiError> {
        let path = require("xConfig", device_id, path)?;
        let response = self.xapi.api.x_config(device_id, &path).await?;

        let items = response
            .get("items")
            .and_then(Value::as_object)
            .filter(|items| !items.is_empty())
            .ok_or_else(|| XapiError::NotFound(format!("xConfig {path}")))?;

        let tree = to_tree(items);
        remove_path(&path, &tree)
            .cloned()
            .ok_or_else(|| XapiError::NotFound(format!("xConfig {path}")))
    }

    /// Set one configuration.
    ///
    /// # Errors
    ///
    /// Returns error if validation or the request fails.
    pub async fn set(&self, device_id: &str, path: &str, value: Value) -> Result<Value, XapiError> {
        self.set_many(device_id, &[(path, value)]).await
    }

    /// Set several configurations in one request.
    ///
    /// # Errors
    ///
    /// Returns error if any path is missing or the request fails.
    pub async fn set_many(
        &self,
        device_id: &str,
        configs: &[(&str, Value)],
    ) -> Result<Value, XapiError> {
        let configs = configs
            .iter()
            .map(|(path, value)| Ok((require("xConfig", device_id, path)?, value.clone())))
            .collect::<Result<Vec<_>, ValidationError>>()?;
        if configs.is_empty() {
            return Err(ValidationError::MissingDeviceOrPath("xConfig").into());
        }

        Ok(self.xapi.api.x_config_set(device_id, &configs).await?)
    }
}

/// Event operations, see [`Xapi::event`].
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    xapi: &'a Xapi,
}

impl Event<'_> {
    /// Subscribe to events matching `pattern` on any device.
    pub fn on<F>(&self, pattern: &str, listener: F) -> ListenerId
    where
        F: Fn(&str, &str, &Value, &Notification) + Send + Sync + 'static,
    {
        self.xapi.router.on_event(normalize_path(pattern), listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{token_store, FakeCloud};
    use serde_json::json;
    use wsi_http::TransportError;

    const BASE: &str = "https://webexapis.com/v1";

    fn xapi(cloud: &Arc<FakeCloud>) -> Xapi {
        Xapi::new(cloud.api(BASE, token_store()), Arc::new(NotificationRouter::new()))
    }

    #[tokio::test]
    async fn command_normalizes_path_and_returns_result() {
        let cloud = FakeCloud::new();
        cloud.reply(
            "POST",
            "xapi/command/Audio.Volume.Set",
            Ok(json!({ "deviceId": "d1", "result": { "status": "OK" } })),
        );

        let result = xapi(&cloud)
            .command("d1", "Audio Volume Set", Some(json!({ "Level": 40 })), None)
            .await
            .unwrap();

        assert_eq!(result, json!({ "status": "OK" }));
        let requests = cloud.requests();
        assert_eq!(
            requests[0].body,
            Some(json!({ "deviceId": "d1", "arguments": { "Level": 40 } }))
        );
    }

    #[tokio::test]
    async fn command_validates_before_sending() {
        let cloud = FakeCloud::new();
        let x = xapi(&cloud);

        let missing = x.command("", "Audio.Volume.Set", None, None).await;
        let not_object = x
            .command("d1", "Audio.Volume.Set", Some(json!([1, 2])), None)
            .await;

        assert!(matches!(
            missing,
            Err(XapiError::Validation(ValidationError::MissingDeviceOrPath("xCommand")))
        ));
        assert!(matches!(
            not_object,
            Err(XapiError::Validation(ValidationError::ParamsNotObject("xCommand")))
        ));
        assert!(cloud.requests().is_empty());
    }

    #[tokio::test]
    async fn multiline_command_body() {
        let cloud = FakeCloud::new();
        cloud.reply("POST", "Panel.Save", Ok(json!({})));

        let result = xapi(&cloud)
            .command(
                "d1",
                "UserInterface.Extensions.Panel.Save",
                Some(json!({ "PanelId": "p" })),
                Some("<Extensions/>"),
            )
            .await
            .unwrap();

        assert_eq!(result, Value::Null);
        assert_eq!(
            cloud.requests()[0].body.as_ref().and_then(|b| b.get("body")),
            Some(&json!("<Extensions/>"))
        );
    }

    #[tokio::test]
    async fn status_get_descends_into_result() {
        let cloud = FakeCloud::new();
        cloud.reply(
            "GET",
            "xapi/status",
            Ok(json!({ "result": { "Audio": { "Volume": 50 } } })),
        );

        let value = xapi(&cloud).status().get("d1", "Audio Volume").await.unwrap();

        assert_eq!(value, json!(50));
        assert_eq!(
            cloud.urls()[0],
            "https://webexapis.com/v1/xapi/status?deviceId=d1&name=Audio.Volume"
        );
    }

    #[tokio::test]
    async fn status_get_empty_result_is_not_found() {
        let cloud = FakeCloud::new();
        cloud.reply("GET", "xapi/status", Ok(json!({ "result": {} })));

        let err = xapi(&cloud)
            .status()
            .get("d1", "RoomAnalytics.PeopleCount")
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "xStatus RoomAnalytics.PeopleCount not found. Did you include the API in the manifest?"
        );
    }

    #[tokio::test]
    async fn status_get_skips_wildcards() {
        let cloud = FakeCloud::new();
        cloud.reply(
            "GET",
            "xapi/status",
            Ok(json!({ "result": { "Audio": { "Volume": 50, "VolumeMute": "Off" } } })),
        );

        let value = xapi(&cloud).status().get("d1", "Audio.*").await.unwrap();

        assert_eq!(value, json!({ "Volume": 50, "VolumeMute": "Off" }));
    }

    #[tokio::test]
    async fn config_get_builds_tree() {
        let cloud = FakeCloud::new();
        cloud.reply(
            "GET",
            "deviceConfigurations",
            Ok(json!({
                "deviceId": "d1",
                "items": {
                    "Audio.DefaultVolume": { "value": 50 },
                    "Audio.Input.Microphone[1].Level": { "value": 12 }
                }
            })),
        );

        let value = xapi(&cloud).config().get("d1", "Audio").await.unwrap();

        assert_eq!(value["DefaultVolume"], json!(50));
        assert_eq!(
            value["Input"]["Microphone"],
            json!([{ "id": "1", "Level": 12 }])
        );
        assert!(cloud.urls()[0].ends_with("deviceConfigurations?deviceId=d1&key=Audio"));
    }

    #[tokio::test]
    async fn config_get_without_items_is_not_found() {
        let cloud = FakeCloud::new();
        cloud.reply("GET", "deviceConfigurations", Ok(json!({ "items": {} })));

        let result = xapi(&cloud).config().get("d1", "Nope").await;

        assert!(matches!(result, Err(XapiError::NotFound(path)) if path == "xConfig Nope"));
    }

    #[tokio::test]
    async fn config_set_many_sends_one_patch() {
        let cloud = FakeCloud::new();
        cloud.reply("PATCH", "deviceConfigurations", Ok(json!({})));

        xapi(&cloud)
            .config()
            .set_many(
                "d1",
                &[
                    ("Audio DefaultVolume", json!(40)),
                    ("Audio.Ultrasound.MaxVolume", json!(0)),
                ],
            )
            .await
            .unwrap();

        let requests = cloud.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].content_type.as_deref(),
            Some(wsi_http::JSON_PATCH_CONTENT_TYPE)
        );
        assert_eq!(
            requests[0].body,
            Some(json!([
                { "op": "replace", "path": "Audio.DefaultVolume/sources/configured/value", "value": 40 },
                { "op": "replace", "path": "Audio.Ultrasound.MaxVolume/sources/configured/value", "value": 0 }
            ]))
        );
    }

    #[tokio::test]
    async fn transport_errors_pass_through() {
        let cloud = FakeCloud::new();
        cloud.reply(
            "GET",
            "xapi/status",
            Err(TransportError::Status {
                status: 403,
                body: "forbidden".into(),
            }),
        );

        let result = xapi(&cloud).status().get("d1", "Audio.Volume").await;

        assert!(matches!(
            result,
            Err(XapiError::Transport(TransportError::Status { status: 403, .. }))
        ));
    }

    #[test]
    fn listeners_register_on_router() {
        let cloud = FakeCloud::new();
        let x = xapi(&cloud);

        let id = x.status().on("Audio Volume", |_, _, _, _| {});
        x.event().on("UserInterface.Extensions", |_, _, _, _| {});

        assert_eq!(x.router.status_listener_count(), 1);
        assert_eq!(x.router.event_listener_count(), 1);
        assert!(x.off(id));
        assert_eq!(x.router.status_listener_count(), 0);
    }
}
