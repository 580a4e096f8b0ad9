//! # Workspace Integrations
//!
//! Connects a server-side process to the Workspace Integrations API as an
//! authorized integration.
//!
//! ```no_run
//! use wsi_integration::{Integration, IntegrationConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = IntegrationConfig::from_json_file("config.json")?;
//! let integration = Integration::connect(config).await?;
//!
//! integration
//!     .xapi()
//!     .status()
//!     .on("RoomAnalytics.PeopleCount", |device, path, value, _| {
//!         println!("{device}: {path} = {value}");
//!     });
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod devices;
pub mod error;
pub mod poller;
pub mod session;
pub mod workspaces;
pub mod xapi;

#[cfg(test)]
mod testing;

pub use config::{ActivationCode, HttpSettings, IntegrationConfig, LogLevel};
pub use devices::Devices;
pub use error::{IntegrationError, ValidationError, XapiError};
pub use poller::{decode_batch, NotificationSink, PollLoop, RETRY_BACKOFF};
pub use session::{ActionHandler, Integration, SessionState};
pub use workspaces::Workspaces;
pub use xapi::Xapi;
