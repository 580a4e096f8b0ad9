//! # Workspace Integrations Core
//!
//! Transport-free building blocks of the integration client.
//!
//! This crate provides:
//! - xAPI path normalization and pattern matching
//! - Decoding of notification records into a tagged [`Notification`]
//! - The [`NotificationRouter`] that fans records out to path listeners
//! - Helpers to turn flat configuration maps into trees

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod notification;
pub mod path;
pub mod router;
pub mod tree;

pub use notification::{Envelope, Notification, NotificationError, NotificationKind};
pub use path::{normalize_path, path_matches};
pub use router::{Listener, ListenerId, NotificationRouter};
