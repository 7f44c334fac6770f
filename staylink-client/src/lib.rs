#![cfg_attr(not(test), forbid(unsafe_code))]

//! Client-side messaging for StayLink views.
//!
//! The entry point is [`MessagingContext`]: an explicitly constructed service
//! object owning the socket connection, the local unread set, and the
//! booking notification signals. REST access to the marketplace backend goes
//! through the [`api::MarketplaceApi`] seam so views and tests never touch
//! HTTP directly.

pub mod api;
pub mod context;
pub mod transport;

pub use context::{BookingToast, ClientError, MessagingContext};
