//! The swapd daemon: HTTP surface and update orchestrator.
//!
//! A publisher POSTs a signed [`swapd_core::UpdateRequest`] to `/update`;
//! the [`update`] module runs the pipeline — verify, parse, match,
//! pre-flight health, fetch, stop, swap, start, post-deploy health — and
//! either commits the new version or rolls back to the previous binary.
//!
//! The daemon itself is one of possibly several [`delivery`] variants; the
//! webhook variant here is the only one that enters the update pipeline.

pub mod delivery;
pub mod locks;
pub mod server;
pub mod state;
pub mod update;

pub use delivery::{Delivery, DeliveryError, DeliverySet, WebhookDelivery};
pub use server::router;
pub use state::DaemonState;
