//! Admin and public HTTP surfaces.
//!
//! Handlers stay thin: decode, delegate to the broker or the store, encode.

mod admin;
mod error;
mod public;
mod server;

pub use admin::admin_router;
pub use error::ApiError;
pub use public::public_router;
pub use server::{run_server, ApiState};
