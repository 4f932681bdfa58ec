pub(crate) mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod observability;
pub mod permission;
pub mod protocol;
pub mod provider;
pub mod routing;
pub mod state;
pub mod stream;

mod util;
