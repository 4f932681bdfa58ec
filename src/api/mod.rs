pub(crate) mod backend;
pub(crate) mod common;
pub mod health;
pub mod ingress;
pub mod models;
pub(crate) mod permissions;
pub(crate) mod streams;

pub use ingress::{anthropic, openai_chat};
