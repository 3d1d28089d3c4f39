//! Tactical RMM script library access.

pub mod client;
pub mod request;

pub use client::{RmmClient, RmmScript, ScriptPayload};
pub use request::RmmRequest;
