//! hubscale-arm — Azure Resource Manager collaborators.
//!
//! - [`ClientSecretCredential`] exchanges an application id and secret for a
//!   management-plane bearer token (OAuth2 client credentials) and hands out
//!   an authenticated [`ArmIotHubClient`].
//! - [`ArmIotHubClient`] implements `ResourceController` over the
//!   `Microsoft.Devices/IotHubs` REST API: read the hub, read its quota
//!   metrics, and submit an updated hub document.
//!
//! Base URLs are part of [`ArmEndpoints`] so tests can point both at a
//! local mock server.

pub mod client;
pub mod credential;
pub mod error;

pub use client::{API_VERSION, ArmIotHubClient};
pub use credential::{ArmEndpoints, ClientSecretCredential};
pub use error::{ArmError, ArmResult};
