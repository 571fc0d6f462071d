//! HTTP access to the authentication API.
//!
//! This module provides:
//! - `ApiClient`: the request gateway (bearer credential, timeouts, and a
//!   single coalesced refresh with one retry on 401)
//! - `AuthService`: typed calls for each auth endpoint
//! - `ApiError`: status-code aware error type

pub mod client;
pub mod error;
pub mod refresh;
pub mod service;

pub use client::{ApiClient, ApiClientBuilder, RequestOptions, DEFAULT_TIMEOUT_MS, REFRESH_PATH};
pub use error::ApiError;
pub use refresh::{RefreshFailure, RefreshTrigger};
pub use service::AuthService;

pub use reqwest::Method;
