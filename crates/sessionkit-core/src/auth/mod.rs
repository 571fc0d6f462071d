//! Credential storage for the client session.
//!
//! This module provides:
//! - `TokenStore`: the access credential, its expiry and the session marker
//! - `SlotStorage` backends: in-memory, JSON file (optionally sealed) and
//!   OS keychain via `KeyringStorage`
//!
//! Tokens are considered expired 60 seconds before their real expiry.

pub mod credentials;
pub mod sealed;
pub mod storage;
pub mod token_store;

pub use credentials::KeyringStorage;
pub use storage::{FileStorage, MemoryStorage, SlotStorage, SlotWrite, SESSION_FILE};
pub use token_store::{TokenPolicy, TokenStore};
