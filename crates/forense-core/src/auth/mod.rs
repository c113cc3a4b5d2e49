//! Authentication module for the anonymous session protocol.
//!
//! This module provides:
//! - `SessionManager`: session creation, refresh, retry and offline fallback
//! - `CredentialSet`: bearer/refresh token pair with derived expiry
//! - `UsageSnapshot`: request and quota counters reported by the API
//! - `Storage`: persistence backends (`FileStore`, `KeyringStore`, `MemoryStore`)
//!
//! Access tokens are considered expired 10 seconds before their real expiry.

pub mod credentials;
pub mod session;
pub mod store;
pub mod tokens;
pub mod usage;

pub use credentials::KeyringStore;
pub use session::{SessionManager, SessionState, CUSTOM_KEY_HEADER, SESSION_PATH};
pub use store::{FileStore, MemoryStore, Storage, CUSTOM_KEY_KEY, TOKENS_KEY};
pub use tokens::{CredentialSet, TokenPayload};
pub use usage::{LimitClass, UsageLimits, UsageSnapshot};
