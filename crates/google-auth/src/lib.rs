//! Google OAuth authentication library
//!
//! Provides client configuration loading, state and PKCE generation,
//! authorization URL construction, token exchange/refresh and the on-disk
//! token store used by the appssync CLI. The crate has no dependency on the
//! listener or the CLI and can be tested on its own.
//!
//! Credential flow:
//! 1. `ClientConfig::resolve()` merges CLI, credentials file and environment
//! 2. `authorize::generate_state()` + `pkce::generate_verifier()` per flow
//! 3. User authorizes via `authorize::build_authorization_url()`
//! 4. `TokenExchanger::exchange()` trades the callback code for tokens
//! 5. `TokenStore::store()` persists the resulting `Credential`
//! 6. `TokenExchanger::refresh()` renews an expired access token before use

pub mod authorize;
pub mod client;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod pkce;
pub mod token;

pub use authorize::{build_authorization_url, generate_state};
pub use client::{ClientConfig, ClientDescriptor};
pub use constants::*;
pub use credentials::{Credential, TokenStore};
pub use error::{Error, Result};
pub use pkce::{compute_challenge, generate_verifier};
pub use token::{GoogleTokenClient, TokenExchanger, TokenResponse, exchange_code, refresh_token};
