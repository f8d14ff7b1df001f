//! Web access tokens: short-lived, optionally one-shot tokens minted for a
//! single download/upload URL so a browser doesn't need the repo's sync
//! token in the query string (spec.md's Supplemented Features).

mod web_token;

pub use web_token::{WebTokenClaim, WebTokenManager};
