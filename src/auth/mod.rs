//! Authentication and authorization
//!
//! - `Authorizer`: injectable token check, consulted once per upgrade attempt
//! - `HttpAuthorizer`: queries an external check endpoint, `1` means authorized
//! - `ExpectedToken`: the secret served by the built-in `/token` check route
//!
//! There is no verdict caching: every upgrade performs a fresh check.

mod authorizer;
mod tokens;

pub use authorizer::{parse_verdict, Authorizer, HttpAuthorizer};
pub use tokens::{display_token, extract_token, ExpectedToken, TOKEN_PARAM, UNKNOWN_TOKEN};
