//! Signed-in identity as handed over by the authentication provider.
//!
//! The core only consumes the user id and role; sign-in itself happens in
//! the provider. The last session is persisted so the app can start offline.

pub mod session;

pub use session::{AuthSession, Session};
