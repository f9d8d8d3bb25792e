pub mod auth;
pub mod client;
pub mod cookies;
pub mod credentials;
pub mod pipeline;
pub mod save;

pub use cookies::CookieStore;
pub use credentials::CredentialStore;
pub use pipeline::{FetchContext, FetchOutcome};
