/// Session module
///
/// Holds the signed-in user's token pair, where it is stored, and the
/// claims read out of the access token.

mod claims;
mod credentials;
mod store;

pub use claims::SessionClaims;
pub use credentials::Credentials;
pub use store::CredentialStore;
pub use store::FileCredentialStore;
pub use store::MemoryCredentialStore;
