pub mod vault;

pub use vault::{Vault, VaultError};

/// Vault entry holding the shared secret that signs inbound git webhooks.
pub const WEBHOOK_SECRET_NAME: &str = "GITHUB_WEBHOOK_SECRET";
