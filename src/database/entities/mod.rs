pub mod provider_credentials;
pub mod tracking_tokens;
pub mod usage_events;

pub use provider_credentials::{CredentialInfo, Model as ProviderCredential};
pub use tracking_tokens::{Model as TrackingToken, TrackingTokenInfo};
pub use usage_events::{Model as UsageEvent, UsageSource};
