pub mod credentials;
pub mod tracking_tokens;
pub mod usage;

pub use credentials::CredentialsDao;
pub use tracking_tokens::TrackingTokensDao;
pub use usage::{UsageDao, UsageQuery};
