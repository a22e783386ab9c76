use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const TRACKING_TOKEN_PREFIX: &str = "CGT_";

/// Attribution handle issued to an upstream integration. The secret is
/// returned once at creation; afterwards only metadata is exposed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tracking_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub label: String,
    #[sea_orm(unique)]
    pub token: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Token metadata without the secret.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrackingTokenInfo {
    pub id: i32,
    pub label: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl From<Model> for TrackingTokenInfo {
    fn from(token: Model) -> Self {
        Self {
            id: token.id,
            label: token.label,
            active: token.active,
            created_at: token.created_at,
            last_seen_at: token.last_seen_at,
        }
    }
}

/// Generate a tracking token secret: prefix plus `length` alphanumeric
/// characters of entropy. Length is clamped to the 16-40 range.
pub fn generate_tracking_token(length: u32) -> String {
    let length = length.clamp(16, 40) as usize;
    let random_part: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();

    format!("{TRACKING_TOKEN_PREFIX}{random_part}")
}

/// Labels are 1-64 characters after trimming.
pub fn validate_label(label: &str) -> bool {
    let trimmed = label.trim();
    !trimmed.is_empty() && trimmed.len() <= 64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_tracking_token() {
        let token = generate_tracking_token(22);
        assert!(token.starts_with(TRACKING_TOKEN_PREFIX));
        assert_eq!(token.len(), TRACKING_TOKEN_PREFIX.len() + 22);
        assert!(token[TRACKING_TOKEN_PREFIX.len()..]
            .chars()
            .all(|c| c.is_alphanumeric()));
    }

    #[test]
    fn test_generate_tracking_token_clamps_length() {
        assert_eq!(
            generate_tracking_token(4).len(),
            TRACKING_TOKEN_PREFIX.len() + 16
        );
        assert_eq!(
            generate_tracking_token(100).len(),
            TRACKING_TOKEN_PREFIX.len() + 40
        );
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_tracking_token(22), generate_tracking_token(22));
    }

    #[test]
    fn test_validate_label() {
        assert!(validate_label("billing-bot"));
        assert!(validate_label(&"a".repeat(64)));
        assert!(!validate_label(""));
        assert!(!validate_label("   "));
        assert!(!validate_label(&"a".repeat(65)));
    }
}
