use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Encrypted third-party API key. Only ciphertext is ever persisted; the
/// plaintext exists transiently during upload and masked display.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "provider_credentials")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub label: String,
    pub provider: String,
    pub encrypted_key: Vec<u8>,
    pub active: bool,
    pub last_ok: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Credential metadata for API responses; never carries key material beyond
/// an optional masked hint.
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialInfo {
    pub id: i32,
    pub label: String,
    pub provider: String,
    pub active: bool,
    pub last_ok: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_hint: Option<String>,
}

impl From<Model> for CredentialInfo {
    fn from(credential: Model) -> Self {
        Self {
            id: credential.id,
            label: credential.label,
            provider: credential.provider,
            active: credential.active,
            last_ok: credential.last_ok,
            created_at: credential.created_at,
            key_hint: None,
        }
    }
}
