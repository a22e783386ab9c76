use crate::auth::mask_secret;
use crate::database::DatabaseError;
use crate::database::entities::{CredentialInfo, ProviderCredential};
use crate::error::AppError;
use crate::server::Server;
use crate::utils::RequestId;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct CreateCredentialRequest {
    pub label: String,
    pub provider: String,
    pub api_key: String,
}

/// POST /keys: encrypt and store a provider credential. The plaintext key is
/// never persisted and never echoed back.
pub async fn create_credential(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<CreateCredentialRequest>,
) -> Result<(StatusCode, Json<CredentialInfo>), AppError> {
    let label = request.label.trim();
    if label.is_empty() || label.len() > 64 {
        return Err(
            AppError::validation("label must be 1-64 characters").with_request_id(request_id)
        );
    }
    let provider = request.provider.trim();
    if provider.is_empty() {
        return Err(AppError::validation("provider is required").with_request_id(request_id));
    }
    if request.api_key.trim().is_empty() {
        return Err(AppError::validation("api_key is required").with_request_id(request_id));
    }

    let encrypted = server
        .cipher
        .encrypt(request.api_key.trim())
        .map_err(|e| AppError::from(e).with_request_id(request_id))?;

    let credential = server
        .database
        .credentials()
        .create(label, provider, encrypted)
        .await
        .map_err(|e| match e {
            DatabaseError::Constraint(_) => {
                AppError::validation("label already in use").with_request_id(request_id)
            }
            other => AppError::from(other).with_request_id(request_id),
        })?;

    info!(
        credential_id = credential.id,
        label = %credential.label,
        provider = %credential.provider,
        "provider credential stored"
    );

    Ok((StatusCode::CREATED, Json(with_hint(credential, &server))))
}

/// GET /keys: credential metadata with masked key hints.
pub async fn list_credentials(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Value>, AppError> {
    let credentials: Vec<CredentialInfo> = server
        .database
        .credentials()
        .list()
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))?
        .into_iter()
        .map(|c| with_hint(c, &server))
        .collect();

    Ok(Json(json!({ "keys": credentials })))
}

/// GET /keys/{id}.
pub async fn get_credential(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i32>,
) -> Result<Json<CredentialInfo>, AppError> {
    let credential = server
        .database
        .credentials()
        .find_by_id(id)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))?
        .ok_or_else(|| AppError::not_found("Credential not found").with_request_id(request_id))?;

    Ok(Json(with_hint(credential, &server)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCredentialRequest {
    pub active: bool,
}

/// PATCH /keys/{id}: activation toggle.
pub async fn update_credential(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateCredentialRequest>,
) -> Result<Json<CredentialInfo>, AppError> {
    let credential = server
        .database
        .credentials()
        .set_active(id, request.active)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))?;

    info!(credential_id = id, active = request.active, "provider credential updated");
    Ok(Json(with_hint(credential, &server)))
}

/// DELETE /keys/{id}.
pub async fn delete_credential(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    server
        .database
        .credentials()
        .delete(id)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))?;

    info!(credential_id = id, "provider credential deleted");
    Ok(Json(json!({ "message": "Credential deleted" })))
}

/// Decrypt the stored key to produce a masked hint. An undecryptable blob
/// (rotated master secret, corrupt row) degrades to no hint rather than an
/// error.
fn with_hint(credential: ProviderCredential, server: &Server) -> CredentialInfo {
    let hint = match server.cipher.decrypt(&credential.encrypted_key) {
        Ok(plaintext) => Some(mask_secret(&plaintext)),
        Err(e) => {
            warn!(credential_id = credential.id, error = %e, "credential hint unavailable");
            None
        }
    };

    let mut info = CredentialInfo::from(credential);
    info.key_hint = hint;
    info
}
