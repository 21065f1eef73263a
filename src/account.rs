//! Account resolution — turns an opaque connection credential into a
//! validated handle for the remote-service client.
//!
//! Two formats are accepted: a URL whose query string carries the connection
//! token (`https://accounts.atxp.ai?connection_token=...`), or a JSON object
//! with explicit identity fields (`{"account_id": "...", "token": "..."}`).
//! Resolution is a pure parse/validate step — no network I/O happens here.

use reqwest::Url;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::CredentialError;

/// Environment variable consulted when no credential is supplied per-request.
pub const CONNECTION_ENV_VAR: &str = "ATXP_CONNECTION";

/// A validated account handle usable by the remote job client.
#[derive(Debug, Clone)]
pub struct AccountHandle {
    /// Account identifier (explicit, or derived from the credential URL host).
    pub account_id: String,
    /// Bearer token for remote calls.
    pub token: SecretString,
}

#[derive(Deserialize)]
struct JsonCredential {
    account_id: Option<String>,
    token: Option<String>,
    // Older blobs used this field name.
    connection_token: Option<String>,
}

/// Parse and validate a raw connection credential.
pub fn resolve(raw: &str) -> Result<AccountHandle, CredentialError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CredentialError::MissingCredential);
    }

    if raw.starts_with('{') {
        return resolve_json(raw);
    }
    resolve_url(raw)
}

/// Resolve from the process-wide default environment variable.
pub fn resolve_from_env() -> Result<AccountHandle, CredentialError> {
    match std::env::var(CONNECTION_ENV_VAR) {
        Ok(raw) => resolve(&raw),
        Err(_) => Err(CredentialError::MissingCredential),
    }
}

fn resolve_json(raw: &str) -> Result<AccountHandle, CredentialError> {
    let parsed: JsonCredential = serde_json::from_str(raw)
        .map_err(|e| CredentialError::InvalidFormat(format!("invalid JSON credential: {e}")))?;

    let token = parsed
        .token
        .or(parsed.connection_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            CredentialError::InvalidFormat("JSON credential has no token field".to_string())
        })?;

    let account_id = parsed
        .account_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            CredentialError::InvalidFormat("JSON credential has no account_id field".to_string())
        })?;

    Ok(AccountHandle {
        account_id,
        token: SecretString::from(token),
    })
}

fn resolve_url(raw: &str) -> Result<AccountHandle, CredentialError> {
    let url = Url::parse(raw)
        .map_err(|e| CredentialError::InvalidFormat(format!("not a credential URL: {e}")))?;

    let mut token = None;
    let mut account_id = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "connection_token" | "token" => token = Some(value.into_owned()),
            "account_id" => account_id = Some(value.into_owned()),
            _ => {}
        }
    }

    let token = token.filter(|t| !t.is_empty()).ok_or_else(|| {
        CredentialError::InvalidFormat("credential URL has no token parameter".to_string())
    })?;

    let account_id = account_id
        .or_else(|| url.host_str().map(str::to_string))
        .ok_or_else(|| {
            CredentialError::InvalidFormat("credential URL has no host or account_id".to_string())
        })?;

    Ok(AccountHandle {
        account_id,
        token: SecretString::from(token),
    })
}
