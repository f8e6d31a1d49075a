//! Common helper functions for Vault operations.

use crate::vault::{VaultClient, VaultError};
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use tracing::{info, warn};

/// Checks the HTTP response from Vault. If successful, returns the JSON body;
/// otherwise, it extracts an error message or returns the status code.
pub async fn check_response(resp: Response) -> Result<Value, VaultError> {
    let status = resp.status();
    if status.is_success() {
        if status == StatusCode::NO_CONTENT {
            Ok(json!({}))
        } else {
            let body = resp.text().await?;
            if body.trim().is_empty() {
                return Ok(json!({}));
            }
            serde_json::from_str(&body)
                .map_err(|e| VaultError::ParseError(format!("Failed to parse response: {}", e)))
        }
    } else {
        let body = resp.text().await.unwrap_or_default();
        if let Some(msg) = first_error_message(&body) {
            return Err(VaultError::Api(msg));
        }
        Err(VaultError::HttpStatus(status.as_u16(), body))
    }
}

/// Pulls the first entry of Vault's `errors` array out of a response body.
fn first_error_message(body: &str) -> Option<String> {
    let val = serde_json::from_str::<Value>(body).ok()?;
    val.get("errors")?
        .as_array()?
        .first()?
        .as_str()
        .map(|s| s.to_string())
}

/// Returns the `data` section of a logical response, or `None` when the
/// response carried no secret.
pub fn extract_data(body: Value) -> Option<Value> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Null) | None => None,
            Some(data) => Some(data),
        },
        _ => None,
    }
}

/// Enables the Consul secrets engine at `path`.
///
/// An engine that is already mounted there is not an error.
pub async fn mount_consul_engine(client: &VaultClient, path: &str) -> Result<(), VaultError> {
    let path = path.trim_matches('/');
    let response = client
        .post_with_body(
            &format!("sys/mounts/{}", path),
            json!({
                "type": "consul"
            }),
        )
        .await;

    match response {
        Ok(_) => {
            info!("Mounted Consul secrets engine at {}", path);
            Ok(())
        }
        Err(VaultError::Api(msg)) | Err(VaultError::HttpStatus(_, msg))
            if msg.contains("path is already in use") =>
        {
            info!("Consul secrets engine already mounted at {}, continuing", path);
            Ok(())
        }
        Err(e) => {
            warn!("Failed to mount Consul secrets engine at {}: {}", path, e);
            Err(e)
        }
    }
}
