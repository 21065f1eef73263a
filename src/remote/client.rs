//! MCP job client — three remote operations behind one trait.
//!
//! Payloads are opaque JSON envelopes; they are decoded exactly once here so
//! the lifecycle manager never inspects raw untyped payloads. Transport
//! failures map to [`RemoteError::Unavailable`], malformed or refused
//! responses to [`RemoteError::Rejected`].

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;

use crate::account::AccountHandle;
use crate::error::RemoteError;
use crate::remote::payment::PaymentEvent;

/// Tool names exposed by the remote services.
const TOOL_CREATE_IMAGE: &str = "create_image_async";
const TOOL_IMAGE_STATUS: &str = "get_image_status";
const TOOL_STORE_URL: &str = "store_url";

/// Status of a remote image-generation job, decoded at the client boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed { result_url: String },
    Failed,
}

/// Result of storing a completed image into durable file storage.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub url: String,
    pub name: String,
}

/// The three operations the lifecycle manager needs from the remote services.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Start an async image-generation job. Returns the remote job id.
    async fn create_job(&self, prompt: &str) -> Result<String, RemoteError>;

    /// Check a job's status.
    async fn job_status(&self, job_id: &str) -> Result<JobStatus, RemoteError>;

    /// Copy a result URL into durable storage. Best-effort — callers must
    /// treat failure as non-fatal to the overall task.
    async fn store_object(&self, source_url: &str) -> Result<StoredObject, RemoteError>;
}

/// Concrete client speaking JSON-RPC `tools/call` over HTTP.
pub struct McpJobClient {
    http: reqwest::Client,
    account: AccountHandle,
    image_service_url: String,
    filestore_service_url: String,
    payments_tx: broadcast::Sender<PaymentEvent>,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    result: Option<RpcResult>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Deserialize)]
struct RpcResult {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default, rename = "isError")]
    is_error: bool,
    #[serde(default, rename = "_meta")]
    meta: Option<Value>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl McpJobClient {
    pub fn new(
        account: AccountHandle,
        image_service_url: impl Into<String>,
        filestore_service_url: impl Into<String>,
        payments_tx: broadcast::Sender<PaymentEvent>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            account,
            image_service_url: image_service_url.into(),
            filestore_service_url: filestore_service_url.into(),
            payments_tx,
        }
    }

    /// Invoke one tool and return the decoded JSON body of its text content.
    async fn call_tool(
        &self,
        endpoint: &str,
        service: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, RemoteError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": tool, "arguments": arguments },
        });

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(self.account.token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("{service} request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RemoteError::Unavailable(format!(
                "{service} returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(RemoteError::Rejected(format!(
                "{service} returned {status}"
            )));
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| RemoteError::Rejected(format!("{service} sent invalid JSON: {e}")))?;

        if let Some(err) = envelope.error {
            return Err(RemoteError::Rejected(format!(
                "{service} error: {}",
                err.message
            )));
        }
        let result = envelope.result.ok_or_else(|| {
            RemoteError::Rejected(format!("{service} response missing result"))
        })?;
        if result.is_error {
            let detail = result
                .content
                .iter()
                .find(|c| c.kind == "text")
                .map(|c| c.text.clone())
                .unwrap_or_default();
            return Err(RemoteError::Rejected(format!(
                "{service} tool {tool} failed: {detail}"
            )));
        }

        self.publish_payment(service, tool, result.meta.as_ref());

        let text = result
            .content
            .iter()
            .find(|c| c.kind == "text")
            .map(|c| c.text.as_str())
            .ok_or_else(|| {
                RemoteError::Rejected(format!("{service} response has no text content"))
            })?;

        serde_json::from_str(text)
            .map_err(|e| RemoteError::Rejected(format!("{service} payload is not JSON: {e}")))
    }

    /// Emit a payment event for a billable call. Amount/currency are taken
    /// from the response `_meta.payment` extension when present.
    fn publish_payment(&self, service: &str, tool: &str, meta: Option<&Value>) {
        let payment = meta.and_then(|m| m.get("payment"));
        let amount = payment
            .and_then(|p| p.get("amount"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Decimal>().ok());
        let currency = payment
            .and_then(|p| p.get("currency"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let event = PaymentEvent {
            account_id: self.account.account_id.clone(),
            service: service.to_string(),
            tool: tool.to_string(),
            amount,
            currency,
            at: Utc::now(),
        };
        debug!(service, tool, "Billable call completed");
        // Ok if nobody is listening.
        let _ = self.payments_tx.send(event);
    }
}

#[async_trait]
impl JobClient for McpJobClient {
    async fn create_job(&self, prompt: &str) -> Result<String, RemoteError> {
        let body = self
            .call_tool(
                &self.image_service_url,
                "image",
                TOOL_CREATE_IMAGE,
                json!({ "prompt": prompt }),
            )
            .await?;

        body.get("jobId")
            .or_else(|| body.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                RemoteError::Rejected("create response has no job identifier".to_string())
            })
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, RemoteError> {
        let body = self
            .call_tool(
                &self.image_service_url,
                "image",
                TOOL_IMAGE_STATUS,
                json!({ "jobId": job_id }),
            )
            .await?;

        let state = body
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::Rejected("status response has no status".to_string()))?;

        match state {
            "pending" | "running" => Ok(JobStatus::Running),
            "completed" => {
                let result_url = body
                    .get("url")
                    .or_else(|| body.get("resultUrl"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        RemoteError::Rejected("completed job has no result URL".to_string())
                    })?;
                Ok(JobStatus::Completed {
                    result_url: result_url.to_string(),
                })
            }
            "failed" => Ok(JobStatus::Failed),
            other => Err(RemoteError::Rejected(format!("unknown job status: {other}"))),
        }
    }

    async fn store_object(&self, source_url: &str) -> Result<StoredObject, RemoteError> {
        let body = self
            .call_tool(
                &self.filestore_service_url,
                "filestore",
                TOOL_STORE_URL,
                json!({ "url": source_url }),
            )
            .await?;

        let url = body
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::Rejected("store response has no url".to_string()))?;
        let name = body
            .get("filename")
            .or_else(|| body.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::Rejected("store response has no name".to_string()))?;

        Ok(StoredObject {
            url: url.to_string(),
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use secrecy::SecretString;

    use super::*;
    use crate::remote::payment::payment_channel;

    fn test_client() -> (McpJobClient, broadcast::Receiver<PaymentEvent>) {
        let (tx, rx) = payment_channel();
        let account = AccountHandle {
            account_id: "acct_test".to_string(),
            token: SecretString::from("tok"),
        };
        (
            McpJobClient::new(account, "http://localhost:1", "http://localhost:1", tx),
            rx,
        )
    }

    #[tokio::test]
    async fn transport_failure_is_unavailable() {
        // Nothing listens on port 1; the connection itself fails.
        let (client, _rx) = test_client();
        let err = client.create_job("a red bicycle").await.unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)));
    }

    #[tokio::test]
    async fn payment_event_carries_meta_amount() {
        let (client, mut rx) = test_client();
        let meta = json!({ "payment": { "amount": "0.05", "currency": "USDC" } });
        client.publish_payment("image", TOOL_CREATE_IMAGE, Some(&meta));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.account_id, "acct_test");
        assert_eq!(event.service, "image");
        assert_eq!(event.amount, Some(dec!(0.05)));
        assert_eq!(event.currency.as_deref(), Some("USDC"));
    }

    #[tokio::test]
    async fn payment_event_without_meta_has_no_amount() {
        let (client, mut rx) = test_client();
        client.publish_payment("filestore", TOOL_STORE_URL, None);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.amount, None);
        assert_eq!(event.currency, None);
    }
}
