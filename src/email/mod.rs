//! Outbound email delivery.
//!
//! Sends go through the organization's mail API on behalf of the signed-in
//! user. Without a delegated identity the send is simulated so approval
//! flows remain testable end to end.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::info;

use crate::config::EmailConfig;
use crate::error::EmailError;

/// A message ready to leave the system.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Mail API content type, "Text" or "HTML".
    pub body_format: String,
}

/// Delegated credentials of the user the message is sent as.
#[derive(Clone)]
pub struct SenderIdentity {
    pub access_token: SecretString,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub recipient: String,
    pub subject: String,
    pub simulated: bool,
}

#[async_trait]
pub trait EmailDelegate: Send + Sync {
    async fn send(
        &self,
        email: &OutboundEmail,
        identity: &SenderIdentity,
    ) -> Result<DeliveryReceipt, EmailError>;
}

/// Mail API client using the user's delegated token.
pub struct GraphEmailDelegate {
    client: reqwest::Client,
    config: EmailConfig,
}

impl GraphEmailDelegate {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmailDelegate for GraphEmailDelegate {
    async fn send(
        &self,
        email: &OutboundEmail,
        identity: &SenderIdentity,
    ) -> Result<DeliveryReceipt, EmailError> {
        let url = format!("{}/me/sendMail", self.config.base_url);
        let mut body = json!({
            "message": {
                "subject": email.subject,
                "body": {
                    "contentType": email.body_format,
                    "content": email.body,
                },
                "toRecipients": [
                    { "emailAddress": { "address": email.recipient } }
                ],
            },
            "saveToSentItems": true,
        });
        if !identity.email.is_empty() {
            body["message"]["from"] = json!({
                "emailAddress": {
                    "address": identity.email,
                    "name": identity.display_name,
                }
            });
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(identity.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 200 || status.as_u16() == 202 {
            info!(
                recipient = %email.recipient,
                sender = %identity.email,
                "Email accepted by mail API"
            );
            return Ok(DeliveryReceipt {
                recipient: email.recipient.clone(),
                subject: email.subject.clone(),
                simulated: false,
            });
        }

        let detail = response.text().await.unwrap_or_default();
        Err(EmailError::SendRejected {
            status: status.as_u16(),
            detail,
        })
    }
}

/// Produce a receipt for a send that never left the process.
pub fn simulated_send(email: &OutboundEmail) -> DeliveryReceipt {
    info!(recipient = %email.recipient, "Simulating email send (no delegated identity)");
    DeliveryReceipt {
        recipient: email.recipient.clone(),
        subject: email.subject.clone(),
        simulated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_send_is_labeled() {
        let email = OutboundEmail {
            recipient: "vendor@example.com".to_string(),
            subject: "Pricing confirmation".to_string(),
            body: "Hello".to_string(),
            body_format: "Text".to_string(),
        };
        let receipt = simulated_send(&email);
        assert!(receipt.simulated);
        assert_eq!(receipt.recipient, "vendor@example.com");
    }
}
