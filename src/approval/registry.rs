//! Approval request lifecycle.
//!
//! Requests are created Pending and resolve to exactly one of Approved,
//! Rejected, or Expired. Every transition happens under the table's write
//! lock, so concurrent approve/reject calls on the same request cannot both
//! succeed. Expiry is lazy: a pending request past its deadline flips to
//! Expired the next time anything reads it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// A single pending (or resolved) approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub user_id: String,
    pub conversation_id: String,
    /// What would happen on approval, e.g. `execute_tool_send_communication`.
    pub action_type: String,
    /// Action parameters, echoed back to the executor on resume.
    pub action_data: Value,
    /// Human-readable description shown to the approver.
    pub message: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Free-form data attached by the approver (edited recipient, note).
    pub response_data: Option<Value>,
}

impl ApprovalRequest {
    fn is_past_deadline(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// In-memory approval table.
pub struct ApprovalRegistry {
    requests: RwLock<HashMap<Uuid, ApprovalRequest>>,
    default_timeout: Duration,
}

impl ApprovalRegistry {
    pub fn new(timeout_minutes: i64) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            default_timeout: Duration::minutes(timeout_minutes),
        }
    }

    /// Create a pending request and return its id. `timeout_minutes`
    /// overrides the registry default when given.
    pub async fn create(
        &self,
        user_id: &str,
        conversation_id: &str,
        action_type: &str,
        action_data: Value,
        message: &str,
        timeout_minutes: Option<i64>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let timeout = timeout_minutes
            .map(Duration::minutes)
            .unwrap_or(self.default_timeout);
        let request = ApprovalRequest {
            id,
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
            action_type: action_type.to_string(),
            action_data,
            message: message.to_string(),
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at: now + timeout,
            resolved_at: None,
            response_data: None,
        };

        info!(approval_id = %id, user_id, action_type, "Approval request created");
        self.requests.write().await.insert(id, request);
        id
    }

    /// Approve a pending request. Returns false if the request is missing,
    /// owned by someone else, already resolved, or past its deadline (in
    /// which case it flips to Expired instead).
    pub async fn approve(&self, id: Uuid, user_id: &str, response_data: Option<Value>) -> bool {
        self.resolve(id, user_id, ApprovalStatus::Approved, response_data)
            .await
    }

    /// Reject a pending request. Same guards as [`approve`](Self::approve).
    pub async fn reject(&self, id: Uuid, user_id: &str, response_data: Option<Value>) -> bool {
        self.resolve(id, user_id, ApprovalStatus::Rejected, response_data)
            .await
    }

    async fn resolve(
        &self,
        id: Uuid,
        user_id: &str,
        target: ApprovalStatus,
        response_data: Option<Value>,
    ) -> bool {
        let mut table = self.requests.write().await;
        let Some(request) = table.get_mut(&id) else {
            warn!(approval_id = %id, "Approval response for unknown request");
            return false;
        };

        if request.user_id != user_id {
            warn!(approval_id = %id, user_id, "Approval response from non-owner");
            return false;
        }
        if request.status != ApprovalStatus::Pending {
            warn!(approval_id = %id, status = ?request.status, "Approval already resolved");
            return false;
        }
        if request.is_past_deadline() {
            request.status = ApprovalStatus::Expired;
            warn!(approval_id = %id, "Approval request expired before response");
            return false;
        }

        request.status = target;
        request.resolved_at = Some(Utc::now());
        request.response_data = response_data;
        info!(approval_id = %id, status = ?target, "Approval request resolved");
        true
    }

    /// Fetch a request by id, flipping it to Expired first if its deadline
    /// has passed.
    pub async fn get(&self, id: Uuid) -> Option<ApprovalRequest> {
        let mut table = self.requests.write().await;
        let request = table.get_mut(&id)?;
        if request.status == ApprovalStatus::Pending && request.is_past_deadline() {
            request.status = ApprovalStatus::Expired;
        }
        Some(request.clone())
    }

    /// All pending requests for a user, optionally narrowed to one
    /// conversation. Deadline-passed entries flip to Expired and are
    /// excluded.
    pub async fn list_pending(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Vec<ApprovalRequest> {
        let mut table = self.requests.write().await;
        let mut pending = Vec::new();
        for request in table.values_mut() {
            if request.status == ApprovalStatus::Pending && request.is_past_deadline() {
                request.status = ApprovalStatus::Expired;
            }
            if request.status == ApprovalStatus::Pending
                && request.user_id == user_id
                && conversation_id.is_none_or(|c| request.conversation_id == c)
            {
                pending.push(request.clone());
            }
        }
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    /// Purge expired entries, flipping any deadline-passed pending requests
    /// first. Returns how many entries were removed.
    pub async fn cleanup(&self) -> usize {
        let mut table = self.requests.write().await;
        for request in table.values_mut() {
            if request.status == ApprovalStatus::Pending && request.is_past_deadline() {
                request.status = ApprovalStatus::Expired;
            }
        }
        let before = table.len();
        table.retain(|_, r| r.status != ApprovalStatus::Expired);
        let purged = before - table.len();
        if purged > 0 {
            info!(purged, "Cleaned up expired approval requests");
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> ApprovalRegistry {
        ApprovalRegistry::new(30)
    }

    #[tokio::test]
    async fn approve_flow() {
        let registry = registry();
        let id = registry
            .create(
                "alice",
                "conv-1",
                "execute_tool_send_communication",
                json!({}),
                "Send the drafted email?",
                None,
            )
            .await;

        assert!(registry.approve(id, "alice", Some(json!({"note": "ok"}))).await);

        let request = registry.get(id).await.unwrap();
        assert_eq!(request.status, ApprovalStatus::Approved);
        assert_eq!(request.response_data, Some(json!({"note": "ok"})));
        assert!(request.resolved_at.is_some());
    }

    #[tokio::test]
    async fn double_approve_fails_and_keeps_first_response() {
        let registry = registry();
        let id = registry.create("alice", "conv-1", "x", json!({}), "do x?", None).await;

        assert!(registry.approve(id, "alice", Some(json!({"first": true}))).await);
        assert!(!registry.approve(id, "alice", Some(json!({"second": true}))).await);

        let request = registry.get(id).await.unwrap();
        assert_eq!(request.response_data, Some(json!({"first": true})));
    }

    #[tokio::test]
    async fn reject_after_approve_fails() {
        let registry = registry();
        let id = registry.create("alice", "conv-1", "x", json!({}), "do x?", None).await;

        assert!(registry.approve(id, "alice", None).await);
        assert!(!registry.reject(id, "alice", None).await);
        assert_eq!(
            registry.get(id).await.unwrap().status,
            ApprovalStatus::Approved
        );
    }

    #[tokio::test]
    async fn non_owner_cannot_resolve() {
        let registry = registry();
        let id = registry.create("alice", "conv-1", "x", json!({}), "do x?", None).await;

        assert!(!registry.approve(id, "mallory", None).await);
        assert_eq!(
            registry.get(id).await.unwrap().status,
            ApprovalStatus::Pending
        );
    }

    #[tokio::test]
    async fn unknown_id_is_false() {
        let registry = registry();
        assert!(!registry.approve(Uuid::new_v4(), "alice", None).await);
        assert!(registry.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn zero_timeout_expires_on_next_read() {
        let registry = ApprovalRegistry::new(0);
        let id = registry.create("alice", "conv-1", "x", json!({}), "do x?", None).await;

        // Any read past the deadline flips the status.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let request = registry.get(id).await.unwrap();
        assert_eq!(request.status, ApprovalStatus::Expired);

        assert!(!registry.approve(id, "alice", None).await);
    }

    #[tokio::test]
    async fn list_pending_filters_by_user_and_conversation() {
        let registry = registry();
        let a1 = registry.create("alice", "conv-1", "x", json!({}), "do x?", None).await;
        let a2 = registry.create("alice", "conv-2", "x", json!({}), "do x?", None).await;
        registry.create("bob", "conv-1", "x", json!({}), "do x?", None).await;

        let all_alice = registry.list_pending("alice", None).await;
        assert_eq!(all_alice.len(), 2);

        let conv1 = registry.list_pending("alice", Some("conv-1")).await;
        assert_eq!(conv1.len(), 1);
        assert_eq!(conv1[0].id, a1);

        registry.approve(a2, "alice", None).await;
        assert_eq!(registry.list_pending("alice", None).await.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_purges_expired_only() {
        let registry = registry();
        let keep = registry.create("alice", "conv-1", "x", json!({}), "do x?", None).await;
        let resolved = registry.create("alice", "conv-1", "x", json!({}), "do x?", None).await;
        registry.approve(resolved, "alice", None).await;
        let doomed = registry
            .create("alice", "conv-1", "x", json!({}), "do x?", Some(0))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(registry.cleanup().await, 1);
        assert!(registry.get(keep).await.is_some());
        assert!(registry.get(resolved).await.is_some());
        assert!(registry.get(doomed).await.is_none());
    }
}
