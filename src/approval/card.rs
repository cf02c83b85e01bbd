//! Rich approval card rendering.
//!
//! Produces an Adaptive Card JSON payload for chat surfaces that support
//! them. Callers that only need the raw request can ignore this and use the
//! registry's JSON directly.

use serde_json::{json, Value};

use super::ApprovalRequest;

/// Longest message preview shown on the card before truncation.
const PREVIEW_CHARS: usize = 300;

/// Build an approval card for a pending request.
pub fn approval_card(request: &ApprovalRequest) -> Value {
    let recipient = request
        .action_data
        .get("recipient")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let message = request
        .action_data
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("");

    let preview: String = if message.chars().count() > PREVIEW_CHARS {
        let truncated: String = message.chars().take(PREVIEW_CHARS).collect();
        format!("{truncated}...")
    } else {
        message.to_string()
    };

    json!({
        "type": "AdaptiveCard",
        "version": "1.4",
        "body": [
            {
                "type": "TextBlock",
                "text": "Approval required",
                "weight": "Bolder",
                "size": "Medium"
            },
            {
                "type": "TextBlock",
                "text": request.message,
                "wrap": true
            },
            {
                "type": "FactSet",
                "facts": [
                    { "title": "Action", "value": request.action_type },
                    { "title": "Recipient", "value": recipient },
                    { "title": "Requested", "value": request.created_at.to_rfc3339() },
                    { "title": "Expires", "value": request.expires_at.to_rfc3339() }
                ]
            },
            {
                "type": "TextBlock",
                "text": preview,
                "wrap": true,
                "isSubtle": true
            }
        ],
        "actions": [
            {
                "type": "Action.Submit",
                "title": "Approve",
                "data": { "action": "approve", "approval_id": request.id }
            },
            {
                "type": "Action.Submit",
                "title": "Reject",
                "data": { "action": "reject", "approval_id": request.id }
            }
        ]
    })
}
