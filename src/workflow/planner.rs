//! Keyword-driven workflow planning.
//!
//! Planning is deterministic: the request text is matched against two
//! keyword classes and exactly one plan shape comes out. Communication wins
//! when both classes match, since a request to email someone about policy
//! still needs the draft-and-send shape.

use serde_json::json;
use tracing::info;

use super::types::WorkflowStep;

/// Steps whose args reference this placeholder receive the most recent
/// completed step's result at execution time.
pub const PREVIOUS_RESULT_PLACEHOLDER: &str = "{{previous_step_result}}";

const COMMUNICATION_KEYWORDS: &[&str] = &["draft", "email", "send", "message", "contact"];
const PROCUREMENT_KEYWORDS: &[&str] = &["procurement", "policy", "vendor", "contract", "purchase"];

pub struct WorkflowPlanner {
    default_recipient: String,
}

impl WorkflowPlanner {
    pub fn new(default_recipient: String) -> Self {
        Self { default_recipient }
    }

    /// Produce the step list for a request. Never returns an empty plan.
    pub fn plan(&self, message: &str) -> Vec<WorkflowStep> {
        let lowered = message.to_lowercase();
        let wants_communication = contains_any(&lowered, COMMUNICATION_KEYWORDS);
        let wants_procurement = contains_any(&lowered, PROCUREMENT_KEYWORDS);

        let steps = if wants_communication {
            vec![
                WorkflowStep::new(
                    0,
                    "draft_communication",
                    json!({ "context": message, "message_type": "email" }),
                    false,
                ),
                WorkflowStep::new(
                    1,
                    "send_communication",
                    json!({
                        "recipient": self.default_recipient,
                        "message": PREVIOUS_RESULT_PLACEHOLDER,
                    }),
                    true,
                ),
            ]
        } else {
            // Procurement questions and anything unmatched both start from
            // knowledge-base retrieval; replanning can extend from there.
            vec![WorkflowStep::new(0, "retrieval", json!({ "query": message }), false)]
        };

        info!(
            steps = steps.len(),
            communication = wants_communication,
            procurement = wants_procurement,
            "Workflow planned"
        );
        steps
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use crate::workflow::types::StepStatus;

    use super::*;

    fn planner() -> WorkflowPlanner {
        WorkflowPlanner::new("procurement@example.edu".to_string())
    }

    #[test]
    fn policy_question_plans_single_retrieval() {
        let steps = planner().plan("What is the policy for buying a laptop?");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].tool, "retrieval");
        assert!(!steps[0].requires_approval);
        assert_eq!(steps[0].args["query"], "What is the policy for buying a laptop?");
        assert_eq!(steps[0].status, StepStatus::Pending);
    }

    #[test]
    fn email_request_plans_draft_then_gated_send() {
        let steps = planner().plan("Please email the vendor to confirm pricing");
        assert_eq!(steps.len(), 2);

        assert_eq!(steps[0].tool, "draft_communication");
        assert!(!steps[0].requires_approval);
        assert_eq!(steps[0].id, "step_1");

        assert_eq!(steps[1].tool, "send_communication");
        assert!(steps[1].requires_approval);
        assert_eq!(steps[1].id, "step_2");
        assert_eq!(steps[1].args["message"], PREVIOUS_RESULT_PLACEHOLDER);
        assert_eq!(steps[1].args["recipient"], "procurement@example.edu");
    }

    #[test]
    fn communication_takes_precedence_over_procurement() {
        // "email" and "vendor" both match; the draft-and-send shape wins.
        let steps = planner().plan("email the vendor about the contract policy");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].tool, "draft_communication");
    }

    #[test]
    fn unmatched_request_defaults_to_retrieval() {
        let steps = planner().plan("Tell me about the weather");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].tool, "retrieval");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let steps = planner().plan("EMAIL the team");
        assert_eq!(steps[0].tool, "draft_communication");
    }
}
