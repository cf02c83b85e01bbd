//! Dynamic replanning heuristics.
//!
//! After a retrieval step completes, the executor asks a [`ReplanTrigger`]
//! whether follow-up communication steps should be appended. The default
//! implementation is keyword-based and intentionally conservative: it only
//! fires for on-domain requests whose answer suggests a human follow-up.

use tracing::info;

/// Decides whether a completed retrieval warrants appended follow-up steps.
pub trait ReplanTrigger: Send + Sync {
    fn should_extend(&self, generated: &str, initial_message: &str) -> bool;
}

/// Phrases in the generated answer that directly invite follow-up contact.
const TRIGGER_PHRASES: &[&str] = &[
    "contact the procurement",
    "reach out to",
    "for further assistance",
    "for more information, contact",
    "speak with",
];

/// Answer phrases signalling the knowledge base came up short.
const INSUFFICIENCY_PHRASES: &[&str] = &[
    "unable to find",
    "no specific information",
    "could not find",
    "don't have information",
    "not covered in the available documents",
];

/// Request phrases signalling a multi-part or escalation-worthy ask.
const COMPLEXITY_SIGNALS: &[&str] = &[
    "urgent",
    "asap",
    "exception",
    "escalate",
    "approve",
    "approval",
    "follow up",
];

/// Request openers that read as small talk rather than a task.
const GENERIC_OPENERS: &[&str] = &["hello", "hi ", "hey", "thanks", "thank you"];

const ON_DOMAIN_KEYWORDS: &[&str] = &[
    "procurement",
    "policy",
    "vendor",
    "contract",
    "purchase",
    "order",
    "quote",
    "invoice",
];

pub struct KeywordReplanTrigger;

impl ReplanTrigger for KeywordReplanTrigger {
    fn should_extend(&self, generated: &str, initial_message: &str) -> bool {
        let answer = generated.to_lowercase();
        let request = initial_message.to_lowercase();

        // Small talk never grows a workflow.
        if GENERIC_OPENERS.iter().any(|o| request.trim_start().starts_with(o)) {
            return false;
        }

        // Off-domain requests don't get procurement follow-ups.
        if !ON_DOMAIN_KEYWORDS.iter().any(|k| request.contains(k)) {
            return false;
        }

        // The answer must offer a follow-up at all; without an invitation,
        // complexity alone is not grounds to start emailing people.
        if !TRIGGER_PHRASES.iter().any(|p| answer.contains(p)) {
            return false;
        }

        // An invitation extends the plan only when backed by a second
        // signal: the answer came up short, or the request itself reads as
        // complex.
        let insufficient = INSUFFICIENCY_PHRASES.iter().any(|p| answer.contains(p));
        let complex = COMPLEXITY_SIGNALS.iter().any(|s| request.contains(s));

        let extend = insufficient || complex;
        if extend {
            info!(insufficient, complex, "Replan trigger fired");
        }
        extend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> KeywordReplanTrigger {
        KeywordReplanTrigger
    }

    #[test]
    fn fires_when_insufficient_answer_offers_contact() {
        assert!(trigger().should_extend(
            "I was unable to find specific information about that. Please contact \
             the procurement office for details.",
            "What is the policy for drone purchases?"
        ));
    }

    #[test]
    fn fires_when_complex_request_is_offered_contact() {
        assert!(trigger().should_extend(
            "Exceptions are handled case by case; please contact the procurement \
             office directly.",
            "I need an urgent exception to the purchase policy"
        ));
    }

    #[test]
    fn invitation_alone_does_not_extend() {
        // A routine question with a complete answer stays a one-step plan,
        // even when the answer politely offers a contact.
        assert!(!trigger().should_extend(
            "The limit is $5,000 per order. Please contact the procurement \
             office for details.",
            "What is the vendor onboarding policy?"
        ));
    }

    #[test]
    fn complexity_without_invitation_does_not_extend() {
        assert!(!trigger().should_extend(
            "Purchases above $10,000 require competitive bids.",
            "I need an urgent exception to the purchase policy"
        ));
    }

    #[test]
    fn insufficiency_without_invitation_does_not_extend() {
        assert!(!trigger().should_extend(
            "I was unable to find specific information about that.",
            "What is the policy for drone purchases?"
        ));
    }

    #[test]
    fn ignores_small_talk() {
        assert!(!trigger().should_extend(
            "Please contact the procurement office.",
            "hello there"
        ));
    }

    #[test]
    fn ignores_off_domain_requests() {
        assert!(!trigger().should_extend(
            "I was unable to find specific information.",
            "what's the best pizza place nearby?"
        ));
    }

    #[test]
    fn stays_quiet_for_complete_on_domain_answers() {
        assert!(!trigger().should_extend(
            "The limit is $5,000 per order.",
            "What is the purchase limit?"
        ));
    }
}
