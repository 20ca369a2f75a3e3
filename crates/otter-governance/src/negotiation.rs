use crate::error::{GovernanceError, Result};
use crate::proposals::NegotiationRegistry;
use async_trait::async_trait;
use chrono::Utc;
use otter_types::{Negotiation, NegotiationId, NegotiationStatus, Rule, RuleId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Proposer recorded on rules produced by mediation.
pub const NEGOTIATED_PROPOSER: &str = "llm-negotiation";

/// Capability required from the external language model during a
/// negotiation: given a prompt, produce text. Cancellable; slow
/// mediators are cut off by the negotiation deadline.
#[async_trait]
pub trait Mediator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Drives one inter-raft negotiation: prompts the mediator with the
/// conflicting rules, records the transcript, and yields a compromise
/// rule.
pub struct Negotiator {
    negotiations: Arc<NegotiationRegistry>,
}

impl Negotiator {
    pub fn new(negotiations: Arc<NegotiationRegistry>) -> Self {
        Self { negotiations }
    }

    /// Resolve a stored negotiation through the mediator.
    ///
    /// The prompt is appended to the transcript before the call and the
    /// mediator's reply after it. Mediator failure or an exceeded
    /// deadline transitions the negotiation to `Failed` and propagates.
    pub async fn resolve(
        &self,
        negotiation_id: &NegotiationId,
        mediator: &dyn Mediator,
        deadline: Duration,
    ) -> Result<Rule> {
        let negotiation = self
            .negotiations
            .get(negotiation_id)
            .await
            .ok_or_else(|| {
                GovernanceError::ConflictUnresolved(format!(
                    "negotiation not found: {}",
                    negotiation_id
                ))
            })?;

        if negotiation.conflicts.is_empty() {
            return Err(GovernanceError::ConflictUnresolved(
                "negotiation has no conflicts to mediate".into(),
            ));
        }

        let prompt = build_prompt(&negotiation);
        self.negotiations
            .update(negotiation_id, |n| n.transcript.push(prompt.clone()))
            .await;

        let reply = match timeout(deadline, mediator.complete(&prompt)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                warn!(negotiation_id = %negotiation_id, error = %err, "Mediator failed");
                self.mark_failed(negotiation_id).await;
                return Err(err);
            }
            Err(_) => {
                warn!(negotiation_id = %negotiation_id, ?deadline, "Mediator deadline exceeded");
                self.mark_failed(negotiation_id).await;
                return Err(GovernanceError::Mediator(format!(
                    "negotiation deadline of {:?} exceeded",
                    deadline
                )));
            }
        };

        let now = Utc::now();
        let scope = negotiation.conflicts[0].conflict_scope.clone();
        let compromise = Rule {
            rule_id: RuleId::compute(&scope, &reply, now.timestamp_micros(), NEGOTIATED_PROPOSER),
            raft_id: String::new(),
            scope,
            version: 1,
            timestamp: now,
            body: reply.clone(),
            base_rule_id: None,
            signature: None,
            proposed_by: NEGOTIATED_PROPOSER.to_string(),
            adopted_at: None,
        };

        self.negotiations
            .update(negotiation_id, |n| {
                n.transcript.push(reply.clone());
                n.proposed_rule = Some(compromise.clone());
                n.status = NegotiationStatus::Resolved;
                n.completed_at = Some(now);
            })
            .await;

        info!(
            negotiation_id = %negotiation_id,
            rule_id = %compromise.rule_id,
            scope = %compromise.scope,
            "Negotiation resolved with compromise rule"
        );

        Ok(compromise)
    }

    async fn mark_failed(&self, negotiation_id: &NegotiationId) {
        let now = Utc::now();
        self.negotiations
            .update(negotiation_id, |n| {
                n.status = NegotiationStatus::Failed;
                n.completed_at = Some(now);
            })
            .await;
    }
}

/// One section per conflict — the scope and both rule bodies — followed
/// by the instruction to produce a single compromise rule.
fn build_prompt(negotiation: &Negotiation) -> String {
    let mut prompt = format!(
        "You are mediating a governance rule conflict between two otter rafts.\n\n\
         Raft 1 ID: {}\nRaft 2 ID: {}\n\nConflicts:\n",
        negotiation.raft1_id, negotiation.raft2_id
    );

    for (i, conflict) in negotiation.conflicts.iter().enumerate() {
        prompt.push_str(&format!(
            "\nConflict {} - Scope: {}\nRaft 1 Rule: {}\nRaft 2 Rule: {}\n",
            i + 1,
            conflict.conflict_scope,
            conflict.rule1.body,
            conflict.rule2.body
        ));
    }

    prompt.push_str(
        "\nPropose one compromise rule that respects both rafts' interests and \
         can be adopted by both. The proposal should be clear, actionable, and \
         acceptable to all members of both rafts.\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use otter_types::{ConflictId, RuleConflict};

    struct FixedMediator(&'static str);

    #[async_trait]
    impl Mediator for FixedMediator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingMediator;

    #[async_trait]
    impl Mediator for FailingMediator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(GovernanceError::Mediator("provider unavailable".into()))
        }
    }

    struct StalledMediator;

    #[async_trait]
    impl Mediator for StalledMediator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn conflict(scope: &str, body1: &str, body2: &str) -> RuleConflict {
        let now = Utc::now();
        let rule = |raft: &str, body: &str| Rule {
            rule_id: RuleId::compute(scope, body, now.timestamp(), raft),
            raft_id: raft.to_string(),
            scope: scope.to_string(),
            version: 1,
            timestamp: now,
            body: body.to_string(),
            base_rule_id: None,
            signature: None,
            proposed_by: raft.to_string(),
            adopted_at: Some(now),
        };
        let rule1 = rule("raft-x", body1);
        let rule2 = rule("raft-y", body2);
        RuleConflict {
            conflict_id: ConflictId::compute(&rule1.rule_id, &rule2.rule_id),
            raft1_id: "raft-x".to_string(),
            raft2_id: "raft-y".to_string(),
            rule1,
            rule2,
            conflict_scope: scope.to_string(),
            detected_at: now,
        }
    }

    async fn stored_negotiation(registry: &NegotiationRegistry) -> NegotiationId {
        let negotiation = Negotiation::start(
            "raft-x",
            "raft-y",
            vec![conflict("pri", "A", "B")],
            Utc::now(),
        );
        let id = negotiation.negotiation_id;
        registry.insert(negotiation).await;
        id
    }

    #[tokio::test]
    async fn test_resolution_builds_compromise_and_transcript() {
        let registry = Arc::new(NegotiationRegistry::new());
        let negotiator = Negotiator::new(registry.clone());
        let id = stored_negotiation(&registry).await;

        let rule = negotiator
            .resolve(&id, &FixedMediator("C"), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(rule.scope, "pri");
        assert_eq!(rule.body, "C");
        assert_eq!(rule.proposed_by, NEGOTIATED_PROPOSER);

        let stored = registry.get(&id).await.unwrap();
        assert_eq!(stored.status, NegotiationStatus::Resolved);
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.proposed_rule.as_ref().unwrap().body, "C");

        // Prompt first, reply second.
        assert_eq!(stored.transcript.len(), 2);
        assert!(stored.transcript[0].contains("Scope: pri"));
        assert!(stored.transcript[0].contains("Raft 1 Rule: A"));
        assert!(stored.transcript[0].contains("Raft 2 Rule: B"));
        assert_eq!(stored.transcript[1], "C");
    }

    #[tokio::test]
    async fn test_mediator_failure_marks_negotiation_failed() {
        let registry = Arc::new(NegotiationRegistry::new());
        let negotiator = Negotiator::new(registry.clone());
        let id = stored_negotiation(&registry).await;

        let result = negotiator
            .resolve(&id, &FailingMediator, Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(GovernanceError::Mediator(_))));

        let stored = registry.get(&id).await.unwrap();
        assert_eq!(stored.status, NegotiationStatus::Failed);
        assert!(stored.proposed_rule.is_none());
        // The prompt stays on record even when the mediator fails.
        assert_eq!(stored.transcript.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded_fails_negotiation() {
        let registry = Arc::new(NegotiationRegistry::new());
        let negotiator = Negotiator::new(registry.clone());
        let id = stored_negotiation(&registry).await;

        let result = negotiator
            .resolve(&id, &StalledMediator, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(GovernanceError::Mediator(_))));
        assert_eq!(
            registry.get(&id).await.unwrap().status,
            NegotiationStatus::Failed
        );
    }
}
