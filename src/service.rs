//! Client-facing command/query surface.
//!
//! Every command checks ownership at the boundary (`caller == owner`), so
//! debates belonging to different users never observe each other. `start`
//! and `resume` hold a per-debate guard: at most one round loop runs per
//! debate id, and delete is refused while one is in flight.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::agent::AgentPort;
use crate::billing::CreditPolicy;
use crate::error::{DebateError, Result};
use crate::graph::{GraphBuilder, GraphConfig};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::readiness::MIN_INPUT_LEN;
use crate::store::DebateStore;
use crate::types::{
    ArgumentGraph, ContextEntry, Debate, DebateMode, DebateStatus, DebateType, Expert, Visibility,
};

/// Removes the debate id from the in-flight set when the loop exits,
/// whichever way it exits.
struct LoopGuard {
    active: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl LoopGuard {
    fn acquire(active: &Arc<Mutex<HashSet<String>>>, id: &str) -> Result<Self> {
        let mut set = active.lock().expect("active set lock");
        if !set.insert(id.to_string()) {
            return Err(DebateError::ConcurrentStartConflict(id.to_string()));
        }
        Ok(Self {
            active: active.clone(),
            id: id.to_string(),
        })
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .expect("active set lock")
            .remove(&self.id);
    }
}

/// The debate engine's public face.
pub struct DebateService {
    store: Arc<dyn DebateStore>,
    orchestrator: Orchestrator,
    graphs: GraphBuilder,
    credit_policy: CreditPolicy,
    active: Arc<Mutex<HashSet<String>>>,
}

impl DebateService {
    pub fn new(store: Arc<dyn DebateStore>, agents: Arc<dyn AgentPort>) -> Self {
        Self::with_configs(
            store,
            agents,
            OrchestratorConfig::default(),
            GraphConfig::default(),
            CreditPolicy::default(),
        )
    }

    pub fn with_configs(
        store: Arc<dyn DebateStore>,
        agents: Arc<dyn AgentPort>,
        orchestrator_config: OrchestratorConfig,
        graph_config: GraphConfig,
        credit_policy: CreditPolicy,
    ) -> Self {
        let orchestrator =
            Orchestrator::new(store.clone(), agents).with_config(orchestrator_config);
        Self {
            store,
            orchestrator,
            graphs: GraphBuilder::new(graph_config),
            credit_policy,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create a draft debate.
    pub async fn create(&self, caller_id: &str, question: &str) -> Result<Debate> {
        let question = question.trim();
        if question.len() < MIN_INPUT_LEN {
            return Err(DebateError::InvalidInput(format!(
                "question must be at least {} characters",
                MIN_INPUT_LEN
            )));
        }
        let debate = Debate::new(caller_id, question);
        tracing::info!(debate = %debate.id, owner = %caller_id, "debate created");
        self.store.insert(debate.clone()).await?;
        Ok(debate)
    }

    /// Configure with the default panel for the category: `draft ->
    /// pending`, mode stays dynamic.
    pub async fn configure_dynamic(
        &self,
        caller_id: &str,
        debate_id: &str,
        debate_type: DebateType,
        max_rounds: u32,
    ) -> Result<Debate> {
        self.configure_inner(
            caller_id,
            debate_id,
            debate_type,
            crate::panel::default_panel(debate_type),
            max_rounds,
            DebateMode::Dynamic,
        )
        .await
    }

    /// Attach an explicit panel, round limit and category: `draft ->
    /// pending`, mode fixed.
    pub async fn configure(
        &self,
        caller_id: &str,
        debate_id: &str,
        debate_type: DebateType,
        experts: Vec<Expert>,
        max_rounds: u32,
    ) -> Result<Debate> {
        self.configure_inner(
            caller_id,
            debate_id,
            debate_type,
            experts,
            max_rounds,
            DebateMode::Fixed,
        )
        .await
    }

    async fn configure_inner(
        &self,
        caller_id: &str,
        debate_id: &str,
        debate_type: DebateType,
        experts: Vec<Expert>,
        max_rounds: u32,
        mode: DebateMode,
    ) -> Result<Debate> {
        if experts.is_empty() {
            return Err(DebateError::InvalidInput(
                "a debate needs at least one expert".into(),
            ));
        }
        if max_rounds == 0 {
            return Err(DebateError::InvalidInput(
                "max_rounds must be at least 1".into(),
            ));
        }
        {
            let mut ids = HashSet::new();
            if !experts.iter().all(|e| ids.insert(e.id.clone())) {
                return Err(DebateError::InvalidInput("duplicate expert ids".into()));
            }
        }

        let caller = caller_id.to_string();
        self.store
            .update(
                debate_id,
                Box::new(move |d| {
                    check_owner(d, &caller)?;
                    if d.status != DebateStatus::Draft {
                        return Err(DebateError::InvalidState(format!(
                            "configure needs draft, debate is {}",
                            d.status.name()
                        )));
                    }
                    d.debate_type = debate_type;
                    d.mode = mode;
                    d.experts = experts;
                    d.max_rounds = max_rounds;
                    d.status = DebateStatus::Pending;
                    Ok(())
                }),
            )
            .await
    }

    /// Start the round loop: `pending -> in_progress`, then drive the loop
    /// to completion, failure, or a pause. Guarded so a second concurrent
    /// start for the same debate is refused.
    pub async fn start(&self, caller_id: &str, debate_id: &str) -> Result<Debate> {
        let _guard = LoopGuard::acquire(&self.active, debate_id)?;

        let caller = caller_id.to_string();
        self.store
            .update(
                debate_id,
                Box::new(move |d| {
                    check_owner(d, &caller)?;
                    if d.status != DebateStatus::Pending {
                        return Err(DebateError::InvalidState(format!(
                            "start needs pending, debate is {}",
                            d.status.name()
                        )));
                    }
                    d.status = DebateStatus::InProgress;
                    d.started_at = Some(Utc::now());
                    Ok(())
                }),
            )
            .await?;

        self.orchestrator.run(debate_id).await
    }

    /// Pause at the next round boundary. Only meaningful while
    /// `in_progress`; the current round's in-flight calls finish.
    pub async fn pause(&self, caller_id: &str, debate_id: &str) -> Result<Debate> {
        let caller = caller_id.to_string();
        self.store
            .update(
                debate_id,
                Box::new(move |d| {
                    check_owner(d, &caller)?;
                    if d.status != DebateStatus::InProgress {
                        return Err(DebateError::InvalidState(format!(
                            "pause needs in_progress, debate is {}",
                            d.status.name()
                        )));
                    }
                    d.paused = true;
                    Ok(())
                }),
            )
            .await
    }

    /// Clear the pause flag and restart the loop from the next round.
    pub async fn resume(&self, caller_id: &str, debate_id: &str) -> Result<Debate> {
        let _guard = LoopGuard::acquire(&self.active, debate_id)?;

        let caller = caller_id.to_string();
        self.store
            .update(
                debate_id,
                Box::new(move |d| {
                    check_owner(d, &caller)?;
                    if d.status != DebateStatus::InProgress || !d.paused {
                        return Err(DebateError::InvalidState(
                            "resume needs a paused in_progress debate".into(),
                        ));
                    }
                    d.paused = false;
                    Ok(())
                }),
            )
            .await?;

        self.orchestrator.run(debate_id).await
    }

    /// Append context mid-debate. Takes effect from the next round's
    /// prompt; sealed rounds are never rewritten.
    pub async fn add_context(
        &self,
        caller_id: &str,
        debate_id: &str,
        text: &str,
    ) -> Result<Debate> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(DebateError::InvalidInput("context text is empty".into()));
        }
        let caller = caller_id.to_string();
        self.store
            .update(
                debate_id,
                Box::new(move |d| {
                    check_owner(d, &caller)?;
                    if d.status != DebateStatus::InProgress {
                        return Err(DebateError::InvalidState(format!(
                            "add_context needs in_progress, debate is {}",
                            d.status.name()
                        )));
                    }
                    d.context.additional.push(ContextEntry {
                        text,
                        added_at: Utc::now(),
                    });
                    Ok(())
                }),
            )
            .await
    }

    /// Current state of a debate, owner only.
    pub async fn get_state(&self, caller_id: &str, debate_id: &str) -> Result<Debate> {
        let debate = self
            .store
            .load(debate_id)
            .await?
            .ok_or_else(|| DebateError::NotFound(debate_id.to_string()))?;
        check_owner(&debate, caller_id)?;
        Ok(debate)
    }

    /// Derived argument graph, cached until a new round seals.
    pub async fn get_argument_graph(
        &self,
        caller_id: &str,
        debate_id: &str,
    ) -> Result<ArgumentGraph> {
        let debate = self.get_state(caller_id, debate_id).await?;
        Ok(self.graphs.graph_for(&debate))
    }

    /// The caller's debates, optionally filtered by status.
    pub async fn list(
        &self,
        caller_id: &str,
        status: Option<DebateStatus>,
    ) -> Result<Vec<Debate>> {
        self.store.list_for_owner(caller_id, status).await
    }

    /// Delete a debate. Refused while its round loop is in flight: callers
    /// wait for the current round to seal or pause first.
    pub async fn delete(&self, caller_id: &str, debate_id: &str) -> Result<bool> {
        if self
            .active
            .lock()
            .expect("active set lock")
            .contains(debate_id)
        {
            return Err(DebateError::InvalidState(format!(
                "debate {} has a round loop in flight",
                debate_id
            )));
        }
        // Ownership first; a missing debate is reported as not found
        // without leaking other owners' data.
        let debate = self
            .store
            .load(debate_id)
            .await?
            .ok_or_else(|| DebateError::NotFound(debate_id.to_string()))?;
        check_owner(&debate, caller_id)?;
        self.graphs.invalidate(debate_id);
        self.store.delete(debate_id).await
    }

    /// Share or unshare a completed transcript.
    pub async fn set_visibility(
        &self,
        caller_id: &str,
        debate_id: &str,
        visibility: Visibility,
    ) -> Result<Debate> {
        let caller = caller_id.to_string();
        self.store
            .update(
                debate_id,
                Box::new(move |d| {
                    check_owner(d, &caller)?;
                    d.visibility = visibility;
                    Ok(())
                }),
            )
            .await
    }

    /// Credits billed for a debate's accumulated cost. Presentation-only:
    /// the stored USD total is never mutated.
    pub fn credits_billed(&self, debate: &Debate) -> u64 {
        self.credit_policy.credits_for(debate.total_cost_usd)
    }
}

fn check_owner(debate: &Debate, caller_id: &str) -> Result<()> {
    if debate.owner_id != caller_id {
        return Err(DebateError::OwnershipViolation(debate.id.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ScriptedAgent;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn expert(id: &str) -> Expert {
        Expert {
            id: id.to_string(),
            name: id.to_uppercase(),
            specializations: vec![],
        }
    }

    fn recommend(option: &str, confidence: f64) -> String {
        format!(
            "Weighing cost against speed, the case is clear.\n\
             RECOMMENDATION: {}\nCONFIDENCE: {}",
            option, confidence
        )
    }

    fn service_with(agent: ScriptedAgent) -> DebateService {
        DebateService::new(Arc::new(MemoryStore::new()), Arc::new(agent))
    }

    // =========================================================================
    // lifecycle commands
    // =========================================================================

    #[tokio::test]
    async fn test_create_rejects_short_questions() {
        let service = service_with(ScriptedAgent::new());
        let err = service.create("user-1", "too short").await.unwrap_err();
        assert!(matches!(err, DebateError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_configure_moves_draft_to_pending() {
        let service = service_with(ScriptedAgent::new());
        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();

        let configured = service
            .configure(
                "user-1",
                &debate.id,
                DebateType::Strategy,
                vec![expert("a"), expert("b")],
                5,
            )
            .await
            .unwrap();
        assert_eq!(configured.status, DebateStatus::Pending);
        assert_eq!(configured.experts.len(), 2);
        assert_eq!(configured.max_rounds, 5);
    }

    #[tokio::test]
    async fn test_configure_dynamic_uses_the_category_panel() {
        let service = service_with(ScriptedAgent::new());
        let debate = service
            .create("user-1", "Which feature should the next release include?")
            .await
            .unwrap();

        let configured = service
            .configure_dynamic("user-1", &debate.id, DebateType::Product, 4)
            .await
            .unwrap();
        assert_eq!(configured.status, DebateStatus::Pending);
        assert_eq!(configured.mode, DebateMode::Dynamic);
        assert_eq!(
            configured.experts,
            crate::panel::default_panel(DebateType::Product)
        );

        // An explicit panel marks the debate fixed instead.
        let other = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();
        let fixed = service
            .configure("user-1", &other.id, DebateType::Strategy, vec![expert("a")], 4)
            .await
            .unwrap();
        assert_eq!(fixed.mode, DebateMode::Fixed);
    }

    #[tokio::test]
    async fn test_configure_twice_fails() {
        let service = service_with(ScriptedAgent::new());
        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();
        service
            .configure("user-1", &debate.id, DebateType::General, vec![expert("a")], 3)
            .await
            .unwrap();

        let err = service
            .configure("user-1", &debate.id, DebateType::General, vec![expert("a")], 3)
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_add_context_requires_in_progress() {
        let service = service_with(ScriptedAgent::new());
        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();

        // Draft: refused.
        let err = service
            .add_context("user-1", &debate.id, "the board weighed in")
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_add_context_rejected_after_completion() {
        let agent = ScriptedAgent::new()
            .says("a", &[recommend("alpha", 0.95)])
            .says("b", &[recommend("alpha", 0.95)]);
        let service = service_with(agent);
        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();
        service
            .configure(
                "user-1",
                &debate.id,
                DebateType::Strategy,
                vec![expert("a"), expert("b")],
                3,
            )
            .await
            .unwrap();
        let finished = service.start("user-1", &debate.id).await.unwrap();
        assert_eq!(finished.status, DebateStatus::Completed);

        let err = service
            .add_context("user-1", &debate.id, "late context")
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_pause_requires_in_progress() {
        let service = service_with(ScriptedAgent::new());
        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();

        let err = service.pause("user-1", &debate.id).await.unwrap_err();
        assert!(matches!(err, DebateError::InvalidState(_)));
    }

    // =========================================================================
    // ownership boundary
    // =========================================================================

    #[tokio::test]
    async fn test_foreign_caller_cannot_read_or_mutate() {
        let service = service_with(ScriptedAgent::new());
        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();

        let err = service.get_state("user-2", &debate.id).await.unwrap_err();
        assert!(matches!(err, DebateError::OwnershipViolation(_)));

        let err = service
            .configure("user-2", &debate.id, DebateType::General, vec![expert("a")], 3)
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::OwnershipViolation(_)));

        let err = service.delete("user-2", &debate.id).await.unwrap_err();
        assert!(matches!(err, DebateError::OwnershipViolation(_)));

        // Still present and untouched for the real owner.
        let state = service.get_state("user-1", &debate.id).await.unwrap();
        assert_eq!(state.status, DebateStatus::Draft);
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_the_caller() {
        let service = service_with(ScriptedAgent::new());
        service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();
        service
            .create("user-2", "Should we rebuild the billing system now?")
            .await
            .unwrap();

        let mine = service.list("user-1", None).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].owner_id, "user-1");

        let drafts = service
            .list("user-1", Some(DebateStatus::Draft))
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);
        let completed = service
            .list("user-1", Some(DebateStatus::Completed))
            .await
            .unwrap();
        assert!(completed.is_empty());
    }

    // =========================================================================
    // start guard
    // =========================================================================

    #[tokio::test]
    async fn test_concurrent_start_conflicts() {
        let agent = ScriptedAgent::new()
            .says("a", &[recommend("alpha", 0.95)])
            .says("b", &[recommend("alpha", 0.95)])
            .with_delay("a", Duration::from_millis(50))
            .with_delay("b", Duration::from_millis(50));
        let service = Arc::new(service_with(agent));
        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();
        service
            .configure(
                "user-1",
                &debate.id,
                DebateType::Strategy,
                vec![expert("a"), expert("b")],
                3,
            )
            .await
            .unwrap();

        let first = {
            let service = service.clone();
            let id = debate.id.clone();
            tokio::spawn(async move { service.start("user-1", &id).await })
        };
        // Give the first loop time to take the guard.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = service.start("user-1", &debate.id).await;
        assert!(matches!(
            second,
            Err(DebateError::ConcurrentStartConflict(_))
        ));

        let finished = first.await.unwrap().unwrap();
        assert_eq!(finished.status, DebateStatus::Completed);
    }

    #[tokio::test]
    async fn test_start_releases_guard_after_completion() {
        let agent = ScriptedAgent::new().says("a", &[recommend("alpha", 0.95)]);
        let service = service_with(agent);
        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();
        service
            .configure("user-1", &debate.id, DebateType::General, vec![expert("a")], 2)
            .await
            .unwrap();
        service.start("user-1", &debate.id).await.unwrap();

        // Guard released: delete is possible, a second start fails on
        // status, not on the guard.
        let err = service.start("user-1", &debate.id).await.unwrap_err();
        assert!(matches!(err, DebateError::InvalidState(_)));
        assert!(service.delete("user-1", &debate.id).await.unwrap());
    }

    // =========================================================================
    // pause / resume / graph
    // =========================================================================

    #[tokio::test]
    async fn test_pause_then_resume_completes() {
        let agent = ScriptedAgent::new()
            .says("a", &[recommend("alpha", 0.6), recommend("alpha", 0.95)])
            .says("b", &[recommend("beta", 0.6), recommend("alpha", 0.95)]);
        let store = Arc::new(MemoryStore::new());
        let service = DebateService::new(store.clone(), Arc::new(agent));
        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();
        service
            .configure(
                "user-1",
                &debate.id,
                DebateType::Strategy,
                vec![expert("a"), expert("b")],
                5,
            )
            .await
            .unwrap();

        // Seed the in_progress + paused state as if pause landed at the
        // first round boundary.
        store
            .update(
                &debate.id,
                Box::new(|d| {
                    d.status = DebateStatus::InProgress;
                    d.started_at = Some(Utc::now());
                    d.paused = true;
                    Ok(())
                }),
            )
            .await
            .unwrap();

        let resumed = service.resume("user-1", &debate.id).await.unwrap();
        assert_eq!(resumed.status, DebateStatus::Completed);
        assert_eq!(resumed.rounds.len(), 2);
    }

    #[tokio::test]
    async fn test_resume_requires_paused() {
        let service = service_with(ScriptedAgent::new());
        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();
        let err = service.resume("user-1", &debate.id).await.unwrap_err();
        assert!(matches!(err, DebateError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_argument_graph_for_completed_debate() {
        let agent = ScriptedAgent::new()
            .says(
                "a",
                &["Because enterprise deals are slow, the expansion carries risk. \
                   Therefore alpha is the prudent route.\n\
                   RECOMMENDATION: alpha\nCONFIDENCE: 0.95"],
            )
            .says(
                "b",
                &["I agree alpha is the prudent route given slow enterprise deals.\n\
                   RECOMMENDATION: alpha\nCONFIDENCE: 0.95"],
            );
        let service = service_with(agent);
        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();
        service
            .configure(
                "user-1",
                &debate.id,
                DebateType::Strategy,
                vec![expert("a"), expert("b")],
                3,
            )
            .await
            .unwrap();
        service.start("user-1", &debate.id).await.unwrap();

        let graph = service
            .get_argument_graph("user-1", &debate.id)
            .await
            .unwrap();
        assert!(!graph.nodes.is_empty());

        // Cached: a second read returns the identical graph.
        let again = service
            .get_argument_graph("user-1", &debate.id)
            .await
            .unwrap();
        assert_eq!(graph, again);
    }

    // =========================================================================
    // end-to-end scenario
    // =========================================================================

    #[tokio::test]
    async fn test_end_to_end_two_round_convergence() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        // Three experts, disagreement in round 1, convergence above 0.9 in
        // round 2.
        let agent = ScriptedAgent::new()
            .says("a", &[recommend("alpha", 0.8), recommend("alpha", 0.95)])
            .says("b", &[recommend("beta", 0.8), recommend("alpha", 0.92)])
            .says("c", &[recommend("gamma", 0.8), recommend("alpha", 0.94)]);
        let service = service_with(agent);

        let debate = service
            .create("user-1", "Should we expand into the enterprise market?")
            .await
            .unwrap();
        service
            .configure(
                "user-1",
                &debate.id,
                DebateType::Strategy,
                vec![expert("a"), expert("b"), expert("c")],
                5,
            )
            .await
            .unwrap();
        let finished = service.start("user-1", &debate.id).await.unwrap();

        assert_eq!(finished.status, DebateStatus::Completed);
        assert_eq!(finished.rounds.len(), 2);
        assert!(finished.consensus_score >= 0.9);
        assert!(!finished.final_ranking.is_empty());
        assert_eq!(finished.final_ranking[0].option, "alpha");
        assert!(finished.completed_at.is_some());
        assert!(finished.quality.is_some());

        // Moderator never spoke twice in one round.
        for round in &finished.rounds {
            assert!(
                round
                    .messages
                    .iter()
                    .filter(|m| m.intervention.is_some())
                    .count()
                    <= 1
            );
        }

        // Credits derived at the boundary; stored USD untouched.
        let credits = service.credits_billed(&finished);
        assert_eq!(
            credits,
            CreditPolicy::default().credits_for(finished.total_cost_usd)
        );
    }
}
