//! Approval gate
//!
//! Holds at most one plan awaiting a human decision. The tracked plan stays
//! visible after approval so execution progress can be patched into it by
//! task id; patches for any other plan id are ignored.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use agentloom_core::{AgentPlan, PlanStatus, TaskPatch};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

struct PendingDecision {
    plan_id: String,
    decide: oneshot::Sender<bool>,
}

/// Single-slot human approval for plans
pub struct ApprovalGate {
    plan: watch::Sender<Option<AgentPlan>>,
    pending: Mutex<Option<PendingDecision>>,
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate")
            .field("plan", &self.plan.borrow().as_ref().map(|p| p.id.clone()))
            .field("has_pending", &self.has_pending())
            .finish()
    }
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalGate {
    pub fn new() -> Self {
        let (plan, _) = watch::channel(None);
        Self {
            plan,
            pending: Mutex::new(None),
        }
    }

    /// Register `plan` as pending and wait for the decision
    ///
    /// Registration happens before this returns, not when the future is
    /// first polled. A plan still pending from an earlier call resolves
    /// `false`. The future also resolves `false` if the gate is cleared or
    /// dropped.
    pub fn wait_for_approval(&self, mut plan: AgentPlan) -> impl Future<Output = bool> + Send + 'static {
        let (decide, decision) = oneshot::channel();
        plan.status = PlanStatus::Pending;

        let superseded = self.lock_pending().replace(PendingDecision {
            plan_id: plan.id.clone(),
            decide,
        });
        if let Some(old) = superseded {
            info!("Plan {} superseded by {}", old.plan_id, plan.id);
            let _ = old.decide.send(false);
        }

        debug!("Plan {} awaiting approval ({} tasks)", plan.id, plan.task_count());
        self.plan.send_replace(Some(plan));

        async move { decision.await.unwrap_or(false) }
    }

    /// Approve the pending plan; `false` when nothing is pending
    pub fn approve_plan(&self) -> bool {
        let Some(pending) = self.lock_pending().take() else {
            return false;
        };
        info!("Plan {} approved", pending.plan_id);
        self.set_status(&pending.plan_id, PlanStatus::Approved);
        let _ = pending.decide.send(true);
        true
    }

    /// Reject the pending plan and drop it from the gate
    pub fn reject_plan(&self) -> bool {
        let Some(pending) = self.lock_pending().take() else {
            return false;
        };
        info!("Plan {} rejected", pending.plan_id);
        self.plan.send_replace(None);
        let _ = pending.decide.send(false);
        true
    }

    pub fn has_pending(&self) -> bool {
        self.lock_pending().is_some()
    }

    /// Snapshot of the tracked plan
    pub fn current_plan(&self) -> Option<AgentPlan> {
        self.plan.borrow().clone()
    }

    /// Observe every change to the tracked plan
    pub fn subscribe(&self) -> watch::Receiver<Option<AgentPlan>> {
        self.plan.subscribe()
    }

    /// Patch one task of the tracked plan
    ///
    /// No-op (returns `false`) when `plan_id` is not the tracked plan or the
    /// task is unknown.
    pub fn update_task(&self, plan_id: &str, task_id: &str, patch: &TaskPatch) -> bool {
        self.plan.send_if_modified(|slot| {
            match slot
                .as_mut()
                .filter(|plan| plan.id == plan_id)
                .and_then(|plan| plan.find_task_mut(task_id))
            {
                Some(task) => {
                    task.apply(patch);
                    true
                }
                None => false,
            }
        })
    }

    /// Edit a task's name or description while the plan still awaits a decision
    pub fn edit_task(&self, plan_id: &str, task_id: &str, name: Option<String>, description: Option<String>) -> bool {
        let is_pending = self
            .lock_pending()
            .as_ref()
            .map_or(false, |p| p.plan_id == plan_id);
        if !is_pending {
            return false;
        }
        let patch = TaskPatch {
            name,
            description,
            ..TaskPatch::default()
        };
        self.update_task(plan_id, task_id, &patch)
    }

    pub fn mark_running(&self, plan_id: &str) -> bool {
        self.set_status(plan_id, PlanStatus::Running)
    }

    pub fn mark_completed(&self, plan_id: &str) -> bool {
        self.set_status(plan_id, PlanStatus::Completed)
    }

    /// Forget the tracked plan; a pending decision resolves `false`
    pub fn clear(&self) {
        if let Some(pending) = self.lock_pending().take() {
            debug!("Clearing pending plan {}", pending.plan_id);
            let _ = pending.decide.send(false);
        }
        self.plan.send_replace(None);
    }

    fn set_status(&self, plan_id: &str, status: PlanStatus) -> bool {
        self.plan.send_if_modified(|slot| match slot.as_mut().filter(|p| p.id == plan_id) {
            Some(plan) => {
                plan.status = status;
                true
            }
            None => false,
        })
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingDecision>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloom_core::{AgentTask, TaskStatus};

    fn plan(title: &str) -> AgentPlan {
        AgentPlan::new(title, vec![vec![AgentTask::new("a", "do a")]])
    }

    #[tokio::test]
    async fn test_approve_resolves_true() {
        let gate = ApprovalGate::new();
        let p = plan("one");
        let id = p.id.clone();
        let decision = gate.wait_for_approval(p);

        assert!(gate.has_pending());
        assert!(gate.approve_plan());
        assert!(decision.await);
        assert_eq!(gate.current_plan().unwrap().id, id);
        assert_eq!(gate.current_plan().unwrap().status, PlanStatus::Approved);
        assert!(!gate.approve_plan());
    }

    #[tokio::test]
    async fn test_reject_resolves_false_and_clears() {
        let gate = ApprovalGate::new();
        let decision = gate.wait_for_approval(plan("one"));
        assert!(gate.reject_plan());
        assert!(!decision.await);
        assert!(gate.current_plan().is_none());
    }

    #[tokio::test]
    async fn test_newer_plan_supersedes_older() {
        let gate = ApprovalGate::new();
        let first = gate.wait_for_approval(plan("first"));
        let second_plan = plan("second");
        let second_id = second_plan.id.clone();
        let second = gate.wait_for_approval(second_plan);

        assert!(!first.await);
        assert_eq!(gate.current_plan().unwrap().id, second_id);
        gate.approve_plan();
        assert!(second.await);
    }

    #[tokio::test]
    async fn test_stale_updates_are_ignored() {
        let gate = ApprovalGate::new();
        let p = plan("one");
        let (plan_id, task_id) = (p.id.clone(), p.parallel_groups[0][0].id.clone());
        let _decision = gate.wait_for_approval(p);

        let patch = TaskPatch::status(TaskStatus::Running);
        assert!(!gate.update_task("other-plan", &task_id, &patch));
        assert!(!gate.update_task(&plan_id, "other-task", &patch));
        assert!(!gate.mark_running("other-plan"));
        assert!(gate.update_task(&plan_id, &task_id, &patch));

        let current = gate.current_plan().unwrap();
        assert_eq!(current.status, PlanStatus::Pending);
        assert_eq!(current.find_task(&task_id).unwrap().status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_edit_only_while_pending() {
        let gate = ApprovalGate::new();
        let p = plan("one");
        let (plan_id, task_id) = (p.id.clone(), p.parallel_groups[0][0].id.clone());
        let decision = gate.wait_for_approval(p);

        assert!(gate.edit_task(&plan_id, &task_id, None, Some("do it better".into())));
        gate.approve_plan();
        decision.await;
        assert!(!gate.edit_task(&plan_id, &task_id, Some("late".into()), None));

        let task = gate.current_plan().unwrap().find_task(&task_id).cloned().unwrap();
        assert_eq!(task.description, "do it better");
        assert_eq!(task.name, "a");
    }

    #[tokio::test]
    async fn test_clear_resolves_false() {
        let gate = ApprovalGate::new();
        let decision = gate.wait_for_approval(plan("one"));
        gate.clear();
        assert!(!decision.await);
        assert!(!gate.has_pending());
    }
}
