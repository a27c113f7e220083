use crate::channel::{ClaimChannel, PickupHooks, REWARD_ACTION};
use crate::claim::{ClaimAttempt, CommitReceipt};
use crate::error::ClaimError;
use crate::ledger::{ScoreBackend, ScoreService};
use crate::score_limit::ScoreLimiter;
use crate::types::Collectible;

const HOOK_INTERRUPTED: &str = "Coin pickup interrupted by hook.";
const REWARD_UNAVAILABLE: &str =
    "The reward service was not able to perform the action. Please check that it is installed in this space.";

/**
 * The authoritative half of a claim.
 *
 * Steps run in order and stop at the first failure:
 * score limits, pre-commit hook, reward acquisition, score recording and
 * finally the exclusive removal of the collectible.
 */
pub struct CommitPipeline<C, H, S> {
    channel: C,
    hooks: H,
    backend: ScoreBackend<S>,
    limiter: ScoreLimiter,
}

impl<C: ClaimChannel, H: PickupHooks, S: ScoreService> CommitPipeline<C, H, S> {
    pub fn new(channel: C, hooks: H, backend: ScoreBackend<S>, limiter: ScoreLimiter) -> Self {
        Self { channel, hooks, backend, limiter }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn backend(&self) -> &ScoreBackend<S> {
        &self.backend
    }

    pub fn limiter(&self) -> &ScoreLimiter {
        &self.limiter
    }

    pub async fn run(&self, attempt: &ClaimAttempt, collectible: &Collectible) -> Result<CommitReceipt, ClaimError> {
        // 1. Score limits, against the score before the speculative delta
        self.limiter.check(attempt.score_value, attempt.score_before)?;

        // 2. Host veto
        if let Some(veto) = self.hooks.before_commit(collectible).await {
            let reason = veto.error.unwrap_or_else(|| HOOK_INTERRUPTED.to_string());
            return Err(ClaimError::BackendError(reason));
        }

        // 3. Reward item
        if let Some(item_id) = collectible.reward_item.as_deref() {
            let receipt = self
                .hooks
                .acquire_reward(item_id, REWARD_ACTION)
                .await
                .ok_or_else(|| ClaimError::BackendUnavailable(REWARD_UNAVAILABLE.to_string()))?;
            log::info!("Acquired reward {} for {}", receipt.item_id, collectible.id);
        }

        // 4. Score
        let authoritative_score = self.backend.record_delta(attempt.score_value).await?;

        // 5. Remove the collectible for good
        self.channel.commit_removal(collectible.id).await?;

        Ok(CommitReceipt { authoritative_score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{HookVeto, NoHooks, RewardReceipt};
    use crate::ledger::NoScoreService;
    use crate::score_limit::LimitRejection;
    use crate::spatial::Position;
    use crate::types::{ClaimSignal, CollectibleId, InstanceId};
    use futures::executor::block_on;
    use std::cell::{Cell, RefCell};
    use std::time::Instant;

    #[derive(Default)]
    struct CountingChannel {
        removals: Cell<u32>,
    }

    impl ClaimChannel for CountingChannel {
        fn set_hidden(&self, _collectible: CollectibleId, _hidden: bool) {}

        fn broadcast(&self, _collectible: CollectibleId, _signal: ClaimSignal) {}

        async fn commit_removal(&self, _collectible: CollectibleId) -> Result<(), ClaimError> {
            self.removals.set(self.removals.get() + 1);
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedHooks {
        veto: Option<HookVeto>,
        reward: Option<RewardReceipt>,
        calls: RefCell<Vec<&'static str>>,
    }

    impl PickupHooks for &ScriptedHooks {
        async fn before_commit(&self, _collectible: &Collectible) -> Option<HookVeto> {
            self.calls.borrow_mut().push("before_commit");
            self.veto.clone()
        }

        async fn acquire_reward(&self, _item_id: &str, action_name: &str) -> Option<RewardReceipt> {
            assert_eq!(action_name, REWARD_ACTION);
            self.calls.borrow_mut().push("acquire_reward");
            self.reward.clone()
        }
    }

    fn attempt(score_value: f64, score_before: f64) -> ClaimAttempt {
        let now = Instant::now();
        ClaimAttempt {
            collectible: CollectibleId(9),
            instance_id: InstanceId::from("me"),
            score_value,
            score_before,
            started_at: now,
            timeout_at: now,
        }
    }

    fn coin(score_value: f64) -> Collectible {
        Collectible::new(CollectibleId(9), Position::default(), score_value)
    }

    #[test]
    fn limit_rejection_short_circuits_before_any_external_call() {
        let hooks = ScriptedHooks::default();
        let pipeline = CommitPipeline::new(
            CountingChannel::default(),
            &hooks,
            ScoreBackend::<NoScoreService>::InMemory,
            ScoreLimiter::unbounded().with_max(10.0),
        );
        let result = block_on(pipeline.run(&attempt(1.0, 10.0), &coin(1.0)));
        assert!(matches!(result, Err(ClaimError::AdmissionRejected(LimitRejection::AtMaximum(_)))));
        assert!(hooks.calls.borrow().is_empty());
        assert_eq!(pipeline.channel().removals.get(), 0);
    }

    #[test]
    fn hook_veto_uses_default_message() {
        let hooks = ScriptedHooks { veto: Some(HookVeto::default()), ..Default::default() };
        let pipeline = CommitPipeline::new(
            CountingChannel::default(),
            &hooks,
            ScoreBackend::<NoScoreService>::InMemory,
            ScoreLimiter::unbounded(),
        );
        let result = block_on(pipeline.run(&attempt(1.0, 0.0), &coin(1.0)));
        assert_eq!(result, Err(ClaimError::BackendError(HOOK_INTERRUPTED.into())));
        assert_eq!(pipeline.channel().removals.get(), 0);
    }

    #[test]
    fn missing_reward_service_is_unavailable() {
        let hooks = ScriptedHooks::default();
        let pipeline = CommitPipeline::new(
            CountingChannel::default(),
            &hooks,
            ScoreBackend::<NoScoreService>::InMemory,
            ScoreLimiter::unbounded(),
        );
        let mut rewarded = coin(1.0);
        rewarded.reward_item = Some("hat".into());
        let result = block_on(pipeline.run(&attempt(1.0, 0.0), &rewarded));
        assert!(matches!(result, Err(ClaimError::BackendUnavailable(_))));
        assert_eq!(*hooks.calls.borrow(), vec!["before_commit", "acquire_reward"]);
    }

    #[test]
    fn successful_run_removes_the_collectible() {
        let hooks = ScriptedHooks { reward: Some(RewardReceipt { item_id: "hat-1".into() }), ..Default::default() };
        let pipeline = CommitPipeline::new(
            CountingChannel::default(),
            &hooks,
            ScoreBackend::<NoScoreService>::InMemory,
            ScoreLimiter::unbounded(),
        );
        let mut rewarded = coin(1.0);
        rewarded.reward_item = Some("hat".into());
        let receipt = block_on(pipeline.run(&attempt(1.0, 0.0), &rewarded)).unwrap();
        assert_eq!(receipt.authoritative_score, None);
        assert_eq!(pipeline.channel().removals.get(), 1);
    }

    #[test]
    fn no_hooks_let_plain_coins_through() {
        let pipeline = CommitPipeline::new(
            CountingChannel::default(),
            NoHooks,
            ScoreBackend::in_memory(),
            ScoreLimiter::unbounded(),
        );
        assert!(block_on(pipeline.run(&attempt(-3.0, 0.0), &coin(-3.0))).is_ok());
    }
}
