//! Spawner admin commands
//!
//! Failures of operator actions go to the operator's notifier; failures of
//! the scheduled tick only reach the log.
use coin_common::{CollectibleId, CollectibleStore, SpawnAdmissionController, TickReport, UserNotifier};
use rand::Rng;

pub fn spawn_now<St, R>(
    spawner: &SpawnAdmissionController,
    store: &mut St,
    rng: &mut R,
    notifier: &dyn UserNotifier,
) -> Option<CollectibleId>
where
    St: CollectibleStore + ?Sized,
    R: Rng + ?Sized,
{
    match spawner.spawn_now(store, rng) {
        Ok(id) => Some(id),
        Err(e) => {
            log::warn!("{}: spawn request failed: {}", spawner.spawner_id(), e);
            notifier.alert(&e.user_alert());
            None
        }
    }
}

pub fn remove_all<St>(spawner: &SpawnAdmissionController, store: &mut St, notifier: &dyn UserNotifier) -> Option<usize>
where
    St: CollectibleStore + ?Sized,
{
    match spawner.remove_all(store) {
        Ok(removed) => Some(removed),
        Err(e) => {
            log::warn!("{}: remove request failed: {}", spawner.spawner_id(), e);
            notifier.alert(&e.user_alert());
            None
        }
    }
}

/// A tick the operator asked for; `None` when the store failed
pub fn tick_now<St, R>(
    spawner: &SpawnAdmissionController,
    store: &mut St,
    now_ms: u64,
    rng: &mut R,
    notifier: &dyn UserNotifier,
) -> Option<TickReport>
where
    St: CollectibleStore + ?Sized,
    R: Rng + ?Sized,
{
    match spawner.tick(store, now_ms, rng) {
        Ok(report) => Some(report),
        Err(e) => {
            log::warn!("{}: tick failed: {}", spawner.spawner_id(), e);
            notifier.alert(&e.user_alert());
            None
        }
    }
}

/// The scheduled tick
pub fn scheduled_tick<St, R>(spawner: &SpawnAdmissionController, store: &mut St, now_ms: u64, rng: &mut R) -> TickReport
where
    St: CollectibleStore + ?Sized,
    R: Rng + ?Sized,
{
    spawner.tick(store, now_ms, rng).unwrap_or_else(|e| {
        log::error!("{}: scheduled tick failed: {}", spawner.spawner_id(), e);
        TickReport::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::LocalWorld;
    use coin_common::{
        NewCollectible, PanelMessage, Position, Severity, SpawnError, SpawnerConfig, SpawnerId, StoredObject, UserAlert,
    };
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::cell::RefCell;

    /// Store whose backing service is down
    struct FailingStore;

    impl CollectibleStore for FailingStore {
        fn fetch_in_radius(&self, _center: Position, _radius: f32) -> Result<Vec<StoredObject>, SpawnError> {
            Err(SpawnError::Persistence("store offline".into()))
        }

        fn create(&mut self, _collectible: NewCollectible) -> Result<CollectibleId, SpawnError> {
            Err(SpawnError::Persistence("store offline".into()))
        }

        fn remove(&mut self, _id: CollectibleId) -> Result<(), SpawnError> {
            Err(SpawnError::Persistence("store offline".into()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        alerts: RefCell<Vec<UserAlert>>,
    }

    impl UserNotifier for RecordingNotifier {
        fn alert(&self, alert: &UserAlert) {
            self.alerts.borrow_mut().push(alert.clone());
        }

        fn post_message(&self, _message: &PanelMessage) {}
    }

    fn spawner() -> SpawnAdmissionController {
        SpawnAdmissionController::new(SpawnerId(1), Position::default(), SpawnerConfig::enabled())
    }

    #[test]
    fn failed_admin_actions_alert_the_operator() {
        let notifier = RecordingNotifier::default();
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(spawn_now(&spawner(), &mut FailingStore, &mut rng, &notifier), None);
        assert_eq!(remove_all(&spawner(), &mut FailingStore, &notifier), None);
        assert_eq!(tick_now(&spawner(), &mut FailingStore, 0, &mut rng, &notifier), None);

        let alerts = notifier.alerts.borrow();
        assert_eq!(alerts.len(), 3);
        assert!(alerts.iter().all(|a| a.severity == Severity::Error));
        assert_eq!(alerts[0].detail.as_deref(), Some("persistence error: store offline"));
    }

    #[test]
    fn scheduled_tick_failures_stay_silent() {
        let report = scheduled_tick(&spawner(), &mut FailingStore, 0, &mut StdRng::seed_from_u64(1));
        assert_eq!(report, TickReport::default());
    }

    #[test]
    fn successful_actions_do_not_alert() {
        let notifier = RecordingNotifier::default();
        let mut world = LocalWorld::new(1);
        let mut rng = StdRng::seed_from_u64(2);

        let id = spawn_now(&spawner(), &mut world, &mut rng, &notifier).unwrap();
        assert!(world.object(id).is_some());
        assert_eq!(remove_all(&spawner(), &mut world, &notifier), Some(1));
        assert!(notifier.alerts.borrow().is_empty());
    }
}
