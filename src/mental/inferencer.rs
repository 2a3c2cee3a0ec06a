//! Per-user mental-state inference.
//!
//! Each user owns one `Arc<Mutex<UserMentalModel>>` inside a [`DashMap`].
//! Updates for the same user serialize on that mutex; different users only
//! share the DashMap shard lock for the instant of the lookup.
//!
//! Eviction never removes a model another caller is holding: an entry is only
//! dropped while the map owns the sole `Arc` reference.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};

use super::model::UserMentalModel;
use crate::config::InferencerConfig;
use crate::emotion::{EmotionalAnalyzer, EmotionalReading, EmotionalState};

type ModelCell = Arc<Mutex<UserMentalModel>>;

/// Longitudinal confusion/frustration tracker keyed by user id.
#[derive(Debug)]
pub struct MentalStateInferencer {
    analyzer: Arc<EmotionalAnalyzer>,
    models: DashMap<String, ModelCell>,
    config: InferencerConfig,
    lock_retries: AtomicU64,
}

impl MentalStateInferencer {
    /// Empty store; `config` is expected to be validated.
    pub fn new(analyzer: Arc<EmotionalAnalyzer>, config: InferencerConfig) -> Self {
        Self {
            analyzer,
            models: DashMap::new(),
            config,
            lock_retries: AtomicU64::new(0),
        }
    }

    /// Analyze `message` and fold the result into the user's model.
    pub fn infer_from_query(&self, user_id: &str, message: &str) -> UserMentalModel {
        let reading = self.analyzer.analyze_detailed(message);
        self.observe(user_id, &reading)
    }

    /// Fold an already-computed reading into the user's model.
    ///
    /// Confusion is sourced from the Confused-state intensity (whether or not
    /// Confused won), frustration from `frustration_level`.
    pub fn observe(&self, user_id: &str, reading: &EmotionalReading) -> UserMentalModel {
        let confusion = reading.state_intensity(EmotionalState::Confused);
        let frustration = reading.context.frustration_level();

        let cell = self.cell(user_id);
        let snapshot = {
            let mut model = self.lock_with_backoff(user_id, &cell);
            model.blend(self.config.decay, confusion, frustration);
            model.clone()
        };
        drop(cell);

        self.enforce_capacity();
        snapshot
    }

    /// Current snapshot, creating a zeroed model on first access.
    pub fn get_mental_model(&self, user_id: &str) -> UserMentalModel {
        let cell = self.cell(user_id);
        let model = self.lock_with_backoff(user_id, &cell);
        model.clone()
    }

    /// Snapshot without creating a model.
    pub fn peek(&self, user_id: &str) -> Option<UserMentalModel> {
        let cell = self.models.get(user_id).map(|r| Arc::clone(r.value()))?;
        let model = self.lock_with_backoff(user_id, &cell);
        Some(model.clone())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Lock attempts that timed out and had to back off.
    pub fn lock_retries(&self) -> u64 {
        self.lock_retries.load(Ordering::Relaxed)
    }

    /// Drop models idle longer than `idle_ttl_secs`. Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        let Some(ttl) = self.config.idle_ttl_secs else {
            return 0;
        };
        let Some(cutoff) = idle_cutoff(ttl) else {
            log::warn!("idle_ttl_secs {} is out of range; nothing evicted", ttl);
            return 0;
        };
        let before = self.models.len();
        self.models.retain(|_, cell| {
            if Arc::strong_count(cell) > 1 {
                return true;
            }
            match cell.try_lock() {
                Some(model) => model.last_updated >= cutoff,
                None => true,
            }
        });
        let removed = before.saturating_sub(self.models.len());
        if removed > 0 {
            log::debug!("Evicted {} idle mental models", removed);
        }
        removed
    }

    fn cell(&self, user_id: &str) -> ModelCell {
        if let Some(existing) = self.models.get(user_id) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .models
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserMentalModel::new(user_id))));
        Arc::clone(entry.value())
    }

    /// `try_lock_for` with a doubling timeout; falls back to a blocking lock so
    /// no update is ever dropped.
    fn lock_with_backoff<'a>(
        &self,
        user_id: &str,
        cell: &'a Mutex<UserMentalModel>,
    ) -> MutexGuard<'a, UserMentalModel> {
        let mut wait = Duration::from_millis(self.config.lock_backoff_ms.max(1));
        for attempt in 1..=self.config.lock_attempts {
            if let Some(guard) = cell.try_lock_for(wait) {
                return guard;
            }
            self.lock_retries.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "Mental model for '{}' busy (attempt {}/{}), backing off {:?}",
                user_id,
                attempt,
                self.config.lock_attempts,
                wait
            );
            wait = wait.saturating_mul(2);
        }
        log::warn!(
            "Mental model for '{}' still contended after {} attempts; waiting",
            user_id,
            self.config.lock_attempts
        );
        cell.lock()
    }

    /// Evict least-recently-updated models once the cache is over `max_users`.
    fn enforce_capacity(&self) {
        let max = self.config.max_users;
        let len = self.models.len();
        if len <= max {
            return;
        }
        let excess = len - max;

        let mut candidates: Vec<(String, DateTime<Utc>)> = self
            .models
            .iter()
            .filter_map(|entry| {
                let model = entry.value().try_lock()?;
                Some((entry.key().clone(), model.last_updated))
            })
            .collect();
        candidates.sort_by_key(|(_, ts)| *ts);

        let mut removed = 0;
        for (key, _) in candidates {
            if removed == excess {
                break;
            }
            if self
                .models
                .remove_if(&key, |_, cell| Arc::strong_count(cell) == 1)
                .is_some()
            {
                removed += 1;
            }
        }
        if removed > 0 {
            log::debug!("Evicted {} mental models over capacity {}", removed, max);
        }
    }
}

/// `now - ttl`, or `None` when that is not representable.
fn idle_cutoff(ttl_secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(ttl_secs).ok()?;
    let ttl = TimeDelta::try_seconds(secs)?;
    Utc::now().checked_sub_signed(ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inferencer(config: InferencerConfig) -> MentalStateInferencer {
        MentalStateInferencer::new(Arc::new(EmotionalAnalyzer::default()), config)
    }

    #[test]
    fn test_first_access_creates_zeroed_model() {
        let inf = inferencer(InferencerConfig::default());
        assert!(inf.peek("alice").is_none());
        let m = inf.get_mental_model("alice");
        assert_eq!(m.user_id, "alice");
        assert_eq!(m.frustration_level, 0.0);
        assert_eq!(m.confusion_level, 0.0);
        assert_eq!(inf.len(), 1);
    }

    #[test]
    fn test_decay_visible_across_queries() {
        let inf = inferencer(InferencerConfig::default());
        let first = inf.infer_from_query(
            "bob",
            "I'm so frustrated, this is not working, nothing works and I'm stuck!",
        );
        assert!(first.frustration_level > 0.0);

        let second = inf.infer_from_query("bob", "Please add a unit test for the parser.");
        assert!(second.frustration_level > 0.0);
        assert!(second.frustration_level < first.frustration_level);
        assert_eq!(inf.get_mental_model("bob").observations, 2);
    }

    #[test]
    fn test_confusion_tracks_confused_intensity() {
        let inf = inferencer(InferencerConfig::default());
        let m = inf.infer_from_query("carol", "I'm confused, this makes no sense");
        assert!(m.confusion_level > 0.0);
        assert_eq!(inf.get_mental_model("dave").confusion_level, 0.0);
    }

    #[test]
    fn test_users_are_independent() {
        let inf = inferencer(InferencerConfig::default());
        inf.infer_from_query("u1", "stuck stuck stuck");
        assert_eq!(inf.get_mental_model("u2").frustration_level, 0.0);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let inf = inferencer(InferencerConfig::default());
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        inf.infer_from_query("shared", "still broken, I'm stuck");
                    }
                });
            }
        });
        assert_eq!(inf.get_mental_model("shared").observations, 400);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let inf = inferencer(InferencerConfig {
            max_users: 2,
            ..Default::default()
        });
        inf.infer_from_query("a", "hello");
        std::thread::sleep(Duration::from_millis(5));
        inf.infer_from_query("b", "hello");
        std::thread::sleep(Duration::from_millis(5));
        inf.infer_from_query("c", "hello");
        assert_eq!(inf.len(), 2);
        assert!(inf.peek("a").is_none());
        assert!(inf.peek("c").is_some());
    }

    #[test]
    fn test_idle_eviction() {
        let inf = inferencer(InferencerConfig {
            idle_ttl_secs: Some(0),
            ..Default::default()
        });
        inf.infer_from_query("idle", "hello");
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(inf.evict_idle(), 1);
        assert!(inf.is_empty());
    }

    #[test]
    fn test_huge_ttl_never_evicts() {
        for ttl in [100_000_000_000_000_000, u64::MAX] {
            let inf = inferencer(InferencerConfig {
                idle_ttl_secs: Some(ttl),
                ..Default::default()
            });
            inf.infer_from_query("u", "hello");
            assert_eq!(inf.evict_idle(), 0);
            assert!(inf.peek("u").is_some());
        }
        assert!(idle_cutoff(u64::MAX).is_none());
        assert!(idle_cutoff(60).is_some_and(|c| c < Utc::now()));
    }

    #[test]
    fn test_contended_lock_backs_off_then_waits() {
        let inf = inferencer(InferencerConfig {
            lock_attempts: 2,
            lock_backoff_ms: 5,
            ..Default::default()
        });
        let cell = inf.cell("busy");
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();

        let held = &cell;
        let (released_at, updated_at) = std::thread::scope(|s| {
            let holder = s.spawn(move || {
                let guard = held.lock();
                locked_tx.send(()).unwrap();
                // Longer than 5ms + 10ms of timed attempts.
                std::thread::sleep(Duration::from_millis(80));
                let released_at = std::time::Instant::now();
                drop(guard);
                released_at
            });
            locked_rx.recv().unwrap();
            let model = inf.infer_from_query("busy", "I'm stuck");
            let updated_at = std::time::Instant::now();
            assert_eq!(model.observations, 1);
            (holder.join().unwrap(), updated_at)
        });

        assert_eq!(inf.lock_retries(), 2);
        assert!(updated_at >= released_at);
        assert_eq!(inf.get_mental_model("busy").observations, 1);
    }

    #[test]
    fn test_idle_eviction_disabled_without_ttl() {
        let inf = inferencer(InferencerConfig::default());
        inf.infer_from_query("x", "hello");
        assert_eq!(inf.evict_idle(), 0);
        assert_eq!(inf.len(), 1);
    }
}
