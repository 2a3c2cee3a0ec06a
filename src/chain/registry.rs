//! Explicit, startup-built stage registry.

use std::sync::Arc;

use super::stage::{Stage, StageId};

/// Stages kept sorted by `(order, registration sequence)`.
#[derive(Default)]
pub struct StageRegistry {
    stages: Vec<(u32, Arc<dyn Stage>)>,
    next_seq: u32,
}

impl StageRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage. Equal orders keep registration order.
    ///
    /// Replaces an already registered stage with the same id in place of
    /// appending a duplicate.
    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        let id = stage.id();
        if let Some(pos) = self.stages.iter().position(|(_, s)| s.id() == id) {
            log::debug!("StageRegistry: replacing stage '{}'", id);
            self.stages.remove(pos);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.stages.push((seq, stage));
        self.stages.sort_by_key(|(seq, s)| (s.order(), *seq));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, stage: Arc<dyn Stage>) -> Self {
        self.register(stage);
        self
    }

    /// Stages in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Stage>> {
        self.stages.iter().map(|(_, s)| s)
    }

    /// Stage ids in execution order.
    pub fn ids(&self) -> Vec<StageId> {
        self.iter().map(|s| s.id()).collect()
    }

    /// Look a stage up by id.
    pub fn get(&self, id: &StageId) -> Option<&Arc<dyn Stage>> {
        self.iter().find(|s| &s.id() == id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages: Vec<String> = self
            .iter()
            .map(|s| format!("{}@{}", s.id(), s.order()))
            .collect();
        f.debug_struct("StageRegistry")
            .field("stages", &stages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::stage::StageOutcome;
    use crate::context::RequestContext;
    use crate::error::Result;
    use async_trait::async_trait;

    struct Named(&'static str, i32);

    #[async_trait]
    impl Stage for Named {
        fn id(&self) -> StageId {
            StageId::from_static(self.0)
        }
        fn order(&self) -> i32 {
            self.1
        }
        async fn execute(&self, _ctx: &mut RequestContext) -> Result<StageOutcome> {
            Ok(StageOutcome::Continue)
        }
    }

    #[test]
    fn test_sorted_by_order_then_registration() {
        let registry = StageRegistry::new()
            .with(Arc::new(Named("late", 50)))
            .with(Arc::new(Named("first_tie", 10)))
            .with(Arc::new(Named("early", -5)))
            .with(Arc::new(Named("second_tie", 10)));
        let ids: Vec<String> = registry.ids().iter().map(|i| i.to_string()).collect();
        assert_eq!(ids, vec!["early", "first_tie", "second_tie", "late"]);
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = StageRegistry::new();
        registry.register(Arc::new(Named("judge", 40)));
        registry.register(Arc::new(Named("judge", 45)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&StageId::JUDGE).unwrap().order(), 45);
    }
}
