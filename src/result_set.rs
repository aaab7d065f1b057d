use crate::{PingStat, TargetId};
use std::collections::HashMap;

/// The statistics of one cycle, in target declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    order: Vec<TargetId>,
    stats: HashMap<TargetId, PingStat>,
}

impl ResultSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id`; an identity that is already present keeps its place and value.
    pub fn insert(&mut self, id: TargetId, stat: PingStat) {
        if self.stats.contains_key(&id) {
            return;
        }
        self.order.push(id.clone());
        self.stats.insert(id, stat);
    }

    #[must_use]
    pub fn get(&self, id: &TargetId) -> Option<&PingStat> {
        self.stats.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &TargetId> {
        self.order.iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TargetId, &PingStat)> {
        self.order.iter().filter_map(|id| self.stats.get(id).map(|stat| (id, stat)))
    }
}
