//! Results of image analyses, addressable by the id returned to the caller.

use serde_json::Value;
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};
use uuid::Uuid;

/// A bounded map of analysis results. When full, the oldest result is evicted.
pub struct AnalysisStore {
    capacity: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    results: HashMap<Uuid, Value>,
    order: VecDeque<Uuid>,
}

impl AnalysisStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn insert(&self, result: Value) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.results.remove(&oldest);
            }
        }
        inner.order.push_back(id);
        inner.results.insert(id, result);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<Value> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .results
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_get() {
        let store = AnalysisStore::new(4);
        let a = store.insert(json!({"n": 1}));
        let b = store.insert(json!({"n": 2}));

        assert_ne!(a, b);
        assert_eq!(store.get(&a), Some(json!({"n": 1})));
        assert_eq!(store.get(&b), Some(json!({"n": 2})));
        assert_eq!(store.get(&Uuid::new_v4()), None);
    }

    #[test]
    fn test_oldest_is_evicted_at_capacity() {
        let store = AnalysisStore::new(2);
        let first = store.insert(json!(1));
        let second = store.insert(json!(2));
        let third = store.insert(json!(3));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&first), None);
        assert_eq!(store.get(&second), Some(json!(2)));
        assert_eq!(store.get(&third), Some(json!(3)));
    }

    #[test]
    fn test_zero_capacity_still_keeps_latest() {
        let store = AnalysisStore::new(0);
        assert!(store.is_empty());
        let id = store.insert(json!("only"));
        assert_eq!(store.get(&id), Some(json!("only")));
        assert_eq!(store.len(), 1);
    }
}
