// Per-encounter data bag shared by trigger callbacks.

use std::sync::Arc;

use serde_json::{Map, Value};

/// Author-supplied initializer run whenever the store is reset.
pub type InitDataFn = Arc<dyn Fn() -> Map<String, Value> + Send + Sync>;

/// Opaque key-value state scoped to one encounter.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    fields: Map<String, Value>,
    /// Name of the local player, kept across resets
    me: Option<String>,
}

impl StateStore {
    pub fn new(me: Option<String>) -> Self {
        Self {
            fields: Map::new(),
            me,
        }
    }

    pub fn me(&self) -> Option<&str> {
        self.me.as_deref()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Add one to an integer field (absent counts as zero) and return the new value.
    pub fn increment(&mut self, field: &str) -> i64 {
        let next = self.get_i64(field).unwrap_or(0) + 1;
        self.set(field, next);
        next
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Discard every field and re-seed from the initializers, in order.
    pub fn reset(&mut self, init_data: &[InitDataFn]) {
        self.fields.clear();
        for init in init_data {
            self.fields.extend(init());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_remove() {
        let mut store = StateStore::new(None);
        store.set("phase", "intermission");
        assert_eq!(store.get_str("phase"), Some("intermission"));
        assert!(store.contains("phase"));
        assert_eq!(store.remove("phase"), Some(json!("intermission")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_increment_from_absent() {
        let mut store = StateStore::new(None);
        assert_eq!(store.increment("pokeCount"), 1);
        assert_eq!(store.increment("pokeCount"), 2);
        assert_eq!(store.get_i64("pokeCount"), Some(2));
    }

    #[test]
    fn test_reset_reseeds_and_keeps_me() {
        let mut store = StateStore::new(Some("Tank Player".to_string()));
        store.set("stale", true);

        let first: InitDataFn = Arc::new(|| {
            let mut map = Map::new();
            map.insert("count".into(), json!(0));
            map.insert("phase".into(), json!("p1"));
            map
        });
        let second: InitDataFn = Arc::new(|| {
            let mut map = Map::new();
            map.insert("phase".into(), json!("p2"));
            map
        });
        store.reset(&[first, second]);

        assert!(!store.contains("stale"));
        assert_eq!(store.get_i64("count"), Some(0));
        assert_eq!(store.get_str("phase"), Some("p2"));
        assert_eq!(store.me(), Some("Tank Player"));
    }

    #[test]
    fn test_reset_without_initializers_is_empty() {
        let mut store = StateStore::new(None);
        store.set("x", 1);
        store.reset(&[]);
        assert!(store.is_empty());
    }
}
