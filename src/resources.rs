//! Capacity-bounded, insertion-ordered resource store, and
//! the sensitive-field sanitizer every stored value passes through first.

use crate::notify::Notifier;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const SENSITIVE_KEYS: &[&str] = &["accessToken", "password", "client_secret", "clientSecret"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAnnotations {
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: String,
    pub text: String,
    pub annotations: ResourceAnnotations,
}

struct Inner {
    entries: IndexMap<String, Resource>,
}

pub struct ResourceStore {
    inner: RwLock<Inner>,
    capacity: usize,
    shutting_down: Arc<AtomicBool>,
    notifier: Arc<dyn Notifier>,
}

impl ResourceStore {
    pub fn new(capacity: usize, shutting_down: Arc<AtomicBool>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: IndexMap::new(),
            }),
            capacity,
            shutting_down,
            notifier,
        }
    }

    /// Inserts or overwrites a resource in place (order preserved on
    /// overwrite). Evicts the oldest entry first if at capacity and this is
    /// a genuinely new key.
    pub fn put(&self, resource: Resource) {
        {
            let mut inner = self.inner.write();
            if !inner.entries.contains_key(&resource.uri) && inner.entries.len() >= self.capacity {
                inner.entries.shift_remove_index(0);
            }
            inner.entries.insert(resource.uri.clone(), resource);
        }
        self.notify_list_changed();
    }

    pub fn get(&self, uri: &str) -> Option<Resource> {
        self.inner.read().entries.get(uri).cloned()
    }

    pub fn list(&self) -> Vec<Resource> {
        self.inner.read().entries.values().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.write().entries.clear();
        self.notify_list_changed();
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify_list_changed(&self) {
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        self.notifier.resources_list_changed();
    }
}

/// Recursively replaces sensitive keys with `[REDACTED length: N]` (or
/// `[REDACTED]` when the value is null/empty), never mutating `value`.
pub fn sanitize(value: &Value, extra_sensitive: &HashSet<&str>) -> Value {
    sanitize_inner(value, extra_sensitive)
}

fn sanitize_inner(value: &Value, extra: &HashSet<&str>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if SENSITIVE_KEYS.contains(&k.as_str()) || extra.contains(k.as_str()) {
                    out.insert(k.clone(), redact(v));
                } else {
                    out.insert(k.clone(), sanitize_inner(v, extra));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| sanitize_inner(v, extra)).collect()),
        other => other.clone(),
    }
}

fn redact(value: &Value) -> Value {
    let len = match value {
        Value::String(s) if !s.is_empty() => Some(s.len()),
        Value::Null => None,
        Value::String(_) => None,
        _ => None,
    };
    match len {
        Some(n) => Value::String(format!("[REDACTED length: {n}]")),
        None => Value::String("[REDACTED]".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullNotifier;

    fn store(capacity: usize) -> ResourceStore {
        ResourceStore::new(capacity, Arc::new(AtomicBool::new(false)), Arc::new(NullNotifier))
    }

    fn resource(uri: &str) -> Resource {
        Resource {
            uri: uri.to_string(),
            name: uri.to_string(),
            description: None,
            mime_type: "text/plain".into(),
            text: "x".into(),
            annotations: ResourceAnnotations {
                last_modified: Utc::now(),
                audience: None,
            },
        }
    }

    #[test]
    fn resource_store_fifo_eviction() {
        let store = store(2);
        store.put(resource("a"));
        store.put(resource("b"));
        store.put(resource("c"));
        let uris: Vec<_> = store.list().into_iter().map(|r| r.uri).collect();
        assert_eq!(uris, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn overwrite_preserves_order() {
        let store = store(3);
        store.put(resource("a"));
        store.put(resource("b"));
        store.put(resource("a"));
        let uris: Vec<_> = store.list().into_iter().map(|r| r.uri).collect();
        assert_eq!(uris, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn sanitize_does_not_mutate_input() {
        let original = serde_json::json!({
            "username": "u@x",
            "accessToken": "secret_token_123",
            "nested": {"password": ""},
        });
        let snapshot = original.clone();
        let sanitized = sanitize(&original, &HashSet::new());
        assert_eq!(original, snapshot);
        assert_eq!(sanitized["username"], "u@x");
        assert_eq!(sanitized["accessToken"], "[REDACTED length: 16]");
        assert_eq!(sanitized["nested"]["password"], "[REDACTED]");
    }

    #[test]
    fn sanitize_recurses_through_arrays() {
        let original = serde_json::json!([{"password": "abcd"}, {"password": ""}]);
        let sanitized = sanitize(&original, &HashSet::new());
        assert_eq!(sanitized[0]["password"], "[REDACTED length: 4]");
        assert_eq!(sanitized[1]["password"], "[REDACTED]");
    }

    #[test]
    fn no_notification_during_shutdown() {
        struct CountingNotifier(std::sync::atomic::AtomicUsize);
        impl Notifier for CountingNotifier {
            fn tools_list_changed(&self) {}
            fn resources_list_changed(&self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
            fn prompts_list_changed(&self) {}
            fn log(&self, _: crate::notify::LogLevel, _: &str, _: Value) {}
            fn progress(&self, _: crate::notify::ProgressToken, _: f64, _: Option<f64>) {}
        }

        let shutting_down = Arc::new(AtomicBool::new(true));
        let notifier = Arc::new(CountingNotifier(std::sync::atomic::AtomicUsize::new(0)));
        let store = ResourceStore::new(10, shutting_down, notifier.clone());
        store.put(resource("a"));
        assert_eq!(notifier.0.load(Ordering::Relaxed), 0);
    }
}
