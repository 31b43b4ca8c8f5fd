//! Shared plumbing for MockKkpClient: locking, scripted responses and
//! JSON merge patch

use crate::error::KkpError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Failure a scripted mock response resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// Typed 404
    NotFound,
    /// Non-success status with a body
    Status(u16, String),
    /// Body that could not be decoded
    Decode(String),
    /// 401/403
    Unauthorized,
}

impl MockFailure {
    pub(crate) fn into_error(self, what: &str) -> KkpError {
        match self {
            Self::NotFound => KkpError::NotFound(format!("{} not found", what)),
            Self::Status(status, message) => KkpError::Api { status, message },
            Self::Decode(message) => KkpError::Decode(message),
            Self::Unauthorized => KkpError::Authentication(format!("access to {} denied", what)),
        }
    }
}

/// A sequence of canned responses; the last entry repeats forever
#[derive(Debug, Clone)]
pub(crate) struct Script<T> {
    steps: VecDeque<Result<T, MockFailure>>,
}

impl<T: Clone> Script<T> {
    pub(crate) fn new(steps: Vec<Result<T, MockFailure>>) -> Self {
        Self { steps: steps.into() }
    }

    pub(crate) fn next(&mut self) -> Option<Result<T, MockFailure>> {
        if self.steps.len() > 1 {
            self.steps.pop_front()
        } else {
            self.steps.front().cloned()
        }
    }
}

/// Lock a mock store, recovering from poisoning caused by a panicking test
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply a JSON merge patch (RFC 7396) to `target`
pub(crate) fn merge_patch(target: &mut serde_json::Value, patch: &serde_json::Value) {
    let serde_json::Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = serde_json::Value::Object(serde_json::Map::new());
    }
    if let serde_json::Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(
                    target_map.entry(key.clone()).or_insert(serde_json::Value::Null),
                    value,
                );
            }
        }
    }
}

/// Round-trip `value` through JSON with `patch` applied
pub(crate) fn apply_patch<T>(value: &T, patch: &serde_json::Value) -> Result<T, KkpError>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut json = serde_json::to_value(value)?;
    merge_patch(&mut json, patch);
    serde_json::from_value(json).map_err(|e| KkpError::InvalidRequest(format!("patch rejected: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_last_step_is_sticky() {
        let mut script = Script::new(vec![Err(MockFailure::NotFound), Ok(1), Ok(2)]);
        assert_eq!(script.next(), Some(Err(MockFailure::NotFound)));
        assert_eq!(script.next(), Some(Ok(1)));
        assert_eq!(script.next(), Some(Ok(2)));
        assert_eq!(script.next(), Some(Ok(2)));
    }

    #[test]
    fn test_merge_patch_nested_and_null() {
        let mut doc = json!({"spec": {"version": "1.31.0", "cniPlugin": {"type": "cilium", "version": "1.15.0"}}, "labels": {"a": "1"}});
        merge_patch(&mut doc, &json!({"spec": {"version": "1.32.7", "cniPlugin": {"version": "1.16.9"}}, "labels": null}));
        assert_eq!(doc, json!({"spec": {"version": "1.32.7", "cniPlugin": {"type": "cilium", "version": "1.16.9"}}}));
    }
}
