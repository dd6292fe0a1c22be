//! Drip payload types.
//!
//! # Design
//! `Subscriber` is the only type callers build up over time. Its custom
//! field map sits behind a mutex so several threads can add fields to one
//! shared instance without losing writes. Events, tag associations and the
//! `{ "subscribers": [...] }`-style envelopes are write-once wire values and
//! stay private to the crate.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::fields::{normalize_key, normalized_fields, CustomFields};

/// A contact record, identified by email.
pub struct Subscriber {
    email: String,
    custom_fields: Mutex<CustomFields>,
    tags: Vec<String>,
}

impl Subscriber {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            custom_fields: Mutex::new(CustomFields::new()),
            tags: Vec::new(),
        }
    }

    /// Replace the custom fields, normalizing every key.
    pub fn with_custom_fields(self, fields: &CustomFields) -> Self {
        *self.lock_fields() = normalized_fields(fields);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self.add_tag(tag);
        }
        self
    }

    /// Set one custom field under its normalized key.
    ///
    /// Takes `&self`: concurrent callers holding the same instance are
    /// serialized by the field lock.
    pub fn add_custom_field(&self, key: &str, value: impl Into<Value>) {
        let key = normalize_key(key);
        let value = value.into();
        self.lock_fields().insert(key, value);
    }

    /// Add a tag unless it is already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Snapshot of the current custom fields.
    pub fn custom_fields(&self) -> CustomFields {
        self.lock_fields().clone()
    }

    /// Look up a field; `key` is normalized first.
    pub fn custom_field(&self, key: &str) -> Option<Value> {
        self.lock_fields().get(&normalize_key(key)).cloned()
    }

    fn lock_fields(&self) -> MutexGuard<'_, CustomFields> {
        // Every critical section is a single map operation, so a poisoned
        // map is still consistent.
        self.custom_fields.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for Subscriber {
    fn clone(&self) -> Self {
        Self {
            email: self.email.clone(),
            custom_fields: Mutex::new(self.custom_fields()),
            tags: self.tags.clone(),
        }
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.email == other.email
            && self.tags == other.tags
            && self.custom_fields() == other.custom_fields()
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("email", &self.email)
            .field("custom_fields", &*self.lock_fields())
            .field("tags", &self.tags)
            .finish()
    }
}

#[derive(Serialize)]
struct SubscriberRef<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "CustomFields::is_empty")]
    custom_fields: &'a CustomFields,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    tags: &'a [String],
}

impl Serialize for Subscriber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.lock_fields();
        SubscriberRef {
            email: &self.email,
            custom_fields: &*fields,
            tags: &self.tags,
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize)]
struct SubscriberOwned {
    email: String,
    #[serde(default)]
    custom_fields: CustomFields,
    #[serde(default)]
    tags: Vec<String>,
}

impl<'de> Deserialize<'de> for Subscriber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let owned = SubscriberOwned::deserialize(deserializer)?;
        Ok(Subscriber::new(owned.email)
            .with_custom_fields(&owned.custom_fields)
            .with_tags(owned.tags))
    }
}

// ---------------------------------------------------------------------------
// Wire envelopes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub(crate) struct SubscribersBody<'a> {
    pub subscribers: &'a [Subscriber],
}

#[derive(Serialize)]
pub(crate) struct BatchesBody<'a> {
    pub batches: [SubscribersBody<'a>; 1],
}

#[derive(Serialize)]
pub(crate) struct Event<'a> {
    pub email: &'a str,
    pub action: &'a str,
}

#[derive(Serialize)]
pub(crate) struct EventsBody<'a> {
    pub events: [Event<'a>; 1],
}

#[derive(Serialize)]
pub(crate) struct TagAssociation<'a> {
    pub email: &'a str,
    pub tag: &'a str,
}

#[derive(Serialize)]
pub(crate) struct TagsBody<'a> {
    pub tags: [TagAssociation<'a>; 1],
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::thread;

    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_without_empty_fields_or_tags() {
        let sub = Subscriber::new("a@example.com");
        assert_eq!(serde_json::to_value(&sub).unwrap(), json!({"email": "a@example.com"}));
    }

    #[test]
    fn serializes_fields_and_tags() {
        let sub = Subscriber::new("a@example.com").with_tags(["vip", "beta"]);
        sub.add_custom_field("$First Name", "Jo");
        sub.add_custom_field("Orders", 3);
        assert_eq!(
            serde_json::to_value(&sub).unwrap(),
            json!({
                "email": "a@example.com",
                "custom_fields": {"first_name": "Jo", "orders": 3},
                "tags": ["vip", "beta"],
            })
        );
    }

    #[test]
    fn with_custom_fields_and_add_custom_field_normalize_the_same_way() {
        let input = json!({"$Plan Name": "pro"});
        let built = Subscriber::new("a@example.com").with_custom_fields(input.as_object().unwrap());
        let added = Subscriber::new("a@example.com");
        added.add_custom_field("$Plan Name", "pro");
        assert_eq!(built, added);
        assert_eq!(added.custom_field("plan_name"), Some(json!("pro")));
        assert_eq!(added.custom_field("$Plan Name"), Some(json!("pro")));
    }

    #[test]
    fn duplicate_tags_are_ignored() {
        let mut sub = Subscriber::new("a@example.com").with_tags(["vip"]);
        sub.add_tag("vip");
        sub.add_tag("churned");
        assert_eq!(sub.tags(), ["vip", "churned"]);
    }

    #[test]
    fn deserialize_normalizes_keys() {
        let sub: Subscriber = serde_json::from_value(json!({
            "email": "b@example.com",
            "custom_fields": {"Lifetime Value": 120.5},
        }))
        .unwrap();
        assert_eq!(sub.email(), "b@example.com");
        assert_eq!(sub.custom_field("lifetime_value"), Some(json!(120.5)));
        assert!(sub.tags().is_empty());
    }

    #[test]
    fn concurrent_add_custom_field_loses_nothing() {
        const THREADS: usize = 16;
        const PER_THREAD: usize = 50;

        let sub = Arc::new(Subscriber::new("c@example.com"));
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let sub = Arc::clone(&sub);
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        sub.add_custom_field(&format!("Field {t} {i}"), i as u64);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let keys: BTreeSet<String> = sub.custom_fields().keys().cloned().collect();
        assert_eq!(keys.len(), THREADS * PER_THREAD);
        for t in 0..THREADS {
            for i in 0..PER_THREAD {
                assert!(keys.contains(&format!("field_{t}_{i}")));
            }
        }
    }

    #[test]
    fn clone_is_a_snapshot() {
        let original = Subscriber::new("d@example.com");
        original.add_custom_field("a", 1);
        let copy = original.clone();
        original.add_custom_field("b", 2);
        assert_eq!(copy.custom_fields().len(), 1);
        assert_eq!(original.custom_fields().len(), 2);
    }
}
