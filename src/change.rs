//! Immutable change events between configuration snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Kind of change, for a single key or a whole property source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Updated,
    Removed,
}

/// Old and new value of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl PropertyChange {
    pub fn change_type(&self) -> ChangeType {
        match (&self.old_value, &self.new_value) {
            (None, _) => ChangeType::Added,
            (Some(_), None) => ChangeType::Removed,
            (Some(_), Some(_)) => ChangeType::Updated,
        }
    }
}

/// Differences between two configuration snapshots.
///
/// Every event carries a random version and the time it was built.
///
/// # Example
/// ```
/// use std::collections::HashMap;
/// use tamaya::change::{ChangeType, ConfigurationChange};
///
/// let old = HashMap::from([("a".to_string(), "1".to_string())]);
/// let new = HashMap::from([
///     ("a".to_string(), "2".to_string()),
///     ("b".to_string(), "3".to_string()),
/// ]);
/// let change = ConfigurationChange::builder().compare(&old, &new).build();
/// assert_eq!(change.len(), 2);
/// assert_eq!(change.change("a").unwrap().change_type(), ChangeType::Updated);
/// assert!(change.removed().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationChange {
    version: Uuid,
    timestamp: DateTime<Utc>,
    changes: BTreeMap<String, PropertyChange>,
}

impl ConfigurationChange {
    pub fn builder() -> ChangeBuilder {
        ChangeBuilder::default()
    }

    pub fn version(&self) -> Uuid {
        self.version
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// All changes, ordered by key.
    pub fn changes(&self) -> impl Iterator<Item = &PropertyChange> {
        self.changes.values()
    }

    pub fn change(&self, key: &str) -> Option<&PropertyChange> {
        self.changes.get(key)
    }

    pub fn added(&self) -> Vec<&PropertyChange> {
        self.of_type(ChangeType::Added)
    }

    pub fn updated(&self) -> Vec<&PropertyChange> {
        self.of_type(ChangeType::Updated)
    }

    pub fn removed(&self) -> Vec<&PropertyChange> {
        self.of_type(ChangeType::Removed)
    }

    fn of_type(&self, change_type: ChangeType) -> Vec<&PropertyChange> {
        self.changes
            .values()
            .filter(|c| c.change_type() == change_type)
            .collect()
    }

    pub fn is_key_affected(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// Collects key changes for a [`ConfigurationChange`] or
/// [`PropertySourceChange`].
#[derive(Debug, Default)]
pub struct ChangeBuilder {
    version: Option<Uuid>,
    timestamp: Option<DateTime<Utc>>,
    changes: BTreeMap<String, PropertyChange>,
}

impl ChangeBuilder {
    /// Records every difference between two snapshots.
    pub fn compare(mut self, old: &HashMap<String, String>, new: &HashMap<String, String>) -> Self {
        for (key, new_value) in new {
            match old.get(key) {
                None => self = self.added(key, new_value),
                Some(old_value) if old_value != new_value => {
                    self = self.updated(key, old_value, new_value)
                }
                Some(_) => {}
            }
        }
        for (key, old_value) in old {
            if !new.contains_key(key) {
                self = self.removed(key, old_value);
            }
        }
        self
    }

    pub fn added(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.record(key.into(), None, Some(value.into()))
    }

    pub fn updated(self, key: impl Into<String>, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.record(key.into(), Some(old.into()), Some(new.into()))
    }

    pub fn removed(self, key: impl Into<String>, old: impl Into<String>) -> Self {
        self.record(key.into(), Some(old.into()), None)
    }

    fn record(mut self, key: String, old_value: Option<String>, new_value: Option<String>) -> Self {
        self.changes.insert(
            key.clone(),
            PropertyChange {
                key,
                old_value,
                new_value,
            },
        );
        self
    }

    /// Fixes the version instead of generating a random one.
    pub fn version(mut self, version: Uuid) -> Self {
        self.version = Some(version);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> ConfigurationChange {
        ConfigurationChange {
            version: self.version.unwrap_or_else(Uuid::new_v4),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            changes: self.changes,
        }
    }
}

/// Change of a single property source: the source-level event plus the key
/// differences it caused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySourceChange {
    source_name: String,
    change_type: ChangeType,
    #[serde(flatten)]
    change: ConfigurationChange,
}

impl PropertySourceChange {
    pub fn builder(source_name: impl Into<String>, change_type: ChangeType) -> PropertySourceChangeBuilder {
        PropertySourceChangeBuilder {
            source_name: source_name.into(),
            change_type,
            changes: ChangeBuilder::default(),
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub fn version(&self) -> Uuid {
        self.change.version()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.change.timestamp()
    }

    pub fn changes(&self) -> impl Iterator<Item = &PropertyChange> {
        self.change.changes()
    }

    pub fn added(&self) -> Vec<&PropertyChange> {
        self.change.added()
    }

    pub fn updated(&self) -> Vec<&PropertyChange> {
        self.change.updated()
    }

    pub fn removed(&self) -> Vec<&PropertyChange> {
        self.change.removed()
    }

    pub fn is_key_affected(&self, key: &str) -> bool {
        self.change.is_key_affected(key)
    }

    pub fn is_empty(&self) -> bool {
        self.change.is_empty()
    }

    pub fn len(&self) -> usize {
        self.change.len()
    }
}

pub struct PropertySourceChangeBuilder {
    source_name: String,
    change_type: ChangeType,
    changes: ChangeBuilder,
}

impl PropertySourceChangeBuilder {
    pub fn compare(mut self, old: &HashMap<String, String>, new: &HashMap<String, String>) -> Self {
        self.changes = self.changes.compare(old, new);
        self
    }

    pub fn added(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.changes = self.changes.added(key, value);
        self
    }

    pub fn updated(mut self, key: impl Into<String>, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.changes = self.changes.updated(key, old, new);
        self
    }

    pub fn removed(mut self, key: impl Into<String>, old: impl Into<String>) -> Self {
        self.changes = self.changes.removed(key, old);
        self
    }

    pub fn build(self) -> PropertySourceChange {
        PropertySourceChange {
            source_name: self.source_name,
            change_type: self.change_type,
            change: self.changes.build(),
        }
    }
}
