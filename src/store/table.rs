//! Keyed record table with last-write-wins semantics.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::records::Record;

/// Records of one kind, ordered by key
#[derive(Debug, Clone)]
pub struct Table<R: Record> {
    rows: BTreeMap<R::Key, R>,
}

impl<R: Record> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<R: Record> Table<R> {
    /// Insert or replace a record, stamping `last_modified`.
    /// Returns the record previously stored under the same key.
    pub fn put(&mut self, mut record: R) -> Option<R> {
        record.touch(Utc::now());
        self.rows.insert(record.key(), record)
    }

    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.rows.get(key)
    }

    /// Apply `change` to an existing record and stamp it.
    ///
    /// A change that alters the key moves the record to its new key,
    /// replacing any record already stored there.
    pub fn update<F>(&mut self, key: &R::Key, change: F) -> Option<&R>
    where
        F: FnOnce(&mut R),
    {
        let mut record = self.rows.remove(key)?;
        change(&mut record);
        record.touch(Utc::now());

        let new_key = record.key();
        self.rows.insert(new_key.clone(), record);
        self.rows.get(&new_key)
    }

    /// All records matching `predicate`, in key order
    pub fn query<P>(&self, predicate: P) -> Vec<&R>
    where
        P: Fn(&R) -> bool,
    {
        self.rows.values().filter(|r| predicate(r)).collect()
    }

    /// First record matching `predicate`, in key order
    pub fn find<P>(&self, predicate: P) -> Option<&R>
    where
        P: Fn(&R) -> bool,
    {
        self.rows.values().find(|r| predicate(r))
    }

    pub fn delete(&mut self, key: &R::Key) -> Option<R> {
        self.rows.remove(key)
    }

    /// Remove every record matching `predicate`, returning how many went
    pub fn delete_where<P>(&mut self, predicate: P) -> usize
    where
        P: Fn(&R) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|_, r| !predicate(r));
        before - self.rows.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last_key(&self) -> Option<&R::Key> {
        self.rows.keys().next_back()
    }
}

impl<R: Record> FromIterator<R> for Table<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().map(|r| (r.key(), r)).collect(),
        }
    }
}

// Stored as a plain list of records; keys are derived on load.
impl<R: Record + Serialize> Serialize for Table<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows.values())
    }
}

impl<'de, R: Record + DeserializeOwned> Deserialize<'de> for Table<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = Vec::<R>::deserialize(deserializer)?;
        Ok(records.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::records::{FormPage, PendingForm};
    use chrono::{Duration, Utc};

    fn key(form: &str, name: &str) -> (String, String, String) {
        FormPage::key_for("case-1", form, name)
    }

    fn page(form: &str, name: &str, valid: bool) -> FormPage {
        FormPage {
            case_id: "case-1".to_string(),
            form_id: form.to_string(),
            page_name: name.to_string(),
            data: Default::default(),
            is_valid: valid,
            validation_errors: Vec::new(),
            last_modified: Utc::now() - Duration::days(1),
        }
    }

    #[test]
    fn test_put_stamps_last_modified() {
        let mut table = Table::default();
        let old = page("ecg", "p1", true);
        let stale = old.last_modified;
        table.put(old);

        let stored = table.get(&key("ecg", "p1")).unwrap();
        assert!(stored.last_modified > stale);
    }

    #[test]
    fn test_put_same_key_is_last_write_wins() {
        let mut table = Table::default();
        table.put(page("ecg", "p1", false));
        let previous = table.put(page("ecg", "p1", true));

        assert!(previous.is_some());
        assert_eq!(table.len(), 1);
        assert!(table.get(&key("ecg", "p1")).unwrap().is_valid);
    }

    #[test]
    fn test_query_and_delete_where() {
        let mut table = Table::default();
        table.put(page("ecg", "p1", true));
        table.put(page("ecg", "p2", false));
        table.put(page("xray", "p1", true));

        assert_eq!(table.query(|p| p.form_id == "ecg").len(), 2);
        assert_eq!(table.delete_where(|p| p.is_valid), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_update_missing_key_returns_none() {
        let mut table: Table<FormPage> = Table::default();
        assert!(table
            .update(&key("ecg", "nope"), |p| p.is_valid = true)
            .is_none());
    }

    #[test]
    fn test_update_that_changes_key_moves_record() {
        let now = Utc::now();
        let mut table = Table::default();
        table.put(PendingForm {
            id: 1,
            template_id: "ECG".to_string(),
            case_id: "case-1".to_string(),
            answers: Default::default(),
            volunteer_id: None,
            study_number: None,
            synced: false,
            created_at: now,
            last_modified: now,
        });

        let moved = table.update(&1, |f| f.id = 7).unwrap();
        assert_eq!(moved.id, 7);
        assert!(table.get(&1).is_none());
        assert_eq!(table.get(&7).unwrap().id, 7);
        assert_eq!(table.len(), 1);

        // keys still match records after a serialize/deserialize cycle
        let value = serde_json::to_value(&table).unwrap();
        let back: Table<PendingForm> = serde_json::from_value(value).unwrap();
        assert!(back.get(&7).is_some());
    }

    #[test]
    fn test_serializes_as_list() {
        let mut table = Table::default();
        table.put(page("ecg", "p1", true));

        let value = serde_json::to_value(&table).unwrap();
        assert!(value.is_array());

        let back: Table<FormPage> = serde_json::from_value(value).unwrap();
        assert_eq!(back.len(), 1);
    }
}
