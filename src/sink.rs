use core::future::Future;

use compact_str::CompactString;
use hashbrown::{HashMap, hash_map::Entry};
use parking_lot::Mutex;

use crate::{
    error::Error,
    record::StudentRecord,
    roll::{RollNumber, YearPartition},
};

/// Where harvested transcripts go. Writes must never replace an existing
/// record under the same key, and must be safe to call concurrently.
pub trait Sink {
    /// Stores `record` unless `key` is already present in `partition`.
    /// Returns whether anything was written.
    fn upsert_if_absent(
        &self,
        partition: &YearPartition,
        key: &RollNumber,
        record: &StudentRecord,
    ) -> impl Future<Output = Result<bool, Error>> + Send;
}

impl<S: Sink> Sink for &S {
    #[inline]
    fn upsert_if_absent(
        &self,
        partition: &YearPartition,
        key: &RollNumber,
        record: &StudentRecord,
    ) -> impl Future<Output = Result<bool, Error>> + Send {
        (**self).upsert_if_absent(partition, key, record)
    }
}

type Key = (CompactString, CompactString);

#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<HashMap<Key, StudentRecord>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, partition: &YearPartition, key: &RollNumber) -> Option<StudentRecord> {
        let key = (partition.collection(), key.to_string().into());
        self.records.lock().get(&key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Every stored roll number, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<CompactString> {
        let mut keys: Vec<_> = self.records.lock().keys().map(|(_, k)| k.clone()).collect();
        keys.sort_unstable();
        keys
    }
}

impl Sink for MemorySink {
    async fn upsert_if_absent(
        &self,
        partition: &YearPartition,
        key: &RollNumber,
        record: &StudentRecord,
    ) -> Result<bool, Error> {
        let key = (partition.collection(), key.to_string().into());
        Ok(match self.records.lock().entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(record.clone());
                true
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StudentInfo;

    fn record(name: &str) -> StudentRecord {
        StudentRecord {
            student_info: StudentInfo {
                roll_number: "21BEC030".into(),
                student_name: name.into(),
                father_name: String::new(),
            },
            ..StudentRecord::default()
        }
    }

    #[tokio::test]
    async fn first_write_wins() {
        let sink = MemorySink::new();
        let year = YearPartition::new("21").unwrap();
        let roll = RollNumber::parse("21BEC030").unwrap();

        assert!(sink.upsert_if_absent(&year, &roll, &record("first")).await.unwrap());
        assert!(!sink.upsert_if_absent(&year, &roll, &record("second")).await.unwrap());

        assert_eq!(sink.len(), 1);
        assert_eq!(
            sink.get(&year, &roll).unwrap().student_info.student_name,
            "first"
        );
    }

    #[tokio::test]
    async fn partitions_are_separate() {
        let sink = MemorySink::new();
        let roll = RollNumber::parse("21BEC030").unwrap();
        let a = YearPartition::new("21").unwrap();
        let b = YearPartition::new("22").unwrap();

        assert!(sink.upsert_if_absent(&a, &roll, &record("a")).await.unwrap());
        assert!(sink.upsert_if_absent(&b, &roll, &record("b")).await.unwrap());
        assert_eq!(sink.len(), 2);
    }
}
