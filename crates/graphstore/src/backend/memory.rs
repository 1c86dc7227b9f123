//! In-memory object store

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ObjectStore, Tags, claim};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
struct Object {
    body: Vec<u8>,
    tags: Tags,
}

type Objects = BTreeMap<(String, String), Object>;

/// Object store kept in process memory.
///
/// Clones do not share state; wrap it in an `Arc` to share.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<Objects>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }

    fn objects(&self) -> MutexGuard<'_, Objects> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn id(bucket: &str, key: &str) -> (String, String) {
    (bucket.to_string(), key.to_string())
}

fn not_found(bucket: &str, key: &str) -> Error {
    Error::NoSuchKey {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

impl ObjectStore for MemoryStore {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects()
            .get(&id(bucket, key))
            .map(|o| o.body.clone())
            .ok_or_else(|| not_found(bucket, key))
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8], tags: &Tags) -> Result<()> {
        self.objects().insert(
            id(bucket, key),
            Object {
                body: body.to_vec(),
                tags: tags.clone(),
            },
        );
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.objects().remove(&id(bucket, key));
        Ok(())
    }

    fn get_tagging(&self, bucket: &str, key: &str) -> Result<Tags> {
        self.objects()
            .get(&id(bucket, key))
            .map(|o| o.tags.clone())
            .ok_or_else(|| not_found(bucket, key))
    }

    fn put_tagging(&self, bucket: &str, key: &str, tags: &Tags) -> Result<()> {
        let mut objects = self.objects();
        let object = objects
            .get_mut(&id(bucket, key))
            .ok_or_else(|| not_found(bucket, key))?;
        object.tags = tags.clone();
        Ok(())
    }

    fn claim_tag(&self, bucket: &str, key: &str, name: &str, value: &str) -> Result<String> {
        let mut objects = self.objects();
        let object = objects
            .get_mut(&id(bucket, key))
            .ok_or_else(|| not_found(bucket, key))?;
        Ok(claim(&mut object.tags, name, value))
    }
}
