use std::collections::BTreeMap;

use crate::error::Result;

pub mod local;
pub mod memory;

pub use local::LocalStore;
pub use memory::MemoryStore;

/// Key/value tags attached to an object
pub type Tags = BTreeMap<String, String>;

/// Object store the persistent graph lives in.
///
/// Modelled on a bucket/key store with per-object tagging:
/// - `MemoryStore` for tests and single-process runs
/// - `LocalStore` for a directory on disk
///
/// Reads and tag operations on a missing object fail with
/// [`crate::Error::NoSuchKey`]; deleting a missing object succeeds.
pub trait ObjectStore: Send + Sync {
    /// Read an object's body
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Create or overwrite an object, replacing its tags with `tags`
    fn put_object(&self, bucket: &str, key: &str, body: &[u8], tags: &Tags) -> Result<()>;

    /// Remove an object and its tags
    fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Read an object's tags
    fn get_tagging(&self, bucket: &str, key: &str) -> Result<Tags>;

    /// Replace an object's tags
    fn put_tagging(&self, bucket: &str, key: &str, tags: &Tags) -> Result<()>;

    /// Set tag `name` to `value` unless it already holds another non-empty
    /// value, returning the value held afterwards.
    ///
    /// Backends override this to make the check and the write one atomic
    /// step; the default reads the tags and then writes them.
    fn claim_tag(&self, bucket: &str, key: &str, name: &str, value: &str) -> Result<String> {
        let mut tags = self.get_tagging(bucket, key)?;
        let held = claim(&mut tags, name, value);
        if held == value {
            self.put_tagging(bucket, key, &tags)?;
        }
        Ok(held)
    }

    /// Remove all tags from an object
    fn delete_tagging(&self, bucket: &str, key: &str) -> Result<()> {
        self.put_tagging(bucket, key, &Tags::new())
    }

    /// Check whether an object exists
    fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.get_tagging(bucket, key) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Holder of tag `name` once `value` has claimed it in `tags`.
///
/// `tags` only changes when the tag was free.
pub(crate) fn claim(tags: &mut Tags, name: &str, value: &str) -> String {
    match tags.get(name).filter(|held| !held.is_empty()) {
        Some(held) => held.clone(),
        None => {
            tags.insert(name.to_string(), value.to_string());
            value.to_string()
        }
    }
}
