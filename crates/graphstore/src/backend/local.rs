//! Object store backed by a directory
//!
//! Layout: `<root>/<bucket>/<key>` holds the body and
//! `<root>/<bucket>/<key>.tags.json` holds the tags. Both are read under a
//! shared `fs2` lock and written under an exclusive one, so concurrent
//! sessions on the same machine never see a half-written file. Claiming a
//! tag reads and rewrites the tags file under a single exclusive lock.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::{ObjectStore, Tags, claim};
use crate::error::{Error, Result};

const TAGS_SUFFIX: &str = ".tags.json";

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        if bucket.is_empty() || key.is_empty() {
            return Err(Error::Backend("bucket and key must not be empty".into()));
        }
        let relative = Path::new(key);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::Backend(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(bucket).join(relative))
    }

    fn tags_path(object: &Path) -> PathBuf {
        let mut name = object.as_os_str().to_os_string();
        name.push(TAGS_SUFFIX);
        PathBuf::from(name)
    }
}

fn not_found(bucket: &str, key: &str) -> Error {
    Error::NoSuchKey {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

/// Read a file under a shared lock
fn locked_read(path: &Path) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    FileExt::lock_shared(&file)?;
    let mut content = Vec::new();
    BufReader::new(&file).read_to_end(&mut content)?;
    Ok(content)
}

/// Write a file under an exclusive lock, truncating only once the lock is held
fn locked_write(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    #[allow(clippy::suspicious_open_options)]
    let file = OpenOptions::new().write(true).create(true).open(path)?;
    FileExt::lock_exclusive(&file)?;
    file.set_len(0)?;
    let mut writer = BufWriter::new(&file);
    writer.write_all(content)?;
    writer.flush()?;
    Ok(())
}

fn parse_tags(raw: &[u8]) -> Result<Tags> {
    if raw.is_empty() {
        return Ok(Tags::new());
    }
    Ok(serde_json::from_slice(raw)?)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl ObjectStore for LocalStore {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        match locked_read(&path) {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found(bucket, key)),
            Err(e) => Err(e.into()),
        }
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8], tags: &Tags) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        locked_write(&path, body)?;
        locked_write(&Self::tags_path(&path), &serde_json::to_vec(tags)?)?;
        log::trace!("wrote {}", path.display());
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        remove_if_exists(&Self::tags_path(&path))?;
        remove_if_exists(&path)?;
        Ok(())
    }

    fn get_tagging(&self, bucket: &str, key: &str) -> Result<Tags> {
        let path = self.object_path(bucket, key)?;
        if !path.exists() {
            return Err(not_found(bucket, key));
        }
        match locked_read(&Self::tags_path(&path)) {
            Ok(raw) => parse_tags(&raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Tags::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn put_tagging(&self, bucket: &str, key: &str, tags: &Tags) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if !path.exists() {
            return Err(not_found(bucket, key));
        }
        locked_write(&Self::tags_path(&path), &serde_json::to_vec(tags)?)?;
        Ok(())
    }

    fn claim_tag(&self, bucket: &str, key: &str, name: &str, value: &str) -> Result<String> {
        let path = self.object_path(bucket, key)?;
        if !path.exists() {
            return Err(not_found(bucket, key));
        }

        #[allow(clippy::suspicious_open_options)]
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(Self::tags_path(&path))?;
        FileExt::lock_exclusive(&file)?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        let mut tags = parse_tags(&raw)?;
        let held = claim(&mut tags, name, value);
        if held == value {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&serde_json::to_vec(&tags)?)?;
            file.flush()?;
        }
        Ok(held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_round_trip_with_nested_key() {
        let temp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(temp.path());
        let key = "persistent_graphs/dev/main.json";
        let tags = Tags::from([("lock".to_string(), "abc".to_string())]);

        store.put_object("state", key, br#"{"vpc":[]}"#, &tags).unwrap();

        assert!(temp.path().join("state").join(key).exists());
        assert_eq!(store.get_object("state", key).unwrap(), br#"{"vpc":[]}"#);
        assert_eq!(store.get_tagging("state", key).unwrap(), tags);
    }

    #[test]
    fn test_missing_object() {
        let temp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(temp.path());

        assert!(store.get_object("state", "a.json").unwrap_err().is_not_found());
        assert!(store.get_tagging("state", "a.json").unwrap_err().is_not_found());
        assert!(store.put_tagging("state", "a.json", &Tags::new()).unwrap_err().is_not_found());
        store.delete_object("state", "a.json").unwrap();
    }

    #[test]
    fn test_delete_removes_tags() {
        let temp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(temp.path());
        let tags = Tags::from([("lock".to_string(), "abc".to_string())]);
        store.put_object("state", "a.json", b"{}", &tags).unwrap();

        store.delete_object("state", "a.json").unwrap();
        store.put_object("state", "a.json", b"{}", &Tags::new()).unwrap();
        assert!(store.get_tagging("state", "a.json").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let temp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(temp.path());
        let err = store.get_object("state", "../outside.json").unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[test]
    fn test_concurrent_tag_writes() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::new(temp.path()));
        store.put_object("state", "a.json", b"{}", &Tags::new()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let tags = Tags::from([("writer".to_string(), format!("thread {i}"))]);
                    store.put_tagging("state", "a.json", &tags).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let tags = store.get_tagging("state", "a.json").unwrap();
        assert!(tags["writer"].starts_with("thread "));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::new(temp.path()));
        let tags = Tags::from([("team".to_string(), "infra".to_string())]);
        store.put_object("state", "a.json", b"{}", &tags).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mine = format!("session {i}");
                    let held = store.claim_tag("state", "a.json", "lock", &mine).unwrap();
                    (mine, held)
                })
            })
            .collect();
        let results: Vec<(String, String)> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<&String> = results
            .iter()
            .filter(|(mine, held)| mine == held)
            .map(|(mine, _)| mine)
            .collect();
        assert_eq!(winners.len(), 1);
        assert!(results.iter().all(|(_, held)| held == winners[0]));

        let tags = store.get_tagging("state", "a.json").unwrap();
        assert_eq!(&tags["lock"], winners[0]);
        assert_eq!(tags["team"], "infra");
    }
}
