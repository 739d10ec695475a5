//! Byte storage behind the session store.
//!
//! Keys are `/`-separated paths such as `u1/front/scan_3`. Listing is
//! numeric-aware and newest first, so `scan_10` comes before `scan_9`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::warn;

pub trait Storage: Send + Sync {
    fn exists(&self, key: &str) -> io::Result<bool>;

    /// Create or replace the bytes stored under `key`
    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()>;

    /// `ErrorKind::NotFound` if nothing is stored under `key`
    fn read(&self, key: &str) -> io::Result<Vec<u8>>;

    /// Keys starting with `prefix`, greatest first in natural order
    fn list_ordered(&self, prefix: &str) -> io::Result<Vec<String>>;
}

impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    fn exists(&self, key: &str) -> io::Result<bool> {
        (**self).exists(key)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        (**self).write(key, bytes)
    }

    fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        (**self).read(key)
    }

    fn list_ordered(&self, prefix: &str) -> io::Result<Vec<String>> {
        (**self).list_ordered(prefix)
    }
}

/// Compare strings treating runs of ASCII digits as numbers
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.as_bytes(), b.as_bytes());
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let da = a.iter().take_while(|c| c.is_ascii_digit()).count();
                let db = b.iter().take_while(|c| c.is_ascii_digit()).count();
                let na = trim_zeros(&a[..da]);
                let nb = trim_zeros(&b[..db]);
                let ord = na.len().cmp(&nb.len()).then_with(|| na.cmp(nb)).then_with(|| da.cmp(&db));
                if ord != Ordering::Equal {
                    return ord;
                }
                a = &a[da..];
                b = &b[db..];
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(y);
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

fn trim_zeros(digits: &[u8]) -> &[u8] {
    let zeros = digits.iter().take_while(|&&c| c == b'0').count();
    &digits[zeros..]
}

fn sort_newest_first(keys: &mut [String]) {
    keys.sort_by(|a, b| natural_cmp(b, a));
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "storage lock poisoned")
}

/// In-process storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, key: &str) -> io::Result<bool> {
        Ok(self.entries.read().map_err(|_| poisoned())?.contains_key(key))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        self.entries
            .read()
            .map_err(|_| poisoned())?
            .get(key)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no entry for {key}")))
    }

    fn list_ordered(&self, prefix: &str) -> io::Result<Vec<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let mut keys: Vec<String> = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        sort_newest_first(&mut keys);
        Ok(keys)
    }
}

/// Files under a root directory; key `a/b/c` lives at `root/a/b/c.<extension>`
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
    extension: String,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self { root: root.into(), extension: extension.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(key.split('/'));
        path.set_extension(&self.extension);
        path
    }
}

impl Storage for FsStorage {
    fn exists(&self, key: &str) -> io::Result<bool> {
        match fs::metadata(self.path_for(key)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // write beside the target and rename so readers never see a partial file
        let tmp = path.with_extension(format!("{}.tmp", self.extension));
        let result = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, &path));
        if result.is_err() {
            // cleanup only; the write or rename error is returned
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(key))
    }

    fn list_ordered(&self, prefix: &str) -> io::Result<Vec<String>> {
        let (dir, stem_prefix) = match prefix.rsplit_once('/') {
            Some((dir, stem)) => (Some(dir), stem),
            None => (None, prefix),
        };
        let mut dir_path = self.root.clone();
        if let Some(dir) = dir {
            dir_path.extend(dir.split('/'));
        }

        let entries = match fs::read_dir(&dir_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!("skipping non UTF-8 file name {}", path.display());
                continue;
            };
            if !stem.starts_with(stem_prefix) {
                continue;
            }
            keys.push(match dir {
                Some(dir) => format!("{dir}/{stem}"),
                None => stem.to_string(),
            });
        }
        sort_newest_first(&mut keys);
        Ok(keys)
    }
}
