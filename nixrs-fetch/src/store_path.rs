use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::extract::NarPath;

const BASE32_CHARS: &[u8; 32] = b"0123456789abcdfghijklmnpqrsvwxyz";
const STORE_PATH_HASH_ENCODED_SIZE: usize = 32;
const MAX_NAME_LEN: usize = 211;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StorePathError {
    #[error("non-absolute store path {0:?}")]
    NonAbsolute(PathBuf),
    #[error("path {0:?} is not in store")]
    NotInStore(PathBuf),
    #[error("invalid store path hash length")]
    HashLength,
    #[error("invalid store path name length")]
    NameLength,
    #[error("invalid store path {ch} symbol at {0}", ch = char::from(*.1).escape_default())]
    Symbol(usize, u8),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("path '{path}' is not a valid store path: {error}")]
pub struct ParseStorePathError {
    pub path: String,
    #[source]
    pub error: StorePathError,
}

/// A store object together with the path of a node inside it.
///
/// ```
/// # use nixrs_fetch::store_path::StorePath;
/// let path = StorePath::parse(
///     "/nix/store",
///     "/nix/store/55xkmqns51sw7nrgykp5vnz36w4fr3cw-nix-2.1.3/bin/nix",
/// ).unwrap();
/// assert_eq!(path.hash(), "55xkmqns51sw7nrgykp5vnz36w4fr3cw");
/// assert_eq!(path.name(), "nix-2.1.3");
/// assert_eq!(path.rel_path().to_string(), "bin/nix");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath {
    hash: String,
    name: String,
    rel_path: NarPath,
}

impl StorePath {
    pub fn parse(store_dir: &str, s: &str) -> Result<StorePath, ParseStorePathError> {
        Self::parse_inner(store_dir, s).map_err(|error| ParseStorePathError {
            path: s.to_owned(),
            error,
        })
    }

    fn parse_inner(store_dir: &str, s: &str) -> Result<StorePath, StorePathError> {
        let path = Path::new(s);
        if !path.is_absolute() {
            return Err(StorePathError::NonAbsolute(path.into()));
        }
        let rest = s
            .strip_prefix(store_dir.trim_end_matches('/'))
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StorePathError::NotInStore(path.into()))?;
        let rest = rest.trim_end_matches('/');
        let (base, rel) = rest.split_once('/').unwrap_or((rest, ""));

        let base = base.as_bytes();
        if base.len() < STORE_PATH_HASH_ENCODED_SIZE + 1 {
            return Err(StorePathError::HashLength);
        }
        if base[STORE_PATH_HASH_ENCODED_SIZE] != b'-' {
            return Err(StorePathError::Symbol(
                STORE_PATH_HASH_ENCODED_SIZE,
                base[STORE_PATH_HASH_ENCODED_SIZE],
            ));
        }
        let (hash, name) = base.split_at(STORE_PATH_HASH_ENCODED_SIZE);
        if let Some(idx) = hash.iter().position(|ch| !BASE32_CHARS.contains(ch)) {
            return Err(StorePathError::Symbol(idx, hash[idx]));
        }
        let name = &name[1..];
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(StorePathError::NameLength);
        }
        if let Some(idx) = name.iter().position(|ch| !valid_name_char(*ch)) {
            return Err(StorePathError::Symbol(
                STORE_PATH_HASH_ENCODED_SIZE + 1 + idx,
                name[idx],
            ));
        }

        Ok(StorePath {
            hash: String::from_utf8_lossy(hash).into_owned(),
            name: String::from_utf8_lossy(name).into_owned(),
            rel_path: rel.parse().unwrap_or_default(),
        })
    }

    /// The 32 character nix-base32 hash part.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of a node inside the store object. Empty for the object itself.
    pub fn rel_path(&self) -> &NarPath {
        &self.rel_path
    }
}

fn valid_name_char(ch: u8) -> bool {
    matches!(ch, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'+' | b'-' | b'_' | b'?' | b'=' | b'.')
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash, self.name)?;
        if !self.rel_path.is_root() {
            write!(f, "/{}", self.rel_path)?;
        }
        Ok(())
    }
}
