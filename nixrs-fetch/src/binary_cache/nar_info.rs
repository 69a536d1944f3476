use std::collections::BTreeMap;
use std::num::ParseIntError;

use thiserror::Error;

use crate::compression::Compression;
use crate::store_path::{ParseStorePathError, StorePath};

/// Parsed `.narinfo` file.
///
/// Hashes and signatures are kept in their textual form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarInfo {
    pub store_path: StorePath,
    pub url: String,
    pub compression: Compression,
    pub file_hash: Option<String>,
    pub file_size: Option<u64>,
    pub nar_hash: Option<String>,
    pub nar_size: Option<u64>,
    pub references: Vec<String>,
    pub deriver: Option<String>,
    pub sigs: Vec<String>,
    pub ca: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl NarInfo {
    pub fn parse(store_dir: &str, s: &str) -> Result<NarInfo, ParseNarInfoError> {
        let mut store_path = None;
        let mut url = String::new();
        let mut compression = Compression::default();
        let mut file_hash = None;
        let mut file_size = None;
        let mut nar_hash = None;
        let mut nar_size = None;
        let mut references = Vec::new();
        let mut deriver = None;
        let mut sigs = Vec::new();
        let mut ca = None;
        let mut extra = BTreeMap::new();

        for line in s.lines() {
            let Some((key, value)) = line.split_once(':') else {
                if !line.trim().is_empty() {
                    return Err(ParseNarInfoError::InvalidLine(line.into()));
                }
                continue;
            };
            let value = value.strip_prefix(' ').unwrap_or(value);
            match key {
                "StorePath" => store_path = Some(StorePath::parse(store_dir, value)?),
                "URL" => url = value.into(),
                "Compression" => compression = value.into(),
                "FileHash" => file_hash = Some(value.into()),
                "FileSize" => file_size = Some(value.parse::<u64>()?),
                "NarHash" => nar_hash = Some(value.into()),
                "NarSize" => nar_size = Some(value.parse::<u64>()?),
                "References" => {
                    references = value.split_whitespace().map(String::from).collect();
                }
                "Deriver" => {
                    if value != "unknown-deriver" {
                        deriver = Some(value.into());
                    }
                }
                "Sig" => sigs.push(value.into()),
                "CA" => {
                    if !value.is_empty() {
                        ca = Some(value.into());
                    }
                }
                _ => {
                    extra.insert(key.into(), value.into());
                }
            }
        }
        let store_path = store_path.ok_or(ParseNarInfoError::MissingStorePath)?;
        if url.is_empty() {
            return Err(ParseNarInfoError::MissingURL);
        }
        Ok(NarInfo {
            store_path,
            url,
            compression,
            file_hash,
            file_size,
            nar_hash,
            nar_size,
            references,
            deriver,
            sigs,
            ca,
            extra,
        })
    }
}

#[derive(Debug, Error)]
pub enum ParseNarInfoError {
    #[error("error parsing int {0}")]
    ParseIntError(
        #[from]
        #[source]
        ParseIntError,
    ),
    #[error("error parsing store path {0}")]
    ParseStorePathError(
        #[from]
        #[source]
        ParseStorePathError,
    ),
    #[error("invalid line '{0}'")]
    InvalidLine(String),
    #[error("StorePath missing from narinfo")]
    MissingStorePath,
    #[error("URL missing from narinfo")]
    MissingURL,
}
