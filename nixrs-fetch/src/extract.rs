use std::fmt;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use tracing::{debug, info};

use crate::ByteString;
use crate::archive::{NarDecoder, NarEvent};
use crate::error::{EntryKind, Error};

/// Path of a node relative to the root of a NAR.
///
/// The empty path names the root node itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NarPath(Vec<ByteString>);

impl NarPath {
    pub fn root() -> NarPath {
        NarPath(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[ByteString] {
        &self.0
    }

    pub fn push<S: Into<ByteString>>(&mut self, segment: S) {
        self.0.push(segment.into());
    }

    fn matches(&self, path: &[Option<ByteString>]) -> bool {
        self.0.len() == path.len()
            && self
                .0
                .iter()
                .zip(path)
                .all(|(target, current)| current.as_ref() == Some(target))
    }
}

impl<S> FromIterator<S> for NarPath
where
    S: Into<ByteString>,
{
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        NarPath(iter.into_iter().map(Into::into).collect())
    }
}

impl FromStr for NarPath {
    type Err = std::convert::Infallible;

    /// Splits on `/`, ignoring empty segments.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| ByteString::copy_from_slice(segment.as_bytes()))
            .collect())
    }
}

impl fmt::Display for NarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for (idx, segment) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", segment.escape_ascii())?;
        }
        Ok(())
    }
}

/// Regular file copied by [`extract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extracted {
    pub size: u64,
    pub executable: bool,
}

/// What [`extract_target`] looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The node at exactly this path.
    Path(NarPath),
    /// The root node when it is not a directory, otherwise the node at this
    /// path.
    StoreObject(NarPath),
}

impl Target {
    pub fn path(&self) -> &NarPath {
        match self {
            Target::Path(path) | Target::StoreObject(path) => path,
        }
    }

    fn matches(&self, path: &[Option<ByteString>], is_dir: bool) -> bool {
        match self {
            Target::Path(target) => target.matches(path),
            Target::StoreObject(target) => (path.is_empty() && !is_dir) || target.matches(path),
        }
    }
}

impl From<NarPath> for Target {
    fn from(path: NarPath) -> Self {
        Target::Path(path)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.path(), f)
    }
}

/// Copy the regular file at `target` out of the NAR into `sink`.
///
/// Every other file's content is skipped without being buffered. Decoding
/// stops as soon as the target's content has been copied, so nothing after
/// it is ever read. A target that is a symlink or directory is reported as
/// [`Error::UnsupportedEntryType`] and when no node has the path
/// [`Error::NotFound`] is returned. In both cases `sink` is left untouched.
pub async fn extract<R, W>(
    decoder: &mut NarDecoder<R>,
    target: &NarPath,
    sink: &mut W,
) -> Result<Extracted, Error>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    extract_target(decoder, &Target::Path(target.clone()), sink).await
}

/// [`extract`] for any [`Target`].
pub async fn extract_target<R, W>(
    decoder: &mut NarDecoder<R>,
    target: &Target,
    sink: &mut W,
) -> Result<Extracted, Error>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut path: Vec<Option<ByteString>> = Vec::new();
    while let Some(event) = decoder.next().await? {
        match event {
            NarEvent::StartDirectory => {
                if target.matches(&path, true) {
                    return Err(Error::UnsupportedEntryType {
                        path: path.iter().flatten().cloned().collect(),
                        kind: EntryKind::Directory,
                    });
                }
                path.push(None);
            }
            NarEvent::Entry { name } => {
                if let Some(current) = path.last_mut() {
                    *current = Some(name);
                }
            }
            NarEvent::EndDirectory => {
                path.pop();
            }
            NarEvent::File { executable, size } => {
                if target.matches(&path, false) {
                    info!(%target, size, executable, offset = decoder.offset(), "found file");
                    let copied = tokio::io::copy(&mut decoder.contents(), sink).await?;
                    if copied != size {
                        return Err(Error::Truncated);
                    }
                    sink.flush().await?;
                    return Ok(Extracted { size, executable });
                }
                decoder.skip_contents().await?;
            }
            NarEvent::Symlink { target: link } => {
                if target.matches(&path, false) {
                    debug!(%target, link = %link.escape_ascii(), "target is a symlink");
                    return Err(Error::UnsupportedEntryType {
                        path: path.iter().flatten().cloned().collect(),
                        kind: EntryKind::Symlink,
                    });
                }
            }
        }
    }
    Err(Error::NotFound(format!("'{target}' in NAR")))
}
