use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::Error;

mod http;
mod nar_info;

pub use self::http::HttpBinaryCache;
pub use self::nar_info::{NarInfo, ParseNarInfoError};

/// Raw, still compressed, NAR body.
pub type NarReader = Box<dyn AsyncRead + Send + Unpin>;

/// Metadata and raw fetch side of a binary cache.
#[async_trait]
pub trait BinaryCache {
    /// Fetch and parse `<hash>.narinfo`.
    ///
    /// Fails with [`Error::NotFound`] when the cache doesn't know the path.
    async fn nar_info(&self, hash: &str) -> Result<NarInfo, Error>;

    /// Open the body of the file at `url`, relative to the cache root.
    async fn nar_reader(&self, url: &str) -> Result<NarReader, Error>;
}
