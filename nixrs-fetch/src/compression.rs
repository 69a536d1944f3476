use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use async_compression::tokio::bufread::{BzDecoder, GzipDecoder, XzDecoder, ZstdDecoder};
use tokio::io::{AsyncRead, BufReader};
use tracing::debug;

use crate::error::Error;

/// Compression label as found in the `Compression` field of a narinfo.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Compression {
    None,
    #[default]
    BZip2,
    Compress,
    GRZip,
    GZip,
    LRZip,
    LZ4,
    LZip,
    LZMA,
    LZOP,
    XZ,
    ZStd,
    BR,
    Unknown(String),
}

impl Compression {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether [`decompress`] can decode this compression.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::None | Self::BZip2 | Self::GZip | Self::XZ | Self::ZStd
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "none",
            Self::BZip2 => "bzip2",
            Self::Compress => "compress",
            Self::GRZip => "grzip",
            Self::GZip => "gzip",
            Self::LRZip => "lrzip",
            Self::LZ4 => "lz4",
            Self::LZip => "lzip",
            Self::LZMA => "lzma",
            Self::LZOP => "lzop",
            Self::XZ => "xz",
            Self::ZStd => "zstd",
            Self::BR => "br",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Compression {
    fn from(value: String) -> Self {
        From::from(value.as_ref())
    }
}

impl<'a> From<&'a str> for Compression {
    fn from(value: &'a str) -> Self {
        match value {
            "none" => Self::None,
            "" => Self::BZip2,
            "bzip2" => Self::BZip2,
            "compress" => Self::Compress,
            "grzip" => Self::GRZip,
            "gzip" => Self::GZip,
            "lrzip" => Self::LRZip,
            "lz4" => Self::LZ4,
            "lzip" => Self::LZip,
            "lzma" => Self::LZMA,
            "lzop" => Self::LZOP,
            "xz" => Self::XZ,
            "zstd" => Self::ZStd,
            "br" => Self::BR,
            s => Self::Unknown(s.to_string()),
        }
    }
}

impl FromStr for Compression {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

/// Decompressed view of a raw archive stream.
///
/// Owns the raw reader: dropping it drops the raw reader exactly once.
pub type DecompressReader<'a> = Box<dyn AsyncRead + Unpin + Send + 'a>;

/// Wrap `reader` with the decoder for `compression`.
///
/// Fails with [`Error::UnsupportedCodec`] before touching `reader` when the
/// compression can't be decoded. Uncompressed streams are passed through
/// without any read-ahead buffering.
pub fn decompress<'a, R>(reader: R, compression: &Compression) -> Result<DecompressReader<'a>, Error>
where
    R: AsyncRead + Unpin + Send + 'a,
{
    if !compression.is_supported() {
        return Err(Error::UnsupportedCodec(compression.clone()));
    }
    debug!(%compression, "decompressing NAR");
    let reader: DecompressReader<'a> = match compression {
        Compression::None => Box::new(reader),
        Compression::BZip2 => Box::new(BzDecoder::new(BufReader::new(reader))),
        Compression::XZ => Box::new(XzDecoder::new(BufReader::new(reader))),
        Compression::ZStd => Box::new(ZstdDecoder::new(BufReader::new(reader))),
        Compression::GZip => Box::new(GzipDecoder::new(BufReader::new(reader))),
        _ => return Err(Error::UnsupportedCodec(compression.clone())),
    };
    Ok(reader)
}
