use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, trace};

use super::{
    NAR_VERSION_MAGIC_1, NarEvent, TOK_CLOSE, TOK_CONTENTS, TOK_DIRECTORY, TOK_ENTRY,
    TOK_EXECUTABLE, TOK_NAME, TOK_NODE, TOK_OPEN, TOK_REGULAR, TOK_SYMLINK, TOK_TARGET, TOK_TYPE,
};
use crate::ByteString;
use crate::error::Error;
use crate::wire::{TokenReader, calc_aligned};

/*
Magic
"nix-archive-1" "(" => Node

Node
"type" "directory" => push frame, Entries
"type" "regular" ["executable" ""] "contents" u64 => Contents
"type" "symlink" "target" String => CloseNode

Contents
bytes padding => CloseNode

CloseNode
")" => CloseEntry

CloseEntry
no frames => Eof
")" => Entries

Entries
"entry" "(" "name" String "node" "(" => Node
")" => pop frame, CloseEntry
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Magic,
    Node,
    Contents { size: u64, remaining: u64 },
    CloseNode,
    CloseEntry,
    Entries,
    Eof,
}

#[derive(Debug, Default)]
struct DirFrame {
    entries: u64,
}

/// Pull based decoder turning a NAR byte stream into [`NarEvent`]s.
///
/// Directory nesting is tracked with an explicit stack of frames so the
/// nesting depth of the archive never grows the call stack. Nothing beyond
/// the current token is read from the underlying reader.
#[derive(Debug)]
pub struct NarDecoder<R> {
    reader: TokenReader<R>,
    frames: Vec<DirFrame>,
    state: State,
}

impl<R> NarDecoder<R> {
    pub fn new(reader: R) -> NarDecoder<R> {
        Self::from_token_reader(TokenReader::new(reader))
    }

    pub fn with_max_token_len(reader: R, max_token_len: u64) -> NarDecoder<R> {
        Self::from_token_reader(TokenReader::with_max_token_len(reader, max_token_len))
    }

    pub fn from_token_reader(reader: TokenReader<R>) -> NarDecoder<R> {
        NarDecoder {
            reader,
            frames: Vec::new(),
            state: State::Magic,
        }
    }

    /// Number of directories currently open.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Bytes consumed from the underlying reader so far.
    pub fn offset(&self) -> u64 {
        self.reader.offset()
    }

    /// Unread content bytes of the current file.
    pub fn remaining_contents(&self) -> u64 {
        match self.state {
            State::Contents { remaining, .. } => remaining,
            _ => 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R> NarDecoder<R>
where
    R: AsyncRead + Unpin,
{
    /// Decode the next event, or `None` once the root node is closed.
    pub async fn next(&mut self) -> Result<Option<NarEvent>, Error> {
        loop {
            match self.state {
                State::Magic => {
                    self.read_magic().await?;
                    self.expect(TOK_OPEN).await?;
                    self.state = State::Node;
                }
                State::Node => return self.read_node().await.map(Some),
                State::Contents { .. } => self.skip_contents().await?,
                State::CloseNode => {
                    self.expect(TOK_CLOSE).await?;
                    self.state = State::CloseEntry;
                }
                State::CloseEntry => {
                    if self.frames.is_empty() {
                        trace!(offset = self.offset(), "end of NAR");
                        self.state = State::Eof;
                    } else {
                        self.expect(TOK_CLOSE).await?;
                        self.state = State::Entries;
                    }
                }
                State::Entries => return self.read_entry().await.map(Some),
                State::Eof => return Ok(None),
            }
        }
    }

    /// Reader over the remaining content of the current file.
    ///
    /// Yields nothing when the last event was not a file.
    pub fn contents(&mut self) -> ContentsReader<'_, R> {
        ContentsReader { decoder: self }
    }

    /// Discard the rest of the current file's content and its padding.
    pub async fn skip_contents(&mut self) -> Result<(), Error> {
        if let State::Contents { size, remaining } = self.state {
            trace!(size, remaining, offset = self.offset(), "skipping contents");
            if remaining == size {
                self.reader.skip_content_stream(size).await?;
            } else {
                self.reader.drain(remaining).await?;
                self.reader.skip_padding(size).await?;
            }
            self.state = State::CloseNode;
        }
        Ok(())
    }

    async fn read_magic(&mut self) -> Result<(), Error> {
        let len = self.reader.read_u64().await?;
        if len != NAR_VERSION_MAGIC_1.len() as u64 {
            debug!(len, "bad NAR magic length");
            return Err(Error::NotANarArchive);
        }
        let mut magic = [0u8; calc_aligned(NAR_VERSION_MAGIC_1.len() as u64) as usize];
        self.reader.read_exact(&mut magic).await?;
        if &magic[..NAR_VERSION_MAGIC_1.len()] != NAR_VERSION_MAGIC_1 {
            debug!(magic = %magic.escape_ascii(), "bad NAR magic");
            return Err(Error::NotANarArchive);
        }
        Ok(())
    }

    async fn expect(&mut self, expected: &[u8]) -> Result<(), Error> {
        let token = self.reader.read_token().await?;
        if token != expected {
            return Err(Error::malformed(format!(
                "expected '{}' but got '{}'",
                expected.escape_ascii(),
                token.escape_ascii()
            )));
        }
        Ok(())
    }

    async fn read_node(&mut self) -> Result<NarEvent, Error> {
        self.expect(TOK_TYPE).await?;
        let node_type = self.reader.read_token().await?;
        match &node_type[..] {
            TOK_REGULAR => {
                let mut executable = false;
                let mut tag = self.reader.read_token().await?;
                if tag == TOK_EXECUTABLE {
                    self.expect(b"").await?;
                    executable = true;
                    tag = self.reader.read_token().await?;
                }
                if tag != TOK_CONTENTS {
                    return Err(Error::malformed(format!(
                        "expected 'contents' but got '{}'",
                        tag.escape_ascii()
                    )));
                }
                let size = self.reader.read_u64().await?;
                debug!(depth = self.depth(), executable, size, "file");
                self.state = State::Contents {
                    size,
                    remaining: size,
                };
                Ok(NarEvent::File { executable, size })
            }
            TOK_SYMLINK => {
                self.expect(TOK_TARGET).await?;
                let target = self.reader.read_token().await?;
                debug!(depth = self.depth(), target = %target.escape_ascii(), "symlink");
                self.state = State::CloseNode;
                Ok(NarEvent::Symlink { target })
            }
            TOK_DIRECTORY => {
                self.frames.push(DirFrame::default());
                debug!(depth = self.depth(), "start directory");
                self.state = State::Entries;
                Ok(NarEvent::StartDirectory)
            }
            other => Err(Error::malformed(format!(
                "unknown file type '{}'",
                other.escape_ascii()
            ))),
        }
    }

    async fn read_entry(&mut self) -> Result<NarEvent, Error> {
        let tag = self.reader.read_token().await?;
        if tag == TOK_CLOSE {
            let frame = self.frames.pop().unwrap_or_default();
            debug!(depth = self.depth(), entries = frame.entries, "end directory");
            self.state = State::CloseEntry;
            return Ok(NarEvent::EndDirectory);
        }
        if tag != TOK_ENTRY {
            return Err(Error::malformed(format!(
                "expected 'entry' or ')' but got '{}'",
                tag.escape_ascii()
            )));
        }
        self.expect(TOK_OPEN).await?;
        self.expect(TOK_NAME).await?;
        let name = self.reader.read_token().await?;
        validate_name(&name)?;
        self.expect(TOK_NODE).await?;
        self.expect(TOK_OPEN).await?;
        if let Some(frame) = self.frames.last_mut() {
            frame.entries += 1;
        }
        trace!(depth = self.depth(), name = %name.escape_ascii(), "entry");
        self.state = State::Node;
        Ok(NarEvent::Entry { name })
    }
}

fn validate_name(name: &ByteString) -> Result<(), Error> {
    if name.is_empty()
        || &name[..] == b"."
        || &name[..] == b".."
        || name.contains(&b'/')
        || name.contains(&0)
    {
        return Err(Error::malformed(format!(
            "NAR contains invalid file name '{}'",
            name.escape_ascii()
        )));
    }
    Ok(())
}

/// Content of the file announced by the last [`NarEvent::File`].
///
/// Borrows the decoder, so the next event can only be requested once the
/// reader is gone. Reads never go past the end of the content.
pub struct ContentsReader<'a, R> {
    decoder: &'a mut NarDecoder<R>,
}

impl<R> ContentsReader<'_, R> {
    pub fn remaining(&self) -> u64 {
        self.decoder.remaining_contents()
    }
}

impl<R> AsyncRead for ContentsReader<'_, R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let decoder = &mut *self.get_mut().decoder;
        let State::Contents { remaining, .. } = &mut decoder.state else {
            return Poll::Ready(Ok(()));
        };
        if *remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let n = {
            let mut limited = buf.take((*remaining).try_into().unwrap_or(usize::MAX));
            let ptr = limited.filled().as_ptr();
            ready!(Pin::new(&mut decoder.reader).poll_read(cx, &mut limited))?;

            // Ensure the pointer does not change from under us
            assert_eq!(ptr, limited.filled().as_ptr());
            limited.filled().len()
        };
        if n == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "EOF before end of content",
            )));
        }

        // SAFETY: This is guaranteed to be the number of initialized (and read)
        // bytes due to the invariants provided by `ReadBuf::filled`.
        unsafe { buf.assume_init(n) };
        buf.advance(n);
        *remaining -= n as u64;
        Poll::Ready(Ok(()))
    }
}
