/*

## Root
- "nix-archive-1" :: String
- Node

## Node
- "(" :: String
- (FileNode | SymlinkNode | DirectoryNode)
- ")" :: String

## FileNode
- "type" => "regular" :: String
- ("executable" => "" :: String)?
- "contents" => Bytes

## SymlinkNode
- "type" => "symlink" :: String
- "target" => String

## DirectoryNode
- "type" => "directory" :: String
- ("entry" => DirEntry)*

### DirEntry

- "(" :: String
- "name" => String
- "node" => Node
- ")" :: String
 */

use crate::ByteString;

#[cfg(any(test, feature = "test"))]
pub mod arbitrary;
mod decoder;
#[cfg(any(test, feature = "test"))]
pub mod test_data;
#[cfg(any(test, feature = "test"))]
mod writer;

pub use decoder::{ContentsReader, NarDecoder};
#[cfg(any(test, feature = "test"))]
pub use writer::write_nar;

pub const NAR_VERSION_MAGIC_1: &[u8] = b"nix-archive-1";

pub(crate) const TOK_OPEN: &[u8] = b"(";
pub(crate) const TOK_CLOSE: &[u8] = b")";
pub(crate) const TOK_TYPE: &[u8] = b"type";
pub(crate) const TOK_REGULAR: &[u8] = b"regular";
pub(crate) const TOK_EXECUTABLE: &[u8] = b"executable";
pub(crate) const TOK_CONTENTS: &[u8] = b"contents";
pub(crate) const TOK_SYMLINK: &[u8] = b"symlink";
pub(crate) const TOK_TARGET: &[u8] = b"target";
pub(crate) const TOK_DIRECTORY: &[u8] = b"directory";
pub(crate) const TOK_ENTRY: &[u8] = b"entry";
pub(crate) const TOK_NAME: &[u8] = b"name";
pub(crate) const TOK_NODE: &[u8] = b"node";

/// One step of a pre-order walk over the archived file tree.
///
/// A [`File`](NarEvent::File) is followed by exactly `size` bytes of content
/// that have to be read through [`NarDecoder::contents`] or skipped before
/// the next event is decoded. [`NarDecoder::next`] skips whatever is left.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum NarEvent {
    StartDirectory,
    /// Names the node that follows within the enclosing directory.
    Entry {
        name: ByteString,
    },
    File {
        executable: bool,
        size: u64,
    },
    Symlink {
        target: ByteString,
    },
    EndDirectory,
}
