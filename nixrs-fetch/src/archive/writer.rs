use bytes::{BufMut as _, Bytes, BytesMut};

use super::test_data::TestNarEvent;
use super::{
    NAR_VERSION_MAGIC_1, TOK_CLOSE, TOK_CONTENTS, TOK_DIRECTORY, TOK_ENTRY, TOK_EXECUTABLE,
    TOK_NAME, TOK_NODE, TOK_OPEN, TOK_REGULAR, TOK_SYMLINK, TOK_TARGET, TOK_TYPE,
};
use crate::wire::calc_padding;

fn put_nix_slice(buf: &mut BytesMut, src: &[u8]) {
    buf.put_u64_le(src.len() as u64);
    buf.put_slice(src);
    buf.put_bytes(0, calc_padding(src.len() as u64));
}

fn put_tokens(buf: &mut BytesMut, tokens: &[&[u8]]) {
    for token in tokens {
        put_nix_slice(buf, token);
    }
}

/// Closes a node and, inside a directory, the entry holding it.
fn close_node(buf: &mut BytesMut, level: usize) {
    put_nix_slice(buf, TOK_CLOSE);
    if level > 0 {
        put_nix_slice(buf, TOK_CLOSE);
    }
}

/// Serialize `events` into a NAR.
pub fn write_nar<'e, E>(events: E) -> Bytes
where
    E: IntoIterator<Item = &'e TestNarEvent>,
{
    let mut buf = BytesMut::new();
    put_tokens(&mut buf, &[NAR_VERSION_MAGIC_1, TOK_OPEN]);
    let mut level = 0;
    for event in events {
        match event {
            TestNarEvent::StartDirectory => {
                put_tokens(&mut buf, &[TOK_TYPE, TOK_DIRECTORY]);
                level += 1;
            }
            TestNarEvent::Entry { name } => {
                put_tokens(&mut buf, &[TOK_ENTRY, TOK_OPEN, TOK_NAME, &name[..], TOK_NODE, TOK_OPEN]);
            }
            TestNarEvent::File {
                executable,
                contents,
            } => {
                put_tokens(&mut buf, &[TOK_TYPE, TOK_REGULAR]);
                if *executable {
                    put_tokens(&mut buf, &[TOK_EXECUTABLE, &b""[..]]);
                }
                put_nix_slice(&mut buf, TOK_CONTENTS);
                put_nix_slice(&mut buf, contents);
                close_node(&mut buf, level);
            }
            TestNarEvent::Symlink { target } => {
                put_tokens(&mut buf, &[TOK_TYPE, TOK_SYMLINK, TOK_TARGET, &target[..]]);
                close_node(&mut buf, level);
            }
            TestNarEvent::EndDirectory => {
                level -= 1;
                close_node(&mut buf, level);
            }
        }
    }
    buf.freeze()
}
