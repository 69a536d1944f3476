use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt as _};

use super::{NarDecoder, NarEvent};
use crate::ByteString;
use crate::error::Error;

/// [`NarEvent`] with the file content inlined.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum TestNarEvent {
    StartDirectory,
    Entry {
        name: ByteString,
    },
    File {
        executable: bool,
        contents: ByteString,
    },
    Symlink {
        target: ByteString,
    },
    EndDirectory,
}

pub type TestNarEvents = Vec<TestNarEvent>;

/// Decode every event of a NAR, reading file contents into memory.
pub async fn read_nar<R>(decoder: &mut NarDecoder<R>) -> Result<TestNarEvents, Error>
where
    R: AsyncRead + Unpin,
{
    let mut events = TestNarEvents::new();
    while let Some(event) = decoder.next().await? {
        let event = match event {
            NarEvent::StartDirectory => TestNarEvent::StartDirectory,
            NarEvent::Entry { name } => TestNarEvent::Entry { name },
            NarEvent::File { executable, size } => {
                let mut buf = Vec::with_capacity(size as usize);
                decoder.contents().read_to_end(&mut buf).await?;
                if buf.len() as u64 != size {
                    return Err(Error::Truncated);
                }
                TestNarEvent::File {
                    executable,
                    contents: Bytes::from(buf),
                }
            }
            NarEvent::Symlink { target } => TestNarEvent::Symlink { target },
            NarEvent::EndDirectory => TestNarEvent::EndDirectory,
        };
        events.push(event);
    }
    Ok(events)
}

fn entry(name: &'static [u8]) -> TestNarEvent {
    TestNarEvent::Entry {
        name: Bytes::from_static(name),
    }
}

fn file(executable: bool, contents: &'static [u8]) -> TestNarEvent {
    TestNarEvent::File {
        executable,
        contents: Bytes::from_static(contents),
    }
}

pub fn text_file() -> TestNarEvents {
    vec![file(false, b"Hello world!")]
}

pub fn exec_file() -> TestNarEvents {
    vec![file(true, b"Very cool stuff")]
}

pub fn empty_file() -> TestNarEvents {
    vec![file(false, b"")]
}

pub fn empty_file_in_dir() -> TestNarEvents {
    vec![
        TestNarEvent::StartDirectory,
        entry(b"a=?.0.aA"),
        file(false, b""),
        TestNarEvent::EndDirectory,
    ]
}

pub fn empty_dir() -> TestNarEvents {
    vec![TestNarEvent::StartDirectory, TestNarEvent::EndDirectory]
}

pub fn empty_dir_in_dir() -> TestNarEvents {
    vec![
        TestNarEvent::StartDirectory,
        entry(b"empty"),
        TestNarEvent::StartDirectory,
        TestNarEvent::EndDirectory,
        TestNarEvent::EndDirectory,
    ]
}

pub fn symlink() -> TestNarEvents {
    vec![TestNarEvent::Symlink {
        target: Bytes::from_static(b"../deep"),
    }]
}

/// `{"a/b.txt": "hello"}`
pub fn hello_in_dir() -> TestNarEvents {
    vec![
        TestNarEvent::StartDirectory,
        entry(b"a"),
        TestNarEvent::StartDirectory,
        entry(b"b.txt"),
        file(false, b"hello"),
        TestNarEvent::EndDirectory,
        TestNarEvent::EndDirectory,
    ]
}

/// A directory holding the files `first` and `second`.
pub fn two_files(first: ByteString, second: ByteString) -> TestNarEvents {
    vec![
        TestNarEvent::StartDirectory,
        entry(b"first"),
        TestNarEvent::File {
            executable: false,
            contents: first,
        },
        entry(b"second"),
        TestNarEvent::File {
            executable: false,
            contents: second,
        },
        TestNarEvent::EndDirectory,
    ]
}

pub fn dir_example() -> TestNarEvents {
    vec![
        TestNarEvent::StartDirectory,
        entry(b"dir"),
        TestNarEvent::StartDirectory,
        entry(b"more"),
        TestNarEvent::StartDirectory,
        entry(b"Deep"),
        file(true, b"Very cool stuff"),
        entry(b"deep"),
        TestNarEvent::StartDirectory,
        entry(b"empty.keep"),
        file(false, b""),
        TestNarEvent::EndDirectory,
        entry(b"link"),
        TestNarEvent::Symlink {
            target: Bytes::from_static(b"Deep"),
        },
        TestNarEvent::EndDirectory,
        entry(b"empty"),
        TestNarEvent::StartDirectory,
        TestNarEvent::EndDirectory,
        entry(b"keep"),
        file(false, b"Hello world!"),
        TestNarEvent::EndDirectory,
        entry(b"testing.txt"),
        file(false, b"Hello world!"),
        entry(b"z"),
        file(false, b"Same name, different directory"),
        TestNarEvent::EndDirectory,
    ]
}
