use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_compression::tokio::bufread::{BzEncoder, GzipEncoder, XzEncoder, ZstdEncoder};
use async_trait::async_trait;
use bytes::Bytes;
use nixrs_fetch::archive::test_data::{self, TestNarEvent, TestNarEvents};
use nixrs_fetch::archive::write_nar;
use nixrs_fetch::binary_cache::{BinaryCache, NarInfo, NarReader};
use nixrs_fetch::compression::Compression;
use nixrs_fetch::error::EntryKind;
use nixrs_fetch::hydra::OutputLookup;
use nixrs_fetch::{Error, Extracted, FetchClient, Settings, Target};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::TempDir;
use tokio::io::AsyncReadExt as _;

const HASH: &str = "ycbqd7822qcnasaqy0mmiv2j9n9m62yl";
const JOB: &str = "nixpkgs/trunk/hello.x86_64-linux";

enum Body {
    Data(Bytes),
    /// Yields the bytes, then stalls.
    Stalled(Bytes),
}

struct MemoryCache {
    nar_infos: BTreeMap<String, String>,
    files: BTreeMap<String, Body>,
    fetched: Arc<AtomicUsize>,
}

#[async_trait]
impl BinaryCache for MemoryCache {
    async fn nar_info(&self, hash: &str) -> Result<NarInfo, Error> {
        let text = self
            .nar_infos
            .get(hash)
            .ok_or_else(|| Error::NotFound(format!("{hash}.narinfo")))?;
        Ok(NarInfo::parse("/nix/store", text)?)
    }

    async fn nar_reader(&self, url: &str) -> Result<NarReader, Error> {
        self.fetched.fetch_add(1, Ordering::SeqCst);
        match self.files.get(url) {
            Some(Body::Data(data)) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(Body::Stalled(data)) => Ok(Box::new(
                tokio_test::io::Builder::new()
                    .read(&data[..])
                    .wait(Duration::from_secs(3600))
                    .build(),
            )),
            None => Err(Error::NotFound(url.into())),
        }
    }
}

/// Jobs starting with `slow/` never answer.
struct MemoryLookup(BTreeMap<String, String>);

#[async_trait]
impl OutputLookup for MemoryLookup {
    async fn resolve(&self, job: &str) -> Result<String, Error> {
        if job.starts_with("slow/") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.0
            .get(job)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job '{job}'")))
    }
}

struct Fixture {
    client: FetchClient<MemoryCache, MemoryLookup>,
    fetched: Arc<AtomicUsize>,
    dir: TempDir,
}

impl Fixture {
    fn output(&self) -> std::path::PathBuf {
        self.dir.path().join("result")
    }

    fn dir_entries(&self) -> Vec<String> {
        let mut ret: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        ret.sort();
        ret
    }
}

fn fixture(output_path: &str, compression: Compression, body: Body, settings: Settings) -> Fixture {
    let url = format!("nar/{HASH}.nar");
    let nar_info = format!(
        "StorePath: /nix/store/{HASH}-hello-2.12.1\nURL: {url}\nCompression: {compression}\nNarSize: 1\n"
    );
    let fetched = Arc::new(AtomicUsize::new(0));
    let cache = MemoryCache {
        nar_infos: [(HASH.to_string(), nar_info)].into_iter().collect(),
        files: [(url, body)].into_iter().collect(),
        fetched: fetched.clone(),
    };
    let lookup = MemoryLookup(
        [(JOB.to_string(), output_path.to_string())]
            .into_iter()
            .collect(),
    );
    Fixture {
        client: FetchClient::new(cache, lookup, settings),
        fetched,
        dir: tempfile::tempdir().unwrap(),
    }
}

async fn compress(compression: &Compression, data: &[u8]) -> Bytes {
    let mut out = Vec::new();
    match compression {
        Compression::None => out.extend_from_slice(data),
        Compression::BZip2 => {
            BzEncoder::new(data).read_to_end(&mut out).await.unwrap();
        }
        Compression::XZ => {
            XzEncoder::new(data).read_to_end(&mut out).await.unwrap();
        }
        Compression::ZStd => {
            ZstdEncoder::new(data).read_to_end(&mut out).await.unwrap();
        }
        Compression::GZip => {
            GzipEncoder::new(data).read_to_end(&mut out).await.unwrap();
        }
        other => panic!("no encoder for {other}"),
    }
    out.into()
}

fn nar(events: &TestNarEvents) -> Bytes {
    write_nar(events.iter())
}

fn named_file_events() -> TestNarEvents {
    vec![
        TestNarEvent::StartDirectory,
        TestNarEvent::Entry {
            name: Bytes::from_static(b"README"),
        },
        TestNarEvent::File {
            executable: false,
            contents: Bytes::from_static(b"not this one"),
        },
        TestNarEvent::Entry {
            name: Bytes::from_static(b"hello-2.12.1"),
        },
        TestNarEvent::File {
            executable: true,
            contents: Bytes::from_static(b"#!/bin/sh\necho hello\n"),
        },
        TestNarEvent::EndDirectory,
    ]
}

fn assert_untouched(fixture: &Fixture) {
    assert!(!fixture.output().exists());
    assert_eq!(fixture.dir_entries(), Vec::<String>::new());
}

#[rstest]
#[case::none(Compression::None)]
#[case::bzip2(Compression::BZip2)]
#[case::xz(Compression::XZ)]
#[case::zstd(Compression::ZStd)]
#[case::gzip(Compression::GZip)]
#[test_log::test(tokio::test)]
async fn extract_nested_file(#[case] compression: Compression) {
    let body = compress(&compression, &nar(&test_data::hello_in_dir())).await;
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1/a/b.txt"),
        compression,
        Body::Data(body),
        Settings::default(),
    );
    let res = fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap();
    assert_eq!(
        res,
        Extracted {
            size: 5,
            executable: false
        }
    );
    assert_eq!(std::fs::read(fixture.output()).unwrap(), b"hello");
    assert_eq!(fixture.dir_entries(), vec!["result".to_string()]);
}

#[test_log::test(tokio::test)]
async fn extract_file_named_like_store_object() {
    let body = compress(&Compression::XZ, &nar(&named_file_events())).await;
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1/"),
        Compression::XZ,
        Body::Data(body),
        Settings::default(),
    );
    let res = fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap();
    assert!(res.executable);
    assert_eq!(
        std::fs::read(fixture.output()).unwrap(),
        b"#!/bin/sh\necho hello\n"
    );
}

#[test_log::test(tokio::test)]
async fn extract_store_object_that_is_a_file() {
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1"),
        Compression::XZ,
        Body::Data(compress(&Compression::XZ, &nar(&test_data::text_file())).await),
        Settings::default(),
    );
    let res = fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap();
    assert_eq!(
        res,
        Extracted {
            size: 12,
            executable: false
        }
    );
    assert_eq!(std::fs::read(fixture.output()).unwrap(), b"Hello world!");
    assert_eq!(fixture.dir_entries(), vec!["result".to_string()]);
}

#[test_log::test(tokio::test)]
async fn store_object_is_a_symlink() {
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1"),
        Compression::None,
        Body::Data(nar(&test_data::symlink())),
        Settings::default(),
    );
    let err = fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::UnsupportedEntryType {
                kind: EntryKind::Symlink,
                ..
            }
        ),
        "{err:?}"
    );
    assert_untouched(&fixture);
}

#[cfg(unix)]
#[rstest]
#[case::regular(format!("/nix/store/{HASH}-hello-2.12.1/a/b.txt"), test_data::hello_in_dir(), 0o644)]
#[case::executable(format!("/nix/store/{HASH}-hello-2.12.1"), named_file_events(), 0o755)]
#[case::root_file(format!("/nix/store/{HASH}-hello-2.12.1"), test_data::text_file(), 0o644)]
#[test_log::test(tokio::test)]
async fn output_mode(#[case] output_path: String, #[case] events: TestNarEvents, #[case] mode: u32) {
    use std::os::unix::fs::PermissionsExt as _;

    let fixture = fixture(
        &output_path,
        Compression::None,
        Body::Data(nar(&events)),
        Settings::default(),
    );
    fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap();
    let meta = std::fs::metadata(fixture.output()).unwrap();
    assert_eq!(meta.permissions().mode() & 0o777, mode);
}

#[test_log::test(tokio::test)]
async fn replaces_existing_output() {
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1/a/b.txt"),
        Compression::None,
        Body::Data(nar(&test_data::hello_in_dir())),
        Settings::default(),
    );
    std::fs::write(fixture.output(), b"old contents that are longer").unwrap();
    fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap();
    assert_eq!(std::fs::read(fixture.output()).unwrap(), b"hello");
}

#[test_log::test(tokio::test)]
async fn target_not_in_archive() {
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1/empty/file"),
        Compression::None,
        Body::Data(nar(&test_data::empty_dir_in_dir())),
        Settings::default(),
    );
    let err = fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");
    assert_eq!(err.exit_code(), 2);
    assert_untouched(&fixture);
}

#[test_log::test(tokio::test)]
async fn target_is_symlink() {
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1/dir/more/link"),
        Compression::None,
        Body::Data(nar(&test_data::dir_example())),
        Settings::default(),
    );
    let err = fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::UnsupportedEntryType {
                kind: EntryKind::Symlink,
                ..
            }
        ),
        "{err:?}"
    );
    assert_untouched(&fixture);
}

#[rstest]
#[case::lz4(Compression::LZ4)]
#[case::brotli(Compression::BR)]
#[case::unknown(Compression::Unknown("snappy".into()))]
#[test_log::test(tokio::test)]
async fn unsupported_compression_is_not_fetched(#[case] compression: Compression) {
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1/a/b.txt"),
        compression.clone(),
        Body::Data(nar(&test_data::hello_in_dir())),
        Settings::default(),
    );
    let err = fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedCodec(ref c) if *c == compression), "{err:?}");
    assert_eq!(fixture.fetched.load(Ordering::SeqCst), 0);
    assert_untouched(&fixture);
}

#[test_log::test(tokio::test)]
async fn unknown_job() {
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1"),
        Compression::None,
        Body::Data(nar(&test_data::text_file())),
        Settings::default(),
    );
    let err = fixture
        .client
        .extract_file("nixpkgs/trunk/missing", &fixture.output())
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");
    assert_untouched(&fixture);
}

#[test_log::test(tokio::test)]
async fn missing_nar_info() {
    let fixture = fixture(
        "/nix/store/55xkmqns51sw7nrgykp5vnz36w4fr3cw-nix-2.1.3",
        Compression::None,
        Body::Data(nar(&test_data::text_file())),
        Settings::default(),
    );
    let err = fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");
    assert_eq!(fixture.fetched.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test)]
async fn bad_store_path() {
    let fixture = fixture(
        "/gnu/store/whatever",
        Compression::None,
        Body::Data(nar(&test_data::text_file())),
        Settings::default(),
    );
    let err = fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadStorePath(_)), "{err:?}");
}

#[test_log::test(tokio::test)]
async fn truncated_download_keeps_existing_output() {
    let mut data = nar(&test_data::two_files(
        Bytes::from_static(b"first"),
        Bytes::from_static(b"second file contents"),
    ))
    .to_vec();
    // cut into the content of `second`
    data.truncate(data.len() - 60);
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1/second"),
        Compression::None,
        Body::Data(data.into()),
        Settings::default(),
    );
    std::fs::write(fixture.output(), b"previous").unwrap();
    let err = fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Truncated), "{err:?}");
    assert_eq!(std::fs::read(fixture.output()).unwrap(), b"previous");
    assert_eq!(fixture.dir_entries(), vec!["result".to_string()]);
}

#[test_log::test(tokio::test)]
async fn timeout_cancels_stalled_download() {
    let data = nar(&test_data::two_files(
        Bytes::from_static(b"first"),
        Bytes::from_static(b"second"),
    ));
    let stalled = data.slice(..data.len() / 2);
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1/second"),
        Compression::None,
        Body::Stalled(stalled),
        Settings {
            timeout: Some(Duration::from_millis(100)),
            ..Settings::default()
        },
    );
    let err = fixture
        .client
        .extract_file(JOB, &fixture.output())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled), "{err:?}");
    assert_eq!(err.exit_code(), 3);
    assert_untouched(&fixture);
}

#[test_log::test(tokio::test)]
async fn timeout_covers_job_lookup() {
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1/a/b.txt"),
        Compression::None,
        Body::Data(nar(&test_data::hello_in_dir())),
        Settings {
            timeout: Some(Duration::from_millis(100)),
            ..Settings::default()
        },
    );
    let err = fixture
        .client
        .extract_file("slow/hello", &fixture.output())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled), "{err:?}");
    assert_eq!(fixture.fetched.load(Ordering::SeqCst), 0);
    assert_untouched(&fixture);
}

#[test_log::test(tokio::test)]
async fn extract_to_sink() {
    let fixture = fixture(
        &format!("/nix/store/{HASH}-hello-2.12.1"),
        Compression::None,
        Body::Data(nar(&test_data::dir_example())),
        Settings::default(),
    );
    let store_path = fixture.client.resolve(JOB).await.unwrap();
    let info = fixture.client.nar_info(&store_path).await.unwrap();
    let mut sink = Vec::new();
    let res = fixture
        .client
        .extract_to(
            &info,
            &Target::Path("dir/more/Deep".parse().unwrap()),
            &mut sink,
        )
        .await
        .unwrap();
    assert!(res.executable);
    assert_eq!(sink, b"Very cool stuff");
    assert_eq!(fixture.fetched.load(Ordering::SeqCst), 1);
}
