use std::future::Future;
use std::path::Path;

use tokio::io::AsyncWrite;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::ByteString;
use crate::archive::NarDecoder;
use crate::binary_cache::{BinaryCache, HttpBinaryCache, NarInfo};
use crate::compression::{DecompressReader, decompress};
use crate::error::Error;
use crate::extract::{Extracted, NarPath, Target, extract_target};
use crate::hydra::{HydraClient, OutputLookup};
use crate::io::{CancelToken, CancelledReader};
use crate::settings::Settings;
use crate::store_path::StorePath;

/// Decoder over a decompressed NAR download.
pub type NarStream = NarDecoder<DecompressReader<'static>>;

/// Reusable client tying the output lookup, the binary cache and the
/// extractor together.
#[derive(Debug, Clone)]
pub struct FetchClient<C, L> {
    cache: C,
    lookup: L,
    settings: Settings,
}

pub type HttpFetchClient = FetchClient<HttpBinaryCache, HydraClient>;

impl HttpFetchClient {
    pub fn from_settings(settings: Settings) -> Result<HttpFetchClient, Error> {
        let client = reqwest::Client::builder().build()?;
        let cache = HttpBinaryCache::with_client(
            client.clone(),
            settings.cache_url.as_str(),
            settings.store_dir.clone(),
        )?;
        let lookup = HydraClient::with_client(client, settings.hydra_url.as_str())?;
        Ok(FetchClient::new(cache, lookup, settings))
    }
}

impl<C, L> FetchClient<C, L> {
    pub fn new(cache: C, lookup: L, settings: Settings) -> FetchClient<C, L> {
        FetchClient {
            cache,
            lookup,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// What to extract from the NAR of `path`.
///
/// A path into the store object selects that node. The store object itself
/// selects the NAR root when that is a regular file and otherwise the entry
/// named like the object.
pub fn target_path(path: &StorePath) -> Target {
    if path.rel_path().is_root() {
        let mut name = NarPath::root();
        name.push(ByteString::copy_from_slice(path.name().as_bytes()));
        Target::StoreObject(name)
    } else {
        Target::Path(path.rel_path().clone())
    }
}

/// Run `fut`, failing with [`Error::Cancelled`] once `deadline` has passed.
async fn until<F, T>(deadline: Option<Instant>, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    let Some(deadline) = deadline else {
        return fut.await;
    };
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(res) => res,
        Err(_) => {
            warn!("deadline expired before the download started");
            Err(Error::Cancelled)
        }
    }
}

impl<C, L> FetchClient<C, L>
where
    C: BinaryCache + Sync,
    L: OutputLookup + Sync,
{
    pub async fn resolve(&self, job: &str) -> Result<StorePath, Error> {
        let path = self.lookup.resolve(job).await?;
        Ok(StorePath::parse(&self.settings.store_dir, &path)?)
    }

    pub async fn nar_info(&self, path: &StorePath) -> Result<NarInfo, Error> {
        self.cache.nar_info(path.hash()).await
    }

    /// Start downloading the NAR described by `info`.
    ///
    /// The compression is checked before anything is fetched. The returned
    /// token aborts the download.
    pub async fn open_nar(&self, info: &NarInfo) -> Result<(NarStream, CancelToken), Error> {
        if !info.compression.is_supported() {
            return Err(Error::UnsupportedCodec(info.compression.clone()));
        }
        let raw = self.cache.nar_reader(&info.url).await?;
        let (raw, cancel) = CancelledReader::new(raw);
        let reader = decompress(raw, &info.compression)?;
        let decoder = NarDecoder::with_max_token_len(reader, self.settings.max_token_len);
        Ok((decoder, cancel))
    }

    /// Stream `target` out of the NAR described by `info` into `sink`.
    ///
    /// When a timeout is configured the download is cancelled once it
    /// expires and the extraction fails with [`Error::Cancelled`].
    pub async fn extract_to<W>(
        &self,
        info: &NarInfo,
        target: &Target,
        sink: &mut W,
    ) -> Result<Extracted, Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let deadline = self.deadline();
        self.extract_until(info, target, sink, deadline).await
    }

    fn deadline(&self) -> Option<Instant> {
        self.settings.timeout.map(|timeout| Instant::now() + timeout)
    }

    async fn extract_until<W>(
        &self,
        info: &NarInfo,
        target: &Target,
        sink: &mut W,
        deadline: Option<Instant>,
    ) -> Result<Extracted, Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let (mut decoder, cancel) = until(deadline, self.open_nar(info)).await?;
        let extraction = extract_target(&mut decoder, target, sink);
        let Some(deadline) = deadline else {
            return extraction.await;
        };
        tokio::pin!(extraction);
        tokio::select! {
            res = &mut extraction => res,
            _ = tokio::time::sleep_until(deadline) => {
                warn!(timeout = ?self.settings.timeout, "deadline expired, cancelling download");
                cancel.cancel();
                extraction.await
            }
        }
    }

    /// Write the file produced by the latest build of `job` to `output`.
    ///
    /// The file is written next to `output` under a temporary name and only
    /// renamed into place once it is complete and synced. On failure
    /// `output` is left untouched. The configured timeout covers every step.
    #[instrument(skip(self, output), fields(output = %output.display()))]
    pub async fn extract_file(&self, job: &str, output: &Path) -> Result<Extracted, Error> {
        let deadline = self.deadline();
        let store_path = until(deadline, self.resolve(job)).await?;
        info!(%store_path, "resolved store path");
        let info = until(deadline, self.nar_info(&store_path)).await?;
        let target = target_path(&store_path);

        let dir = match output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let tmp = tempfile::Builder::new()
            .prefix(".nix-fetch-")
            .tempfile_in(dir)?;
        let mut file = tokio::fs::File::from_std(tmp.reopen()?);
        let extracted = self
            .extract_until(&info, &target, &mut file, deadline)
            .await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            let mode = if extracted.executable { 0o755 } else { 0o644 };
            file.set_permissions(std::fs::Permissions::from_mode(mode))
                .await?;
        }
        file.sync_all().await?;
        drop(file);
        tmp.persist(output).map_err(|err| err.error)?;
        info!(
            size = extracted.size,
            executable = extracted.executable,
            "wrote file"
        );
        Ok(extracted)
    }
}
