use std::io;

use async_trait::async_trait;
use futures::TryStreamExt as _;
use reqwest::{Client, IntoUrl, Response, StatusCode, Url};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use super::{BinaryCache, NarInfo, NarReader};
use crate::error::Error;
use crate::settings::DEFAULT_STORE_DIR;

#[derive(Clone, Debug)]
pub struct HttpBinaryCache {
    store_dir: String,
    client: Client,
    base_url: Url,
}

impl HttpBinaryCache {
    pub fn new<U: IntoUrl>(url: U) -> Result<HttpBinaryCache, Error> {
        Self::with_store(url, DEFAULT_STORE_DIR)
    }

    pub fn with_store<U: IntoUrl, S: Into<String>>(
        url: U,
        store_dir: S,
    ) -> Result<HttpBinaryCache, Error> {
        let client = reqwest::Client::builder().build()?;
        Self::with_client(client, url, store_dir)
    }

    pub fn with_client<U: IntoUrl, S: Into<String>>(
        client: Client,
        url: U,
        store_dir: S,
    ) -> Result<HttpBinaryCache, Error> {
        let mut base_url = url.into_url()?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(HttpBinaryCache {
            store_dir: store_dir.into(),
            client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<Response, Error> {
        let url = self.base_url.join(path)?;
        debug!(%url, "GET");
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            Err(Error::NotFound(url.to_string()))
        } else {
            Ok(resp.error_for_status()?)
        }
    }
}

#[async_trait]
impl BinaryCache for HttpBinaryCache {
    async fn nar_info(&self, hash: &str) -> Result<NarInfo, Error> {
        let text = self.get(&format!("{hash}.narinfo")).await?.text().await?;
        let info = NarInfo::parse(&self.store_dir, &text)?;
        info!(url = %info.url, compression = %info.compression, "fetched narinfo");
        Ok(info)
    }

    async fn nar_reader(&self, url: &str) -> Result<NarReader, Error> {
        let resp = self.get(url).await?;
        debug!(content_length = ?resp.content_length(), "streaming NAR");
        let stream = resp.bytes_stream().map_err(io::Error::other);
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }
}
