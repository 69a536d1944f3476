use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, IntoUrl, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Error;

/// Resolves a job identifier to the store path of its latest output.
#[async_trait]
pub trait OutputLookup {
    async fn resolve(&self, job: &str) -> Result<String, Error>;
}

#[derive(Debug, Default, Deserialize)]
struct HydraBuild {
    #[serde(default)]
    buildoutputs: HydraBuildOutputs,
}

#[derive(Debug, Default, Deserialize)]
struct HydraBuildOutputs {
    #[serde(default)]
    out: Option<HydraBuildOutput>,
}

#[derive(Debug, Default, Deserialize)]
struct HydraBuildOutput {
    #[serde(default)]
    path: String,
}

fn output_path(job: &str, body: &str) -> Result<String, Error> {
    let build: HydraBuild = serde_json::from_str(body)?;
    match build.buildoutputs.out {
        Some(out) if !out.path.is_empty() => Ok(out.path),
        _ => Err(Error::NotFound(format!("output of job '{job}'"))),
    }
}

/// [`OutputLookup`] backed by the JSON API of a Hydra instance.
#[derive(Clone, Debug)]
pub struct HydraClient {
    client: Client,
    base_url: Url,
}

impl HydraClient {
    pub fn new<U: IntoUrl>(url: U) -> Result<HydraClient, Error> {
        let client = reqwest::Client::builder().build()?;
        Self::with_client(client, url)
    }

    pub fn with_client<U: IntoUrl>(client: Client, url: U) -> Result<HydraClient, Error> {
        let mut base_url = url.into_url()?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(HydraClient { client, base_url })
    }

    /// `job/<job>/latest` under the base URL, each `/`-separated part of the
    /// job name percent-encoded as one path segment.
    pub fn latest_url(&self, job: &str) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push("job")
            .extend(job.split('/'))
            .push("latest");
        Ok(url)
    }
}

#[async_trait]
impl OutputLookup for HydraClient {
    async fn resolve(&self, job: &str) -> Result<String, Error> {
        let url = self.latest_url(job)?;
        debug!(%url, "GET");
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("job '{job}'")));
        }
        let body = resp.error_for_status()?.text().await?;
        let path = output_path(job, &body)?;
        info!(job, %path, "resolved job");
        Ok(path)
    }
}
