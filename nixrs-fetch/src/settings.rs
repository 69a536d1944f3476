use std::time::Duration;

use crate::wire::DEFAULT_MAX_TOKEN_LEN;

pub const DEFAULT_CACHE_URL: &str = "https://cache.nixos.org/";
pub const DEFAULT_HYDRA_URL: &str = "https://hydra.nixos.org/";
pub const DEFAULT_STORE_DIR: &str = "/nix/store";

/// Configuration of a [`FetchClient`](crate::FetchClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root of the binary cache serving narinfo files and NARs.
    pub cache_url: String,
    /// Hydra instance used to resolve jobs to store paths.
    pub hydra_url: String,
    pub store_dir: String,
    /// Deadline for a whole extraction, covering the job lookup, the narinfo
    /// fetch and the NAR download.
    pub timeout: Option<Duration>,
    pub max_token_len: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            cache_url: DEFAULT_CACHE_URL.into(),
            hydra_url: DEFAULT_HYDRA_URL.into(),
            store_dir: DEFAULT_STORE_DIR.into(),
            timeout: None,
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
        }
    }
}
