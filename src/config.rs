//! Run configuration
//!
//! Settings shared by every component of a harvest run. The binary fills
//! these from command line flags; library users can start from `Default`.

use crate::species_api::ListingOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of images per species
pub const DEFAULT_IMAGE_COUNT: usize = 30;

/// Default dataset root, relative to the working directory
pub const DEFAULT_OUTPUT_ROOT: &str = "dataset";

/// HTTP behavior shared by the API client and the image downloader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Upper bound on any single request, connect through body
    pub timeout: Duration,
    /// Minimum spacing between consecutive API calls
    pub request_delay: Duration,
    /// Extra attempts after a transient API failure
    pub retries: u32,
    /// Pause before retrying a failed API call
    pub retry_delay: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            request_delay: Duration::from_millis(1000),
            retries: 2,
            retry_delay: Duration::from_secs(2),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Builds the blocking HTTP client used for the whole run
    pub fn build_http_client(&self) -> Result<reqwest::blocking::Client, reqwest::Error> {
        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .build()
    }
}

/// Everything a harvest run needs besides the species list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestConfig {
    /// Root folder receiving one subfolder per species
    pub output_root: PathBuf,
    pub client: ClientConfig,
    pub listing: ListingOptions,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            client: ClientConfig::default(),
            listing: ListingOptions::default(),
        }
    }
}
