//! Blocking HTTP used by the asset and self updaters.

use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;

use crate::constants;

pub trait HttpFetch: Send + Sync {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;

    fn get_text(&self, url: &str) -> Result<String> {
        let bytes = self.get_bytes(url)?;
        String::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8", url))
    }
}

pub struct HttpClient {
    client: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(constants::HTTP_USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

impl HttpFetch for HttpClient {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        debug!("[Http] GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("requesting {}", url))?
            .error_for_status()
            .with_context(|| format!("bad status from {}", url))?;
        let body = response.bytes().with_context(|| format!("reading body of {}", url))?;
        Ok(body.to_vec())
    }
}
