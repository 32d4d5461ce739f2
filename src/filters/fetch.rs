//! Where filter content comes from: an HTTP GET or a local file.

use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::warn;

use super::store::ChunkSource;
use crate::error::{FilterError, FilterResult};

const CHUNK_SIZE: usize = 64 * 1024;

/// Build the HTTP client shared by every refresh.
pub fn build_client(timeout: Duration, user_agent: &str) -> FilterResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()?)
}

/// An open body stream, read chunk by chunk.
pub enum Source {
    Local(File),
    Remote(reqwest::Response),
}

impl Source {
    /// Open `url`: absolute paths are read from disk, anything else is fetched.
    /// Only `200 OK` counts as a successful response.
    pub async fn open(client: &reqwest::Client, url: &str) -> FilterResult<Self> {
        if Path::new(url).is_absolute() {
            return Ok(Source::Local(File::open(url).await?));
        }

        let response = client.get(url).send().await.map_err(|e| {
            warn!("requesting filter from {}, skip: {}", url, e);
            FilterError::from(e)
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!("got status code {} from {}, skip", status.as_u16(), url);
            return Err(FilterError::HttpStatus(status.as_u16()));
        }

        Ok(Source::Remote(response))
    }
}

impl ChunkSource for Source {
    async fn next_chunk(&mut self) -> FilterResult<Option<Vec<u8>>> {
        match self {
            Source::Local(file) => {
                let mut buf = vec![0u8; CHUNK_SIZE];
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(buf))
            }
            Source::Remote(response) => Ok(response.chunk().await?.map(|b| b.to_vec())),
        }
    }
}
