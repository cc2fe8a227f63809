use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};

use crate::{GenerationError, ImageFetcher};

/// Plain GET of the generated image URL. Only `200 OK` counts as success.
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, GenerationError> {
        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(GenerationError::FetchStatus(response.status().as_u16()));
        }
        Ok(response.bytes().await?)
    }
}
