//! S3-compatible REST client built on reqwest.
//!
//! Uses path-style addressing (`{endpoint}/{bucket}/{key}`). Credentials are
//! supplied as an optional bearer token; request signing is left to a gateway
//! in front of the store.

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::{ObjectBody, ObjectStore, StoreError};
use crate::config::StoreConfig;

/// Region that takes no `LocationConstraint` when creating a bucket
pub const DEFAULT_REGION: &str = "us-east-1";

const CONTENT_MD5: &str = "content-md5";

pub struct S3Store {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    bucket_name: Regex,
}

impl S3Store {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            StoreError::Other(format!("invalid endpoint {}: {}", config.endpoint, e))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(StoreError::Other(format!(
                "endpoint cannot be used as a base URL: {}",
                config.endpoint
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let bucket_name = Regex::new(r"<Name>([^<]*)</Name>")
            .map_err(|e| StoreError::Other(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            token: config.token.clone().filter(|t| !t.is_empty()),
            bucket_name,
        })
    }

    fn url<'a, I>(&self, segments: I) -> Url
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Body of a create-bucket request for the given region
pub fn location_constraint_body(region: &str) -> String {
    if region == DEFAULT_REGION || region.is_empty() {
        return String::new();
    }
    format!(
        "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <LocationConstraint>{}</LocationConstraint>\
         </CreateBucketConfiguration>",
        region
    )
}

async fn error_for(response: Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND && body.contains("NoSuchBucket") {
        return StoreError::NoSuchContainer(body);
    }
    StoreError::Status {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn create_container(&self, name: &str, region: &str) -> Result<(), StoreError> {
        let url = self.url([name]);
        let response = self
            .request(Method::PUT, url)
            .body(location_constraint_body(region))
            .send()
            .await?;

        if response.status().is_success() {
            info!("Created bucket {} in {}", name, region);
            return Ok(());
        }

        if response.status() == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            if body.contains("BucketAlreadyOwnedByYou") {
                info!("Bucket {} already exists", name);
                return Ok(());
            }
            return Err(StoreError::Status {
                status: StatusCode::CONFLICT.as_u16(),
                body,
            });
        }

        Err(error_for(response).await)
    }

    async fn list_containers(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .request(Method::GET, self.endpoint.clone())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let body = response.text().await?;
        Ok(self
            .bucket_name
            .captures_iter(&body)
            .map(|caps| caps[1].to_string())
            .collect())
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: ObjectBody,
        content_digest: &str,
    ) -> Result<(), StoreError> {
        let url = self.url(std::iter::once(container).chain(key.split('/')));
        debug!("PUT {} ({} bytes)", url, body.len);

        let stream = ReaderStream::new(body.file);
        let response = self
            .request(Method::PUT, url)
            .header(CONTENT_LENGTH, body.len)
            .header(CONTENT_MD5, content_digest)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_for(response).await)
        }
    }
}
