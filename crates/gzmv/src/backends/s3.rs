//! 🪣📡🏗️ S3 Object Store — the cloud-to-cloud data paratrooper.
//!
//! COLD OPEN — EXT. AWS CONSOLE — 3:47 AM
//!
//! Two hundred log files sat in a bucket, fat and uncompressed, costing someone
//! money every single month. "Squeeze them," the ticket said. "Put them somewhere
//! else. Delete the originals." The cursor blinked. The S3ObjectStore blinked back.
//!
//! 🧠 Knowledge graph:
//! - Listing: `ListObjectsV2`, one page per call, continuation token in, token out
//! - Reading: `GetObject` → `ByteStream::into_async_read()` → boxed `AsyncRead`
//! - Writing: objects under one part go through `PutObject` (zero-length included);
//!   anything bigger becomes a multipart upload, one part buffered at a time.
//!   Any failure aborts the multipart upload so no half-object ever appears.
//! - Deleting: `DeleteObject`, and `NoSuchKey`/404 counts as success

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::delete_object::DeleteObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use tracing::{debug, trace, warn};

use crate::app_config::Location;
use crate::backends::{ListPage, ObjectReader, ObjectStore};
use crate::pipe::PipeReader;

/// 📏 S3 refuses multipart parts smaller than 5 MiB (except the last one).
/// It's also the most we ever hold in memory per upload.
pub(crate) const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// 🪣 One bucket, one client. Clones share the client's connection pool.
#[derive(Clone)]
pub(crate) struct S3ObjectStore {
    client: Client,
    bucket: String,
    part_size: usize,
}

// 🐛 Debug skips the client: nobody debugging a transfer wants the SDK's
// entire config tree in their logs.
impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.bucket)
            .field("part_size", &self.part_size)
            .finish()
    }
}

impl S3ObjectStore {
    /// 🚀 Build a client for `location`: region from config, credentials from the
    /// usual chain (env vars → ~/.aws → IAM role → hope), endpoint override if given.
    ///
    /// 💀 Fails up front when the chain can't actually produce credentials, instead of
    /// letting the first ListObjectsV2 find out the hard way.
    pub(crate) async fn connect(location: &Location) -> Result<Self> {
        let the_aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(location.region.clone()))
            .load()
            .await;

        resolve_credentials(the_aws_config.credentials_provider(), &location.region).await?;

        let mut the_s3_config = aws_sdk_s3::config::Builder::from(&the_aws_config);
        if let Some(endpoint) = &location.endpoint {
            // -- 🧪 localstack and friends don't do virtual-hosted buckets
            the_s3_config = the_s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::from_client(
            Client::from_conf(the_s3_config.build()),
            &location.bucket,
        ))
    }

    pub(crate) fn from_client(client: Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            part_size: MIN_PART_SIZE,
        }
    }

    /// 🧪 Tiny parts so tests can go multipart without shipping megabytes around.
    #[cfg(test)]
    pub(crate) fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size;
        self
    }

    /// 📦 Everything from the pipe up to one part's worth. `true` means the pipe hit
    /// end-of-stream while filling it.
    async fn next_part(&self, body: &mut PipeReader) -> Result<(Vec<u8>, bool)> {
        let mut part = Vec::with_capacity(self.part_size);
        while part.len() < self.part_size {
            match body
                .next_chunk()
                .await
                .context("💀 compressed stream broke before the upload finished")?
            {
                Some(chunk) => part.extend_from_slice(&chunk),
                None => return Ok((part, true)),
            }
        }
        Ok((part, false))
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first_part: Vec<u8>,
        body: &mut PipeReader,
    ) -> Result<Vec<CompletedPart>> {
        let mut completed = Vec::new();
        let mut part_number: i32 = 1;
        let (mut part, mut end_of_stream) = (first_part, false);

        loop {
            if !part.is_empty() {
                let the_part_len = part.len();
                let response = self
                    .client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(part))
                    .send()
                    .await
                    .with_context(|| {
                        format!(
                            "💀 UploadPart {part_number} failed for s3://{}/{key}",
                            self.bucket
                        )
                    })?;
                trace!("🧱 part {part_number} ({the_part_len} bytes) landed in s3://{}/{key}", self.bucket);
                completed.push(
                    CompletedPart::builder()
                        .set_e_tag(response.e_tag().map(str::to_owned))
                        .part_number(part_number)
                        .build(),
                );
                part_number += 1;
            }
            if end_of_stream {
                return Ok(completed);
            }
            (part, end_of_stream) = self.next_part(body).await?;
        }
    }

    async fn upload_multipart(
        &self,
        key: &str,
        first_part: Vec<u8>,
        body: &mut PipeReader,
    ) -> Result<()> {
        let the_upload = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| {
                format!("💀 CreateMultipartUpload failed for s3://{}/{key}", self.bucket)
            })?;
        let upload_id = the_upload
            .upload_id()
            .context("💀 S3 started a multipart upload and forgot to tell us its id")?
            .to_string();

        let committed = match self.upload_parts(key, &upload_id, first_part, body).await {
            Ok(parts) => self
                .client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map(|_| ())
                .with_context(|| {
                    format!("💀 CompleteMultipartUpload failed for s3://{}/{key}", self.bucket)
                }),
            Err(error) => Err(error),
        };

        if committed.is_err() {
            // -- 🧹 half an object is worse than none. tell S3 to forget the parts.
            if let Err(abort_error) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(
                    "⚠️ couldn't abort multipart upload {upload_id} for s3://{}/{key}: {abort_error}",
                    self.bucket
                );
            }
        }
        committed
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix);
        if let Some(token) = continuation {
            request = request.continuation_token(token);
        }

        let response = request.send().await.with_context(|| {
            format!(
                "💀 ListObjectsV2 failed for s3://{}/{prefix}. Check bucket name, region and credentials.",
                self.bucket
            )
        })?;

        Ok(ListPage {
            keys: response
                .contents()
                .iter()
                .filter_map(|object| object.key().map(str::to_owned))
                .collect(),
            next_continuation: response.next_continuation_token().map(str::to_owned),
            truncated: response.is_truncated().unwrap_or(false),
        })
    }

    async fn open_read(&self, key: &str) -> Result<ObjectReader> {
        let the_response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 GetObject failed for s3://{}/{key}. Missing object, or IAM said no.",
                    self.bucket
                )
            })?;

        Ok(Box::new(the_response.body.into_async_read()))
    }

    async fn upload(&self, key: &str, body: &mut PipeReader) -> Result<()> {
        let (first_part, end_of_stream) = self.next_part(body).await?;

        if !end_of_stream {
            return self.upload_multipart(key, first_part, body).await;
        }

        // -- 📦 the whole thing fit in one part. one request, no ceremony.
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(first_part))
            .send()
            .await
            .with_context(|| format!("💀 PutObject failed for s3://{}/{key}", self.bucket))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(error) if is_not_found(&error) => {
                debug!("🫥 s3://{}/{key} was already gone. counting it as deleted.", self.bucket);
                Ok(())
            }
            Err(error) => Err(error).with_context(|| {
                format!("💀 DeleteObject failed for s3://{}/{key}", self.bucket)
            }),
        }
    }
}

/// 🔑 Ask the provider for credentials once, now. Both "no provider at all" and
/// "provider came back empty-handed" are fatal.
async fn resolve_credentials(provider: Option<SharedCredentialsProvider>, region: &str) -> Result<()> {
    let Some(provider) = provider else {
        bail!(
            "💀 no AWS credentials provider could be resolved for region '{region}'. \
             Check env vars, ~/.aws/credentials, or the instance role."
        );
    };
    provider.provide_credentials().await.with_context(|| {
        format!(
            "💀 can't resolve AWS credentials for region '{region}'. \
             Check env vars, ~/.aws/credentials, or the instance role."
        )
    })?;
    trace!("🔑 credentials resolved for region '{region}'");
    Ok(())
}

fn is_not_found(error: &SdkError<DeleteObjectError>) -> bool {
    let the_code_says_so = error
        .as_service_error()
        .and_then(|service_error| service_error.code())
        .is_some_and(|code| code == "NoSuchKey" || code == "NotFound");
    let the_status_says_so = error
        .raw_response()
        .is_some_and(|response| response.status().as_u16() == 404);
    the_code_says_so || the_status_says_so
}
