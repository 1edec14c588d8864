use std::sync::Arc;

use async_trait::async_trait;
use storage_gax::retry::{invoke, RetrySetting};

use crate::http::batch::{self, BatchRequest, BatchResponse, BatchResult};
use crate::http::buckets::list::ListBucketsResponse;
use crate::http::buckets::{self, Bucket};
use crate::http::copy_writer::CopyWriter;
use crate::http::objects::compose::ComposeRequest;
use crate::http::objects::download::Range;
use crate::http::objects::list::ListObjectsResponse;
use crate::http::objects::rewrite::CopyRequest;
use crate::http::objects::{self, BlobId, Object};
use crate::http::page::{Page, PageFetcher, PageResult};
use crate::http::read_channel::ReadChannel;
use crate::http::resumable_upload_client::ResumableUploadClient;
use crate::http::transport::{Transport, TransportRequest, TransportResponse};
use crate::http::write_channel::WriteChannel;
use crate::http::{check_response_status, is_retryable, parse_json, Error};
use crate::option::{Options, StorageOption};

/// Sends `request` until it succeeds or the retry setting gives up.
pub(crate) async fn execute(
    transport: &dyn Transport,
    retry: &RetrySetting,
    request: &TransportRequest,
) -> Result<TransportResponse, Error> {
    let response = invoke(
        || async move { check_response_status(transport.send(request.clone()).await?) },
        retry,
        &mut is_retryable,
    )
    .await?;
    Ok(response)
}

/// The operations of the storage service. Every call goes through the retry engine.
#[derive(Clone, Debug)]
pub struct StorageClient {
    transport: Arc<dyn Transport>,
    retry: RetrySetting,
    project_id: Option<String>,
    read_chunk_size: usize,
    write_chunk_size: usize,
    path_delimiter: String,
}

impl StorageClient {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        retry: RetrySetting,
        project_id: Option<String>,
        read_chunk_size: usize,
        write_chunk_size: usize,
        path_delimiter: String,
    ) -> Self {
        Self {
            transport,
            retry,
            project_id,
            read_chunk_size,
            write_chunk_size,
            path_delimiter,
        }
    }

    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        execute(self.transport.as_ref(), &self.retry, &request).await
    }

    async fn send_json<T: for<'de> serde::Deserialize<'de>>(&self, request: TransportRequest) -> Result<T, Error> {
        let response = self.send(request).await?;
        parse_json(&response)
    }

    fn project(&self) -> Result<&str, Error> {
        self.project_id
            .as_deref()
            .ok_or_else(|| Error::InvalidArgument("project id is required".to_string()))
    }

    /// Creates the bucket.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn create_bucket(&self, bucket: &Bucket, options: &[StorageOption]) -> Result<Bucket, Error> {
        let options = Options::try_from(options)?.merge_preconditions(None, bucket.metageneration, false)?;
        let request = buckets::insert::build(self.project()?, bucket, &options)?;
        self.send_json(request).await
    }

    /// Gets the bucket. `None` when it does not exist.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn get_bucket(&self, name: &str, options: &[StorageOption]) -> Result<Option<Bucket>, Error> {
        let options = Options::try_from(options)?.merge_preconditions(None, None, false)?;
        match self.send_json(buckets::get::build(name, &options)).await {
            Ok(bucket) => Ok(Some(bucket)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lists the buckets of the project.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn list_buckets(&self, options: &[StorageOption]) -> Result<Page<Bucket>, Error> {
        let fetcher = BucketFetcher {
            client: self.clone(),
            project: self.project()?.to_string(),
        };
        Page::first(Arc::new(fetcher), Options::try_from(options)?).await
    }

    /// Updates the writable metadata of the bucket.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn update_bucket(&self, bucket: &Bucket, options: &[StorageOption]) -> Result<Bucket, Error> {
        let options = Options::try_from(options)?.merge_preconditions(None, bucket.metageneration, false)?;
        self.send_json(buckets::patch::build(bucket, &options)?).await
    }

    /// Deletes the bucket. `false` when it does not exist.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn delete_bucket(&self, name: &str, options: &[StorageOption]) -> Result<bool, Error> {
        let options = Options::try_from(options)?.merge_preconditions(None, None, false)?;
        not_found_as_false(self.send(buckets::delete::build(name, &options)).await)
    }

    /// Uploads `content` with the metadata of `object` in one request.
    ///
    /// The MD5 and CRC32c of `content` are sent with the metadata, so the
    /// service rejects a body that does not match them.
    /// The whole upload is repeated on a retryable failure. Guard it with a
    /// generation precondition when a repeated upload must not replace a newer object.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn create_object(
        &self,
        object: &Object,
        content: &[u8],
        options: &[StorageOption],
    ) -> Result<Object, Error> {
        let options =
            Options::try_from(options)?.merge_preconditions(object.generation, object.metageneration, false)?;
        let object = object.clone().with_checksums(content);
        let request = objects::upload::build_multipart(&object, content, &options)?;
        self.send_json(request).await
    }

    /// Gets the object metadata. `None` when it does not exist.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn get_object(&self, id: &BlobId, options: &[StorageOption]) -> Result<Option<Object>, Error> {
        let options = Options::try_from(options)?.merge_preconditions(id.generation, None, false)?;
        match self.send_json(objects::get::build(id, &options)).await {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lists the objects of the bucket. With `StorageOption::CurrentDirectory`
    /// the configured path delimiter is used.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn list_objects(&self, bucket: &str, options: &[StorageOption]) -> Result<Page<Object>, Error> {
        let fetcher = ObjectFetcher {
            client: self.clone(),
            bucket: bucket.to_string(),
        };
        let options = Options::try_from(options)?.resolve_delimiter(&self.path_delimiter);
        Page::first(Arc::new(fetcher), options).await
    }

    /// Updates the writable metadata of the object.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn update_object(&self, object: &Object, options: &[StorageOption]) -> Result<Object, Error> {
        let options =
            Options::try_from(options)?.merge_preconditions(object.generation, object.metageneration, false)?;
        self.send_json(objects::patch::build(object, &options)?).await
    }

    /// Deletes the object. `false` when it does not exist.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn delete_object(&self, id: &BlobId, options: &[StorageOption]) -> Result<bool, Error> {
        let options = Options::try_from(options)?.merge_preconditions(id.generation, None, false)?;
        not_found_as_false(self.send(objects::delete::build(id, &options)).await)
    }

    /// Concatenates the sources into the target.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn compose(&self, req: &ComposeRequest) -> Result<Object, Error> {
        let options = Options::try_from(req.target_options.as_slice())?.merge_preconditions(
            req.target.generation,
            req.target.metageneration,
            false,
        )?;
        self.send_json(objects::compose::build(req, &options)?).await
    }

    /// Starts a server-side copy and runs its first rewrite call.
    ///
    /// Source preconditions are sent as `ifSource*` parameters with the source
    /// generation as their default.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn copy(&self, req: CopyRequest) -> Result<CopyWriter, Error> {
        let source = Options::try_from(req.source_options.as_slice())?.merge_preconditions(
            req.source.generation,
            None,
            true,
        )?;
        let target = Options::try_from(req.target_options.as_slice())?.merge_preconditions(
            req.target.generation,
            req.target.metageneration,
            false,
        )?;
        let max_bytes = req.megabytes_copied_per_chunk.map(|mb| mb * 1024 * 1024);
        let mut writer = CopyWriter::new(
            self.transport.clone(),
            self.retry.clone(),
            req.source,
            req.target,
            source.union(target)?,
            max_bytes,
        );
        writer.copy_chunk().await?;
        Ok(writer)
    }

    /// Downloads the whole content of the object in one request.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn read_all_bytes(&self, id: &BlobId, options: &[StorageOption]) -> Result<Vec<u8>, Error> {
        let options = Options::try_from(options)?.merge_preconditions(id.generation, None, false)?;
        let response = self
            .send(objects::download::build(id, &options, &Range::default()))
            .await?;
        Ok(response.body.to_vec())
    }

    /// Opens a channel reading the object in chunks of the configured read chunk size.
    pub fn reader(&self, id: &BlobId, options: &[StorageOption]) -> Result<ReadChannel, Error> {
        let options = Options::try_from(options)?.merge_preconditions(id.generation, None, false)?;
        Ok(ReadChannel::new(
            self.transport.clone(),
            self.retry.clone(),
            id.clone(),
            options,
            self.read_chunk_size,
        ))
    }

    /// Opens a resumable upload session for the object.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn writer(&self, object: &Object, options: &[StorageOption]) -> Result<WriteChannel, Error> {
        let options =
            Options::try_from(options)?.merge_preconditions(object.generation, object.metageneration, false)?;
        let response = self
            .send(objects::upload::build_resumable(object, &options)?)
            .await?;
        let location = response
            .header_value("Location")
            .ok_or_else(|| Error::ProtocolInternal("upload session without Location".to_string()))?;
        let upload = ResumableUploadClient::new(location, self.transport.clone())?;
        Ok(WriteChannel::new(upload, self.retry.clone(), self.write_chunk_size))
    }

    /// Submits the items in one request. The request is repeated as a whole
    /// on a retryable failure; a failed item only fails its own result.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn batch(&self, req: &BatchRequest) -> Result<BatchResponse, Error> {
        if req.is_empty() {
            return Ok(BatchResponse::default());
        }
        let (request, slots) = batch::build(req)?;
        tracing::debug!("submit batch of {} items", slots.len());
        let transport = self.transport.as_ref();
        let request = &request;
        let slots = slots.as_slice();
        let response = invoke(
            || async move { batch::parse(transport.send(request.clone()).await?, slots).await },
            &self.retry,
            &mut is_retryable,
        )
        .await?;
        Ok(response)
    }

    /// Gets the objects in one batch. A missing or failed object is `None`.
    pub async fn get_objects(&self, ids: &[BlobId]) -> Result<Vec<Option<Object>>, Error> {
        let req = ids
            .iter()
            .fold(BatchRequest::new(), |req, id| req.get(id.clone(), vec![]));
        let response = self.batch(&req).await?;
        Ok(response.gets.into_iter().map(|(_, r)| optional(r)).collect())
    }

    /// Updates the objects in one batch. A failed update is `None`.
    pub async fn update_objects(&self, objects: &[Object]) -> Result<Vec<Option<Object>>, Error> {
        let req = objects
            .iter()
            .fold(BatchRequest::new(), |req, object| req.update(object.clone(), vec![]));
        let response = self.batch(&req).await?;
        Ok(response.updates.into_iter().map(|(_, r)| optional(r)).collect())
    }

    /// Deletes the objects in one batch. A failed delete is `false`.
    pub async fn delete_objects(&self, ids: &[BlobId]) -> Result<Vec<bool>, Error> {
        let req = ids
            .iter()
            .fold(BatchRequest::new(), |req, id| req.delete(id.clone(), vec![]));
        let response = self.batch(&req).await?;
        Ok(response.deletes.into_iter().map(|(_, r)| r.unwrap_or(false)).collect())
    }
}

fn optional(result: BatchResult<Object>) -> Option<Object> {
    match result {
        BatchResult::Value(object) => Some(object),
        _ => None,
    }
}

fn not_found_as_false(result: Result<TransportResponse, Error>) -> Result<bool, Error> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

struct ObjectFetcher {
    client: StorageClient,
    bucket: String,
}

#[async_trait]
impl PageFetcher<Object> for ObjectFetcher {
    async fn fetch(&self, options: Options) -> Result<PageResult<Object>, Error> {
        let response: ListObjectsResponse = self
            .client
            .send_json(objects::list::build(&self.bucket, &options))
            .await?;
        Ok(PageResult {
            values: response.items,
            prefixes: response.prefixes,
            next_page_token: response.next_page_token,
        })
    }
}

struct BucketFetcher {
    client: StorageClient,
    project: String,
}

#[async_trait]
impl PageFetcher<Bucket> for BucketFetcher {
    async fn fetch(&self, options: Options) -> Result<PageResult<Bucket>, Error> {
        let response: ListBucketsResponse = self
            .client
            .send_json(buckets::list::build(&self.project, &options))
            .await?;
        Ok(PageResult {
            values: response.items,
            prefixes: vec![],
            next_page_token: response.next_page_token,
        })
    }
}
