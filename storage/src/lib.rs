#![allow(clippy::result_large_err)]
//! # storage-rpc
//!
//! The request execution and transfer layer of a Cloud Storage client.
//!
//! * [JSON API Documentation](https://cloud.google.com/storage/docs/json_api/v1)
//!
//! Every call runs through one retry engine, preconditions are resolved
//! against the target record before a request is built, several object
//! operations can share one batch round trip, object bodies stream through
//! resumable channels, listings page lazily, and URLs can be signed for
//! time-limited access.
//!
//! ## Quick Start
//!
//! ### Anonymous Access
//!
//! ```rust
//! use storage_rpc::client::{ClientConfig, Client};
//!
//! async fn run() {
//!     let config = ClientConfig::default().anonymous();
//!     let client = Client::new(config);
//! }
//! ```
//!
//! ### Usage
//!
//! ```
//! use futures_util::StreamExt;
//! use storage_rpc::client::{Client, ClientConfig};
//! use storage_rpc::http::batch::BatchRequest;
//! use storage_rpc::http::objects::{BlobId, Object};
//! use storage_rpc::http::Error;
//! use storage_rpc::option::StorageOption;
//!
//! async fn run(config: ClientConfig) -> Result<(), Error> {
//!     let client = Client::new(config);
//!
//!     // Upload only when the object does not exist yet.
//!     let object = Object::new("bucket", "file.txt");
//!     let uploaded = client
//!         .create_object(&object, b"hello world", &[StorageOption::IfGenerationMatch(Some(0))])
//!         .await?;
//!
//!     // Stream a large object in chunks.
//!     let mut writer = client.writer(&Object::new("bucket", "large.bin"), &[]).await?;
//!     writer.write(&[0u8; 10_000_000]).await?;
//!     writer.close().await?;
//!     let mut chunks = client.reader(&BlobId::new("bucket", "large.bin"), &[])?.into_stream();
//!     while let Some(chunk) = chunks.next().await {
//!         let _ = chunk?;
//!     }
//!
//!     // Several operations in one round trip.
//!     let batch = BatchRequest::new()
//!         .get(uploaded.blob_id(), vec![])
//!         .delete(BlobId::new("bucket", "large.bin"), vec![]);
//!     let response = client.batch(&batch).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod option;
pub mod sign;
