//! Several object operations in one round trip.
//!
//! The items are encoded as `application/http` parts of one `multipart/mixed`
//! request. Each part carries a content id naming the operation and the
//! object, and the service answers every part with a response part referring
//! to the same id. The results come back in submission order, each one either
//! a value, an empty marker for a get that found nothing, or the item's own
//! failure.
use std::collections::{HashMap, HashSet};

use reqwest::Method;

use crate::http::error::ErrorResponse;
use crate::http::multipart::{self, Part};
use crate::http::objects::{delete, get, patch, BlobId, Object};
use crate::http::transport::{TransportRequest, TransportResponse};
use crate::http::{check_response_status, Error, Escape, BATCH_PATH};
use crate::option::{Options, StorageOption};

/// Deletes, updates and gets submitted together.
#[derive(Clone, Debug, Default)]
pub struct BatchRequest {
    deletes: Vec<(BlobId, Vec<StorageOption>)>,
    updates: Vec<(Object, Vec<StorageOption>)>,
    gets: Vec<(BlobId, Vec<StorageOption>)>,
}

impl BatchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete(mut self, id: BlobId, options: Vec<StorageOption>) -> Self {
        self.deletes.push((id, options));
        self
    }

    pub fn update(mut self, object: Object, options: Vec<StorageOption>) -> Self {
        self.updates.push((object, options));
        self
    }

    pub fn get(mut self, id: BlobId, options: Vec<StorageOption>) -> Self {
        self.gets.push((id, options));
        self
    }

    pub fn len(&self) -> usize {
        self.deletes.len() + self.updates.len() + self.gets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The outcome of one batch item.
#[derive(Debug)]
pub enum BatchResult<T> {
    Value(T),
    /// The item succeeded without a value, e.g. a get of a missing object.
    Empty,
    Failed(Error),
}

impl<T> BatchResult<T> {
    pub fn is_success(&self) -> bool {
        !matches!(self, BatchResult::Failed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            BatchResult::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            BatchResult::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// The value, or `default` for an empty or failed item. The failure is dropped.
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            BatchResult::Value(v) => v,
            _ => default,
        }
    }
}

/// Results of a batch, each list in the order its items were added.
#[derive(Debug, Default)]
pub struct BatchResponse {
    pub deletes: Vec<(BlobId, BatchResult<bool>)>,
    pub updates: Vec<(BlobId, BatchResult<Object>)>,
    pub gets: Vec<(BlobId, BatchResult<Object>)>,
}

impl BatchResponse {
    pub fn len(&self) -> usize {
        self.deletes.len() + self.updates.len() + self.gets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Operation {
    Delete,
    Update,
    Get,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::Delete => "delete",
            Operation::Update => "update",
            Operation::Get => "get",
        }
    }
}

/// A submitted item waiting for its response part.
#[derive(Clone, Debug)]
pub(crate) struct Slot {
    operation: Operation,
    id: BlobId,
    content_id: String,
}

fn content_id(operation: Operation, id: &BlobId) -> String {
    match id.generation {
        Some(generation) => format!(
            "{}:{}/{}/{}",
            operation.as_str(),
            id.bucket.escape(),
            id.name.escape(),
            generation
        ),
        None => format!("{}:{}/{}", operation.as_str(), id.bucket.escape(), id.name.escape()),
    }
}

/// Encodes the batch. Fails with `InvalidArgument` on an identity given twice for one operation.
pub(crate) fn build(request: &BatchRequest) -> Result<(TransportRequest, Vec<Slot>), Error> {
    let mut items = Vec::with_capacity(request.len());
    for (id, options) in &request.deletes {
        let options = Options::build(options.iter().cloned())?.merge_preconditions(id.generation, None, false)?;
        items.push((Operation::Delete, id.clone(), delete::build(id, &options)));
    }
    for (object, options) in &request.updates {
        let options = Options::build(options.iter().cloned())?.merge_preconditions(
            object.generation,
            object.metageneration,
            false,
        )?;
        items.push((Operation::Update, object.blob_id(), patch::build(object, &options)?));
    }
    for (id, options) in &request.gets {
        let options = Options::build(options.iter().cloned())?.merge_preconditions(id.generation, None, false)?;
        items.push((Operation::Get, id.clone(), get::build(id, &options)));
    }

    let mut seen = HashSet::new();
    let mut slots = Vec::with_capacity(items.len());
    let mut parts = Vec::with_capacity(items.len());
    for (operation, id, item) in items {
        let content_id = content_id(operation, &id);
        if !seen.insert(content_id.clone()) {
            return Err(Error::InvalidArgument(format!(
                "{} of {} is given twice in one batch",
                operation.as_str(),
                id
            )));
        }
        parts.push(
            Part::new(multipart::encode_request(&item))
                .header("Content-Type", "application/http")
                .header("Content-Transfer-Encoding", "binary")
                .header("Content-ID", format!("<{content_id}>")),
        );
        slots.push(Slot {
            operation,
            id,
            content_id,
        });
    }

    let boundary = multipart::boundary();
    let request = TransportRequest::new(Method::POST, BATCH_PATH)
        .header("Content-Type", format!("multipart/mixed; boundary={boundary}"))
        .body(multipart::encode(&boundary, &parts));
    Ok((request, slots))
}

/// Correlates the response parts with the submitted items.
///
/// A failed item does not fail the batch. A submitted item without a response
/// part, or a body that is not a multipart document, is `ProtocolInternal`.
pub(crate) async fn parse(response: TransportResponse, slots: &[Slot]) -> Result<BatchResponse, Error> {
    let response = check_response_status(response)?;
    let boundary = response
        .header_value("Content-Type")
        .and_then(multipart::boundary_of)
        .ok_or_else(|| Error::ProtocolInternal("batch response is not multipart".to_string()))?;

    let mut answers = HashMap::new();
    for part in multipart::decode(&boundary, response.body.clone()).await? {
        let Some(id) = part.header_value("Content-ID").map(response_content_id) else {
            return Err(Error::ProtocolInternal("batch response part without Content-ID".to_string()));
        };
        let answer = multipart::decode_response(&part.body)?;
        if answers.insert(id.clone(), answer).is_some() {
            return Err(Error::ProtocolInternal(format!("batch response answers {id} twice")));
        }
    }

    let mut result = BatchResponse::default();
    for slot in slots {
        let answer = answers
            .remove(&slot.content_id)
            .ok_or_else(|| Error::ProtocolInternal(format!("batch response has no answer for {}", slot.content_id)))?;
        let id = slot.id.clone();
        match slot.operation {
            Operation::Delete => result.deletes.push((id, delete_result(answer))),
            Operation::Update => result.updates.push((id, object_result(answer, false))),
            Operation::Get => result.gets.push((id, object_result(answer, true))),
        }
    }
    Ok(result)
}

/// `<response-update:b/o>` to `update:b/o`.
fn response_content_id(header: &str) -> String {
    let id = header.trim().trim_start_matches('<').trim_end_matches('>');
    id.strip_prefix("response-").unwrap_or(id).to_string()
}

fn failure(answer: &TransportResponse) -> Error {
    Error::Response(ErrorResponse::from_body(answer.status, &answer.body))
}

fn delete_result(answer: TransportResponse) -> BatchResult<bool> {
    if answer.is_success() {
        BatchResult::Value(true)
    } else {
        BatchResult::Failed(failure(&answer))
    }
}

fn object_result(answer: TransportResponse, not_found_is_empty: bool) -> BatchResult<Object> {
    if answer.is_success() {
        match serde_json::from_slice(&answer.body) {
            Ok(object) => BatchResult::Value(object),
            Err(e) => BatchResult::Failed(e.into()),
        }
    } else if not_found_is_empty && answer.status == 404 {
        BatchResult::Empty
    } else {
        BatchResult::Failed(failure(&answer))
    }
}
