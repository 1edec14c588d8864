//! An in-memory storage service for tests.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use reqwest::Method;
use time::OffsetDateTime;

use crate::http::buckets::list::ListBucketsResponse;
use crate::http::buckets::Bucket;
use crate::http::error::{ErrorResponse, ErrorWrapper};
use crate::http::multipart::{self, Part};
use crate::http::objects::list::ListObjectsResponse;
use crate::http::objects::rewrite::RewriteObjectResponse;
use crate::http::objects::Object;
use crate::http::transport::{Transport, TransportRequest, TransportResponse};
use crate::http::Error;

/// What an injected fault does to the request it hits.
#[derive(Clone, Debug)]
pub(crate) enum Fault {
    /// Answers with the status without touching the store.
    Status(u16),
    /// Fails before any response is received.
    Disconnect,
    /// Keeps this many bytes of a resumable chunk, then answers 503.
    AcceptPrefix(usize),
    /// Runs a batch but leaves the answer of this item out.
    DropBatchPart(usize),
}

#[derive(Debug)]
struct Trigger {
    method: Method,
    path: String,
    skip: usize,
    fault: Fault,
}

#[derive(Debug)]
struct Stored {
    object: Object,
    content: Bytes,
}

#[derive(Debug)]
struct Session {
    object: Object,
    query: Vec<(String, String)>,
    data: Vec<u8>,
    finished: Option<Object>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, Bucket>,
    objects: BTreeMap<(String, String), Stored>,
    sessions: HashMap<String, Session>,
    triggers: Vec<Trigger>,
    log: Vec<TransportRequest>,
    generation: i64,
    session_id: u64,
}

#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    state: Mutex<State>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the request after the first `skip` ones matching `method` and
    /// containing `path` fail with `fault`. Each fault fires once.
    pub fn inject(&self, method: Method, path: &str, skip: usize, fault: Fault) {
        self.state.lock().unwrap().triggers.push(Trigger {
            method,
            path: path.to_string(),
            skip,
            fault,
        });
    }

    /// Stores an object directly.
    pub fn put(&self, bucket: &str, name: &str, content: impl Into<Bytes>) -> Object {
        let mut state = self.state.lock().unwrap();
        state.store(Object::new(bucket, name), content.into())
    }

    pub fn content(&self, bucket: &str, name: &str) -> Option<Bytes> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&(bucket.to_string(), name.to_string()))
            .map(|s| s.content.clone())
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().log.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        let parts = match request.header_value("Content-Type").and_then(multipart::boundary_of) {
            Some(boundary) => multipart::decode(&boundary, request.body.clone()).await.ok(),
            None => None,
        };
        let parts = parts.as_deref();
        let mut state = self.state.lock().unwrap();
        state.log.push(request.clone());
        match state.take_fault(&request) {
            Some(Fault::Status(status)) => Ok(error(status, "injected fault")),
            Some(Fault::Disconnect) => Err(Error::HttpMiddleware(anyhow::anyhow!("connection reset"))),
            Some(Fault::AcceptPrefix(len)) => Ok(state.accept_prefix(&request, len)),
            Some(Fault::DropBatchPart(index)) => Ok(state.batch(parts, Some(index))),
            None => Ok(state.handle(&request, parts)),
        }
    }
}

fn error(status: u16, message: &str) -> TransportResponse {
    let wrapper = ErrorWrapper {
        error: ErrorResponse {
            code: status,
            errors: vec![],
            message: message.to_string(),
        },
    };
    json(status, &wrapper)
}

fn json<T: serde::Serialize>(status: u16, value: &T) -> TransportResponse {
    TransportResponse::new(status)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(value).unwrap())
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().to_string()
}

fn param<T: std::str::FromStr>(request: &TransportRequest, key: &str) -> Option<T> {
    request.query_value(key).and_then(|v| v.parse().ok())
}

/// Checks `if*` (or `ifSource*`) parameters against the current object.
fn check_preconditions(request: &TransportRequest, current: Option<&Object>, source: bool) -> Result<(), TransportResponse> {
    let prefix = if source { "ifSource" } else { "if" };
    let generation = current.and_then(|o| o.generation);
    let metageneration = current.and_then(|o| o.metageneration);
    let checks = [
        ("GenerationMatch", generation.unwrap_or(0), true, true),
        ("GenerationNotMatch", generation.unwrap_or(0), false, true),
        ("MetagenerationMatch", metageneration.unwrap_or(0), true, false),
        ("MetagenerationNotMatch", metageneration.unwrap_or(0), false, false),
    ];
    for (name, actual, equal, missing_ok) in checks {
        let Some(expected) = param::<i64>(request, &format!("{prefix}{name}")) else {
            continue;
        };
        let holds = if current.is_none() {
            missing_ok && equal && expected == 0
        } else {
            (actual == expected) == equal
        };
        if !holds {
            return Err(error(412, &format!("{prefix}{name} failed")));
        }
    }
    Ok(())
}

fn bucket_preconditions(request: &TransportRequest, bucket: &Bucket) -> Result<(), TransportResponse> {
    let metageneration = bucket.metageneration.unwrap_or(0);
    if let Some(expected) = param::<i64>(request, "ifMetagenerationMatch") {
        if metageneration != expected {
            return Err(error(412, "ifMetagenerationMatch failed"));
        }
    }
    if let Some(expected) = param::<i64>(request, "ifMetagenerationNotMatch") {
        if metageneration == expected {
            return Err(error(412, "ifMetagenerationNotMatch failed"));
        }
    }
    Ok(())
}

/// `bytes a-b/total` as (first byte, last byte, total); `*` is `None`.
fn content_range(value: &str) -> Option<(Option<(u64, u64)>, Option<u64>)> {
    let (range, total) = value.trim().strip_prefix("bytes ")?.split_once('/')?;
    let total = if total == "*" { None } else { Some(total.parse().ok()?) };
    let range = if range == "*" {
        None
    } else {
        let (first, last) = range.split_once('-')?;
        Some((first.parse().ok()?, last.parse().ok()?))
    };
    Some((range, total))
}

macro_rules! try_response {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(response) => return response,
        }
    };
}

impl State {
    fn take_fault(&mut self, request: &TransportRequest) -> Option<Fault> {
        let index = self
            .triggers
            .iter_mut()
            .position(|t| {
                if t.method != request.method || !request.path_and_query().contains(&t.path) {
                    return false;
                }
                if t.skip > 0 {
                    t.skip -= 1;
                    return false;
                }
                true
            })?;
        Some(self.triggers.remove(index).fault)
    }

    fn store(&mut self, mut object: Object, content: Bytes) -> Object {
        self.generation += 1;
        let now = OffsetDateTime::now_utc();
        object.generation = Some(1_700_000_000_000_000 + self.generation);
        object.metageneration = Some(1);
        object.size = Some(content.len() as i64);
        object.id = format!("{}/{}/{}", object.bucket, object.name, self.generation);
        object.time_created = Some(now);
        object.updated = Some(now);
        let key = (object.bucket.clone(), object.name.clone());
        self.objects.insert(
            key,
            Stored {
                object: object.clone(),
                content,
            },
        );
        object
    }

    fn current(&self, bucket: &str, name: &str) -> Option<&Stored> {
        self.objects.get(&(bucket.to_string(), name.to_string()))
    }

    /// The object addressed by a request, honoring its `generation` parameter.
    fn lookup(&self, request: &TransportRequest, bucket: &str, name: &str) -> Result<&Stored, TransportResponse> {
        let stored = self
            .current(bucket, name)
            .ok_or_else(|| error(404, &format!("No such object: {bucket}/{name}")))?;
        match param::<i64>(request, "generation") {
            Some(generation) if stored.object.generation != Some(generation) => {
                Err(error(404, &format!("No such object: {bucket}/{name}#{generation}")))
            }
            _ => Ok(stored),
        }
    }

    /// `parts` is the decoded body of a multipart request.
    fn handle(&mut self, request: &TransportRequest, parts: Option<&[Part]>) -> TransportResponse {
        let path = request.path.clone();
        if path == "/batch/storage/v1" {
            return self.batch(parts, None);
        }
        if let Some(rest) = path.strip_prefix("/upload/storage/v1/b/") {
            let bucket = decode(rest.trim_end_matches("/o"));
            return self.upload(request, &bucket, parts);
        }
        let Some(rest) = path.strip_prefix("/storage/v1/b") else {
            return error(404, "unknown path");
        };
        let segments: Vec<String> = rest.split('/').filter(|s| !s.is_empty()).map(decode).collect();
        let method = request.method.clone();
        match segments.as_slice() {
            [] if method == Method::POST => self.insert_bucket(request),
            [] if method == Method::GET => self.list_buckets(request),
            [bucket] if method == Method::GET => match self.buckets.get(bucket) {
                Some(b) => json(200, b),
                None => error(404, "No such bucket"),
            },
            [bucket] if method == Method::PATCH => self.patch_bucket(request, bucket),
            [bucket] if method == Method::DELETE => self.delete_bucket(request, bucket),
            [bucket, o] if o == "o" && method == Method::GET => self.list_objects(request, bucket),
            [bucket, o, name] if o == "o" && method == Method::GET => {
                if request.query_value("alt") == Some("media") {
                    self.download(request, bucket, name)
                } else {
                    let stored = try_response!(self.lookup(request, bucket, name));
                    try_response!(check_preconditions(request, Some(&stored.object), false));
                    json(200, &stored.object)
                }
            }
            [bucket, o, name] if o == "o" && method == Method::PATCH => self.patch_object(request, bucket, name),
            [bucket, o, name] if o == "o" && method == Method::DELETE => {
                let stored = try_response!(self.lookup(request, bucket, name));
                try_response!(check_preconditions(request, Some(&stored.object), false));
                self.objects.remove(&(bucket.clone(), name.clone()));
                TransportResponse::new(204)
            }
            [bucket, o, name, compose] if o == "o" && compose == "compose" => self.compose(request, bucket, name),
            [sb, o, sn, rewrite, b, db, o2, dn] if o == "o" && rewrite == "rewriteTo" && b == "b" && o2 == "o" => {
                self.rewrite(request, (sb.as_str(), sn.as_str()), (db.as_str(), dn.as_str()))
            }
            _ => error(404, "unknown path"),
        }
    }

    fn insert_bucket(&mut self, request: &TransportRequest) -> TransportResponse {
        let mut bucket: Bucket = try_response!(serde_json::from_slice(&request.body).map_err(|e| error(400, &e.to_string())));
        if self.buckets.contains_key(&bucket.name) {
            return error(409, "You already own this bucket.");
        }
        bucket.id = bucket.name.clone();
        bucket.metageneration = Some(1);
        bucket.project_number = Some(1);
        bucket.time_created = Some(OffsetDateTime::now_utc());
        self.buckets.insert(bucket.name.clone(), bucket.clone());
        json(200, &bucket)
    }

    fn list_buckets(&self, request: &TransportRequest) -> TransportResponse {
        let max = param::<usize>(request, "maxResults").unwrap_or(1000);
        let token: Option<String> = param(request, "pageToken");
        let mut items: Vec<Bucket> = self
            .buckets
            .values()
            .filter(|b| token.as_ref().map_or(true, |t| &b.name > t))
            .cloned()
            .collect();
        let next_page_token = if items.len() > max {
            items.truncate(max);
            items.last().map(|b| b.name.clone())
        } else {
            None
        };
        json(200, &ListBucketsResponse { items, next_page_token })
    }

    fn patch_bucket(&mut self, request: &TransportRequest, name: &str) -> TransportResponse {
        let patch: Bucket = try_response!(serde_json::from_slice(&request.body).map_err(|e| error(400, &e.to_string())));
        let Some(bucket) = self.buckets.get_mut(name) else {
            return error(404, "No such bucket");
        };
        try_response!(bucket_preconditions(request, bucket));
        if patch.labels.is_some() {
            bucket.labels = patch.labels;
        }
        if patch.versioning.is_some() {
            bucket.versioning = patch.versioning;
        }
        if patch.storage_class.is_some() {
            bucket.storage_class = patch.storage_class;
        }
        bucket.metageneration = bucket.metageneration.map(|m| m + 1);
        bucket.updated = Some(OffsetDateTime::now_utc());
        json(200, bucket)
    }

    fn delete_bucket(&mut self, request: &TransportRequest, name: &str) -> TransportResponse {
        let Some(bucket) = self.buckets.get(name) else {
            return error(404, "No such bucket");
        };
        try_response!(bucket_preconditions(request, bucket));
        if self.objects.keys().any(|(b, _)| b == name) {
            return error(409, "The bucket you tried to delete is not empty.");
        }
        self.buckets.remove(name);
        TransportResponse::new(204)
    }

    fn list_objects(&self, request: &TransportRequest, bucket: &str) -> TransportResponse {
        let max = param::<usize>(request, "maxResults").unwrap_or(1000);
        let token: Option<String> = param(request, "pageToken");
        let prefix = request.query_value("prefix").unwrap_or_default();
        let delimiter = request.query_value("delimiter").filter(|d| !d.is_empty());

        // Objects and prefixes in name order, each entry keyed by the name it sorts at.
        let mut entries: BTreeMap<String, Option<Object>> = BTreeMap::new();
        for ((b, name), stored) in &self.objects {
            if b != bucket || !name.starts_with(prefix) {
                continue;
            }
            let rest = &name[prefix.len()..];
            match delimiter.and_then(|d| rest.find(d).map(|i| (i, d))) {
                Some((i, d)) => {
                    entries.insert(format!("{}{}", &name[..prefix.len() + i], d), None);
                }
                None => {
                    entries.insert(name.clone(), Some(stored.object.clone()));
                }
            }
        }
        let mut page: Vec<(String, Option<Object>)> = entries
            .into_iter()
            .filter(|(key, _)| token.as_ref().map_or(true, |t| key > t))
            .collect();
        let next_page_token = if page.len() > max {
            page.truncate(max);
            page.last().map(|(key, _)| key.clone())
        } else {
            None
        };
        let mut prefixes = BTreeSet::new();
        let mut items = vec![];
        for (key, object) in page {
            match object {
                Some(object) => items.push(object),
                None => {
                    prefixes.insert(key);
                }
            }
        }
        json(
            200,
            &ListObjectsResponse {
                prefixes: prefixes.into_iter().collect(),
                items,
                next_page_token,
            },
        )
    }

    fn download(&self, request: &TransportRequest, bucket: &str, name: &str) -> TransportResponse {
        let stored = try_response!(self.lookup(request, bucket, name));
        try_response!(check_preconditions(request, Some(&stored.object), false));
        let generation = stored.object.generation.unwrap_or_default();
        let content = &stored.content;
        let Some(range) = request.header_value("Range") else {
            return TransportResponse::new(200)
                .header("x-goog-generation", generation)
                .body(content.clone());
        };
        let len = content.len() as u64;
        let (first, last) = match range.trim_start_matches("bytes=").split_once('-') {
            Some((first, last)) => (
                first.parse::<u64>().unwrap_or(0),
                last.parse::<u64>().unwrap_or(u64::MAX),
            ),
            None => return error(400, "invalid range"),
        };
        if first >= len {
            return error(416, "Requested range not satisfiable");
        }
        let end = last.saturating_add(1).min(len);
        TransportResponse::new(206)
            .header("x-goog-generation", generation)
            .header("Content-Range", format!("bytes {}-{}/{}", first, end - 1, len))
            .body(content.slice(first as usize..end as usize))
    }

    fn patch_object(&mut self, request: &TransportRequest, bucket: &str, name: &str) -> TransportResponse {
        let patch: Object = try_response!(serde_json::from_slice(&request.body).map_err(|e| error(400, &e.to_string())));
        let stored = try_response!(self.lookup(request, bucket, name));
        try_response!(check_preconditions(request, Some(&stored.object), false));
        let Some(stored) = self.objects.get_mut(&(bucket.to_string(), name.to_string())) else {
            return error(404, "No such object");
        };
        let object = &mut stored.object;
        if patch.content_type.is_some() {
            object.content_type = patch.content_type;
        }
        if patch.cache_control.is_some() {
            object.cache_control = patch.cache_control;
        }
        if patch.content_disposition.is_some() {
            object.content_disposition = patch.content_disposition;
        }
        if let Some(metadata) = patch.metadata {
            object.metadata.get_or_insert_with(Default::default).extend(metadata);
        }
        object.metageneration = object.metageneration.map(|m| m + 1);
        object.updated = Some(OffsetDateTime::now_utc());
        json(200, object)
    }

    fn compose(&mut self, request: &TransportRequest, bucket: &str, name: &str) -> TransportResponse {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Compose {
            destination: Object,
            source_objects: Vec<crate::http::objects::SourceObject>,
        }
        let body: Compose = try_response!(serde_json::from_slice(&request.body).map_err(|e| error(400, &e.to_string())));
        try_response!(check_preconditions(
            request,
            self.current(bucket, name).map(|s| &s.object),
            false
        ));
        let mut content = Vec::new();
        for source in &body.source_objects {
            let Some(stored) = self.current(bucket, &source.name) else {
                return error(404, &format!("No such object: {bucket}/{}", source.name));
            };
            if source.generation.is_some() && source.generation != stored.object.generation {
                return error(412, "source generation mismatch");
            }
            content.extend_from_slice(&stored.content);
        }
        let mut target = body.destination;
        target.bucket = bucket.to_string();
        target.name = name.to_string();
        json(200, &self.store(target, content.into()))
    }

    fn rewrite(
        &mut self,
        request: &TransportRequest,
        (source_bucket, source_name): (&str, &str),
        (bucket, name): (&str, &str),
    ) -> TransportResponse {
        let target: Object = try_response!(serde_json::from_slice(&request.body).map_err(|e| error(400, &e.to_string())));
        let source = self
            .current(source_bucket, source_name)
            .ok_or_else(|| error(404, "No such source object"));
        let source = try_response!(source);
        if let Some(generation) = param::<i64>(request, "sourceGeneration") {
            if source.object.generation != Some(generation) {
                return error(404, "No such source generation");
            }
        }
        try_response!(check_preconditions(request, Some(&source.object), true));
        try_response!(check_preconditions(
            request,
            self.current(bucket, name).map(|s| &s.object),
            false
        ));

        let size = source.content.len() as u64;
        let copied: u64 = param(request, "rewriteToken").unwrap_or(0);
        let step = param::<u64>(request, "maxBytesRewrittenPerCall").unwrap_or(size);
        let copied = (copied + step.max(1)).min(size);
        let content = source.content.clone();
        let mut response = RewriteObjectResponse {
            total_bytes_rewritten: Some(copied as i64),
            object_size: Some(size as i64),
            done: copied == size,
            ..Default::default()
        };
        if response.done {
            let mut target = target;
            target.bucket = bucket.to_string();
            target.name = name.to_string();
            response.resource = Some(self.store(target, content));
        } else {
            response.rewrite_token = Some(copied.to_string());
        }
        json(200, &response)
    }

    fn upload(&mut self, request: &TransportRequest, bucket: &str, parts: Option<&[Part]>) -> TransportResponse {
        if let Some(id) = request.query_value("upload_id") {
            let id = id.to_string();
            return match request.method {
                Method::PUT => self.upload_chunk(request, &id),
                Method::DELETE => match self.sessions.remove(&id) {
                    Some(_) => TransportResponse::new(499),
                    None => error(404, "No such upload"),
                },
                _ => error(405, "method not allowed"),
            };
        }
        match request.query_value("uploadType") {
            Some("multipart") => {
                let Some([metadata, media]) = parts else {
                    return error(400, "expected a multipart body with two parts");
                };
                let mut object: Object =
                    try_response!(serde_json::from_slice(&metadata.body).map_err(|e| error(400, &e.to_string())));
                object.bucket = bucket.to_string();
                try_response!(check_preconditions(
                    request,
                    self.current(bucket, &object.name).map(|s| &s.object),
                    false
                ));
                json(200, &self.store(object, media.body.clone()))
            }
            Some("resumable") => {
                let mut object: Object = try_response!(serde_json::from_slice(&request.body).map_err(|e| error(400, &e.to_string())));
                object.bucket = bucket.to_string();
                if let Some(name) = request.query_value("name") {
                    object.name = name.to_string();
                }
                self.session_id += 1;
                let id = format!("session-{}", self.session_id);
                let location = format!("/upload/storage/v1/b/{bucket}/o?uploadType=resumable&upload_id={id}");
                self.sessions.insert(
                    id,
                    Session {
                        object,
                        query: request.query.clone(),
                        data: vec![],
                        finished: None,
                    },
                );
                TransportResponse::new(200).header("Location", location)
            }
            _ => error(400, "unknown uploadType"),
        }
    }

    fn upload_chunk(&mut self, request: &TransportRequest, id: &str) -> TransportResponse {
        let Some((range, total)) = request.header_value("Content-Range").and_then(content_range) else {
            return error(400, "invalid Content-Range");
        };
        let Some(session) = self.sessions.get_mut(id) else {
            return error(404, "No such upload");
        };
        if let Some(object) = &session.finished {
            return json(200, object);
        }
        if let Some((first, _)) = range {
            let held = session.data.len() as u64;
            if first > held {
                return error(400, "chunk does not continue the upload");
            }
            let skip = ((held - first) as usize).min(request.body.len());
            session.data.extend_from_slice(&request.body[skip..]);
        }
        if total.is_some_and(|t| t == session.data.len() as u64) {
            return self.finish(request, id);
        }
        incomplete(session.data.len())
    }

    fn accept_prefix(&mut self, request: &TransportRequest, len: usize) -> TransportResponse {
        let id = request.query_value("upload_id").unwrap_or_default().to_string();
        if let Some(session) = self.sessions.get_mut(&id) {
            let len = len.min(request.body.len());
            session.data.extend_from_slice(&request.body[..len]);
        }
        error(503, "connection dropped mid-upload")
    }

    fn finish(&mut self, request: &TransportRequest, id: &str) -> TransportResponse {
        let Some(session) = self.sessions.get(id) else {
            return error(404, "No such upload");
        };
        let creation = TransportRequest {
            query: session.query.clone(),
            ..request.clone()
        };
        let object = session.object.clone();
        let content = Bytes::from(session.data.clone());
        try_response!(check_preconditions(
            &creation,
            self.current(&object.bucket, &object.name).map(|s| &s.object),
            false
        ));
        let stored = self.store(object, content);
        if let Some(session) = self.sessions.get_mut(id) {
            session.finished = Some(stored.clone());
        }
        json(200, &stored)
    }

    fn batch(&mut self, parts: Option<&[Part]>, drop: Option<usize>) -> TransportResponse {
        let Some(parts) = parts else {
            return error(400, "batch request is not multipart");
        };
        let mut answers = vec![];
        for (i, part) in parts.iter().enumerate() {
            let inner = try_response!(multipart::decode_request(&part.body).map_err(|e| error(400, &e.to_string())));
            let response = self.handle(&inner, None);
            if drop == Some(i) {
                continue;
            }
            let content_id = part.header_value("Content-ID").unwrap_or_default();
            let content_id = content_id.trim_start_matches('<').trim_end_matches('>');
            answers.push(
                Part::new(multipart::encode_response(&response))
                    .header("Content-Type", "application/http")
                    .header("Content-ID", format!("<response-{content_id}>")),
            );
        }
        let boundary = "batch_mock_response";
        TransportResponse::new(200)
            .header("Content-Type", format!("multipart/mixed; boundary={boundary}"))
            .body(multipart::encode(boundary, &answers))
    }
}

fn incomplete(held: usize) -> TransportResponse {
    let response = TransportResponse::new(308);
    if held == 0 {
        response
    } else {
        response.header("Range", format!("bytes=0-{}", held - 1))
    }
}
