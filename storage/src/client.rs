use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;
use storage_gax::retry::RetrySetting;
use time::OffsetDateTime;
use token_source::TokenSourceProvider;
use url::Url;

use crate::http::objects::Object;
use crate::http::storage_client::StorageClient;
use crate::http::transport::{HttpTransport, Transport};
use crate::http::write_channel::{upload_chunk_size, UPLOAD_QUANTUM};
use crate::http::Error;
use crate::sign::{create_signed_url, ServiceAccountSigner, SignedURLError, SignedURLOptions};

const CHUNK_SIZE: usize = 8 * UPLOAD_QUANTUM;

#[derive(Debug)]
pub struct ClientConfig {
    pub http: Option<ClientWithMiddleware>,
    pub storage_endpoint: String,
    /// `None` sends every request without credentials.
    pub token_source_provider: Option<Box<dyn TokenSourceProvider>>,
    pub retry: RetrySetting,
    pub read_chunk_size: usize,
    /// Rounded up to a multiple of 256 KiB, the unit resumable uploads commit in.
    pub write_chunk_size: usize,
    pub default_signer: Option<ServiceAccountSigner>,
    /// Used for `StorageOption::CurrentDirectory` listings.
    pub path_delimiter: String,
    pub project_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http: None,
            storage_endpoint: "https://storage.googleapis.com".to_string(),
            token_source_provider: None,
            retry: RetrySetting::default(),
            read_chunk_size: CHUNK_SIZE,
            write_chunk_size: CHUNK_SIZE,
            default_signer: None,
            path_delimiter: "/".to_string(),
            project_id: None,
        }
    }
}

impl ClientConfig {
    pub fn anonymous(mut self) -> Self {
        self.token_source_provider = None;
        self
    }

    pub fn with_token_source_provider(mut self, provider: Box<dyn TokenSourceProvider>) -> Self {
        self.token_source_provider = Some(provider);
        self
    }
}

#[derive(Clone, Debug)]
pub struct Client {
    default_signer: Option<ServiceAccountSigner>,
    storage_client: StorageClient,
}

impl Deref for Client {
    type Target = StorageClient;

    fn deref(&self) -> &Self::Target {
        &self.storage_client
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Client {
    /// New client
    pub fn new(mut config: ClientConfig) -> Self {
        let ts = match config.token_source_provider.take() {
            Some(tsp) => Some(tsp.token_source()),
            None => {
                tracing::trace!("Use anonymous access due to lack of token");
                None
            }
        };
        let http = config
            .http
            .take()
            .unwrap_or_else(|| reqwest_middleware::ClientBuilder::new(reqwest::Client::default()).build());
        let transport = HttpTransport::new(&config.storage_endpoint, http, ts);
        Self::with_transport(Arc::new(transport), config)
    }

    /// A client sending every request through `transport`. The transport
    /// settings of `config` are ignored.
    pub fn with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let storage_client = StorageClient::new(
            transport,
            config.retry,
            config.project_id,
            config.read_chunk_size.max(1),
            upload_chunk_size(config.write_chunk_size),
            config.path_delimiter,
        );
        Self {
            default_signer: config.default_signer,
            storage_client,
        }
    }

    /// Get signed url.
    /// SignedURL returns a URL for the specified object. Signed URLs allow anyone
    /// access to a restricted resource for a limited time without needing a
    /// Google account or signing in. For more information about signed URLs, see
    /// https://cloud.google.com/storage/docs/access-control/signed-urls-v2
    ///
    /// The URL expires `duration` from now. `signer` overrides the configured default signer.
    ///
    /// ```
    /// use std::time::Duration;
    /// use storage_rpc::client::Client;
    /// use storage_rpc::http::objects::Object;
    /// use storage_rpc::sign::SignedURLOptions;
    ///
    /// fn run(client: Client, object: Object) {
    ///     let url_for_download = client.signed_url(&object, Duration::from_secs(600), None, SignedURLOptions::default());
    /// }
    /// ```
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub fn signed_url(
        &self,
        object: &Object,
        duration: Duration,
        signer: Option<&ServiceAccountSigner>,
        opts: SignedURLOptions,
    ) -> Result<Url, Error> {
        let signer = signer
            .or(self.default_signer.as_ref())
            .ok_or(SignedURLError::MissingCredential)?;
        let expiration = i64::try_from(duration.as_secs())
            .ok()
            .and_then(|secs| OffsetDateTime::now_utc().unix_timestamp().checked_add(secs))
            .ok_or(SignedURLError::InvalidOption("duration is too long"))?;
        Ok(create_signed_url(object, expiration, signer, &opts)?)
    }
}
