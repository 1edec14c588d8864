//! Signed URLs granting time-limited access to one object.
//!
//! The string to sign is the V2 canonical form:
//!
//! ```text
//! METHOD\nCONTENT-MD5\nCONTENT-TYPE\nEXPIRATION\n/bucket/object
//! ```
//!
//! It is signed with RSASSA-PKCS1-v1_5 over SHA-256 using the private key of
//! a service account.
//!
//! See https://cloud.google.com/storage/docs/access-control/signed-urls-v2
use std::fmt;

use base64::prelude::*;
use pkcs8::SecretDocument;
use reqwest::Method;
use ring::{rand, signature};
use url::Url;

use crate::http::objects::Object;
use crate::http::ErrorKind;

const HOST: &str = "https://storage.googleapis.com";

/// A service account able to sign URLs.
#[derive(Clone)]
pub struct ServiceAccountSigner {
    /// The `GoogleAccessId` of the signed URL.
    pub client_email: String,
    /// PEM encoded PKCS#8 RSA private key.
    pub private_key: String,
}

impl fmt::Debug for ServiceAccountSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountSigner")
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountSigner {
    pub fn new(client_email: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            client_email: client_email.into(),
            private_key: private_key.into(),
        }
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignedURLError> {
        let (_, der) =
            SecretDocument::from_pem(&self.private_key).map_err(|e| SignedURLError::InvalidKey(e.to_string()))?;
        let key_pair =
            signature::RsaKeyPair::from_pkcs8(der.as_bytes()).map_err(|e| SignedURLError::InvalidKey(e.to_string()))?;
        let mut signed = vec![0; key_pair.public().modulus_len()];
        key_pair
            .sign(&signature::RSA_PKCS1_SHA256, &rand::SystemRandom::new(), payload, &mut signed)
            .map_err(|e| SignedURLError::InvalidKey(e.to_string()))?;
        Ok(signed)
    }
}

/// Restricts what the signed URL can be used for.
#[derive(Clone, Debug)]
pub struct SignedURLOptions {
    /// The HTTP method the URL is valid for. Defaults to GET.
    pub method: Method,
    /// Binds the URL to the object's MD5 hash. The caller has to send it as `Content-MD5`.
    pub md5: bool,
    /// Binds the URL to the object's content type. The caller has to send it as `Content-Type`.
    pub content_type: bool,
}

impl Default for SignedURLOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            md5: false,
            content_type: false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SignedURLError {
    #[error("no signing credential is available")]
    MissingCredential,
    #[error("invalid service account private key: {0}")]
    InvalidKey(String),
    #[error("invalid option: {0}")]
    InvalidOption(&'static str),
    #[error(transparent)]
    ParseError(#[from] url::ParseError),
}

impl SignedURLError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SignedURLError::InvalidOption(_) => ErrorKind::InvalidArgument,
            SignedURLError::MissingCredential | SignedURLError::InvalidKey(_) | SignedURLError::ParseError(_) => {
                ErrorKind::SigningFailure
            }
        }
    }
}

/// `/bucket/object` with exactly one slash in front of the bucket and between bucket and object.
pub(crate) fn canonical_path(bucket: &str, name: &str) -> String {
    let mut path = String::with_capacity(bucket.len() + name.len() + 2);
    if !bucket.starts_with('/') {
        path.push('/');
    }
    path.push_str(bucket);
    if !bucket.ends_with('/') {
        path.push('/');
    }
    if name.starts_with('/') {
        path.pop();
    }
    path.push_str(name);
    path
}

/// Signs a URL for `object` that expires at `expiration` seconds since the epoch.
pub(crate) fn create_signed_url(
    object: &Object,
    expiration: i64,
    signer: &ServiceAccountSigner,
    opts: &SignedURLOptions,
) -> Result<Url, SignedURLError> {
    let md5 = if opts.md5 {
        object
            .md5_hash
            .as_deref()
            .ok_or(SignedURLError::InvalidOption("object is missing a value for md5"))?
    } else {
        ""
    };
    let content_type = if opts.content_type {
        object
            .content_type
            .as_deref()
            .ok_or(SignedURLError::InvalidOption("object is missing a value for content-type"))?
    } else {
        ""
    };
    let path = canonical_path(&object.bucket, &object.name);
    let payload = format!("{}\n{}\n{}\n{}\n{}", opts.method, md5, content_type, expiration, path);
    tracing::trace!("string_to_sign={:?}", payload);

    let signature = signer.sign(payload.as_bytes())?;
    let mut url = Url::parse(&format!("{HOST}{path}"))?;
    url.query_pairs_mut()
        .append_pair("GoogleAccessId", &signer.client_email)
        .append_pair("Expires", &expiration.to_string())
        .append_pair("Signature", &BASE64_STANDARD.encode(signature));
    Ok(url)
}
