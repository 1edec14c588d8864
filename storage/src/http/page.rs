use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, Stream};

use crate::http::Error;
use crate::option::Options;

/// One listing response.
#[derive(Debug)]
pub(crate) struct PageResult<T> {
    pub values: Vec<T>,
    pub prefixes: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Fetches one page of a listing. Implementations run the call through the retry engine.
#[async_trait]
pub(crate) trait PageFetcher<T>: Send + Sync {
    async fn fetch(&self, options: Options) -> Result<PageResult<T>, Error>;
}

/// A materialized page of a listing and the cursor to the next one.
///
/// A page never changes: [`Page::next_page`] returns a new page, and returns
/// `None` once the listing is exhausted, no matter how often it is called.
pub struct Page<T> {
    values: Vec<T>,
    prefixes: Vec<String>,
    next_page_token: Option<String>,
    options: Options,
    fetcher: Arc<dyn PageFetcher<T>>,
}

impl<T> fmt::Debug for Page<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("values", &self.values)
            .field("prefixes", &self.prefixes)
            .field("next_page_token", &self.next_page_token)
            .finish()
    }
}

impl<T: Send + 'static> Page<T> {
    pub(crate) async fn first(fetcher: Arc<dyn PageFetcher<T>>, options: Options) -> Result<Self, Error> {
        let result = fetcher.fetch(options.clone()).await?;
        Ok(Self::from_result(result, options, fetcher))
    }

    fn from_result(result: PageResult<T>, options: Options, fetcher: Arc<dyn PageFetcher<T>>) -> Self {
        Self {
            values: result.values,
            prefixes: result.prefixes,
            next_page_token: result.next_page_token.filter(|token| !token.is_empty()),
            options,
            fetcher,
        }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    /// The prefixes of a delimiter listing. Always empty for bucket listings.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn next_page_token(&self) -> Option<&str> {
        self.next_page_token.as_deref()
    }

    pub fn has_next_page(&self) -> bool {
        self.next_page_token.is_some()
    }

    /// Fetches the page after this one with the same options and this page's token.
    pub async fn next_page(&self) -> Result<Option<Page<T>>, Error> {
        let Some(token) = &self.next_page_token else {
            return Ok(None);
        };
        let options = self.options.with_page_token(token);
        let result = self.fetcher.fetch(options.clone()).await?;
        Ok(Some(Self::from_result(result, options, self.fetcher.clone())))
    }

    /// Every value of this and all following pages. Pages are fetched lazily;
    /// the stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, Error>> + Send {
        let walk = Walk {
            buffer: self.values.into_iter(),
            token: self.next_page_token,
            options: self.options,
            fetcher: self.fetcher,
        };
        stream::unfold(walk, |mut walk| async move {
            loop {
                if let Some(value) = walk.buffer.next() {
                    return Some((Ok(value), walk));
                }
                let token = walk.token.take()?;
                match walk.fetcher.fetch(walk.options.with_page_token(&token)).await {
                    Ok(result) => {
                        walk.buffer = result.values.into_iter();
                        walk.token = result.next_page_token.filter(|token| !token.is_empty());
                    }
                    Err(e) => return Some((Err(e), walk)),
                }
            }
        })
    }
}

struct Walk<T> {
    buffer: std::vec::IntoIter<T>,
    token: Option<String>,
    options: Options,
    fetcher: Arc<dyn PageFetcher<T>>,
}
