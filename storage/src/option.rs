//! Optional request parameters and preconditions.
//!
//! Every optional parameter of a request is one [`StorageOption`]. A request
//! carries at most one option of each [`OptionKind`]; [`Options::build`]
//! rejects duplicates.
//!
//! A precondition option may be given without a value, e.g.
//! `StorageOption::IfGenerationMatch(None)`. The value is then taken from the
//! record the request targets when the options are merged with
//! [`Options::merge_preconditions`].
//!
//! ```
//! use storage_rpc::option::{Options, OptionKind, StorageOption};
//!
//! let options = Options::build([StorageOption::IfGenerationMatch(None)]).unwrap();
//! let merged = options.merge_preconditions(Some(7), None, false).unwrap();
//! assert_eq!(merged.get(OptionKind::IfGenerationMatch), Some(&StorageOption::IfGenerationMatch(Some(7))));
//! ```
use std::collections::BTreeMap;

use crate::http::Error;

/// Set of properties to return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    Full,
    NoAcl,
}

impl Projection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Projection::Full => "full",
            Projection::NoAcl => "noAcl",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageOption {
    IfGenerationMatch(Option<i64>),
    IfGenerationNotMatch(Option<i64>),
    IfMetagenerationMatch(Option<i64>),
    IfMetagenerationNotMatch(Option<i64>),
    IfSourceGenerationMatch(Option<i64>),
    IfSourceGenerationNotMatch(Option<i64>),
    IfSourceMetagenerationMatch(Option<i64>),
    IfSourceMetagenerationNotMatch(Option<i64>),
    Delimiter(String),
    /// Directory-like listing using the client's configured path delimiter.
    CurrentDirectory,
    Prefix(String),
    /// Partial response field mask.
    Fields(String),
    PageToken(String),
    MaxResults(u32),
    Projection(Projection),
    PredefinedAcl(String),
    Versions(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionKind {
    IfGenerationMatch,
    IfGenerationNotMatch,
    IfMetagenerationMatch,
    IfMetagenerationNotMatch,
    IfSourceGenerationMatch,
    IfSourceGenerationNotMatch,
    IfSourceMetagenerationMatch,
    IfSourceMetagenerationNotMatch,
    Delimiter,
    Prefix,
    Fields,
    PageToken,
    MaxResults,
    Projection,
    PredefinedAcl,
    Versions,
}

impl OptionKind {
    /// The query parameter name of the option.
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKind::IfGenerationMatch => "ifGenerationMatch",
            OptionKind::IfGenerationNotMatch => "ifGenerationNotMatch",
            OptionKind::IfMetagenerationMatch => "ifMetagenerationMatch",
            OptionKind::IfMetagenerationNotMatch => "ifMetagenerationNotMatch",
            OptionKind::IfSourceGenerationMatch => "ifSourceGenerationMatch",
            OptionKind::IfSourceGenerationNotMatch => "ifSourceGenerationNotMatch",
            OptionKind::IfSourceMetagenerationMatch => "ifSourceMetagenerationMatch",
            OptionKind::IfSourceMetagenerationNotMatch => "ifSourceMetagenerationNotMatch",
            OptionKind::Delimiter => "delimiter",
            OptionKind::Prefix => "prefix",
            OptionKind::Fields => "fields",
            OptionKind::PageToken => "pageToken",
            OptionKind::MaxResults => "maxResults",
            OptionKind::Projection => "projection",
            OptionKind::PredefinedAcl => "predefinedAcl",
            OptionKind::Versions => "versions",
        }
    }

    fn is_precondition(&self) -> bool {
        *self <= OptionKind::IfSourceMetagenerationNotMatch
    }
}

impl StorageOption {
    pub fn kind(&self) -> OptionKind {
        match self {
            StorageOption::IfGenerationMatch(_) => OptionKind::IfGenerationMatch,
            StorageOption::IfGenerationNotMatch(_) => OptionKind::IfGenerationNotMatch,
            StorageOption::IfMetagenerationMatch(_) => OptionKind::IfMetagenerationMatch,
            StorageOption::IfMetagenerationNotMatch(_) => OptionKind::IfMetagenerationNotMatch,
            StorageOption::IfSourceGenerationMatch(_) => OptionKind::IfSourceGenerationMatch,
            StorageOption::IfSourceGenerationNotMatch(_) => OptionKind::IfSourceGenerationNotMatch,
            StorageOption::IfSourceMetagenerationMatch(_) => OptionKind::IfSourceMetagenerationMatch,
            StorageOption::IfSourceMetagenerationNotMatch(_) => OptionKind::IfSourceMetagenerationNotMatch,
            StorageOption::Delimiter(_) | StorageOption::CurrentDirectory => OptionKind::Delimiter,
            StorageOption::Prefix(_) => OptionKind::Prefix,
            StorageOption::Fields(_) => OptionKind::Fields,
            StorageOption::PageToken(_) => OptionKind::PageToken,
            StorageOption::MaxResults(_) => OptionKind::MaxResults,
            StorageOption::Projection(_) => OptionKind::Projection,
            StorageOption::PredefinedAcl(_) => OptionKind::PredefinedAcl,
            StorageOption::Versions(_) => OptionKind::Versions,
        }
    }

    /// The value of a precondition option, `None` when it is left to the target record.
    fn precondition_value(&self) -> Option<i64> {
        match self {
            StorageOption::IfGenerationMatch(v)
            | StorageOption::IfGenerationNotMatch(v)
            | StorageOption::IfMetagenerationMatch(v)
            | StorageOption::IfMetagenerationNotMatch(v)
            | StorageOption::IfSourceGenerationMatch(v)
            | StorageOption::IfSourceGenerationNotMatch(v)
            | StorageOption::IfSourceMetagenerationMatch(v)
            | StorageOption::IfSourceMetagenerationNotMatch(v) => *v,
            _ => None,
        }
    }

    fn precondition(kind: OptionKind, value: i64) -> StorageOption {
        let value = Some(value);
        match kind {
            OptionKind::IfGenerationMatch => StorageOption::IfGenerationMatch(value),
            OptionKind::IfGenerationNotMatch => StorageOption::IfGenerationNotMatch(value),
            OptionKind::IfMetagenerationMatch => StorageOption::IfMetagenerationMatch(value),
            OptionKind::IfMetagenerationNotMatch => StorageOption::IfMetagenerationNotMatch(value),
            OptionKind::IfSourceGenerationMatch => StorageOption::IfSourceGenerationMatch(value),
            OptionKind::IfSourceGenerationNotMatch => StorageOption::IfSourceGenerationNotMatch(value),
            OptionKind::IfSourceMetagenerationMatch => StorageOption::IfSourceMetagenerationMatch(value),
            _ => StorageOption::IfSourceMetagenerationNotMatch(value),
        }
    }

    fn query_value(&self) -> Option<String> {
        match self {
            StorageOption::Delimiter(v)
            | StorageOption::Prefix(v)
            | StorageOption::Fields(v)
            | StorageOption::PageToken(v)
            | StorageOption::PredefinedAcl(v) => Some(v.clone()),
            StorageOption::CurrentDirectory => None,
            StorageOption::MaxResults(v) => Some(v.to_string()),
            StorageOption::Projection(v) => Some(v.as_str().to_string()),
            StorageOption::Versions(v) => Some(v.to_string()),
            other => other.precondition_value().map(|v| v.to_string()),
        }
    }
}

/// The generic precondition kinds, each with the default it takes and the kind used for a source.
const PRECONDITIONS: [(OptionKind, Fallback, OptionKind); 4] = [
    (
        OptionKind::IfGenerationMatch,
        Fallback::Generation,
        OptionKind::IfSourceGenerationMatch,
    ),
    (
        OptionKind::IfGenerationNotMatch,
        Fallback::Generation,
        OptionKind::IfSourceGenerationNotMatch,
    ),
    (
        OptionKind::IfMetagenerationMatch,
        Fallback::Metageneration,
        OptionKind::IfSourceMetagenerationMatch,
    ),
    (
        OptionKind::IfMetagenerationNotMatch,
        Fallback::Metageneration,
        OptionKind::IfSourceMetagenerationNotMatch,
    ),
];

#[derive(Clone, Copy)]
enum Fallback {
    Generation,
    Metageneration,
}

/// An immutable set of options holding at most one option per kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    inner: BTreeMap<OptionKind, StorageOption>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `InvalidArgument` when two options share a kind.
    pub fn build(options: impl IntoIterator<Item = StorageOption>) -> Result<Self, Error> {
        let mut inner = BTreeMap::new();
        for option in options {
            let kind = option.kind();
            if let Some(prev) = inner.insert(kind, option) {
                return Err(Error::InvalidArgument(format!("duplicate option {prev:?}")));
            }
        }
        Ok(Self { inner })
    }

    pub fn get(&self, kind: OptionKind) -> Option<&StorageOption> {
        self.inner.get(&kind)
    }

    pub fn contains(&self, kind: OptionKind) -> bool {
        self.inner.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StorageOption> {
        self.inner.values()
    }

    /// Resolves the generic preconditions against the target's generation and metageneration.
    ///
    /// An explicit value always wins over the default. A precondition with
    /// neither fails with `InvalidArgument`. Preconditions absent from the set
    /// stay absent. With `as_source` the generic kinds become the
    /// `IfSource*` kinds.
    pub fn merge_preconditions(
        &self,
        generation: Option<i64>,
        metageneration: Option<i64>,
        as_source: bool,
    ) -> Result<Options, Error> {
        let mut inner = self.inner.clone();
        for (kind, fallback, source_kind) in PRECONDITIONS {
            let Some(option) = inner.remove(&kind) else {
                continue;
            };
            let default = match fallback {
                Fallback::Generation => generation,
                Fallback::Metageneration => metageneration,
            };
            let value = option
                .precondition_value()
                .or(default)
                .ok_or_else(|| Error::InvalidArgument(format!("option {} is missing a value", kind.as_str())))?;
            let target = if as_source { source_kind } else { kind };
            if inner.contains_key(&target) {
                return Err(Error::InvalidArgument(format!(
                    "option {} is given twice",
                    target.as_str()
                )));
            }
            inner.insert(target, StorageOption::precondition(target, value));
        }
        Ok(Options { inner })
    }

    /// Both sets together. Fails with `InvalidArgument` when they share a kind.
    pub(crate) fn union(self, other: Options) -> Result<Options, Error> {
        let mut inner = self.inner;
        for (kind, option) in other.inner {
            if inner.insert(kind, option).is_some() {
                return Err(Error::InvalidArgument(format!("option {} is given twice", kind.as_str())));
            }
        }
        Ok(Options { inner })
    }

    /// Replaces the `Delimiter` placeholder with the configured delimiter.
    pub(crate) fn resolve_delimiter(mut self, delimiter: &str) -> Self {
        if let Some(StorageOption::CurrentDirectory) = self.inner.get(&OptionKind::Delimiter) {
            self.inner
                .insert(OptionKind::Delimiter, StorageOption::Delimiter(delimiter.to_string()));
        }
        self
    }

    /// Options for the next page: the page token replaced by `token`.
    pub(crate) fn with_page_token(&self, token: &str) -> Options {
        let mut inner = self.inner.clone();
        inner.insert(OptionKind::PageToken, StorageOption::PageToken(token.to_string()));
        Options { inner }
    }

    pub(crate) fn without_preconditions(&self) -> Options {
        let inner = self
            .inner
            .iter()
            .filter(|(kind, _)| !kind.is_precondition())
            .map(|(kind, option)| (*kind, option.clone()))
            .collect();
        Options { inner }
    }

    /// Query parameters in kind order; options without a value are skipped.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        self.inner
            .iter()
            .filter_map(|(kind, option)| option.query_value().map(|v| (kind.as_str(), v)))
            .collect()
    }
}

impl TryFrom<Vec<StorageOption>> for Options {
    type Error = Error;

    fn try_from(options: Vec<StorageOption>) -> Result<Self, Self::Error> {
        Options::build(options)
    }
}

impl TryFrom<&[StorageOption]> for Options {
    type Error = Error;

    fn try_from(options: &[StorageOption]) -> Result<Self, Self::Error> {
        Options::build(options.iter().cloned())
    }
}
