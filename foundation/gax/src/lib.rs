//! # storage-gax
//!
//! The retry engine every remote call of `storage-rpc` goes through.
//!
//! A unit of work is a closure producing a future. [`retry::invoke`] runs it,
//! asks a [`retry::Predicate`] whether a failure is worth another attempt and
//! sleeps according to [`retry::RetrySetting`] in between.
//!
//! ```
//! use storage_gax::retry::{invoke, RetrySetting};
//!
//! async fn run() {
//!     let result: Result<u32, _> = invoke(
//!         || async { Err::<u32, &str>("unavailable") },
//!         &RetrySetting::default(),
//!         &mut |e: &&str| *e == "unavailable",
//!     )
//!     .await;
//!     assert!(result.unwrap_err().is_exhausted());
//! }
//! ```
pub mod retry;
