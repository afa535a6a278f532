//! Panic-to-error conversion at fallible boundaries.
//!
//! `std::result::Result` already is the two-variant outcome type and carries
//! `map`, `and_then` and `unwrap_or`. What it cannot express is code that
//! unwinds; these helpers turn a panic into [`BriefwireError::Panicked`] so a
//! misbehaving collaborator or parser never takes the whole run down.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use crate::error::{BriefwireError, Result};

/// Run `f`, converting any panic into an error value.
pub fn try_catch<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T,
{
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_to_error)
}

/// Await `fut`, converting any panic raised while polling into an error value.
pub async fn try_catch_async<T, Fut>(fut: Fut) -> Result<T>
where
    Fut: Future<Output = T>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(panic_to_error)
}

fn panic_to_error(payload: Box<dyn Any + Send>) -> BriefwireError {
    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(%message, "caught panic at fallible boundary");
    BriefwireError::Panicked { message }
}
