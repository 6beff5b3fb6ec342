//! Fault isolation at the plugin boundary.
//!
//! Plugin code runs inside [`isolate`], which turns both returned errors and
//! panics into a [`HandlerError`] so that nothing a plugin does can unwind
//! into the controller's control flow.
//!
//! [`CallbackLock`] is shared by the scheduler and the router: at most one
//! plugin callback is in flight at any time, whatever the runtime flavour.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt as _;
use tokio::sync::Mutex;

use mhub_domain::error::HandlerError;

/// Await `fut`, converting a panic into [`HandlerError::Panicked`].
///
/// # Errors
///
/// Returns the future's own error, or `Panicked` if it unwound.
pub async fn isolate<T, F>(fut: F) -> Result<T, HandlerError>
where
    F: Future<Output = Result<T, HandlerError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Hub-wide turn taken by every plugin callback.
#[derive(Clone, Default)]
pub struct CallbackLock(Arc<Mutex<()>>);

impl CallbackLock {
    /// Wait for the turn, then run `fut` under [`isolate`].
    ///
    /// # Errors
    ///
    /// Same as [`isolate`].
    pub async fn run<T, F>(&self, fut: F) -> Result<T, HandlerError>
    where
        F: Future<Output = Result<T, HandlerError>>,
    {
        let _turn = self.0.lock().await;
        isolate(fut).await
    }
}

impl fmt::Debug for CallbackLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackLock")
            .field("busy", &self.0.try_lock().is_err())
            .finish()
    }
}

/// Extract a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_pass_through_success() {
        let result = isolate(async { Ok::<_, HandlerError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn should_pass_through_error() {
        let result = isolate(async { Err::<(), _>(HandlerError::failed("nope")) }).await;
        assert!(matches!(result, Err(HandlerError::Failed(_))));
    }

    async fn explode() -> Result<(), HandlerError> {
        panic!("socket exploded")
    }

    async fn explode_with(code: i32) -> Result<(), HandlerError> {
        panic!("exit code {code}")
    }

    #[tokio::test]
    async fn should_convert_panic_with_str_payload() {
        match isolate(explode()).await {
            Err(HandlerError::Panicked(msg)) => assert_eq!(msg, "socket exploded"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_convert_panic_with_formatted_payload() {
        match isolate(explode_with(7)).await {
            Err(HandlerError::Panicked(msg)) => assert_eq!(msg, "exit code 7"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_release_turn_after_panicking_callback() {
        let lock = CallbackLock::default();

        let first = lock.run(explode()).await;
        let second = lock.run(async { Ok::<_, HandlerError>("next") }).await;

        assert!(matches!(first, Err(HandlerError::Panicked(_))));
        assert_eq!(second.unwrap(), "next");
    }
}
