//! The contract between a queue and whatever produces its elements.

use std::{error, fmt, marker::PhantomData};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
/// Produces one element for a seed.
///
/// A generator is shared by every worker of a queue and is called
/// concurrently, possibly with the same seed from several workers at once.
pub trait Generator<S>: Send + Sync + 'static
where
    S: Send + Sync + 'static,
{
    /// The element produced.
    type Output: Send + 'static;
    /// The failure produced.
    type Error: error::Error + Send + Sync + 'static;

    /// Generate the next element for `seed`.
    ///
    /// Long running implementations should return promptly once `token` is
    /// cancelled. The queue discards whatever is returned after
    /// cancellation.
    ///
    /// # Errors
    ///
    /// Any error stops the queue, the first one is reported to consumers.
    async fn generate(&self, token: &CancellationToken, seed: &S)
    -> Result<Self::Output, Self::Error>;
}

/// A [`Generator`] backed by a synchronous function, see [`from_fn`].
pub struct FromFn<F, T, E> {
    func: F,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<F, T, E> fmt::Debug for FromFn<F, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromFn").finish_non_exhaustive()
    }
}

/// Wrap `func` into a [`Generator`].
pub fn from_fn<S, F, T, E>(func: F) -> FromFn<F, T, E>
where
    F: Fn(&S) -> Result<T, E>,
{
    FromFn {
        func,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<S, F, T, E> Generator<S> for FromFn<F, T, E>
where
    S: Send + Sync + 'static,
    F: Fn(&S) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: error::Error + Send + Sync + 'static,
{
    type Output = T;
    type Error = E;

    async fn generate(&self, _token: &CancellationToken, seed: &S) -> Result<T, E> {
        (self.func)(seed)
    }
}
