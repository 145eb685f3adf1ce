//! Feed reader abstraction.
//!
//! A [`FeedReader`] turns one transport into a sequence of [`FeedEvent`]s:
//!
//! - `next()` yields `Ok(Some(event))`, `Ok(None)` at end-of-stream, or the first error
//! - once `next()` has failed, `err()` reports that error and later calls return it again
//! - row events are deduplicated; resolved notifications never are
//! - `close()` releases transport resources; closing twice is a no-op

use async_trait::async_trait;
use feedcheck_core::{FeedError, FeedResult};

use crate::event::FeedEvent;

#[async_trait]
pub trait FeedReader: Send {
    /// Partition labels this feed may deliver rows under.
    fn partitions(&self) -> Vec<String>;

    async fn next(&mut self) -> FeedResult<Option<FeedEvent>>;

    /// The error that stopped the feed, if any.
    fn err(&self) -> Option<&FeedError>;

    async fn close(&mut self) -> FeedResult<()>;
}

#[async_trait]
impl<R: FeedReader + ?Sized> FeedReader for Box<R> {
    fn partitions(&self) -> Vec<String> {
        (**self).partitions()
    }

    async fn next(&mut self) -> FeedResult<Option<FeedEvent>> {
        (**self).next().await
    }

    fn err(&self) -> Option<&FeedError> {
        (**self).err()
    }

    async fn close(&mut self) -> FeedResult<()> {
        (**self).close().await
    }
}

/// Records the first error a reader returned so it can be replayed.
#[derive(Debug, Default)]
pub struct FirstError(Option<FeedError>);

impl FirstError {
    /// Fails with the recorded error, if any.
    pub fn check(&self) -> FeedResult<()> {
        match &self.0 {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Passes `result` through, remembering its error if it is the first one.
    pub fn record<T>(&mut self, result: FeedResult<T>) -> FeedResult<T> {
        if let Err(err) = &result {
            if self.0.is_none() {
                self.0 = Some(err.clone());
            }
        }
        result
    }

    pub fn get(&self) -> Option<&FeedError> {
        self.0.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_first_error_sticks() {
        let mut first = FirstError::default();
        assert!(first.check().is_ok());
        assert_eq!(first.record(Ok::<_, FeedError>(1)).unwrap(), 1);
        let _ = first.record::<()>(Err(FeedError::transport("a")));
        let _ = first.record::<()>(Err(FeedError::transport("b")));
        assert_eq!(first.get(), Some(&FeedError::transport("a")));
        assert_eq!(first.check(), Err(FeedError::transport("a")));
    }
}
