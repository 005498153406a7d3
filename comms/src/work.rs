use std::{future::Future, io, pin::Pin};

use futures::future;

/// A pending transfer with a single peer.
///
/// Nothing moves until the handle is awaited, either on its own with `wait` or
/// together with the rest of a round through `wait_all`.
pub struct Work<'a> {
    rank: usize,
    fut: Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>,
}

impl<'a> Work<'a> {
    /// Creates a new `Work` handle.
    ///
    /// # Arguments
    /// * `rank` - The peer this transfer talks to.
    /// * `fut` - The transfer itself.
    pub fn new<F>(rank: usize, fut: F) -> Self
    where
        F: Future<Output = io::Result<()>> + Send + 'a,
    {
        Self {
            rank,
            fut: Box::pin(fut),
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Drives this transfer to completion.
    pub async fn wait(self) -> io::Result<()> {
        self.fut.await
    }
}

/// Waits for every handle in `works` to complete.
///
/// # Returns
/// The rank and error of the first transfer that failed, the remaining ones
/// are dropped mid-flight.
pub async fn wait_all(works: Vec<Work<'_>>) -> Result<(), (usize, io::Error)> {
    let pending = works.into_iter().map(|work| {
        let rank = work.rank;
        async move { work.wait().await.map_err(|e| (rank, e)) }
    });

    future::try_join_all(pending).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_failure_is_reported_with_its_rank() {
        let works = vec![
            Work::new(1, async { Ok(()) }),
            Work::new(2, async { Err(io::Error::other("boom")) }),
            Work::new(3, async { Ok(()) }),
        ];

        let (rank, err) = wait_all(works).await.unwrap_err();
        assert_eq!(rank, 2);
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn empty_round_completes() {
        assert!(wait_all(Vec::new()).await.is_ok());
    }
}
