//! Async testing utilities

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Poll an async condition until it is true or `timeout` elapses
///
/// Time is measured on the tokio clock, so this also works under
/// `#[tokio::test(start_paused = true)]`.
///
/// ```
/// use std::time::Duration;
///
/// use storefront_session::testing::poll_until;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let ready = poll_until(Duration::from_millis(50), Duration::from_millis(5), || async { true }).await;
/// assert!(ready);
/// # }
/// ```
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }

    condition().await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_sees_late_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = flag.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            setter.store(true, Ordering::SeqCst);
        });

        let flag_ref = &flag;
        let result = poll_until(Duration::from_secs(1), Duration::from_millis(10), || async move {
            flag_ref.load(Ordering::SeqCst)
        })
        .await;
        assert!(result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_times_out() {
        let result =
            poll_until(Duration::from_millis(100), Duration::from_millis(10), || async { false })
                .await;
        assert!(!result);
    }
}
