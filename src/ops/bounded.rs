use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Run `unit(i)` for every `i` in `0..total_units`, at most
/// `max_concurrency` at a time, and wait for all of them.
///
/// The limit is clamped to `1..=Semaphore::MAX_PERMITS`.
///
/// A permit is taken before each unit is spawned, so no more than
/// `max_concurrency` tasks exist at once. Units report their own failures;
/// a panicking unit is logged and does not stop the others.
pub async fn run_bounded<F, Fut>(max_concurrency: usize, total_units: usize, unit: F)
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrency.clamp(1, Semaphore::MAX_PERMITS)));
    let mut join_set = JoinSet::new();

    for index in 0..total_units {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(why) => {
                tracing::error!("Stopped scheduling work at unit {}: {}", index, why);
                break;
            }
        };

        let work = unit(index);
        join_set.spawn(async move {
            work.await;
            drop(permit);
        });
    }

    while let Some(result) = join_set.join_next().await {
        if let Err(why) = result {
            tracing::error!("Work unit failed to complete: {}", why);
        }
    }
}
