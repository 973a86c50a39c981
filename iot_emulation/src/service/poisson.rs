use anyhow::{Context, Result};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Finite Poisson point process driving one job.
///
/// One signal is emitted immediately, then the process draws exponential
/// inter-arrival times with mean `mean_interval` until `total_duration` has
/// elapsed; it may overshoot the total duration by at most one draw. The
/// channel has a single slot so a slow consumer holds back the producer and
/// with it the effective arrival schedule. Once the duration is exhausted
/// the channel closes; the process cannot be restarted.
///
/// The producing task's handle is returned with the receiver so the owner
/// can join it and surface a panic instead of dropping it.
pub fn exponential_arrivals(
    mean_interval: Duration,
    total_duration: Duration,
) -> Result<(mpsc::Receiver<()>, JoinHandle<()>)> {
    let lambda = 1.0 / (mean_interval.as_secs_f64() * 1000.0);
    let distribution = Exp::new(lambda)
        .context("The mean inter-arrival duration must be positive")?;
    let (tx, rx) = mpsc::channel(1);
    let producer = tokio::spawn(async move {
        let mut rng = SmallRng::from_entropy();
        let started_at = Instant::now();
        loop {
            if tx.send(()).await.is_err() {
                // Consumer went away, no point in keeping the schedule
                break;
            }
            let wait_ms = distribution.sample(&mut rng);
            tokio::time::sleep(Duration::from_secs_f64(wait_ms / 1000.0))
                .await;
            if started_at.elapsed() > total_duration {
                break;
            }
        }
    });
    Ok((rx, producer))
}
