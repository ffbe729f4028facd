//! Continuous polling with a fixed two-tier delay policy.
//!
//! Each poller owns one configured point and loops forever: read, emit the
//! value(s) on success, then sleep. A successful poll is followed by the
//! success interval (500 ms by default); a failed one is logged and followed
//! by the retry interval (1 s by default). Retries are unbounded, with no
//! jitter and no backoff growth: the fixed delays are the rate limit toward
//! a physical device that may reject rapid repeated requests.
//!
//! The loop races every sleep against a shutdown signal, so pollers stop
//! cooperatively instead of requiring process termination.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::config::{PointConfig, PollConfig};
use crate::link::{DeviceLink, LinkError};
use crate::ops;

/// One successfully polled value, attributed to its logical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSample {
    pub address: u32,
    pub value: SampleValue,
}

/// The value carried by a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleValue {
    Register(u16),
    Coil(bool),
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Register(v) => write!(f, "{}", v),
            SampleValue::Coil(v) => write!(f, "{}", v),
        }
    }
}

/// A poller for a single register, register range, or coil.
pub struct Poller<L> {
    link: Arc<L>,
    point: PointConfig,
    success_interval: Duration,
    retry_interval: Duration,
    samples: mpsc::Sender<PollSample>,
    shutdown: watch::Receiver<bool>,
}

impl<L: DeviceLink> Poller<L> {
    /// Create a poller for one configured point.
    pub fn new(
        link: Arc<L>,
        point: PointConfig,
        config: &PollConfig,
        samples: mpsc::Sender<PollSample>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            link,
            point,
            success_interval: Duration::from_millis(config.success_interval_ms),
            retry_interval: Duration::from_millis(config.retry_interval_ms),
            samples,
            shutdown,
        }
    }

    /// Run the polling loop until shutdown is signalled.
    ///
    /// Failures are never fatal: every one is converted into a delayed
    /// retry, indefinitely.
    pub async fn run(mut self) {
        info!(
            "Starting poller for {} (success interval {:?}, retry interval {:?})",
            self.point.describe(),
            self.success_interval,
            self.retry_interval
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let delay = match self.poll_once().await {
                Ok(()) => self.success_interval,
                Err(e) => {
                    error!(
                        "Error reading {}: {}. Retrying in {:?}...",
                        self.point.describe(),
                        e,
                        self.retry_interval
                    );
                    self.retry_interval
                }
            };

            if !self.sleep_or_shutdown(delay).await {
                break;
            }
        }

        debug!("Poller for {} stopped", self.point.describe());
    }

    /// Perform a single read and emit the resulting sample(s).
    async fn poll_once(&self) -> Result<(), LinkError> {
        match self.point {
            PointConfig::Register { address } => {
                let value = ops::read_register(self.link.as_ref(), address).await?;
                self.emit(address, SampleValue::Register(value)).await;
            }
            PointConfig::Registers { address, count } => {
                let values = ops::read_registers(self.link.as_ref(), address, count).await?;
                for (i, value) in values.into_iter().enumerate() {
                    self.emit(address + i as u32, SampleValue::Register(value))
                        .await;
                }
            }
            PointConfig::Coil { address } => {
                let value = ops::read_coil(self.link.as_ref(), address).await?;
                self.emit(address, SampleValue::Coil(value)).await;
            }
        }
        Ok(())
    }

    async fn emit(&self, address: u32, value: SampleValue) {
        if self
            .samples
            .send(PollSample { address, value })
            .await
            .is_err()
        {
            debug!("Sample consumer gone; dropping {}", address);
        }
    }

    /// Sleep for `delay`, waking early on shutdown.
    ///
    /// Returns `false` when shutdown was signalled during the wait.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            changed = self.shutdown.changed() => match changed {
                Ok(()) => !*self.shutdown.borrow(),
                // Sender dropped: treat as shutdown.
                Err(_) => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays a scripted sequence of responses and records every request.
    #[derive(Default)]
    struct ScriptedLink {
        holding: Mutex<VecDeque<Result<Vec<u16>, LinkError>>>,
        coils: Mutex<VecDeque<Result<Vec<bool>, LinkError>>>,
        holding_calls: Mutex<Vec<(u16, u16)>>,
        coil_calls: Mutex<Vec<(u16, u16)>>,
    }

    impl ScriptedLink {
        fn with_holding(script: Vec<Result<Vec<u16>, LinkError>>) -> Self {
            Self {
                holding: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn with_coils(script: Vec<Result<Vec<bool>, LinkError>>) -> Self {
            Self {
                coils: Mutex::new(script.into()),
                ..Default::default()
            }
        }
    }

    impl DeviceLink for ScriptedLink {
        async fn read_holding(&self, offset: u16, count: u16) -> Result<Vec<u16>, LinkError> {
            self.holding_calls.lock().unwrap().push((offset, count));
            self.holding
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LinkError::Read("script exhausted".to_string())))
        }

        async fn read_coils(&self, offset: u16, count: u16) -> Result<Vec<bool>, LinkError> {
            self.coil_calls.lock().unwrap().push((offset, count));
            self.coils
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LinkError::Read("script exhausted".to_string())))
        }

        async fn write_holding(&self, _offset: u16, _value: u16) -> Result<(), LinkError> {
            Ok(())
        }

        async fn write_coil(&self, _offset: u16, _value: bool) -> Result<(), LinkError> {
            Ok(())
        }
    }

    fn spawn_poller(
        link: Arc<ScriptedLink>,
        point: PointConfig,
    ) -> (
        mpsc::Receiver<PollSample>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<()>,
    ) {
        let config = PollConfig::default();
        let (sample_tx, sample_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = Poller::new(link, point, &config, sample_tx, shutdown_rx);
        let handle = tokio::spawn(poller.run());
        (sample_rx, shutdown_tx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_poll_issues_one_translated_request_per_cycle() {
        let link = Arc::new(ScriptedLink::with_holding(vec![Ok(vec![1, 2, 3, 4, 5])]));
        let (mut samples, shutdown, handle) = spawn_poller(
            link.clone(),
            PointConfig::Registers {
                address: 400010,
                count: 5,
            },
        );

        for i in 0..5u32 {
            let sample = samples.recv().await.unwrap();
            assert_eq!(sample.address, 400010 + i);
            assert_eq!(sample.value, SampleValue::Register(1 + i as u16));
        }
        assert_eq!(link.holding_calls.lock().unwrap().as_slice(), &[(9, 5)]);

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_delay_success_by_two_retry_intervals() {
        let link = Arc::new(ScriptedLink::with_holding(vec![
            Err(LinkError::Read("connection reset".to_string())),
            Err(LinkError::Read("connection reset".to_string())),
            Ok(vec![7]),
        ]));
        let (mut samples, shutdown, handle) =
            spawn_poller(link, PointConfig::Register { address: 400001 });

        let start = Instant::now();
        let sample = samples.recv().await.unwrap();

        // Two failed attempts, each followed by the 1 s retry interval.
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(sample.address, 400001);
        assert_eq!(sample.value, SampleValue::Register(7));

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_polls_are_spaced_by_the_success_interval() {
        let link = Arc::new(ScriptedLink::with_holding(vec![
            Ok(vec![1]),
            Ok(vec![2]),
            Ok(vec![3]),
        ]));
        let (mut samples, shutdown, handle) =
            spawn_poller(link, PointConfig::Register { address: 400001 });

        let start = Instant::now();
        let mut arrivals = Vec::new();
        for _ in 0..3 {
            samples.recv().await.unwrap();
            arrivals.push(start.elapsed());
        }

        assert_eq!(
            arrivals,
            vec![
                Duration::ZERO,
                Duration::from_millis(500),
                Duration::from_millis(1000),
            ]
        );

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_coil_failures_use_the_same_retry_discipline() {
        let link = Arc::new(ScriptedLink::with_coils(vec![
            Err(LinkError::Read("connection reset".to_string())),
            Ok(vec![true]),
        ]));
        let (mut samples, shutdown, handle) =
            spawn_poller(link.clone(), PointConfig::Coil { address: 100050 });

        let start = Instant::now();
        let sample = samples.recv().await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(sample.address, 100050);
        assert_eq!(sample.value, SampleValue::Coil(true));
        assert_eq!(link.coil_calls.lock().unwrap().as_slice(), &[(49, 1), (49, 1)]);

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_stops_on_shutdown_signal() {
        let link = Arc::new(ScriptedLink::with_holding(vec![Ok(vec![1])]));
        let (mut samples, shutdown, handle) =
            spawn_poller(link, PointConfig::Register { address: 400001 });

        samples.recv().await.unwrap();
        shutdown.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop after shutdown")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_sender_stops_the_poller() {
        let link = Arc::new(ScriptedLink::default());
        let (_samples, shutdown, handle) =
            spawn_poller(link, PointConfig::Register { address: 400001 });

        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop after sender drop")
            .unwrap();
    }
}
