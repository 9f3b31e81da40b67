//! Flip gate: one-shot face-down detection over orientation samples
//!
//! Consumes a stream of device-orientation samples and fires a single
//! "flipped" signal once the absolute front-back tilt exceeds the
//! threshold. The latch suppresses repeat firing within one arm cycle; a
//! fresh arm is required for the next reveal. There is no timeout: the
//! gate waits indefinitely, and teardown is the caller's responsibility.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Face-down threshold in degrees.
///
/// Orientation sensors are noisy near the physical limit, so the gate
/// triggers short of a full 180 while still requiring a near-complete
/// flip rather than a tilt.
pub const FLIP_THRESHOLD_DEGREES: f64 = 150.0;

/// One device-orientation sample: front-back tilt in degrees,
/// conventionally 0 when face-up and approaching +/-180 when face-down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub beta: f64,
}

/// Orientation access state, confirmed before the gate may be armed.
///
/// Platforms that gate the sensor behind a runtime grant must have the
/// grant confirmed first; a denied grant means the gate is never armed and
/// the caller presents an explanatory failure instead of hanging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationPermission {
    Granted,
    Denied,
}

/// Handle for one armed reveal cycle.
///
/// Dropping the handle (or calling [`FlipSubscription::cancel`]) tears the
/// listener down; the signal receiver then never fires.
pub struct FlipSubscription {
    cancel: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl FlipSubscription {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the latch has fired in this cycle.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for FlipSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Detects the face-down gesture that reveals the audio.
pub struct FlipGate {
    threshold: f64,
}

impl FlipGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Arm the gate over a sample stream.
    ///
    /// The returned receiver resolves at most once, on the first sample
    /// crossing the threshold; later samples in the same cycle are
    /// swallowed by the latch. Orientation access must already be granted
    /// (see [`OrientationPermission`]) or the receiver can never fire.
    pub fn arm(
        &self,
        mut samples: mpsc::Receiver<OrientationSample>,
    ) -> (FlipSubscription, oneshot::Receiver<()>) {
        let (signal_tx, signal_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));

        let threshold = self.threshold;
        let task_cancel = cancel.clone();
        let task_fired = fired.clone();
        tokio::spawn(async move {
            let mut signal = Some(signal_tx);
            loop {
                tokio::select! {
                    // Cancellation wins over a simultaneously ready sample.
                    biased;
                    _ = task_cancel.cancelled() => break,
                    sample = samples.recv() => {
                        let Some(sample) = sample else { break };
                        if sample.beta.abs() > threshold
                            && !task_fired.swap(true, Ordering::SeqCst)
                        {
                            debug!("Flip detected at beta {}", sample.beta);
                            if let Some(tx) = signal.take() {
                                let _ = tx.send(());
                            }
                            // Latched; this cycle is done listening.
                            break;
                        }
                    }
                }
            }
        });

        (FlipSubscription { cancel, fired }, signal_rx)
    }
}

impl Default for FlipGate {
    fn default() -> Self {
        Self::new(FLIP_THRESHOLD_DEGREES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn fires_exactly_once_across_repeated_crossings() {
        let gate = FlipGate::default();
        let (tx, rx) = mpsc::channel(16);
        let (sub, signal) = gate.arm(rx);

        for beta in [10.0, 160.0, 170.0, 165.0] {
            tx.send(OrientationSample { beta }).await.unwrap();
        }

        timeout(Duration::from_secs(1), signal)
            .await
            .expect("signal should arrive")
            .expect("sender should not drop unfired");
        assert!(sub.has_fired());
    }

    #[tokio::test]
    async fn negative_tilt_counts_as_face_down() {
        let gate = FlipGate::default();
        let (tx, rx) = mpsc::channel(16);
        let (_sub, signal) = gate.arm(rx);

        tx.send(OrientationSample { beta: -170.0 }).await.unwrap();

        timeout(Duration::from_secs(1), signal)
            .await
            .expect("signal should arrive")
            .expect("sender should not drop unfired");
    }

    #[tokio::test]
    async fn sub_threshold_samples_never_fire() {
        let gate = FlipGate::default();
        let (tx, rx) = mpsc::channel(16);
        let (sub, mut signal) = gate.arm(rx);

        for beta in [0.0, 45.0, 120.0, 149.9, -140.0] {
            tx.send(OrientationSample { beta }).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(signal.try_recv().is_err());
        assert!(!sub.has_fired());
    }

    #[tokio::test]
    async fn cancel_tears_the_listener_down() {
        let gate = FlipGate::default();
        let (tx, rx) = mpsc::channel(16);
        let (sub, signal) = gate.arm(rx);

        sub.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(OrientationSample { beta: 175.0 }).await;

        // The sender half was dropped by the task, so the signal errors
        // rather than firing.
        assert!(timeout(Duration::from_secs(1), signal).await.unwrap().is_err());
        assert!(!sub.has_fired());
    }
}
