//! Orientation-sample sources
//!
//! Samples arrive asynchronously from a background thread and are read by
//! the render thread once per tick, last-write-wins. On the web original the
//! source is the device gyroscope; on desktop a driver synthesizes samples
//! (or deliberately emits invalid ones to exercise the permission-denied
//! path).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::SensorError;

/// A raw sample as delivered by the platform
///
/// `None` fields are how the platform signals a denied or absent sensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawOrientationSample {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
}

impl RawOrientationSample {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha: Some(alpha),
            beta: Some(beta),
            gamma: Some(gamma),
        }
    }

    /// Validate into a usable sample
    pub fn validate(&self) -> Result<OrientationSample, SensorError> {
        match (self.alpha, self.beta, self.gamma) {
            (Some(alpha), Some(beta), Some(gamma)) => {
                if alpha.is_finite() && beta.is_finite() && gamma.is_finite() {
                    Ok(OrientationSample { alpha, beta, gamma })
                } else {
                    Err(SensorError::InvalidSample)
                }
            }
            _ => Err(SensorError::PermissionDenied),
        }
    }
}

/// Device orientation as three Euler-like angles, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationSample {
    /// Rotation about the device z axis
    pub alpha: f64,
    /// Rotation about the device x axis
    pub beta: f64,
    /// Rotation about the device y axis
    pub gamma: f64,
}

impl OrientationSample {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }
}

/// Produces one sample per poll on the sensor thread
pub trait OrientationDriver: Send + 'static {
    /// Sample at `elapsed` seconds since the source started
    fn sample(&mut self, elapsed: f64) -> RawOrientationSample;
}

/// Smooth synthetic device wobble, the desktop stand-in for a gyroscope
pub struct WobbleDriver {
    /// Peak excursion of each angle, in degrees
    pub amplitude: f64,
    /// Wobble frequency in Hz
    pub frequency: f64,
}

impl Default for WobbleDriver {
    fn default() -> Self {
        Self {
            amplitude: 25.0,
            frequency: 0.1,
        }
    }
}

impl OrientationDriver for WobbleDriver {
    fn sample(&mut self, elapsed: f64) -> RawOrientationSample {
        let w = std::f64::consts::TAU * self.frequency * elapsed;
        RawOrientationSample::new(
            self.amplitude * w.sin(),
            self.amplitude * (w * 0.7).cos(),
            self.amplitude * 0.5 * (w * 1.3).sin(),
        )
    }
}

/// Always reports missing angles, like a denied permission prompt
pub struct DeniedDriver;

impl OrientationDriver for DeniedDriver {
    fn sample(&mut self, _elapsed: f64) -> RawOrientationSample {
        RawOrientationSample::default()
    }
}

/// Background orientation-sample source
///
/// Runs its driver on a dedicated thread at roughly sensor rate and keeps
/// only the most recent sample; the render thread takes it once per tick.
/// `stop()` detaches synchronously: after it returns no further samples are
/// written.
pub struct OrientationSensor {
    latest: Arc<Mutex<Option<RawOrientationSample>>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl OrientationSensor {
    /// Spawn the sample thread with the given driver
    pub fn start<D: OrientationDriver>(mut driver: D) -> Self {
        let latest: Arc<Mutex<Option<RawOrientationSample>>> = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let latest_clone = latest.clone();
        let running_clone = running.clone();

        let thread_handle = std::thread::Builder::new()
            .name("orientation-sensor".to_string())
            .spawn(move || {
                log::info!("orientation sensor thread started");
                let started = Instant::now();
                while running_clone.load(Ordering::Acquire) {
                    let sample = driver.sample(started.elapsed().as_secs_f64());
                    *latest_clone.lock() = Some(sample);
                    std::thread::sleep(Duration::from_millis(16));
                }
                log::info!("orientation sensor thread stopped");
            })
            .expect("failed to spawn orientation sensor thread");

        Self {
            latest,
            running,
            thread_handle: Some(thread_handle),
        }
    }

    /// Take the most recent unread sample, if any
    pub fn take_latest(&self) -> Option<RawOrientationSample> {
        self.latest.lock().take()
    }

    /// Stop the sample thread and wait for it to exit
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        // no writer is left; clear anything that slipped in before the join
        *self.latest.lock() = None;
    }
}

impl Drop for OrientationSensor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sample_round_trips() {
        let raw = RawOrientationSample::new(10.0, 20.0, 30.0);
        let sample = raw.validate().unwrap();
        assert_eq!(sample, OrientationSample::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn test_missing_fields_signal_permission_denied() {
        let raw = RawOrientationSample {
            alpha: None,
            beta: Some(1.0),
            gamma: Some(2.0),
        };
        assert!(matches!(
            raw.validate(),
            Err(SensorError::PermissionDenied)
        ));
    }

    #[test]
    fn test_non_finite_angles_are_rejected() {
        let raw = RawOrientationSample::new(f64::NAN, 0.0, 0.0);
        assert!(matches!(raw.validate(), Err(SensorError::InvalidSample)));
    }

    #[test]
    fn test_sensor_delivers_and_stops() {
        let mut sensor = OrientationSensor::start(WobbleDriver::default());

        // wait for at least one sample
        let mut got = None;
        for _ in 0..100 {
            if let Some(sample) = sensor.take_latest() {
                got = Some(sample);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(got.is_some(), "sensor never produced a sample");
        assert!(got.unwrap().validate().is_ok());

        sensor.stop();
        assert!(sensor.take_latest().is_none());
    }

    #[test]
    fn test_denied_driver_produces_invalid_samples() {
        let mut driver = DeniedDriver;
        let raw = driver.sample(0.0);
        assert!(raw.validate().is_err());
    }
}
