use crate::components::acquisition::parameters::DiscoveryPolicy;
use crate::devices::hardware::camera::{CameraDevice, DeviceSystem};
use crate::error::{CaptureError, Result};
use std::{thread, time::Duration};
use tracing::{info, warn};

/// Wait for the user to connect a device. Discovery is retried at a
/// constant interval until a device shows up or `policy.max_tries`
/// discoveries came back empty. With several devices connected the first
/// one is used and the others are released straight away.
///
/// * `system`: camera SDK entry point.
/// * `policy`: retry budget and interval.
pub fn acquire_device<S: DeviceSystem>(system: &mut S, policy: &DiscoveryPolicy) -> Result<S::Device> {
    let interval = policy.interval();
    for attempt in 1..=policy.max_tries {
        let mut devices = system.create_devices()?;
        if devices.is_empty() {
            info!(
                "Try {attempt} of {}: waiting for {:?} for a device to be connected",
                policy.max_tries, interval
            );
            wait_with_progress(interval);
            continue;
        }

        let device = devices.remove(0);
        for extra in devices {
            info!("Releasing additional device {}", extra.info());
            if let Err(e) = system.destroy_device(extra) {
                warn!("Failed to release additional device {e}");
            }
        }
        info!("Device used for capture: {}", device.info());
        return Ok(device);
    }

    Err(CaptureError::NoDeviceFound {
        attempts: policy.max_tries,
    })
}

/// Sleep for `interval`, reporting progress once per elapsed second.
fn wait_with_progress(interval: Duration) {
    let whole_seconds = interval.as_secs();
    for second in 1..=whole_seconds {
        thread::sleep(Duration::from_secs(1));
        info!("{second} seconds passed {}", ".".repeat(second as usize));
    }
    let remainder = interval - Duration::from_secs(whole_seconds);
    if !remainder.is_zero() {
        thread::sleep(remainder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::software::camera::{SimulatedCamera, SimulatedSystem};
    use rstest::rstest;

    fn policy(max_tries: u32) -> DiscoveryPolicy {
        DiscoveryPolicy {
            max_tries,
            interval_secs: 0.0,
        }
    }

    #[rstest]
    #[case(0, 1)]
    #[case(3, 4)]
    #[case(5, 6)]
    fn test_device_returned_once_discovery_succeeds(#[case] empty: u32, #[case] calls: u32) {
        let mut system = SimulatedSystem::new(SimulatedCamera::new()).with_empty_discoveries(empty);
        let device = acquire_device(&mut system, &policy(6)).expect("device within budget");
        assert_eq!(device.info().model, "SIM-1440M");
        assert_eq!(system.discovery_calls(), calls);
    }

    #[rstest]
    #[case(2)]
    #[case(4)]
    fn test_first_device_kept_and_extras_released(#[case] count: usize) {
        let mut system = SimulatedSystem::new(SimulatedCamera::new()).with_devices(count);
        let device = acquire_device(&mut system, &policy(1)).expect("device");
        assert_eq!(device.info().id, "Simulated-0001");

        let released: Vec<&str> = system
            .destroyed()
            .iter()
            .map(|extra| extra.info().id.as_str())
            .collect();
        assert_eq!(released.len(), count - 1);
        assert!(!released.contains(&"Simulated-0001"));
        assert_eq!(system.discovery_calls(), 1);
    }

    #[test]
    fn test_budget_exhausted_without_extra_attempt() {
        let mut system = SimulatedSystem::new(SimulatedCamera::new()).with_empty_discoveries(6);
        let result = acquire_device(&mut system, &policy(6));
        assert!(matches!(
            result,
            Err(CaptureError::NoDeviceFound { attempts: 6 })
        ));
        assert_eq!(system.discovery_calls(), 6);
    }

    #[test]
    fn test_sub_second_interval_is_honoured() {
        let started = std::time::Instant::now();
        wait_with_progress(Duration::from_millis(20));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
