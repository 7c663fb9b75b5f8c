//! # Device Detection
//!
//! Selects the compute device for model inference, preferring CUDA, then
//! Metal, then CPU. Detection runs once per process.

use candle_core::Device;
use std::sync::OnceLock;
use tracing::{debug, info};

static BEST_DEVICE: OnceLock<Device> = OnceLock::new();

/// The best available device, cached after first detection.
pub fn best_device() -> Device {
    BEST_DEVICE.get_or_init(detect_best_device).clone()
}

fn detect_best_device() -> Device {
    match Device::new_cuda(0) {
        Ok(device) => {
            info!("Selected CUDA GPU for inference");
            return device;
        }
        Err(e) => debug!("CUDA not available: {}", e),
    }

    match Device::new_metal(0) {
        Ok(device) => {
            info!("Selected Metal GPU for inference");
            return device;
        }
        Err(e) => debug!("Metal not available: {}", e),
    }

    info!("Using CPU for inference (no GPU acceleration available)");
    Device::Cpu
}

/// Human-readable device description for health reporting.
pub fn device_description(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_always_yields_a_device() {
        let device = best_device();
        assert!(!device_description(&device).is_empty());
    }

    #[test]
    fn test_cpu_description() {
        assert_eq!(device_description(&Device::Cpu), "cpu");
    }
}
