//! Maps `Box<dyn Error>` from trait boundaries to typed `DripError`.
//!
//! The traits in `drip_traits` return `Box<dyn Error + Send + Sync>`; this
//! module classifies those, with an optional feature-gated path for
//! `drip_hardware::HwError` downcasting.

use crate::error::DripError;

/// Map a trait-boundary error to a typed `DripError`.
///
/// Lost GPIO access is fatal; everything else from a sensor or valve is a
/// transient fault that the current tick can skip.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> DripError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<drip_hardware::HwError>() {
            return match hw {
                drip_hardware::HwError::Gpio(msg) => DripError::Fatal(format!("gpio: {msg}")),
                other => DripError::TransientIo(other.to_string()),
            };
        }
    }

    DripError::TransientIo(e.to_string())
}
