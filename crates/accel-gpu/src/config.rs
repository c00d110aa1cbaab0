//! Device selection and transfer settings.

use std::env;

/// Which pixel layouts the device can copy to host memory directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferPolicy {
    /// Every supported texture layout reads back directly.
    #[default]
    Native,
    /// Only 4-channel 8-bit reads are direct. Other layouts are repacked on
    /// the GPU first and compacted on the host if rows come out padded.
    Rgba8,
}

impl TransferPolicy {
    /// Parses `native` or `rgba8`, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "native" => Some(Self::Native),
            "rgba8" => Some(Self::Rgba8),
            _ => None,
        }
    }
}

/// GPU context configuration.
#[derive(Debug, Clone)]
pub struct GpuConfig {
    /// Adapter power preference.
    pub power_preference: wgpu::PowerPreference,
    /// Use the software fallback adapter.
    pub force_fallback_adapter: bool,
    /// Read-back transfer policy.
    pub transfer: TransferPolicy,
    /// Device label.
    pub label: String,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            transfer: TransferPolicy::Native,
            label: "accel-gpu".to_string(),
        }
    }
}

impl GpuConfig {
    /// Defaults overridden by `ACCEL_TRANSFER`, `ACCEL_POWER` and
    /// `ACCEL_FORCE_FALLBACK_ADAPTER`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(transfer) = env::var("ACCEL_TRANSFER").ok().and_then(|v| TransferPolicy::parse(&v)) {
            config.transfer = transfer;
        }
        if let Some(power) = env::var("ACCEL_POWER").ok().and_then(|v| parse_power(&v)) {
            config.power_preference = power;
        }
        config.force_fallback_adapter = env::var("ACCEL_FORCE_FALLBACK_ADAPTER")
            .map(|v| is_truthy(&v))
            .unwrap_or(false);
        config
    }

    /// Same config with another transfer policy.
    pub fn with_transfer(mut self, transfer: TransferPolicy) -> Self {
        self.transfer = transfer;
        self
    }
}

fn parse_power(value: &str) -> Option<wgpu::PowerPreference> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" => Some(wgpu::PowerPreference::LowPower),
        "high" => Some(wgpu::PowerPreference::HighPerformance),
        "none" => Some(wgpu::PowerPreference::None),
        _ => None,
    }
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transfer() {
        assert_eq!(TransferPolicy::parse("native"), Some(TransferPolicy::Native));
        assert_eq!(TransferPolicy::parse(" RGBA8 "), Some(TransferPolicy::Rgba8));
        assert_eq!(TransferPolicy::parse("rgb"), None);
    }

    #[test]
    fn test_parse_power() {
        assert_eq!(parse_power("low"), Some(wgpu::PowerPreference::LowPower));
        assert_eq!(parse_power("High"), Some(wgpu::PowerPreference::HighPerformance));
        assert_eq!(parse_power("turbo"), None);
    }

    #[test]
    fn test_truthy() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("yes"));
    }

    #[test]
    fn test_default() {
        let config = GpuConfig::default().with_transfer(TransferPolicy::Rgba8);
        assert_eq!(config.transfer, TransferPolicy::Rgba8);
        assert!(!config.force_fallback_adapter);
        assert_eq!(config.label, "accel-gpu");
    }
}
