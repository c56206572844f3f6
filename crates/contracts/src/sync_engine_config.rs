//! Sync engine configuration contracts that can be shared across crates.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{ChannelType, ContractError};

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEngineConfig {
    /// Reserved type id of the reference (master) channel
    #[serde(default = "default_reference_type")]
    pub reference_type: ChannelType,

    /// Trigger counter width; the modulus is `2^counter_bits`
    #[serde(default = "default_counter_bits")]
    pub counter_bits: u32,

    /// A backward jump of at least `modulus - wrap_tolerance` is a wraparound
    #[serde(default = "default_wrap_tolerance")]
    pub wrap_tolerance: u64,

    /// Largest forward step the target may take in one cycle
    #[serde(default = "default_target_window")]
    pub target_window: u64,

    /// Largest jump tolerated from zero-glitch families before forcing
    #[serde(default = "default_zero_glitch_tolerance")]
    pub zero_glitch_tolerance: u64,

    /// Event-numbering offset selection
    #[serde(default)]
    pub firmware: FirmwareConfig,

    /// Per-family correction policies
    #[serde(default = "default_quirks")]
    pub quirks: Vec<QuirkConfig>,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            reference_type: default_reference_type(),
            counter_bits: default_counter_bits(),
            wrap_tolerance: default_wrap_tolerance(),
            target_window: default_target_window(),
            zero_glitch_tolerance: default_zero_glitch_tolerance(),
            firmware: FirmwareConfig::default(),
            quirks: default_quirks(),
        }
    }
}

impl SyncEngineConfig {
    /// Counter modulus (`2^counter_bits`)
    #[inline]
    pub fn modulus(&self) -> u64 {
        1u64 << self.counter_bits
    }

    /// Check the value ranges the counter arithmetic relies on
    ///
    /// Rules:
    /// - counter width in 1..=32, wrap tolerance below the modulus
    /// - target window > 0
    /// - quirk families non-empty and unique, mask widths in 1..=32
    /// - event offsets are 0 or 1
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ContractError> {
        self.validate_reference()?;
        self.validate_counter()?;
        self.firmware.validate()?;
        self.validate_quirks()
    }

    fn validate_reference(&self) -> Result<(), ContractError> {
        if self.reference_type.is_empty() {
            return Err(ContractError::config_validation(
                "reference_type",
                "reference channel type id cannot be empty",
            ));
        }
        Ok(())
    }

    fn validate_counter(&self) -> Result<(), ContractError> {
        if !(1..=32).contains(&self.counter_bits) {
            return Err(ContractError::config_validation(
                "counter_bits",
                format!("counter_bits must be in 1..=32, got {}", self.counter_bits),
            ));
        }

        if self.wrap_tolerance >= self.modulus() {
            return Err(ContractError::config_validation(
                "wrap_tolerance",
                format!(
                    "wrap_tolerance ({}) must be below the modulus ({})",
                    self.wrap_tolerance,
                    self.modulus()
                ),
            ));
        }

        if self.target_window == 0 {
            return Err(ContractError::config_validation(
                "target_window",
                "target_window must be > 0",
            ));
        }
        Ok(())
    }

    fn validate_quirks(&self) -> Result<(), ContractError> {
        let mut seen = HashSet::new();
        for (idx, quirk) in self.quirks.iter().enumerate() {
            if quirk.family.is_empty() {
                return Err(ContractError::config_validation(
                    format!("quirks[{idx}].family"),
                    "family label cannot be empty",
                ));
            }
            if !seen.insert(quirk.family.as_str()) {
                return Err(ContractError::config_validation(
                    format!("quirks[family={}]", quirk.family),
                    "duplicate family",
                ));
            }
            if let Some(bits) = quirk.mask_bits {
                if !(1..=32).contains(&bits) {
                    return Err(ContractError::config_validation(
                        format!("quirks[family={}].mask_bits", quirk.family),
                        format!("mask_bits must be in 1..=32, got {bits}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn default_reference_type() -> ChannelType {
    ChannelType::new("_TLU")
}

fn default_counter_bits() -> u32 {
    15
}

fn default_wrap_tolerance() -> u64 {
    20
}

fn default_target_window() -> u64 {
    10_000
}

fn default_zero_glitch_tolerance() -> u64 {
    10
}

fn default_quirks() -> Vec<QuirkConfig> {
    vec![
        QuirkConfig::policy("NI", QuirkPolicy::SingleSkip),
        QuirkConfig::policy("DEPFE5", QuirkPolicy::ZeroGlitch),
        QuirkConfig {
            family: "PyBAR".to_string(),
            policy: QuirkPolicy::None,
            mask_bits: Some(16),
        },
    ]
}

/// Firmware-dependent event-numbering offset
///
/// The reference channel numbers events from zero while the other channels
/// count triggers; depending on the firmware the two differ by one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareConfig {
    /// Run-begin tag naming the firmware
    #[serde(default = "default_firmware_tag")]
    pub tag: String,

    /// Firmware ids up to and including this one use `legacy_event_offset`
    #[serde(default = "default_legacy_max_id")]
    pub legacy_max_id: Option<u64>,

    #[serde(default)]
    pub legacy_event_offset: u64,

    /// Offset for newer firmware or when the tag is missing
    #[serde(default = "default_event_offset")]
    pub default_event_offset: u64,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            tag: default_firmware_tag(),
            legacy_max_id: default_legacy_max_id(),
            legacy_event_offset: 0,
            default_event_offset: default_event_offset(),
        }
    }
}

impl FirmwareConfig {
    /// Event-numbering offset for the given firmware tag value
    pub fn event_offset(&self, firmware_id: Option<&str>) -> u64 {
        match (firmware_id.and_then(parse_firmware_id), self.legacy_max_id) {
            (Some(id), Some(max)) if id <= max => self.legacy_event_offset,
            _ => self.default_event_offset,
        }
    }

    fn validate(&self) -> Result<(), ContractError> {
        for (field, value) in [
            ("firmware.legacy_event_offset", self.legacy_event_offset),
            ("firmware.default_event_offset", self.default_event_offset),
        ] {
            if value > 1 {
                return Err(ContractError::config_validation(
                    field,
                    format!("event offset must be 0 or 1, got {value}"),
                ));
            }
        }

        if self.tag.is_empty() {
            return Err(ContractError::config_validation(
                "firmware.tag",
                "firmware tag name cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Parse a firmware id written either as decimal or as `0x` hex
pub fn parse_firmware_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

fn default_firmware_tag() -> String {
    "FirmwareID".to_string()
}

fn default_legacy_max_id() -> Option<u64> {
    Some(0x0E)
}

fn default_event_offset() -> u64 {
    1
}

/// Correction policy for one hardware family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuirkConfig {
    /// Family label as carried by the sub-records
    pub family: String,

    #[serde(default)]
    pub policy: QuirkPolicy,

    /// Keep only the low bits of the raw counter
    #[serde(default)]
    pub mask_bits: Option<u32>,
}

impl QuirkConfig {
    pub fn policy(family: impl Into<String>, policy: QuirkPolicy) -> Self {
        Self {
            family: family.into(),
            policy,
            mask_bits: None,
        }
    }
}

/// Known counter faults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuirkPolicy {
    /// Trust the counter
    #[default]
    None,
    /// Occasionally skips one trigger while repeating a stale counter
    SingleSkip,
    /// Occasionally reports a spurious counter (usually zero) mid-run
    ZeroGlitch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncEngineConfig::default();
        assert_eq!(config.modulus(), 32768);
        assert_eq!(config.reference_type, "_TLU");
        assert_eq!(config.quirks.len(), 3);
    }

    #[test]
    fn test_event_offset_selection() {
        let firmware = FirmwareConfig::default();
        assert_eq!(firmware.event_offset(None), 1);
        assert_eq!(firmware.event_offset(Some("0x0e")), 0);
        assert_eq!(firmware.event_offset(Some("12")), 0);
        assert_eq!(firmware.event_offset(Some("0x1e000012")), 1);
        assert_eq!(firmware.event_offset(Some("unknown")), 1);
    }

    #[test]
    fn test_validate_small_counter() {
        let config = SyncEngineConfig {
            counter_bits: 4,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("wrap_tolerance"));

        let config = SyncEngineConfig {
            counter_bits: 4,
            wrap_tolerance: 2,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: SyncEngineConfig =
            serde_json::from_str(r#"{"counter_bits": 16, "quirks": []}"#).unwrap();
        assert_eq!(config.modulus(), 65536);
        assert!(config.quirks.is_empty());
        assert_eq!(config.target_window, 10_000);
    }
}
