//! Configuration validation
//!
//! The range rules live on [`SyncEngineConfig::validate`] so the engine
//! checks the same ones when it is handed a config built in code.

use contracts::{ContractError, SyncEngineConfig};

/// Validate a SyncEngineConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &SyncEngineConfig) -> Result<(), ContractError> {
    config.validate()
}
