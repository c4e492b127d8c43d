use crate::domain::offline::OfflineLimits;
use crate::domain::parameters::TransactionParameters;
use crate::domain::run_config::{CollectDataConfig, RunConfiguration};
use crate::error::{FlowError, Result};
use crate::infrastructure::scripted::{BackendScript, DelegateScript, TerminalScript};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// A self-contained simulation: what to run, with which policy, against which
/// scripted collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    /// The transaction to run. May be omitted when only data collection is wanted.
    pub parameters: Option<TransactionParameters>,
    pub config: RunConfiguration,
    pub offline_limits: OfflineLimits,
    /// Runs a collect-data flow after the transaction, if present.
    pub collect_data: Option<CollectDataConfig>,
    /// Cancels the transaction run after this many milliseconds.
    pub cancel_after_ms: Option<u64>,
    pub terminal: TerminalScript,
    pub backend: BackendScript,
    pub delegate: DelegateScript,
}

/// Reads a [`Scenario`] from a JSON source.
pub struct ScenarioReader<R: Read> {
    source: R,
}

impl<R: Read> ScenarioReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn scenario(self) -> Result<Scenario> {
        let scenario: Scenario = serde_json::from_reader(self.source)?;
        if scenario.parameters.is_none() && scenario.collect_data.is_none() {
            return Err(FlowError::ValidationError(
                "a scenario needs transaction parameters or a collect_data section".to_string(),
            ));
        }
        Ok(scenario)
    }
}
