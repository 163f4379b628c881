//! Reputation providers (heuristic simulation, VirusTotal)

mod simulated;
mod virustotal;

pub use simulated::SimulatedProvider;
pub use virustotal::{
    parse_analysis_json, parse_report_json, parse_submission_json, AnalysisState,
    VirusTotalProvider,
};

use crate::config::{Config, ProviderKind};
use crate::error::ScanError;
use crate::random::{RandomSource, StdRandom};
use crate::reputation::ReputationProvider;
use std::sync::Arc;

/// Random source for simulation: seeded when configured, entropy otherwise.
pub fn random_source(config: &Config) -> Box<dyn RandomSource> {
    match config.seed {
        Some(seed) => Box::new(StdRandom::seeded(seed)),
        None => Box::new(StdRandom::from_entropy()),
    }
}

/// Build the provider selected by `config.provider`.
pub fn build_provider(config: &Config) -> Result<Arc<dyn ReputationProvider>, ScanError> {
    match config.provider {
        ProviderKind::Simulated => {
            log::debug!("Using simulated reputation provider");
            Ok(Arc::new(SimulatedProvider::new(random_source(config))))
        }
        ProviderKind::VirusTotal => {
            if config.api_key().is_none() {
                return Err(ScanError::NotConfigured("VirusTotal"));
            }
            log::debug!("Using VirusTotal provider at {}", config.base_url);
            Ok(Arc::new(VirusTotalProvider::from_config(config)?))
        }
    }
}
