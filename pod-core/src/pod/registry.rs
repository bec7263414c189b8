use super::Pod;
use crate::core::{ConfigError, PodId, StrategyCategory};
use crate::risk::RiskLimit;
use rust_decimal::Decimal;
use serde::Serialize;

/// Static description of a registered pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodSpec {
    pub id: PodId,
    pub category: StrategyCategory,
    /// Capital carved out of the portfolio for this pod
    pub capital: Decimal,
    pub limit: RiskLimit,
}

/// Pods in registration order
///
/// Built explicitly and handed to the simulator; registration order is
/// the dispatch order for every tick.
#[derive(Default)]
pub struct PodRegistry {
    entries: Vec<(PodSpec, Box<dyn Pod>)>,
}

impl PodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: PodSpec, pod: Box<dyn Pod>) -> Result<(), ConfigError> {
        if self.contains(&spec.id) {
            return Err(ConfigError::DuplicatePod(spec.id));
        }
        self.entries.push((spec, pod));
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, spec: PodSpec, pod: Box<dyn Pod>) -> Result<Self, ConfigError> {
        self.register(spec, pod)?;
        Ok(self)
    }

    pub fn contains(&self, id: &PodId) -> bool {
        self.entries.iter().any(|(spec, _)| &spec.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn specs(&self) -> impl Iterator<Item = &PodSpec> {
        self.entries.iter().map(|(spec, _)| spec)
    }

    pub fn total_capital(&self) -> Decimal {
        self.specs().map(|s| s.capital).sum()
    }

    pub fn into_entries(self) -> Vec<(PodSpec, Box<dyn Pod>)> {
        self.entries
    }
}

impl std::fmt::Debug for PodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(spec, pod)| (&spec.id, pod.name())))
            .finish()
    }
}
