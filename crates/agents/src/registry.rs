use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use opspilot_core::Outcome;

use crate::unit::AnalysisUnit;
use crate::units::{
    CustomsCompliance, EsgRiskMonitor, InvoiceValidator, ProcurementAnalyzer, ShipmentTracker, VendorMonitor,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("agent name must not be empty")]
    EmptyName,

    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("registry lock poisoned")]
    Poisoned,
}

/// Lifecycle state reported by `status()`. Units are always active.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub name: String,
    pub state: AgentState,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<Outcome>,
}

struct Slot {
    unit: Arc<dyn AnalysisUnit>,
    last_run_at: Option<DateTime<Utc>>,
    last_outcome: Option<Outcome>,
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    slots: HashMap<String, Slot>,
}

/// Name → unit table, iterated in insertion order.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the six built-in units.
    pub fn with_default_units() -> Result<Self, RegistryError> {
        let registry = Self::new();
        registry.register("vendor-monitor", VendorMonitor::default())?;
        registry.register("invoice-validator", InvoiceValidator::default())?;
        registry.register("shipment-tracker", ShipmentTracker::new())?;
        registry.register("customs-compliance", CustomsCompliance::new())?;
        registry.register("esg-risk", EsgRiskMonitor::new())?;
        registry.register("procurement", ProcurementAnalyzer::new())?;
        Ok(registry)
    }

    pub fn register<U: AnalysisUnit>(&self, name: impl Into<String>, unit: U) -> Result<(), RegistryError> {
        self.register_arc(name, Arc::new(unit))
    }

    /// Insert or replace. A replaced unit keeps its position and loses its run history.
    pub fn register_arc(&self, name: impl Into<String>, unit: Arc<dyn AnalysisUnit>) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let mut inner = self.inner.write().map_err(|_| RegistryError::Poisoned)?;
        let slot = Slot {
            unit,
            last_run_at: None,
            last_outcome: None,
        };
        if inner.slots.insert(name.clone(), slot).is_none() {
            inner.order.push(name);
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn AnalysisUnit>, RegistryError> {
        let inner = self.inner.read().map_err(|_| RegistryError::Poisoned)?;
        inner
            .slots
            .get(name)
            .map(|slot| Arc::clone(&slot.unit))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn list_names(&self) -> Result<Vec<String>, RegistryError> {
        let inner = self.inner.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(inner.order.clone())
    }

    /// Ordered snapshot of `(name, unit)` pairs, taken under a single read lock.
    pub fn entries(&self) -> Result<Vec<(String, Arc<dyn AnalysisUnit>)>, RegistryError> {
        let inner = self.inner.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(inner
            .order
            .iter()
            .filter_map(|name| inner.slots.get(name).map(|slot| (name.clone(), Arc::clone(&slot.unit))))
            .collect())
    }

    pub fn status(&self) -> Result<Vec<AgentStatus>, RegistryError> {
        let inner = self.inner.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(inner
            .order
            .iter()
            .filter_map(|name| {
                inner.slots.get(name).map(|slot| AgentStatus {
                    name: name.clone(),
                    state: AgentState::Active,
                    last_run_at: slot.last_run_at,
                    last_outcome: slot.last_outcome,
                })
            })
            .collect())
    }

    pub fn record_run(&self, name: &str, at: DateTime<Utc>, outcome: Outcome) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::Poisoned)?;
        let slot = inner
            .slots
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        slot.last_run_at = Some(at);
        slot.last_outcome = Some(outcome);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.order.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
