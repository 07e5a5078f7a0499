//! Patient registry: maps patient ids to engines under the learning scope.
//!
//! - `per_patient`: every patient gets an independent store.
//! - `population`: all engines share one store; updates serialize per arm.
//!
//! Each patient's engine gets a stream salt derived from the patient id, so
//! Thompson draws of different patients are decorrelated even though they
//! share the configured seed.

use std::collections::HashMap;
use std::sync::Arc;

use ct_common::{PatientId, Result};
use ct_config::{ActionSpaceConfig, LearningScope, PolicyConfig};
use sha2::{Digest, Sha256};

use crate::actions::ActionSpace;
use crate::engine::PolicyEngine;
use crate::logging::LogContext;
use crate::stats::ArmStore;

#[derive(Debug)]
pub struct PatientRegistry {
    policy: PolicyConfig,
    actions: ActionSpaceConfig,
    shared: Option<Arc<ArmStore>>,
    engines: HashMap<PatientId, PolicyEngine>,
    log: LogContext,
}

impl PatientRegistry {
    pub fn new(policy: PolicyConfig, actions: ActionSpaceConfig) -> Result<Self> {
        ct_config::validate_policy(&policy)?;
        let space = ActionSpace::from_config(&actions)?;
        let shared = match policy.learning_scope {
            LearningScope::Population => Some(Arc::new(ArmStore::new(&policy, space.len())?)),
            LearningScope::PerPatient => None,
        };
        Ok(Self {
            policy,
            actions,
            shared,
            engines: HashMap::new(),
            log: LogContext::for_current_run(),
        })
    }

    pub fn scope(&self) -> LearningScope {
        self.policy.learning_scope
    }

    /// The population store, when the scope shares one.
    pub fn shared_store(&self) -> Option<&Arc<ArmStore>> {
        self.shared.as_ref()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn contains(&self, patient: &PatientId) -> bool {
        self.engines.contains_key(patient)
    }

    /// The patient's engine, created on first use.
    pub fn engine_mut(&mut self, patient: &PatientId) -> Result<&mut PolicyEngine> {
        if !self.engines.contains_key(patient) {
            let engine = self.build_engine(patient)?;
            self.engines.insert(patient.clone(), engine);
        }
        self.engines
            .get_mut(patient)
            .ok_or_else(|| ct_common::Error::StateCorrupted(format!("engine for {} vanished", patient)))
    }

    /// A detached engine for `patient`, for use on another thread.
    ///
    /// In population scope it shares the registry's store; in per-patient
    /// scope it owns a fresh one. The registry keeps no reference to it.
    pub fn spawn_engine(&self, patient: &PatientId) -> Result<PolicyEngine> {
        self.build_engine(patient)
    }

    fn build_engine(&self, patient: &PatientId) -> Result<PolicyEngine> {
        let salt = stream_salt(patient);
        let log = self.log.clone().with_stream_id(format!("{}", patient));
        let engine = match &self.shared {
            Some(store) => {
                PolicyEngine::with_store(self.policy.clone(), &self.actions, Arc::clone(store), salt)?
            }
            None => {
                let space = ActionSpace::from_config(&self.actions)?;
                let store = Arc::new(ArmStore::new(&self.policy, space.len())?);
                PolicyEngine::with_store(self.policy.clone(), &self.actions, store, salt)?
            }
        };
        Ok(engine.with_log_context(log))
    }
}

/// First eight bytes of `sha256(patient id)`.
pub fn stream_salt(patient: &PatientId) -> u64 {
    let digest = Sha256::digest(patient.0.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
