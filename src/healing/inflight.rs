//! In-flight markers for error signatures.
//!
//! A signature is claimed with [`InFlightSet::try_acquire`] and released when
//! the returned guard drops, so every exit path out of the orchestrator
//! (return, `?`, panic unwinding) clears it.

use crate::healing::types::ErrorSignature;
use dashmap::DashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    inner: Arc<DashSet<ErrorSignature>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a signature. `None` means another orchestration already holds it.
    pub fn try_acquire(&self, signature: ErrorSignature) -> Option<InFlightGuard> {
        if self.inner.insert(signature.clone()) {
            Some(InFlightGuard {
                set: self.inner.clone(),
                signature,
            })
        } else {
            None
        }
    }

    pub fn contains(&self, signature: &ErrorSignature) -> bool {
        self.inner.contains(signature)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Snapshot of the currently held signatures, sorted.
    pub fn snapshot(&self) -> Vec<ErrorSignature> {
        let mut all: Vec<_> = self.inner.iter().map(|s| s.key().clone()).collect();
        all.sort();
        all
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<DashSet<ErrorSignature>>,
    signature: ErrorSignature,
}

impl InFlightGuard {
    pub fn signature(&self) -> &ErrorSignature {
        &self.signature
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.signature);
    }
}
