//! Fault injection for the in-process service adapters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::AppError;

/// How an armed call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The call fails as if the service were unreachable.
    Unavailable,
    /// The call fails as if the service never answered.
    Timeout,
}

/// Per-method failure switches for one service.
///
/// An armed method keeps failing until it is cleared.
#[derive(Debug, Clone)]
pub struct Faults {
    service: &'static str,
    armed: Arc<Mutex<HashMap<&'static str, Fault>>>,
}

impl Faults {
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            armed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn set(&self, method: &'static str, fault: Option<Fault>) {
        let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        match fault {
            Some(fault) => {
                armed.insert(method, fault);
            }
            None => {
                armed.remove(method);
            }
        }
    }

    pub fn clear(&self) {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Fails with the armed fault for `method`, if any.
    pub(crate) fn check(&self, method: &'static str) -> Result<(), AppError> {
        let fault = self
            .armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .copied();
        match fault {
            None => Ok(()),
            Some(Fault::Unavailable) => Err(AppError::Unavailable {
                service: self.service,
                reason: format!("{method} failed"),
            }),
            Some(Fault::Timeout) => Err(AppError::Timeout {
                service: self.service,
                method,
            }),
        }
    }
}
