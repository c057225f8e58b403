//! Injection point for the engine
//!
//! The UI root builds one [`Provider`], initializes it with an engine, and
//! passes it down. Reaching for the engine before that is a wiring bug.

use crate::engine::Engine;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Engine shared by every component of one UI tree
pub type SharedEngine = Rc<RefCell<Engine>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("app state accessed outside an initialized provider")]
    NotInitialized,
}

#[derive(Default)]
pub struct Provider {
    engine: Option<SharedEngine>,
}

impl Provider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the engine. A second call replaces the first engine.
    pub fn init(&mut self, engine: Engine) -> SharedEngine {
        if self.engine.is_some() {
            tracing::warn!("Provider initialized twice, replacing engine");
        }
        let shared = Rc::new(RefCell::new(engine));
        self.engine = Some(Rc::clone(&shared));
        shared
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    pub fn try_app_state(&self) -> Result<SharedEngine, ProviderError> {
        self.engine.clone().ok_or(ProviderError::NotInitialized)
    }

    /// The engine.
    ///
    /// # Panics
    ///
    /// Panics if [`Provider::init`] has not been called.
    pub fn app_state(&self) -> SharedEngine {
        match self.try_app_state() {
            Ok(engine) => engine,
            Err(e) => panic!("{e}"),
        }
    }
}
