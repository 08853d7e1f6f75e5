//! HandlerRegistry - name -> Dispatcher のマッピング
//!
//! Design:
//! - Built during initialization (mutable).
//! - Used during runtime (immutable, shared behind `Arc`).
//! This avoids locks on the delivery path.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::{Dispatcher, DispatcherRegistry};
use crate::typed::{Handler, Topic, TypedDispatcher};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a dispatcher named '{0}' is already registered")]
    Duplicate(String),
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    dispatchers: HashMap<String, Arc<dyn Dispatcher>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dispatcher under `name` (a queue name, `deadletter` or
    /// `deadletter.<queue>`).
    ///
    /// If you want "last wins", change this to overwrite instead of error.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.dispatchers.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.dispatchers.insert(name, dispatcher);
        Ok(())
    }

    /// Register a typed handler under its topic's queue name.
    pub fn register_typed<T: Topic, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register(T::QUEUE, Arc::new(TypedDispatcher::<T, H>::new(handler)))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dispatchers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }
}

impl DispatcherRegistry for HandlerRegistry {
    fn get(&self, name: &str) -> Option<Arc<dyn Dispatcher>> {
        self.dispatchers.get(name).cloned()
    }
}
