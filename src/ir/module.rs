//! The module: a thread-safe collection of functions sharing one type table.
//!
//! Functions are stored as immutable [`Arc`] snapshots. Readers clone the
//! `Arc` out of the map and never hold a map guard while working, so passes
//! running on different functions in parallel can read each other's bodies
//! freely. A pass publishes its result by replacing the snapshot.
//!
//! # Name Registry
//!
//! Every function name maps to exactly one [`FunctionId`]. Specialized clones
//! are created through [`Module::get_or_insert_with`], which inserts under the
//! registry entry for the name: two threads asking for the same name observe
//! a single clone, and only the first one builds it.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    ir::{Function, FunctionId, TypeTable},
    Error, Result,
};

/// A module of functions.
#[derive(Debug)]
pub struct Module {
    name: String,
    types: TypeTable,
    functions: DashMap<FunctionId, Arc<Function>>,
    names: DashMap<String, FunctionId>,
    next_id: AtomicU32,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: TypeTable::new(),
            functions: DashMap::new(),
            names: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the shared type table.
    #[must_use]
    pub const fn types(&self) -> &TypeTable {
        &self.types
    }

    fn allocate_id(&self) -> FunctionId {
        FunctionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Adds a function and assigns its id.
    ///
    /// # Arguments
    ///
    /// * `function` - The function to add; its current id is overwritten.
    ///
    /// # Returns
    ///
    /// The id assigned to the function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateFunction`] if a function with the same name exists.
    pub fn add_function(&self, mut function: Function) -> Result<FunctionId> {
        match self.names.entry(function.name().to_string()) {
            Entry::Occupied(_) => Err(Error::DuplicateFunction(function.name().to_string())),
            Entry::Vacant(slot) => {
                let id = self.allocate_id();
                function.set_id(id);
                self.functions.insert(id, Arc::new(function));
                slot.insert(id);
                Ok(id)
            }
        }
    }

    /// Returns the function registered under `name`, creating it with `make` if absent.
    ///
    /// `make` runs at most once per name, while the registry entry for the name
    /// is held, and receives the id the new function will carry.
    ///
    /// # Returns
    ///
    /// The function id and `true` if this call created the function.
    pub fn get_or_insert_with<F>(&self, name: &str, make: F) -> (FunctionId, bool)
    where
        F: FnOnce(FunctionId) -> Function,
    {
        if let Some(id) = self.names.get(name) {
            return (*id, false);
        }

        match self.names.entry(name.to_string()) {
            Entry::Occupied(slot) => (*slot.get(), false),
            Entry::Vacant(slot) => {
                let id = self.allocate_id();
                let mut function = make(id);
                function.set_id(id);
                self.functions.insert(id, Arc::new(function));
                slot.insert(id);
                (id, true)
            }
        }
    }

    /// Returns a snapshot of a function.
    #[must_use]
    pub fn function(&self, id: FunctionId) -> Option<Arc<Function>> {
        self.functions.get(&id).map(|f| Arc::clone(&f))
    }

    /// Returns the id registered for a name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<FunctionId> {
        self.names.get(name).map(|id| *id)
    }

    /// Returns a snapshot of the function registered for a name.
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<Arc<Function>> {
        self.lookup(name).and_then(|id| self.function(id))
    }

    /// Publishes a new version of an existing function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FunctionNotFound`] if no function has this id, or
    /// [`Error::Malformed`] if the new version was renamed.
    pub fn replace_function(&self, function: Function) -> Result<()> {
        let id = function.id();
        let Some(mut slot) = self.functions.get_mut(&id) else {
            return Err(Error::FunctionNotFound(id));
        };
        if slot.name() != function.name() {
            return Err(malformed_error!(
                "function {} cannot be renamed from '{}' to '{}'",
                id,
                slot.name(),
                function.name()
            ));
        }
        *slot = Arc::new(function);
        Ok(())
    }

    /// Returns every function id in ascending order.
    #[must_use]
    pub fn function_ids(&self) -> Vec<FunctionId> {
        let mut ids: Vec<FunctionId> = self.functions.iter().map(|f| *f.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the clones that were specialized from `original`.
    #[must_use]
    pub fn specializations_of(&self, original: FunctionId) -> Vec<FunctionId> {
        let mut ids: Vec<FunctionId> = self
            .functions
            .iter()
            .filter(|f| f.specialized_from() == Some(original))
            .map(|f| *f.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns `true` if the module has no functions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
