//! ReadModelRepository - Typed accessor for read model operations.

use std::marker::PhantomData;

use super::{ReadModel, ReadModelError, ReadModelStore, Versioned};

/// Typed repository wrapper for accessing read models of a specific type.
///
/// Provides short method names by delegating to `ReadModelStore` trait methods.
pub struct ReadModelRepository<'a, S, M> {
    store: &'a S,
    _marker: PhantomData<M>,
}

impl<'a, S: ReadModelStore, M: ReadModel> ReadModelRepository<'a, S, M> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Get a read model by ID.
    pub fn get(&self, id: &str) -> Result<Option<Versioned<M>>, ReadModelError> {
        self.store.get_model(id)
    }

    /// Queue an insert on the underlying store.
    pub fn stage_insert(&self, model: &M) -> Result<(), ReadModelError> {
        self.store.stage_insert(model)
    }

    /// Queue a full replace on the underlying store.
    pub fn stage_replace(&self, model: &M) -> Result<(), ReadModelError> {
        self.store.stage_replace(model)
    }

    /// Queue a delete on the underlying store.
    pub fn stage_delete(&self, id: &str) -> Result<(), ReadModelError> {
        self.store.stage_delete::<M>(id)
    }

    /// Find read models matching a predicate.
    pub fn find(&self, predicate: &dyn Fn(&M) -> bool) -> Result<Vec<Versioned<M>>, ReadModelError> {
        self.store.find_models(predicate)
    }

    /// Find the first read model matching a predicate.
    pub fn find_one(
        &self,
        predicate: &dyn Fn(&M) -> bool,
    ) -> Result<Option<Versioned<M>>, ReadModelError> {
        Ok(self.store.find_models(predicate)?.into_iter().next())
    }

    /// Every stored model of this type.
    pub fn all(&self) -> Result<Vec<Versioned<M>>, ReadModelError> {
        self.store.find_models(&|_| true)
    }
}

/// Extension trait for typed read model access on any ReadModelStore.
pub trait ReadModelsExt: ReadModelStore + Sized {
    /// Get a typed read model repository.
    fn read_models<M: ReadModel>(&self) -> ReadModelRepository<'_, Self, M> {
        ReadModelRepository::new(self)
    }
}

impl<S: ReadModelStore> ReadModelsExt for S {}
