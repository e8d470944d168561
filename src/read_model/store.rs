//! ReadModelStore - the secondary store boundary.

use super::{ReadModel, ReadModelError, Versioned};

/// Per-document storage with staged writes.
///
/// `stage_*` methods only queue work on this handle; nothing is visible until
/// `save_pending`. Each document write is atomic on its own, there is no
/// all-or-nothing guarantee across documents.
pub trait ReadModelStore: Send + Sync {
    /// Get a read model by ID. Returns None if not found.
    fn get_model<M: ReadModel>(&self, id: &str) -> Result<Option<Versioned<M>>, ReadModelError>;

    /// Find read models matching a predicate.
    fn find_models<M: ReadModel>(
        &self,
        predicate: &dyn Fn(&M) -> bool,
    ) -> Result<Vec<Versioned<M>>, ReadModelError>;

    /// Queue creation of a new document.
    fn stage_insert<M: ReadModel>(&self, model: &M) -> Result<(), ReadModelError>;

    /// Queue a full-document replace of an existing document.
    fn stage_replace<M: ReadModel>(&self, model: &M) -> Result<(), ReadModelError>;

    /// Queue removal of a document.
    fn stage_delete<M: ReadModel>(&self, id: &str) -> Result<(), ReadModelError>;

    /// Number of queued writes.
    fn pending_count(&self) -> usize;

    /// Write every queued document and return how many were written.
    /// The queue is empty afterwards, whether or not the call succeeded.
    fn save_pending(&self) -> Result<usize, ReadModelError>;

    /// Drop every queued write.
    fn discard_pending(&self);
}
