//! Name/id registry of type-erased attributes.
//!
//! Ids index a dense slot vector and are recycled through a free list, so a
//! mesh that churns attributes does not leak slots. Names live in a
//! `BTreeMap`, which makes sequential iteration deterministic (lexicographic)
//! regardless of insertion order. Every slot holds its attribute behind an
//! `Arc`: cloning the manager is cheap, and writes copy shared attributes on
//! first touch.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::attribute::erased::ErasedAttribute;
use crate::attribute::value::IndexValue;
use crate::attribute::AttributeId;
use crate::mesh_error::MeshError;
use crate::parallel;

/// One occupied slot: the attribute plus its registered name.
#[derive(Debug, Clone)]
pub struct AttributeSlot<I: IndexValue> {
    pub(crate) name: String,
    pub(crate) attr: Arc<ErasedAttribute<I>>,
}

/// Registry of all attributes of one mesh.
#[derive(Debug, Clone, Default)]
pub struct AttributeManager<I: IndexValue> {
    slots: Vec<Option<AttributeSlot<I>>>,
    names: BTreeMap<String, AttributeId>,
    free_ids: Vec<AttributeId>,
}

impl<I: IndexValue> AttributeManager<I> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            names: BTreeMap::new(),
            free_ids: Vec::new(),
        }
    }

    /// Number of registered attributes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn get_id(&self, name: &str) -> Result<AttributeId, MeshError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| MeshError::AttributeDoesNotExist(name.to_string()))
    }

    pub fn get_name(&self, id: AttributeId) -> Option<&str> {
        self.slots
            .get(id as usize)
            .and_then(|s| s.as_ref())
            .map(|s| s.name.as_str())
    }

    /// Register `attr` under `name`, recycling a free id when available.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        attr: Arc<ErasedAttribute<I>>,
    ) -> Result<AttributeId, MeshError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(MeshError::AttributeAlreadyExists(name));
        }
        let id = match self.free_ids.pop() {
            Some(id) => {
                debug_assert!(self.slots[id as usize].is_none());
                self.slots[id as usize] = Some(AttributeSlot {
                    name: name.clone(),
                    attr,
                });
                id
            }
            None => {
                let id = self.slots.len() as AttributeId;
                self.slots.push(Some(AttributeSlot {
                    name: name.clone(),
                    attr,
                }));
                id
            }
        };
        self.names.insert(name, id);
        Ok(id)
    }

    /// Remove the attribute registered under `name`, returning its handle.
    pub fn remove(&mut self, name: &str) -> Result<Arc<ErasedAttribute<I>>, MeshError> {
        let id = self.get_id(name)?;
        self.names.remove(name);
        let slot = self.slots[id as usize]
            .take()
            .expect("name map points at an empty slot");
        self.free_ids.push(id);
        Ok(slot.attr)
    }

    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<(), MeshError> {
        let id = self.get_id(old_name)?;
        if self.names.contains_key(new_name) {
            return Err(MeshError::AttributeAlreadyExists(new_name.to_string()));
        }
        self.names.remove(old_name);
        self.names.insert(new_name.to_string(), id);
        self.slots[id as usize]
            .as_mut()
            .expect("name map points at an empty slot")
            .name = new_name.to_string();
        Ok(())
    }

    /// Shared read access.
    pub fn read(&self, id: AttributeId) -> Option<&ErasedAttribute<I>> {
        self.slots
            .get(id as usize)
            .and_then(|s| s.as_ref())
            .map(|s| &*s.attr)
    }

    /// Exclusive write access; copies the attribute first if the handle is
    /// shared with another mesh.
    pub fn write(&mut self, id: AttributeId) -> Option<&mut ErasedAttribute<I>> {
        self.slots
            .get_mut(id as usize)
            .and_then(|s| s.as_mut())
            .map(|s| Arc::make_mut(&mut s.attr))
    }

    /// Clone the shared handle (no data copy).
    pub fn copy_ptr(&self, id: AttributeId) -> Option<Arc<ErasedAttribute<I>>> {
        self.slots
            .get(id as usize)
            .and_then(|s| s.as_ref())
            .map(|s| Arc::clone(&s.attr))
    }

    /// Take sole ownership of the attribute behind `handle`, copying when the
    /// handle is still shared.
    pub fn unwrap_handle(handle: Arc<ErasedAttribute<I>>) -> ErasedAttribute<I> {
        Arc::try_unwrap(handle).unwrap_or_else(|shared| (*shared).clone())
    }

    /// Ids of all registered attributes in name order.
    pub fn ids(&self) -> impl Iterator<Item = AttributeId> + '_ {
        self.names.values().copied()
    }

    /// Names of all registered attributes in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Sequential iteration in name order.
    pub fn seq_foreach_id<F: FnMut(AttributeId)>(&self, mut f: F) {
        for id in self.names.values() {
            f(*id);
        }
    }

    /// Parallel iteration over attribute ids, in unspecified order.
    pub fn par_foreach_id<F>(&self, f: F)
    where
        F: Fn(AttributeId) + Send + Sync,
    {
        let ids: Vec<AttributeId> = (0..self.slots.len() as AttributeId)
            .filter(|&id| self.slots[id as usize].is_some())
            .collect();
        parallel::for_each(ids, f);
    }
}
