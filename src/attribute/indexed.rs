//! Indexed attributes: a value buffer addressed through a per-corner index.
//!
//! The value half has element kind [`AttributeElement::Value`] and is never
//! auto-resized by the mesh; the index half has one entry per corner and is
//! reindexed together with the corner buffers.

use crate::attribute::value::{AttributeValue, IndexValue};
use crate::attribute::{Attribute, AttributeElement, AttributeUsage};

/// A value buffer plus a per-corner index buffer into it.
#[derive(Debug, Clone)]
pub struct IndexedAttribute<V: AttributeValue, I: IndexValue> {
    values: Attribute<V>,
    indices: Attribute<I>,
}

impl<V: AttributeValue, I: IndexValue> IndexedAttribute<V, I> {
    /// New empty indexed attribute with `num_channels` value channels.
    pub fn new(usage: AttributeUsage, num_channels: usize) -> Self {
        Self {
            values: Attribute::new(AttributeElement::Value, usage, num_channels),
            indices: Attribute::new(AttributeElement::Corner, AttributeUsage::CornerIndex, 1),
        }
    }

    pub fn usage(&self) -> AttributeUsage {
        self.values.usage()
    }

    pub fn num_channels(&self) -> usize {
        self.values.num_channels()
    }

    pub fn values(&self) -> &Attribute<V> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Attribute<V> {
        &mut self.values
    }

    pub fn indices(&self) -> &Attribute<I> {
        &self.indices
    }

    pub fn indices_mut(&mut self) -> &mut Attribute<I> {
        &mut self.indices
    }
}
