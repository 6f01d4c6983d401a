//! Typed attribute buffer.
//!
//! An [`Attribute`] owns (or wraps) a flat buffer of `num_elements *
//! num_channels` scalar entries in row-major element order. Storage is either
//! internal (a plain `Vec`) or an externally shared buffer; policies decide
//! what happens when an external buffer is grown, written through a read-only
//! wrap, or exported back to the caller.

use std::sync::Arc;

use num_traits::AsPrimitive;

use crate::attribute::value::AttributeValue;
use crate::attribute::{
    AttributeElement, AttributeExportPolicy, AttributeGrowthPolicy, AttributeUsage,
    AttributeWritePolicy,
};
use crate::mesh_error::MeshError;

/// Shared handle to a caller-owned buffer wrapped as attribute storage.
pub type ExternalBuffer<V> = Arc<Vec<V>>;

/// Backing storage of an attribute.
#[derive(Debug, Clone)]
pub enum AttributeStorage<V> {
    /// Owned storage; grows and shrinks freely.
    Internal(Vec<V>),
    /// Caller-provided buffer shared through an `Arc`. The buffer length is
    /// the wrap capacity; the logical entry count may be smaller.
    External {
        buffer: ExternalBuffer<V>,
        read_only: bool,
    },
}

/// A typed per-element buffer with semantic metadata.
#[derive(Debug, Clone)]
pub struct Attribute<V: AttributeValue> {
    element: AttributeElement,
    usage: AttributeUsage,
    num_channels: usize,
    num_elements: usize,
    default_value: V,
    growth_policy: AttributeGrowthPolicy,
    write_policy: AttributeWritePolicy,
    storage: AttributeStorage<V>,
}

impl<V: AttributeValue> Attribute<V> {
    /// New empty attribute with internal storage and default policies.
    pub fn new(element: AttributeElement, usage: AttributeUsage, num_channels: usize) -> Self {
        debug_assert!(num_channels > 0);
        Self {
            element,
            usage,
            num_channels,
            num_elements: 0,
            default_value: V::default(),
            growth_policy: AttributeGrowthPolicy::default(),
            write_policy: AttributeWritePolicy::default(),
            storage: AttributeStorage::Internal(Vec::new()),
        }
    }

    pub fn element(&self) -> AttributeElement {
        self.element
    }

    pub fn usage(&self) -> AttributeUsage {
        self.usage
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn num_entries(&self) -> usize {
        self.num_elements * self.num_channels
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements == 0
    }

    pub fn default_value(&self) -> V {
        self.default_value
    }

    pub fn set_default_value(&mut self, value: V) {
        self.default_value = value;
    }

    pub fn growth_policy(&self) -> AttributeGrowthPolicy {
        self.growth_policy
    }

    pub fn set_growth_policy(&mut self, policy: AttributeGrowthPolicy) {
        self.growth_policy = policy;
    }

    pub fn write_policy(&self) -> AttributeWritePolicy {
        self.write_policy
    }

    pub fn set_write_policy(&mut self, policy: AttributeWritePolicy) {
        self.write_policy = policy;
    }

    pub fn is_external(&self) -> bool {
        matches!(self.storage, AttributeStorage::External { .. })
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self.storage,
            AttributeStorage::External {
                read_only: true,
                ..
            }
        )
    }

    /// All logical entries, element-major.
    pub fn as_slice(&self) -> &[V] {
        let n = self.num_entries();
        match &self.storage {
            AttributeStorage::Internal(data) => &data[..n],
            AttributeStorage::External { buffer, .. } => &buffer[..n],
        }
    }

    /// All logical entries, mutable. Gated by the write policy when the
    /// storage is a read-only wrap.
    pub fn as_slice_mut(&mut self) -> Result<&mut [V], MeshError> {
        self.ensure_writable()?;
        let n = self.num_entries();
        Ok(match &mut self.storage {
            AttributeStorage::Internal(data) => &mut data[..n],
            AttributeStorage::External { buffer, .. } => &mut Arc::make_mut(buffer)[..n],
        })
    }

    /// Entry at `(element, channel)`. Panics on out-of-bounds access.
    pub fn get(&self, element: usize, channel: usize) -> V {
        debug_assert!(channel < self.num_channels);
        self.as_slice()[element * self.num_channels + channel]
    }

    /// Channel row of one element.
    pub fn row(&self, element: usize) -> &[V] {
        let start = element * self.num_channels;
        &self.as_slice()[start..start + self.num_channels]
    }

    /// Mutable channel row of one element.
    pub fn row_mut(&mut self, element: usize) -> Result<&mut [V], MeshError> {
        let start = element * self.num_channels;
        let end = start + self.num_channels;
        Ok(&mut self.as_slice_mut()?[start..end])
    }

    /// Append elements from a flat value buffer. The buffer length must be a
    /// multiple of the channel count.
    pub fn insert_elements(&mut self, values: &[V]) -> Result<(), MeshError> {
        if values.len() % self.num_channels != 0 {
            return Err(MeshError::WrongValueArrayLength {
                len: values.len(),
                expected: (values.len() / self.num_channels + 1) * self.num_channels,
            });
        }
        let count = values.len() / self.num_channels;
        let old = self.num_elements;
        let start = old * self.num_channels;
        self.resize_elements(old + count)?;
        self.as_slice_mut()?[start..].copy_from_slice(values);
        Ok(())
    }

    /// Append `count` elements filled with the default value.
    pub fn insert_default_elements(&mut self, count: usize) -> Result<(), MeshError> {
        self.resize_elements(self.num_elements + count)
    }

    /// Resize to `new_num_elements`, filling new entries with the default
    /// value. Growth of external storage is gated by the growth policy.
    pub fn resize_elements(&mut self, new_num_elements: usize) -> Result<(), MeshError> {
        let new_entries = new_num_elements * self.num_channels;
        self.ensure_storage(new_entries)?;
        if let AttributeStorage::Internal(data) = &mut self.storage {
            data.resize(new_entries, self.default_value);
        }
        self.num_elements = new_num_elements;
        Ok(())
    }

    /// Drop all elements. Keeps internal capacity; external wraps only reset
    /// the logical size.
    pub fn clear(&mut self) {
        self.num_elements = 0;
        if let AttributeStorage::Internal(data) = &mut self.storage {
            data.clear();
        }
    }

    /// Pre-allocate internal capacity for `num_entries` total entries.
    pub fn reserve_entries(&mut self, num_entries: usize) {
        if let AttributeStorage::Internal(data) = &mut self.storage {
            if num_entries > data.len() {
                data.reserve(num_entries - data.len());
            }
        }
    }

    pub fn shrink_to_fit(&mut self) {
        if let AttributeStorage::Internal(data) = &mut self.storage {
            data.shrink_to_fit();
        }
    }

    /// Replace storage with a writable shared wrap of `buffer`, holding
    /// `num_elements` logical elements. The buffer may be larger than needed;
    /// the slack is growth capacity under `AllowWithinCapacity`.
    pub fn wrap(
        &mut self,
        buffer: ExternalBuffer<V>,
        num_elements: usize,
    ) -> Result<(), MeshError> {
        let needed = num_elements * self.num_channels;
        if buffer.len() < needed {
            return Err(MeshError::WrappedBufferTooSmall {
                len: buffer.len(),
                needed,
            });
        }
        self.storage = AttributeStorage::External {
            buffer,
            read_only: false,
        };
        self.num_elements = num_elements;
        Ok(())
    }

    /// Like [`wrap`](Self::wrap), but writes are gated by the write policy.
    pub fn wrap_const(
        &mut self,
        buffer: ExternalBuffer<V>,
        num_elements: usize,
    ) -> Result<(), MeshError> {
        self.wrap(buffer, num_elements)?;
        if let AttributeStorage::External { read_only, .. } = &mut self.storage {
            *read_only = true;
        }
        Ok(())
    }

    /// Copy external storage into an owned internal buffer. No-op when the
    /// storage is already internal.
    pub fn create_internal_copy(&mut self) {
        if let AttributeStorage::External { buffer, .. } = &self.storage {
            let n = self.num_entries();
            self.storage = AttributeStorage::Internal(buffer[..n].to_vec());
        }
    }

    /// Enforce `policy` before handing the attribute back to the caller.
    pub fn apply_export_policy(&mut self, policy: AttributeExportPolicy) -> Result<(), MeshError> {
        if !self.is_external() {
            return Ok(());
        }
        match policy {
            AttributeExportPolicy::CopyIfExternal => {
                self.create_internal_copy();
                Ok(())
            }
            AttributeExportPolicy::KeepExternalPtr => {
                log::warn!("exporting an attribute that points to externally owned memory");
                Ok(())
            }
            AttributeExportPolicy::ErrorIfExternal => Err(MeshError::ExportExternalBuffer),
        }
    }

    /// Convert every entry to another scalar type. Metadata and policies are
    /// kept; the copy always owns internal storage.
    pub fn cast_copy<W>(&self) -> Attribute<W>
    where
        W: AttributeValue + 'static,
        V: AsPrimitive<W>,
    {
        let mut out = Attribute::<W>::new(self.element, self.usage, self.num_channels);
        out.default_value = self.default_value.as_();
        out.growth_policy = self.growth_policy;
        out.write_policy = self.write_policy;
        out.storage =
            AttributeStorage::Internal(self.as_slice().iter().map(|v| v.as_()).collect());
        out.num_elements = self.num_elements;
        out
    }

    fn ensure_writable(&mut self) -> Result<(), MeshError> {
        if self.is_read_only() {
            match self.write_policy {
                AttributeWritePolicy::ErrorIfReadOnly => return Err(MeshError::ReadOnlyAttribute),
                AttributeWritePolicy::WarnAndCopy => {
                    log::warn!("writing to a read-only attribute buffer; copying to internal storage");
                    self.create_internal_copy();
                }
                AttributeWritePolicy::SilentCopy => self.create_internal_copy(),
            }
        }
        Ok(())
    }

    /// Make sure the storage can hold `new_entries` entries, applying the
    /// growth policy when external.
    fn ensure_storage(&mut self, new_entries: usize) -> Result<(), MeshError> {
        let capacity = match &self.storage {
            AttributeStorage::Internal(_) => return Ok(()),
            AttributeStorage::External { buffer, .. } => buffer.len(),
        };
        if new_entries <= self.num_entries() {
            // Shrinking an external wrap only moves the logical boundary.
            return Ok(());
        }
        match self.growth_policy {
            AttributeGrowthPolicy::ErrorIfExternal => Err(MeshError::GrowExternalBuffer),
            AttributeGrowthPolicy::AllowWithinCapacity => {
                if new_entries <= capacity && !self.is_read_only() {
                    let old = self.num_entries();
                    if let AttributeStorage::External { buffer, .. } = &mut self.storage {
                        Arc::make_mut(buffer)[old..new_entries].fill(self.default_value);
                    }
                    Ok(())
                } else {
                    Err(MeshError::GrowExternalBuffer)
                }
            }
            AttributeGrowthPolicy::WarnAndCopy => {
                log::warn!("growing an attribute past its external buffer; copying to internal storage");
                self.create_internal_copy();
                Ok(())
            }
            AttributeGrowthPolicy::SilentCopy => {
                self.create_internal_copy();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_attr() -> Attribute<f64> {
        Attribute::new(AttributeElement::Vertex, AttributeUsage::Scalar, 1)
    }

    #[test]
    fn insert_and_access() {
        let mut attr = Attribute::<f64>::new(AttributeElement::Vertex, AttributeUsage::UV, 2);
        attr.insert_elements(&[0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(attr.num_elements(), 2);
        assert_eq!(attr.get(1, 0), 2.0);
        assert_eq!(attr.row(0), &[0.0, 1.0]);
    }

    #[test]
    fn insert_appends_after_existing_rows() {
        let mut attr = Attribute::<f64>::new(AttributeElement::Vertex, AttributeUsage::UV, 2);
        attr.insert_elements(&[0.0, 1.0]).unwrap();
        attr.insert_elements(&[2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(attr.num_elements(), 3);
        assert_eq!(attr.row(1), &[2.0, 3.0]);
        assert_eq!(attr.row(2), &[4.0, 5.0]);
    }

    #[test]
    fn insert_rejects_partial_rows() {
        let mut attr = Attribute::<f64>::new(AttributeElement::Vertex, AttributeUsage::UV, 2);
        assert!(matches!(
            attr.insert_elements(&[1.0, 2.0, 3.0]),
            Err(MeshError::WrongValueArrayLength { .. })
        ));
    }

    #[test]
    fn default_value_fills_growth() {
        let mut attr = scalar_attr();
        attr.set_default_value(7.5);
        attr.resize_elements(3).unwrap();
        assert_eq!(attr.as_slice(), &[7.5, 7.5, 7.5]);
    }

    #[test]
    fn external_wrap_growth_policies() {
        let buffer = Arc::new(vec![1.0f64, 2.0, 3.0, 4.0]);
        let mut attr = scalar_attr();
        attr.wrap(buffer.clone(), 2).unwrap();
        assert!(attr.is_external());

        assert!(matches!(
            attr.resize_elements(3),
            Err(MeshError::GrowExternalBuffer)
        ));

        attr.set_growth_policy(AttributeGrowthPolicy::AllowWithinCapacity);
        attr.resize_elements(4).unwrap();
        assert!(attr.is_external());
        assert!(matches!(
            attr.resize_elements(5),
            Err(MeshError::GrowExternalBuffer)
        ));

        attr.set_growth_policy(AttributeGrowthPolicy::SilentCopy);
        attr.resize_elements(5).unwrap();
        assert!(!attr.is_external());
        assert_eq!(attr.num_elements(), 5);
    }

    #[test]
    fn const_wrap_write_policies() {
        let buffer = Arc::new(vec![1.0f64, 2.0]);
        let mut attr = scalar_attr();
        attr.wrap_const(buffer.clone(), 2).unwrap();
        assert!(attr.is_read_only());
        assert!(matches!(
            attr.as_slice_mut(),
            Err(MeshError::ReadOnlyAttribute)
        ));

        attr.set_write_policy(AttributeWritePolicy::SilentCopy);
        attr.as_slice_mut().unwrap()[0] = 9.0;
        assert!(!attr.is_external());
        assert_eq!(attr.get(0, 0), 9.0);
        // Caller's buffer is untouched.
        assert_eq!(buffer[0], 1.0);
    }

    #[test]
    fn writable_wrap_copies_when_shared() {
        let buffer = Arc::new(vec![1.0f64, 2.0]);
        let mut attr = scalar_attr();
        attr.wrap(buffer.clone(), 2).unwrap();
        attr.as_slice_mut().unwrap()[0] = 5.0;
        // The caller still holds the Arc, so the write went to a private copy.
        assert_eq!(buffer[0], 1.0);
        assert_eq!(attr.get(0, 0), 5.0);
    }

    #[test]
    fn export_policy() {
        let buffer = Arc::new(vec![1.0f64, 2.0]);
        let mut attr = scalar_attr();
        attr.wrap(buffer, 2).unwrap();
        assert!(matches!(
            attr.apply_export_policy(AttributeExportPolicy::ErrorIfExternal),
            Err(MeshError::ExportExternalBuffer)
        ));
        attr.apply_export_policy(AttributeExportPolicy::CopyIfExternal)
            .unwrap();
        assert!(!attr.is_external());
    }

    #[test]
    fn cast_copy_converts_entries() {
        let mut attr = Attribute::<f32>::new(AttributeElement::Vertex, AttributeUsage::Scalar, 1);
        attr.insert_elements(&[1.5, 2.5]).unwrap();
        let cast: Attribute<f64> = attr.cast_copy();
        assert_eq!(cast.as_slice(), &[1.5f64, 2.5]);
    }
}
