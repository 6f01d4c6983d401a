//! Type-erased attribute storage.
//!
//! The set of storable scalar types is closed, so erasure is a plain enum
//! over {ten scalars} x {flat, indexed} instead of trait objects. Uniform
//! operations (resizing, row compaction, index rewriting) dispatch with a
//! match; typed access goes through the downcast hooks on [`AttributeValue`],
//! which are generated here together with the enum.

use crate::attribute::value::{is_invalid, AttributeValue, AttributeValueType, IndexValue};
use crate::attribute::{
    Attribute, AttributeElement, AttributeExportPolicy, AttributeUsage, IndexedAttribute,
};
use crate::mesh_error::MeshError;

/// Invoke `$callback` with the full list of storable types, as
/// `(FlatVariant, IndexedVariant, scalar_type, value_type_tag)` tuples.
macro_rules! for_each_attribute_type {
    ($callback:ident) => {
        $callback! {
            (I8, IndexedI8, i8, AttributeValueType::I8),
            (I16, IndexedI16, i16, AttributeValueType::I16),
            (I32, IndexedI32, i32, AttributeValueType::I32),
            (I64, IndexedI64, i64, AttributeValueType::I64),
            (U8, IndexedU8, u8, AttributeValueType::U8),
            (U16, IndexedU16, u16, AttributeValueType::U16),
            (U32, IndexedU32, u32, AttributeValueType::U32),
            (U64, IndexedU64, u64, AttributeValueType::U64),
            (F32, IndexedF32, f32, AttributeValueType::F32),
            (F64, IndexedF64, f64, AttributeValueType::F64),
        }
    };
}

macro_rules! declare_erased_attribute {
    ($(($flat:ident, $indexed:ident, $ty:ty, $tag:expr)),+ $(,)?) => {
        /// An attribute of any storable scalar type, flat or indexed.
        ///
        /// `I` is the mesh index type; it only shows up in the index buffers
        /// of indexed variants.
        #[derive(Debug, Clone)]
        pub enum ErasedAttribute<I: IndexValue> {
            $( $flat(Attribute<$ty>), )+
            $( $indexed(IndexedAttribute<$ty, I>), )+
        }

        impl<I: IndexValue> ErasedAttribute<I> {
            pub fn value_type(&self) -> AttributeValueType {
                match self {
                    $( Self::$flat(_) => $tag, )+
                    $( Self::$indexed(_) => $tag, )+
                }
            }

            /// Element kind; indexed attributes report
            /// [`AttributeElement::Indexed`].
            pub fn element(&self) -> AttributeElement {
                match self {
                    $( Self::$flat(a) => a.element(), )+
                    $( Self::$indexed(_) => AttributeElement::Indexed, )+
                }
            }

            pub fn usage(&self) -> AttributeUsage {
                match self {
                    $( Self::$flat(a) => a.usage(), )+
                    $( Self::$indexed(a) => a.usage(), )+
                }
            }

            pub fn num_channels(&self) -> usize {
                match self {
                    $( Self::$flat(a) => a.num_channels(), )+
                    $( Self::$indexed(a) => a.num_channels(), )+
                }
            }

            pub fn is_indexed(&self) -> bool {
                match self {
                    $( Self::$flat(_) => false, )+
                    $( Self::$indexed(_) => true, )+
                }
            }

            /// Logical element count. For indexed attributes this is the
            /// length of the per-corner index buffer; the value half is not
            /// tied to any element count.
            pub fn num_elements(&self) -> usize {
                match self {
                    $( Self::$flat(a) => a.num_elements(), )+
                    $( Self::$indexed(a) => a.indices().num_elements(), )+
                }
            }

            /// Resize the per-element rows, filling growth with the default
            /// value. Indexed attributes resize their index buffer only.
            pub fn resize_elements(&mut self, new_count: usize) -> Result<(), MeshError> {
                match self {
                    $( Self::$flat(a) => a.resize_elements(new_count), )+
                    $( Self::$indexed(a) => a.indices_mut().resize_elements(new_count), )+
                }
            }

            pub fn reserve_entries(&mut self, num_entries: usize) {
                match self {
                    $( Self::$flat(a) => a.reserve_entries(num_entries), )+
                    $( Self::$indexed(a) => a.indices_mut().reserve_entries(num_entries), )+
                }
            }

            pub fn clear(&mut self) {
                match self {
                    $( Self::$flat(a) => a.clear(), )+
                    $( Self::$indexed(a) => a.indices_mut().clear(), )+
                }
            }

            pub fn shrink_to_fit(&mut self) {
                match self {
                    $( Self::$flat(a) => a.shrink_to_fit(), )+
                    $( Self::$indexed(a) => {
                        a.values_mut().shrink_to_fit();
                        a.indices_mut().shrink_to_fit();
                    } )+
                }
            }

            pub fn is_external(&self) -> bool {
                match self {
                    $( Self::$flat(a) => a.is_external(), )+
                    $( Self::$indexed(a) => {
                        a.values().is_external() || a.indices().is_external()
                    } )+
                }
            }

            pub fn apply_export_policy(
                &mut self,
                policy: AttributeExportPolicy,
            ) -> Result<(), MeshError> {
                match self {
                    $( Self::$flat(a) => a.apply_export_policy(policy), )+
                    $( Self::$indexed(a) => {
                        a.values_mut().apply_export_policy(policy)?;
                        a.indices_mut().apply_export_policy(policy)
                    } )+
                }
            }

            /// Compact per-element rows according to `old_to_new` (invalid
            /// sentinel marks a discarded element), then truncate to
            /// `new_count`. Kept rows must map to positions at or below their
            /// old index.
            pub fn apply_element_mapping(
                &mut self,
                old_to_new: &[I],
                new_count: usize,
            ) -> Result<(), MeshError> {
                match self {
                    $( Self::$flat(a) => {
                        remap_rows(a, old_to_new)?;
                        a.resize_elements(new_count)
                    } )+
                    $( Self::$indexed(a) => {
                        remap_rows(a.indices_mut(), old_to_new)?;
                        a.indices_mut().resize_elements(new_count)
                    } )+
                }
            }
        }

        $(
            impl AttributeValue for $ty {
                const VALUE_TYPE: AttributeValueType = $tag;

                fn sentinel() -> Self {
                    <$ty>::MAX
                }

                fn erase<I: IndexValue>(attr: Attribute<Self>) -> ErasedAttribute<I> {
                    ErasedAttribute::$flat(attr)
                }

                fn erase_indexed<I: IndexValue>(
                    attr: IndexedAttribute<Self, I>,
                ) -> ErasedAttribute<I> {
                    ErasedAttribute::$indexed(attr)
                }

                fn as_flat<I: IndexValue>(
                    erased: &ErasedAttribute<I>,
                ) -> Option<&Attribute<Self>> {
                    match erased {
                        ErasedAttribute::$flat(a) => Some(a),
                        _ => None,
                    }
                }

                fn as_flat_mut<I: IndexValue>(
                    erased: &mut ErasedAttribute<I>,
                ) -> Option<&mut Attribute<Self>> {
                    match erased {
                        ErasedAttribute::$flat(a) => Some(a),
                        _ => None,
                    }
                }

                fn as_indexed<I: IndexValue>(
                    erased: &ErasedAttribute<I>,
                ) -> Option<&IndexedAttribute<Self, I>> {
                    match erased {
                        ErasedAttribute::$indexed(a) => Some(a),
                        _ => None,
                    }
                }

                fn as_indexed_mut<I: IndexValue>(
                    erased: &mut ErasedAttribute<I>,
                ) -> Option<&mut IndexedAttribute<Self, I>> {
                    match erased {
                        ErasedAttribute::$indexed(a) => Some(a),
                        _ => None,
                    }
                }

                fn into_flat<I: IndexValue>(
                    erased: ErasedAttribute<I>,
                ) -> Option<Attribute<Self>> {
                    match erased {
                        ErasedAttribute::$flat(a) => Some(a),
                        _ => None,
                    }
                }

                fn into_indexed<I: IndexValue>(
                    erased: ErasedAttribute<I>,
                ) -> Option<IndexedAttribute<Self, I>> {
                    match erased {
                        ErasedAttribute::$indexed(a) => Some(a),
                        _ => None,
                    }
                }
            }
        )+
    };
}

for_each_attribute_type!(declare_erased_attribute);

impl<I: IndexValue> ErasedAttribute<I> {
    /// Rewrite the stored element indices of a `*Index`-usage attribute.
    /// No-op when the value type is not the mesh index type.
    pub fn map_index_values<F>(&mut self, f: F) -> Result<(), MeshError>
    where
        F: Fn(I) -> Result<I, MeshError>,
    {
        if let Some(a) = I::as_flat_mut(self) {
            for v in a.as_slice_mut()?.iter_mut() {
                *v = f(*v)?;
            }
        } else if let Some(a) = I::as_indexed_mut(self) {
            for v in a.values_mut().as_slice_mut()?.iter_mut() {
                *v = f(*v)?;
            }
        }
        Ok(())
    }

    /// Fill the stored element indices of a `*Index`-usage attribute with the
    /// attribute default. No-op when the value type is not the mesh index
    /// type.
    pub fn reset_index_values(&mut self) -> Result<(), MeshError> {
        if let Some(a) = I::as_flat_mut(self) {
            let d = a.default_value();
            a.as_slice_mut()?.fill(d);
        } else if let Some(a) = I::as_indexed_mut(self) {
            let d = a.values().default_value();
            a.values_mut().as_slice_mut()?.fill(d);
        }
        Ok(())
    }
}

fn remap_rows<V: AttributeValue, I: IndexValue>(
    attr: &mut Attribute<V>,
    old_to_new: &[I],
) -> Result<(), MeshError> {
    let nc = attr.num_channels();
    let data = attr.as_slice_mut()?;
    for (old, &new) in old_to_new.iter().enumerate() {
        if is_invalid(new) {
            continue;
        }
        let new = new.to_usize();
        if new != old {
            data.copy_within(old * nc..old * nc + nc, new * nc);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_round_trip() {
        let attr = Attribute::<f64>::new(AttributeElement::Vertex, AttributeUsage::Position, 3);
        let erased: ErasedAttribute<u32> = f64::erase(attr);
        assert_eq!(erased.value_type(), AttributeValueType::F64);
        assert!(!erased.is_indexed());
        assert!(f64::as_flat(&erased).is_some());
        assert!(f32::as_flat(&erased).is_none());
        assert!(f64::as_indexed(&erased).is_none());
    }

    #[test]
    fn element_mapping_compacts_rows() {
        let mut attr = Attribute::<f64>::new(AttributeElement::Vertex, AttributeUsage::UV, 2);
        attr.insert_elements(&[0.0, 0.1, 1.0, 1.1, 2.0, 2.1, 3.0, 3.1])
            .unwrap();
        let mut erased: ErasedAttribute<u32> = f64::erase(attr);
        // Drop elements 1 and 2.
        let mapping = [0u32, u32::MAX, u32::MAX, 1];
        erased.apply_element_mapping(&mapping, 2).unwrap();
        let attr = f64::as_flat(&erased).unwrap();
        assert_eq!(attr.num_elements(), 2);
        assert_eq!(attr.as_slice(), &[0.0, 0.1, 3.0, 3.1]);
    }

    #[test]
    fn map_index_values_skips_non_index_types() {
        let mut attr = Attribute::<u32>::new(AttributeElement::Corner, AttributeUsage::VertexIndex, 1);
        attr.insert_elements(&[0, 1, 2]).unwrap();
        let mut erased: ErasedAttribute<u32> = u32::erase(attr);
        erased.map_index_values(|v| Ok(v + 10)).unwrap();
        assert_eq!(u32::as_flat(&erased).unwrap().as_slice(), &[10, 11, 12]);

        let mut other = Attribute::<f64>::new(AttributeElement::Vertex, AttributeUsage::Scalar, 1);
        other.insert_elements(&[1.0]).unwrap();
        let mut erased: ErasedAttribute<u32> = f64::erase(other);
        erased.map_index_values(|v| Ok(v + 1)).unwrap();
        assert_eq!(f64::as_flat(&erased).unwrap().as_slice(), &[1.0]);
    }
}
