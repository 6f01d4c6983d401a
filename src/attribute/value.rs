//! Scalar value types storable in attributes.
//!
//! The set of storable types is closed: the ten primitive scalars listed in
//! [`AttributeValueType`]. Type erasure dispatches over this set with a plain
//! enum rather than trait objects, so every storable type also carries the
//! hooks to move in and out of [`ErasedAttribute`](crate::attribute::ErasedAttribute).

use std::fmt::Debug;
use std::hash::Hash;

use num_traits::{AsPrimitive, Float, PrimInt, Unsigned};
use serde::{Deserialize, Serialize};

use crate::attribute::erased::ErasedAttribute;
use crate::attribute::{Attribute, IndexedAttribute};

/// Tag identifying the scalar type stored in an erased attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeValueType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for i8 {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// A scalar storable in an attribute buffer.
///
/// Sealed; implemented exactly for the ten types named by
/// [`AttributeValueType`]. The associated functions bridge typed and erased
/// attribute representations; implementations are generated alongside
/// `ErasedAttribute` itself.
pub trait AttributeValue:
    sealed::Sealed + Copy + Default + Debug + PartialEq + PartialOrd + Send + Sync + 'static
{
    /// Runtime tag for this type.
    const VALUE_TYPE: AttributeValueType;

    /// Largest representable value. Index-typed attributes use it as the
    /// invalid marker.
    fn sentinel() -> Self;

    fn erase<I: IndexValue>(attr: Attribute<Self>) -> ErasedAttribute<I>;
    fn erase_indexed<I: IndexValue>(attr: IndexedAttribute<Self, I>) -> ErasedAttribute<I>;

    fn as_flat<I: IndexValue>(erased: &ErasedAttribute<I>) -> Option<&Attribute<Self>>;
    fn as_flat_mut<I: IndexValue>(erased: &mut ErasedAttribute<I>) -> Option<&mut Attribute<Self>>;
    fn as_indexed<I: IndexValue>(erased: &ErasedAttribute<I>) -> Option<&IndexedAttribute<Self, I>>;
    fn as_indexed_mut<I: IndexValue>(
        erased: &mut ErasedAttribute<I>,
    ) -> Option<&mut IndexedAttribute<Self, I>>;

    fn into_flat<I: IndexValue>(erased: ErasedAttribute<I>) -> Option<Attribute<Self>>;
    fn into_indexed<I: IndexValue>(
        erased: ErasedAttribute<I>,
    ) -> Option<IndexedAttribute<Self, I>>;
}

/// Floating-point coordinate type of a mesh.
pub trait Scalar: AttributeValue + Float + AsPrimitive<f32> + AsPrimitive<f64> {}
impl Scalar for f32 {}
impl Scalar for f64 {}

/// Unsigned integer type used for vertex/facet/corner/edge indices.
///
/// The maximum representable value is reserved as the invalid sentinel, see
/// [`invalid_index`].
pub trait IndexValue:
    AttributeValue + PrimInt + Unsigned + Hash + AsPrimitive<u64> + AsPrimitive<usize>
{
    /// Narrow a count to the index type. Callers guarantee the value fits;
    /// overflow is a programming error.
    fn from_usize(value: usize) -> Self;
    /// Widen to `usize` for slicing.
    fn to_usize(self) -> usize;
}

impl IndexValue for u32 {
    #[inline]
    fn from_usize(value: usize) -> Self {
        debug_assert!(value <= u32::MAX as usize);
        value as u32
    }
    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl IndexValue for u64 {
    #[inline]
    fn from_usize(value: usize) -> Self {
        value as u64
    }
    #[inline]
    fn to_usize(self) -> usize {
        debug_assert!(self <= usize::MAX as u64);
        self as usize
    }
}

/// Sentinel marking an unset or discarded index slot.
#[inline]
pub fn invalid_index<I: IndexValue>() -> I {
    I::max_value()
}

/// True if `index` is the invalid sentinel.
#[inline]
pub fn is_invalid<I: IndexValue>(index: I) -> bool {
    index == I::max_value()
}
