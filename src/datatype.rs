//! Element datatype trait and type tag mapping.
//!
//! This module provides the [`Datatype`] trait, a sealed trait that maps Rust
//! element types to the [`DatatypeTag`] carried by every buffer. Tags are the
//! second index of the reduction [`Optable`](crate::Optable) and the key used
//! to reject transfers between buffers of different element types.
//!
//! # Supported Types
//!
//! | Rust Type   | Tag         | Index |
//! |-------------|-------------|-------|
//! | `u8`        | `U8`        | 0     |
//! | `i8`        | `I8`        | 1     |
//! | `i16`       | `I16`       | 2     |
//! | `i32`       | `I32`       | 3     |
//! | `i64`       | `I64`       | 4     |
//! | `isize`     | `Isize`     | 5     |
//! | `u32`       | `U32`       | 6     |
//! | `u64`       | `U64`       | 7     |
//! | `f32`       | `F32`       | 8     |
//! | `f64`       | `F64`       | 9     |
//! | [`IntPair`] | `IntPair`   | 10    |
//! | [`DoubleInt`] | `DoubleInt` | 11  |

use std::mem;

/// Seals [`Datatype`] against outside implementations.
mod sealed {
    pub trait Sealed {}
}

/// Tag identifying the element type of a buffer.
///
/// The discriminants are dense so that a tag can index a table directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DatatypeTag {
    /// 8-bit unsigned integer
    U8 = 0,
    /// 8-bit signed integer
    I8 = 1,
    /// 16-bit signed integer
    I16 = 2,
    /// 32-bit signed integer
    I32 = 3,
    /// 64-bit signed integer
    I64 = 4,
    /// Pointer-sized signed integer
    Isize = 5,
    /// 32-bit unsigned integer
    U32 = 6,
    /// 64-bit unsigned integer
    U64 = 7,
    /// 32-bit floating point
    F32 = 8,
    /// 64-bit floating point
    F64 = 9,
    /// `(i32 value, i32 index)` pair
    IntPair = 10,
    /// `(f64 value, i32 index)` pair
    DoubleInt = 11,
}

impl DatatypeTag {
    /// Number of element types.
    pub const COUNT: usize = 12;

    /// All tags in index order.
    pub const ALL: [DatatypeTag; Self::COUNT] = [
        DatatypeTag::U8,
        DatatypeTag::I8,
        DatatypeTag::I16,
        DatatypeTag::I32,
        DatatypeTag::I64,
        DatatypeTag::Isize,
        DatatypeTag::U32,
        DatatypeTag::U64,
        DatatypeTag::F32,
        DatatypeTag::F64,
        DatatypeTag::IntPair,
        DatatypeTag::DoubleInt,
    ];

    /// Size in bytes of one element.
    pub const fn size_of(self) -> usize {
        match self {
            DatatypeTag::U8 => mem::size_of::<u8>(),
            DatatypeTag::I8 => mem::size_of::<i8>(),
            DatatypeTag::I16 => mem::size_of::<i16>(),
            DatatypeTag::I32 => mem::size_of::<i32>(),
            DatatypeTag::I64 => mem::size_of::<i64>(),
            DatatypeTag::Isize => mem::size_of::<isize>(),
            DatatypeTag::U32 => mem::size_of::<u32>(),
            DatatypeTag::U64 => mem::size_of::<u64>(),
            DatatypeTag::F32 => mem::size_of::<f32>(),
            DatatypeTag::F64 => mem::size_of::<f64>(),
            DatatypeTag::IntPair => mem::size_of::<IntPair>(),
            DatatypeTag::DoubleInt => mem::size_of::<DoubleInt>(),
        }
    }

    /// Table index of this tag.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// An `i32` value paired with an `i32` location, for min/max-with-location
/// reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct IntPair {
    /// Value compared by `Min`/`Max`
    pub value: i32,
    /// Location carried along with the winning value
    pub index: i32,
}

/// An `f64` value paired with an `i32` location, for min/max-with-location
/// reductions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct DoubleInt {
    /// Value compared by `Min`/`Max`
    pub value: f64,
    /// Location carried along with the winning value
    pub index: i32,
}

/// Trait for types that can be used in communication buffers.
///
/// This is a **sealed trait**: it cannot be implemented outside this crate.
/// See the module documentation for the supported types.
///
/// # Example
///
/// ```
/// use mprt::{Datatype, DatatypeTag};
///
/// fn tag_of<T: Datatype>(_: &[T]) -> DatatypeTag {
///     T::TAG
/// }
///
/// assert_eq!(tag_of(&[1.0f64, 2.0]), DatatypeTag::F64);
/// assert_eq!(tag_of(&[7i32]), DatatypeTag::I32);
/// ```
pub trait Datatype: sealed::Sealed + Copy + Send + 'static {
    /// The tag stored in buffers of this element type.
    const TAG: DatatypeTag;
}

macro_rules! impl_datatype {
    ($ty:ty, $tag:expr) => {
        impl sealed::Sealed for $ty {}
        impl Datatype for $ty {
            const TAG: DatatypeTag = $tag;
        }
    };
}

impl_datatype!(u8, DatatypeTag::U8);
impl_datatype!(i8, DatatypeTag::I8);
impl_datatype!(i16, DatatypeTag::I16);
impl_datatype!(i32, DatatypeTag::I32);
impl_datatype!(i64, DatatypeTag::I64);
impl_datatype!(isize, DatatypeTag::Isize);
impl_datatype!(u32, DatatypeTag::U32);
impl_datatype!(u64, DatatypeTag::U64);
impl_datatype!(f32, DatatypeTag::F32);
impl_datatype!(f64, DatatypeTag::F64);
impl_datatype!(IntPair, DatatypeTag::IntPair);
impl_datatype!(DoubleInt, DatatypeTag::DoubleInt);
