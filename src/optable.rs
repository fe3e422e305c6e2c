//! Dispatch table of combine handlers, indexed by operation and element type.
//!
//! The table is built once, on first use, and is read-only afterwards.
//!
//! | Element types | Operations |
//! |---------------|------------|
//! | `u8, i8, i16, i32, i64, isize, u32, u64` | all eight |
//! | `f32, f64` | `Sum`, `Prod`, `Min`, `Max` |
//! | `IntPair, DoubleInt` | `Min`, `Max` (by `value`, ties keep the lower `index`) |
//!
//! Integer `Sum` and `Prod` wrap on overflow. `Lor` and `Land` treat any
//! non-zero element as true and produce `0` or `1`.

use std::ptr;
use std::sync::OnceLock;

use crate::datatype::{Datatype, DatatypeTag, DoubleInt, IntPair};
use crate::error::ErrorKind;
use crate::reduce::ReduceBuffer;
use crate::ReduceOp;

/// Combines the second buffer into the first, element by element.
pub type Handler = fn(&ReduceBuffer<'_>, &ReduceBuffer<'_>) -> Result<(), ErrorKind>;

/// Handler for unsupported (operation, element type) pairs.
pub fn dummy_handler(_recv: &ReduceBuffer<'_>, _send: &ReduceBuffer<'_>) -> Result<(), ErrorKind> {
    Err(ErrorKind::UnsupportedOp)
}

/// Process-wide table of combine handlers.
///
/// # Example
///
/// ```
/// use mprt::{DatatypeTag, Optable, ReduceOp};
///
/// let table = Optable::instance();
/// assert!(table.is_supported(ReduceOp::Max, DatatypeTag::I32));
/// assert!(!table.is_supported(ReduceOp::Band, DatatypeTag::F64));
/// ```
pub struct Optable {
    handlers: [[Option<Handler>; DatatypeTag::COUNT]; ReduceOp::COUNT],
}

static OPTABLE: OnceLock<Optable> = OnceLock::new();

impl Optable {
    /// The shared table.
    pub fn instance() -> &'static Optable {
        OPTABLE.get_or_init(Optable::build)
    }

    /// Handler for `op` on `tag`, or [`dummy_handler`] if there is none.
    pub fn get(&self, op: ReduceOp, tag: DatatypeTag) -> Handler {
        self.handlers[op.index()][tag.index()].unwrap_or(dummy_handler)
    }

    /// Check whether a real handler exists for `op` on `tag`.
    pub fn is_supported(&self, op: ReduceOp, tag: DatatypeTag) -> bool {
        self.handlers[op.index()][tag.index()].is_some()
    }

    fn build() -> Self {
        let mut table = Optable {
            handlers: [[None; DatatypeTag::COUNT]; ReduceOp::COUNT],
        };

        macro_rules! integral {
            ($($t:ty),*) => {$(
                table.register::<$t, Sum>(ReduceOp::Sum);
                table.register::<$t, Prod>(ReduceOp::Prod);
                table.register::<$t, Min>(ReduceOp::Min);
                table.register::<$t, Max>(ReduceOp::Max);
                table.register::<$t, Bor>(ReduceOp::Bor);
                table.register::<$t, Band>(ReduceOp::Band);
                table.register::<$t, Lor>(ReduceOp::Lor);
                table.register::<$t, Land>(ReduceOp::Land);
            )*};
        }
        macro_rules! floating {
            ($($t:ty),*) => {$(
                table.register::<$t, Sum>(ReduceOp::Sum);
                table.register::<$t, Prod>(ReduceOp::Prod);
                table.register::<$t, Min>(ReduceOp::Min);
                table.register::<$t, Max>(ReduceOp::Max);
            )*};
        }

        integral!(u8, i8, i16, i32, i64, isize, u32, u64);
        floating!(f32, f64);
        table.register::<IntPair, Min>(ReduceOp::Min);
        table.register::<IntPair, Max>(ReduceOp::Max);
        table.register::<DoubleInt, Min>(ReduceOp::Min);
        table.register::<DoubleInt, Max>(ReduceOp::Max);
        table
    }

    fn register<T: Datatype, O: Operator<T>>(&mut self, op: ReduceOp) {
        self.handlers[op.index()][T::TAG.index()] = Some(combine::<T, O>);
    }
}

impl std::fmt::Debug for Optable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let supported = self.handlers.iter().flatten().filter(|h| h.is_some()).count();
        f.debug_struct("Optable")
            .field("supported", &supported)
            .finish()
    }
}

trait Operator<T> {
    fn apply(a: T, b: T) -> T;
}

struct Sum;
struct Prod;
struct Min;
struct Max;
struct Bor;
struct Band;
struct Lor;
struct Land;

macro_rules! impl_integral_ops {
    ($($t:ty),*) => {$(
        impl Operator<$t> for Sum {
            fn apply(a: $t, b: $t) -> $t { a.wrapping_add(b) }
        }
        impl Operator<$t> for Prod {
            fn apply(a: $t, b: $t) -> $t { a.wrapping_mul(b) }
        }
        impl Operator<$t> for Min {
            fn apply(a: $t, b: $t) -> $t { a.min(b) }
        }
        impl Operator<$t> for Max {
            fn apply(a: $t, b: $t) -> $t { a.max(b) }
        }
        impl Operator<$t> for Bor {
            fn apply(a: $t, b: $t) -> $t { a | b }
        }
        impl Operator<$t> for Band {
            fn apply(a: $t, b: $t) -> $t { a & b }
        }
        impl Operator<$t> for Lor {
            fn apply(a: $t, b: $t) -> $t { <$t>::from(a != 0 || b != 0) }
        }
        impl Operator<$t> for Land {
            fn apply(a: $t, b: $t) -> $t { <$t>::from(a != 0 && b != 0) }
        }
    )*};
}

impl_integral_ops!(u8, i8, i16, i32, i64, isize, u32, u64);

macro_rules! impl_float_ops {
    ($($t:ty),*) => {$(
        impl Operator<$t> for Sum {
            fn apply(a: $t, b: $t) -> $t { a + b }
        }
        impl Operator<$t> for Prod {
            fn apply(a: $t, b: $t) -> $t { a * b }
        }
        impl Operator<$t> for Min {
            fn apply(a: $t, b: $t) -> $t { if b < a { b } else { a } }
        }
        impl Operator<$t> for Max {
            fn apply(a: $t, b: $t) -> $t { if b > a { b } else { a } }
        }
    )*};
}

impl_float_ops!(f32, f64);

macro_rules! impl_pair_ops {
    ($($t:ty),*) => {$(
        impl Operator<$t> for Min {
            fn apply(a: $t, b: $t) -> $t {
                if b.value < a.value || (b.value == a.value && b.index < a.index) { b } else { a }
            }
        }
        impl Operator<$t> for Max {
            fn apply(a: $t, b: $t) -> $t {
                if b.value > a.value || (b.value == a.value && b.index < a.index) { b } else { a }
            }
        }
    )*};
}

impl_pair_ops!(IntPair, DoubleInt);

fn combine<T: Datatype, O: Operator<T>>(recv: &ReduceBuffer<'_>, send: &ReduceBuffer<'_>) -> Result<(), ErrorKind> {
    if recv.datatype() != T::TAG {
        return Err(ErrorKind::BufferType);
    }
    recv.check(send)?;

    let dst = recv.raw();
    let out = dst.addr_mut().ok_or(ErrorKind::BufferType)? as *mut T;
    let inp = send.raw().addr() as *const T;

    for i in 0..dst.len() {
        // SAFETY: both views are live typed slices of `T` with `dst.len()`
        // elements (checked above). `y` is read before `out[i]` is written,
        // so `recv` and `send` may be the same buffer.
        unsafe {
            let y = ptr::read(inp.add(i));
            let x = ptr::read(out.add(i));
            ptr::write(out.add(i), O::apply(x, y));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RecvBuffer;

    fn apply<T: Datatype>(op: ReduceOp, a: &mut [T], b: &mut [T]) -> Result<(), ErrorKind> {
        let x = ReduceBuffer::new(RecvBuffer::new(a), 0);
        let y = ReduceBuffer::new(RecvBuffer::new(b), 1);
        (Optable::instance().get(op, T::TAG))(&x, &y)
    }

    #[test]
    fn max_of_ints_is_registered() {
        let table = Optable::instance();
        assert!(table.is_supported(ReduceOp::Max, DatatypeTag::I32));

        let mut a = [7i32];
        let mut b = [12i32];
        apply(ReduceOp::Max, &mut a, &mut b).unwrap();
        assert_eq!(a, [12]);
    }

    #[test]
    fn support_matrix() {
        let table = Optable::instance();
        for op in ReduceOp::ALL {
            for tag in DatatypeTag::ALL {
                let expected = match tag {
                    DatatypeTag::F32 | DatatypeTag::F64 => matches!(
                        op,
                        ReduceOp::Sum | ReduceOp::Prod | ReduceOp::Min | ReduceOp::Max
                    ),
                    DatatypeTag::IntPair | DatatypeTag::DoubleInt => {
                        matches!(op, ReduceOp::Min | ReduceOp::Max)
                    }
                    _ => true,
                };
                assert_eq!(table.is_supported(op, tag), expected, "{op:?} on {tag:?}");
            }
        }
    }

    #[test]
    fn dummy_handler_reports_unsupported() {
        let mut a = [1.0f64];
        let mut b = [2.0f64];
        assert_eq!(
            apply(ReduceOp::Land, &mut a, &mut b),
            Err(ErrorKind::UnsupportedOp)
        );
        assert_eq!(a, [1.0]);
    }

    #[test]
    fn integer_ops() {
        let mut a = [250u8, 0b1100, 3, 0];
        let mut b = [10u8, 0b1010, 0, 0];
        apply(ReduceOp::Sum, &mut a, &mut b).unwrap();
        assert_eq!(a, [4, 0b10110, 3, 0]);

        let mut a = [0b1100i64, 5];
        let mut b = [0b1010i64, -5];
        apply(ReduceOp::Band, &mut a, &mut b).unwrap();
        assert_eq!(a, [0b1000, 5 & -5]);

        let mut a = [0i16, 4, 0, -1];
        let mut b = [0i16, 0, 9, 2];
        let mut c = a;
        apply(ReduceOp::Lor, &mut c, &mut b).unwrap();
        assert_eq!(c, [0, 1, 1, 1]);
        apply(ReduceOp::Land, &mut a, &mut b).unwrap();
        assert_eq!(a, [0, 0, 0, 1]);
    }

    #[test]
    fn location_pairs_keep_index() {
        let mut a = [IntPair { value: 3, index: 0 }, IntPair { value: 5, index: 4 }];
        let mut b = [IntPair { value: 1, index: 2 }, IntPair { value: 5, index: 1 }];
        apply(ReduceOp::Min, &mut a, &mut b).unwrap();
        assert_eq!(a[0], IntPair { value: 1, index: 2 });
        assert_eq!(a[1], IntPair { value: 5, index: 1 });

        let mut a = [DoubleInt { value: 0.5, index: 7 }];
        let mut b = [DoubleInt { value: 2.5, index: 3 }];
        apply(ReduceOp::Max, &mut a, &mut b).unwrap();
        assert_eq!(a[0], DoubleInt { value: 2.5, index: 3 });
    }

    #[test]
    fn length_mismatch_is_a_size_error() {
        let mut a = [1u64, 2];
        let mut b = [1u64];
        assert_eq!(
            apply(ReduceOp::Sum, &mut a, &mut b),
            Err(ErrorKind::BufferSize)
        );
    }
}
