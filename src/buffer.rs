//! Typed, non-owning views over caller memory.
//!
//! A [`SendBuffer`] borrows a slice immutably and a [`RecvBuffer`] borrows one
//! mutably. Both record the element type, address and element count; the
//! runtime only ever reads those three properties and never allocates or
//! frees the memory behind them. The borrow lifetime `'a` must cover the
//! [`Scope`](crate::Scope) a request is built in, and the scope cancels its
//! requests before it ends, so the memory outlives every operation on it.

use std::marker::PhantomData;
use std::ptr;

use crate::datatype::{Datatype, DatatypeTag};

/// Type-erased buffer view shared by messages and reduction buffers.
///
/// `Buffer` is a plain address/length/type triple. Whoever creates one from a
/// borrowed slice is responsible for keeping the borrow alive for as long as
/// the view is reachable.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Buffer {
    tag: DatatypeTag,
    addr: *mut u8,
    len: usize,
    writable: bool,
}

// SAFETY: a `Buffer` is only dereferenced while the borrow it was created
// from is alive; access is serialized by the message pool lock or by the
// reduction tree node locks.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl Buffer {
    pub(crate) fn datatype(&self) -> DatatypeTag {
        self.tag
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.len * self.tag.size_of()
    }

    pub(crate) fn addr(&self) -> *const u8 {
        self.addr
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.writable
    }

    /// Mutable address, or `None` for a read-only view.
    pub(crate) fn addr_mut(&self) -> Option<*mut u8> {
        self.writable.then_some(self.addr)
    }

    /// Copy the first `src.len()` elements of `src` into this buffer.
    ///
    /// # Safety
    ///
    /// `self` must be writable, both views must be live, the element types
    /// must match and `self.len() >= src.len()`.
    pub(crate) unsafe fn copy_from(&self, src: &Buffer) {
        debug_assert!(self.writable);
        debug_assert_eq!(self.tag, src.tag);
        debug_assert!(self.len >= src.len);
        if src.len == 0 || ptr::eq(self.addr, src.addr) {
            return;
        }
        ptr::copy(src.addr, self.addr, src.byte_len());
    }
}

/// Read-only buffer used as the source of a send or reduction.
///
/// # Example
///
/// ```
/// use mprt::{DatatypeTag, SendBuffer};
///
/// let data = [1i32, 2, 3];
/// let buf = SendBuffer::new(&data);
/// assert_eq!(buf.datatype(), DatatypeTag::I32);
/// assert_eq!(buf.len(), 3);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SendBuffer<'a> {
    raw: Buffer,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> SendBuffer<'a> {
    /// Borrow `data` as a send buffer.
    pub fn new<T: Datatype>(data: &'a [T]) -> Self {
        SendBuffer {
            raw: Buffer {
                tag: T::TAG,
                addr: data.as_ptr() as *mut u8,
                len: data.len(),
                writable: false,
            },
            _marker: PhantomData,
        }
    }

    /// Element type.
    pub fn datatype(&self) -> DatatypeTag {
        self.raw.tag
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.raw.len
    }

    /// Check whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.raw.len == 0
    }

    /// Address of the first element.
    pub fn addr(&self) -> *const u8 {
        self.raw.addr
    }

    pub(crate) fn raw(&self) -> Buffer {
        self.raw
    }
}

impl<'a, T: Datatype> From<&'a [T]> for SendBuffer<'a> {
    fn from(data: &'a [T]) -> Self {
        SendBuffer::new(data)
    }
}

/// Writable buffer used as the destination of a receive or reduction.
///
/// The buffer holds a mutable borrow, so the caller cannot read or modify the
/// memory while a request built from it is alive.
#[derive(Debug)]
pub struct RecvBuffer<'a> {
    raw: Buffer,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> RecvBuffer<'a> {
    /// Borrow `data` as a receive buffer.
    pub fn new<T: Datatype>(data: &'a mut [T]) -> Self {
        RecvBuffer {
            raw: Buffer {
                tag: T::TAG,
                addr: data.as_mut_ptr() as *mut u8,
                len: data.len(),
                writable: true,
            },
            _marker: PhantomData,
        }
    }

    /// Element type.
    pub fn datatype(&self) -> DatatypeTag {
        self.raw.tag
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.raw.len
    }

    /// Check whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.raw.len == 0
    }

    /// Address of the first element.
    pub fn addr(&self) -> *const u8 {
        self.raw.addr
    }

    pub(crate) fn raw(&self) -> Buffer {
        self.raw
    }
}

impl<'a, T: Datatype> From<&'a mut [T]> for RecvBuffer<'a> {
    fn from(data: &'a mut [T]) -> Self {
        RecvBuffer::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_buffer_reports_type_and_length() {
        let data = vec![1.5f64; 4];
        let buf = SendBuffer::new(&data);
        assert_eq!(buf.datatype(), DatatypeTag::F64);
        assert_eq!(buf.len(), 4);
        assert!(!buf.is_empty());
        assert_eq!(buf.addr(), data.as_ptr() as *const u8);
        assert!(!buf.raw().is_writable());
        assert!(buf.raw().addr_mut().is_none());
        assert_eq!(buf.raw().byte_len(), 32);
    }

    #[test]
    fn recv_buffer_is_writable() {
        let mut data = [0u8; 3];
        let buf = RecvBuffer::new(&mut data);
        assert_eq!(buf.datatype(), DatatypeTag::U8);
        assert!(buf.raw().addr_mut().is_some());
    }

    #[test]
    fn copy_moves_prefix_only() {
        let src = [7i32, 8];
        let mut dst = [0i32; 4];
        let s = SendBuffer::new(&src).raw();
        let d = RecvBuffer::new(&mut dst).raw();
        unsafe { d.copy_from(&s) };
        assert_eq!(dst, [7, 8, 0, 0]);
    }

    #[test]
    fn empty_buffers() {
        let data: [u64; 0] = [];
        let buf = SendBuffer::from(&data[..]);
        assert!(buf.is_empty());
    }
}
