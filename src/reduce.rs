//! Reduction buffers and the binary combination tree.
//!
//! A reduction combines one [`ReduceBuffer`] per participant into a single
//! result. Participants are arranged in a [`TreeShape`]: adjacent entries are
//! paired level by level and an odd entry is promoted unchanged to the next
//! level. The shape depends only on the number of participants, which fixes
//! the association order of every reduction over that many participants.

use std::marker::PhantomData;

use tracing::debug;

use crate::buffer::{Buffer, RecvBuffer, SendBuffer};
use crate::datatype::DatatypeTag;
use crate::error::{Error, ErrorKind, Result};
use crate::optable::Optable;
use crate::ReduceOp;

/// A receive buffer annotated with the rank that contributes it.
///
/// # Example
///
/// ```
/// use mprt::{ReduceBuffer, RecvBuffer, SendBuffer};
///
/// let input = [1.0f64, 2.0];
/// let mut out = [0.0f64; 2];
/// let mut buf = ReduceBuffer::new(RecvBuffer::new(&mut out), 0);
/// buf.copy_from(&SendBuffer::new(&input)).unwrap();
/// drop(buf);
/// assert_eq!(out, input);
/// ```
#[derive(Debug)]
pub struct ReduceBuffer<'a> {
    buf: Buffer,
    rank: i32,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> ReduceBuffer<'a> {
    /// Wrap `buf` as the contribution of `rank`.
    pub fn new(buf: RecvBuffer<'a>, rank: i32) -> Self {
        ReduceBuffer {
            buf: buf.raw(),
            rank,
            _marker: PhantomData,
        }
    }

    /// Rebuild a reduction buffer from a view parked by another thread.
    ///
    /// # Safety
    ///
    /// `buf` must be a writable view whose borrow outlives the returned value.
    pub(crate) unsafe fn from_raw(buf: Buffer, rank: i32) -> Self {
        ReduceBuffer {
            buf,
            rank,
            _marker: PhantomData,
        }
    }

    /// Rank that contributed this buffer.
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// Element type.
    pub fn datatype(&self) -> DatatypeTag {
        self.buf.datatype()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    /// Check that `other` can be combined with this buffer: same element type
    /// and same length.
    pub fn check(&self, other: &ReduceBuffer<'_>) -> std::result::Result<(), ErrorKind> {
        check_pair(&self.buf, &other.buf)
    }

    /// Overwrite this buffer with the contents of `src`, which must have the
    /// same element type and length.
    pub fn copy_from(&mut self, src: &SendBuffer<'_>) -> std::result::Result<(), ErrorKind> {
        let src = src.raw();
        check_pair(&self.buf, &src)?;
        // SAFETY: both borrows are alive for the duration of this call, and
        // `check_pair` verified type and length.
        unsafe { self.buf.copy_from(&src) };
        Ok(())
    }

    /// Overwrite this buffer with the contents of another reduction buffer.
    pub(crate) fn copy_from_reduce(&self, src: &ReduceBuffer<'_>) -> std::result::Result<(), ErrorKind> {
        check_pair(&self.buf, &src.buf)?;
        // SAFETY: see `copy_from`; a reduction buffer is always writable.
        unsafe { self.buf.copy_from(&src.buf) };
        Ok(())
    }

    pub(crate) fn raw(&self) -> Buffer {
        self.buf
    }
}

fn check_pair(a: &Buffer, b: &Buffer) -> std::result::Result<(), ErrorKind> {
    if a.datatype() != b.datatype() {
        return Err(ErrorKind::BufferType);
    }
    if a.len() != b.len() {
        return Err(ErrorKind::BufferSize);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Item {
    Leaf(usize),
    Node(usize),
}

/// Deterministic binary combination tree over `n` participants.
///
/// A tree over `n > 1` participants has `n - 1` internal nodes, each joining
/// exactly two subtrees. Nodes are numbered bottom-up, so a node is always
/// numbered after both of its children.
///
/// ```text
///   participants   0   1   2   3   4
///   level 1         \ /     \ /    |
///                    n0      n1    |
///   level 2            \    /      |
///                        n2        |
///   level 3                \      /
///                             n3
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeShape {
    entry: Vec<Option<usize>>,
    parent: Vec<Option<usize>>,
    pairs: Vec<(usize, usize)>,
    depth: usize,
}

impl TreeShape {
    /// Build the tree for `n` participants.
    pub fn new(n: usize) -> Self {
        let mut entry = vec![None; n];
        let mut parent = Vec::new();
        let mut pairs = Vec::new();
        let mut depth = 0;

        // Each item carries its leftmost participant.
        let mut level: Vec<(Item, usize)> = (0..n).map(|p| (Item::Leaf(p), p)).collect();
        while level.len() > 1 {
            let mut next = Vec::with_capacity((level.len() + 1) / 2);
            for chunk in level.chunks(2) {
                let [(left, lrep), (right, rrep)] = *chunk else {
                    next.push(chunk[0]);
                    continue;
                };
                let node = parent.len();
                parent.push(None);
                pairs.push((lrep, rrep));
                for child in [left, right] {
                    match child {
                        Item::Leaf(p) => entry[p] = Some(node),
                        Item::Node(c) => parent[c] = Some(node),
                    }
                }
                next.push((Item::Node(node), lrep));
            }
            level = next;
            depth += 1;
        }

        TreeShape {
            entry,
            parent,
            pairs,
            depth,
        }
    }

    /// Number of participants.
    pub fn participants(&self) -> usize {
        self.entry.len()
    }

    /// Number of internal nodes.
    pub fn node_count(&self) -> usize {
        self.parent.len()
    }

    /// Number of levels above the participants.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// First node on the path of `participant` to the root, or `None` if the
    /// participant is alone.
    pub fn entry(&self, participant: usize) -> Option<usize> {
        self.entry.get(participant).copied().flatten()
    }

    /// Parent of `node`, or `None` for the root.
    pub fn parent(&self, node: usize) -> Option<usize> {
        self.parent.get(node).copied().flatten()
    }

    /// Combination steps in execution order. Each step names the leftmost
    /// participant of the two joined subtrees; the right one is combined into
    /// the left one.
    pub fn combine_order(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.pairs.iter().copied()
    }
}

/// Reduce `bufs` in place along [`TreeShape::new(bufs.len())`](TreeShape::new).
///
/// The right subtree is always combined into the left one, so the result
/// lands in `bufs[0]`. The other buffers hold partial results afterwards.
///
/// # Errors
///
/// [`ErrorKind::UnsupportedOp`] if `op` is not defined for the element type,
/// [`ErrorKind::BufferType`] or [`ErrorKind::BufferSize`] if two buffers do
/// not match. Steps before the failing one have already been applied.
///
/// # Example
///
/// ```
/// use mprt::{combine_tree, ReduceBuffer, ReduceOp, RecvBuffer};
///
/// let mut data = [[1i64], [2], [3]];
/// let bufs: Vec<ReduceBuffer<'_>> = data
///     .iter_mut()
///     .enumerate()
///     .map(|(rank, d)| ReduceBuffer::new(RecvBuffer::new(d), rank as i32))
///     .collect();
/// combine_tree(ReduceOp::Sum, &bufs).unwrap();
/// drop(bufs);
/// assert_eq!(data[0], [6]);
/// ```
pub fn combine_tree(op: ReduceOp, bufs: &[ReduceBuffer<'_>]) -> Result<()> {
    let Some(first) = bufs.first() else {
        return Ok(());
    };
    let handler = Optable::instance().get(op, first.datatype());
    let shape = TreeShape::new(bufs.len());

    for (left, right) in shape.combine_order() {
        handler(&bufs[left], &bufs[right]).map_err(|kind| {
            debug!(?op, left, right, %kind, "combine step failed");
            Error::comm("combine_tree", kind)
        })?;
    }
    Ok(())
}
