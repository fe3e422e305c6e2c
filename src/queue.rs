//! Arena-backed message queues.
//!
//! All queues of one pool share a single slot arena. Each occupied slot is
//! linked into exactly one list through `prev`/`next` slot indices, so a
//! message can be unlinked in O(1) given its [`QueueHandle`]. Handles carry
//! the slot generation; a handle whose slot has since been reused is
//! rejected instead of unlinking an unrelated message.

use std::sync::Arc;

use crate::message::Message;

/// Generation-checked reference to a queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueHandle {
    index: u32,
    generation: u32,
}

struct Entry {
    msg: Arc<Message>,
    seq: u64,
    list: usize,
    prev: Option<u32>,
    next: Option<u32>,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Default, Clone, Copy)]
struct ListEnds {
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

/// A queued message seen during a search.
pub(crate) struct Candidate {
    pub(crate) handle: QueueHandle,
    pub(crate) seq: u64,
}

pub(crate) struct MessageQueue {
    slots: Vec<Slot>,
    free: Vec<u32>,
    lists: Vec<ListEnds>,
    next_seq: u64,
}

impl MessageQueue {
    pub(crate) fn new(list_count: usize) -> Self {
        MessageQueue {
            slots: Vec::new(),
            free: Vec::new(),
            lists: vec![ListEnds::default(); list_count],
            next_seq: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self, list: usize) -> usize {
        self.lists[list].len
    }

    /// Total number of queued messages across all lists.
    #[cfg(test)]
    pub(crate) fn total(&self) -> usize {
        self.lists.iter().map(|l| l.len).sum()
    }

    /// Append `msg` to `list`, stamping it with the next arrival number.
    pub(crate) fn push_back(&mut self, list: usize, msg: Arc<Message>) -> QueueHandle {
        let seq = self.next_seq;
        self.next_seq += 1;

        let prev = self.lists[list].tail;
        let entry = Entry {
            msg,
            seq,
            list,
            prev,
            next: None,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                (self.slots.len() - 1) as u32
            }
        };

        match prev {
            Some(p) => self.entry_mut(p).next = Some(index),
            None => self.lists[list].head = Some(index),
        }
        let ends = &mut self.lists[list];
        ends.tail = Some(index);
        ends.len += 1;

        QueueHandle {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Unlink the message behind `handle`. Returns `None` for stale handles.
    pub(crate) fn remove(&mut self, handle: QueueHandle) -> Option<Arc<Message>> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);

        match entry.prev {
            Some(p) => self.entry_mut(p).next = entry.next,
            None => self.lists[entry.list].head = entry.next,
        }
        match entry.next {
            Some(n) => self.entry_mut(n).prev = entry.prev,
            None => self.lists[entry.list].tail = entry.prev,
        }
        self.lists[entry.list].len -= 1;

        Some(entry.msg)
    }

    /// Oldest message in `list` accepted by `pred`.
    pub(crate) fn find<F>(&self, list: usize, mut pred: F) -> Option<Candidate>
    where
        F: FnMut(&Message) -> bool,
    {
        let mut cursor = self.lists[list].head;
        while let Some(index) = cursor {
            let slot = &self.slots[index as usize];
            let entry = slot.entry.as_ref()?;
            if pred(&*entry.msg) {
                return Some(Candidate {
                    handle: QueueHandle {
                        index,
                        generation: slot.generation,
                    },
                    seq: entry.seq,
                });
            }
            cursor = entry.next;
        }
        None
    }

    /// Messages of `list` in arrival order.
    #[cfg(test)]
    pub(crate) fn iter(&self, list: usize) -> impl Iterator<Item = &Arc<Message>> + '_ {
        let mut cursor = self.lists[list].head;
        std::iter::from_fn(move || {
            let index = cursor?;
            let entry = self.slots[index as usize].entry.as_ref()?;
            cursor = entry.next;
            Some(&entry.msg)
        })
    }

    fn entry_mut(&mut self, index: u32) -> &mut Entry {
        self.slots[index as usize]
            .entry
            .as_mut()
            .unwrap_or_else(|| unreachable!("linked slot {index} is vacant"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SendBuffer;

    fn msg(tag: i32) -> Arc<Message> {
        static DATA: [u8; 1] = [0];
        Message::new(SendBuffer::new(&DATA).raw(), 0, tag)
    }

    fn tags(q: &MessageQueue, list: usize) -> Vec<i32> {
        q.iter(list).map(|m| m.tag()).collect()
    }

    #[test]
    fn lists_are_fifo_and_independent() {
        let mut q = MessageQueue::new(2);
        q.push_back(0, msg(1));
        q.push_back(1, msg(10));
        q.push_back(0, msg(2));
        q.push_back(0, msg(3));

        assert_eq!(tags(&q, 0), vec![1, 2, 3]);
        assert_eq!(tags(&q, 1), vec![10]);
        assert_eq!(q.total(), 4);
    }

    #[test]
    fn remove_unlinks_from_middle_head_and_tail() {
        let mut q = MessageQueue::new(1);
        let a = q.push_back(0, msg(1));
        let b = q.push_back(0, msg(2));
        let c = q.push_back(0, msg(3));

        assert_eq!(q.remove(b).map(|m| m.tag()), Some(2));
        assert_eq!(tags(&q, 0), vec![1, 3]);
        assert_eq!(q.remove(a).map(|m| m.tag()), Some(1));
        assert_eq!(q.remove(c).map(|m| m.tag()), Some(3));
        assert_eq!(q.len(0), 0);
        assert!(q.iter(0).next().is_none());
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut q = MessageQueue::new(1);
        let first = q.push_back(0, msg(1));
        assert!(q.remove(first).is_some());
        assert!(q.remove(first).is_none());

        // The slot is reused with a new generation.
        let second = q.push_back(0, msg(2));
        assert_eq!(second.index, first.index);
        assert!(q.remove(first).is_none());
        assert_eq!(q.len(0), 1);
        assert!(q.remove(second).is_some());
    }

    #[test]
    fn find_returns_oldest_match_with_sequence() {
        let mut q = MessageQueue::new(2);
        q.push_back(1, msg(9));
        q.push_back(0, msg(4));
        q.push_back(0, msg(5));
        q.push_back(0, msg(4));

        let hit = q.find(0, |m| m.tag() == 4).unwrap();
        assert_eq!(hit.seq, 1);
        let hit = q.find(0, |m| m.tag() == 5).unwrap();
        assert_eq!(hit.seq, 2);
        assert!(q.find(0, |m| m.tag() == 9).is_none());
    }
}
