//! Intrusive FIFO thread list.
//!
//! Every thread belongs to at most one list at a time — the ready queue or
//! exactly one condition's wait list — linked through `Thread::next`. This
//! gives O(1) push/pop and, critically, an O(1) `append_to` so a
//! `broadcast` can move an entire wait list onto the ready queue without
//! walking it.

use super::task::{Thread, Tid};
use crate::config::MAX_THREADS;

pub type ThreadTable = [Option<Thread>; MAX_THREADS];

#[derive(Clone, Copy)]
pub struct ThreadList {
    head: Option<Tid>,
    tail: Option<Tid>,
}

impl ThreadList {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<Tid> {
        self.head
    }

    pub fn push_back(&mut self, table: &mut ThreadTable, tid: Tid) {
        table[tid].as_mut().expect("queued tid has no thread").next = None;
        match self.tail {
            Some(t) => table[t].as_mut().expect("queue tail missing").next = Some(tid),
            None => self.head = Some(tid),
        }
        self.tail = Some(tid);
    }

    pub fn pop_front(&mut self, table: &mut ThreadTable) -> Option<Tid> {
        let tid = self.head?;
        let next = table[tid].as_mut().expect("queue head missing").next.take();
        self.head = next;
        if self.head.is_none() {
            self.tail = None;
        }
        Some(tid)
    }

    /// Moves every entry of `self` onto the back of `other`, in order, in
    /// constant time, leaving `self` empty.
    pub fn append_to(&mut self, table: &mut ThreadTable, other: &mut ThreadList) {
        if self.is_empty() {
            return;
        }
        match other.tail {
            Some(t) => table[t].as_mut().expect("queue tail missing").next = self.head,
            None => other.head = self.head,
        }
        other.tail = self.tail;
        self.head = None;
        self.tail = None;
    }
}

impl Default for ThreadList {
    fn default() -> Self {
        Self::new()
    }
}
