//! # Fragment Queue
//!
//! Per-response storage for fragments in the order they arrived.

use crate::fragment::Fragment;

/// Arrival-ordered fragments of one response plus the outstanding count.
///
/// The count is bookkeeping for the caller deciding when a response is
/// complete; it is never interpreted here and may go negative.
#[derive(Debug, Default)]
pub struct FragmentQueue {
    fragments: Vec<Fragment>,
    outstanding: i64,
}

impl FragmentQueue {
    pub fn new(outstanding: i64) -> Self {
        Self {
            fragments: Vec::new(),
            outstanding,
        }
    }

    /// Append a fragment on behalf of a single producer.
    pub fn enqueue(&mut self, fragment: Fragment) {
        self.enqueue_counted(fragment, 1);
    }

    /// Append a fragment on behalf of `count` producers at once.
    pub fn enqueue_counted(&mut self, fragment: Fragment, count: u32) {
        self.outstanding -= i64::from(count);
        self.fragments.push(fragment);
    }

    /// Append without touching the outstanding count.
    pub fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Take every queued fragment, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<Fragment> {
        std::mem::take(&mut self.fragments)
    }

    pub(crate) fn replace(&mut self, fragments: Vec<Fragment>) {
        self.fragments = fragments;
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fragment> {
        self.fragments.iter()
    }

    pub fn as_slice(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn outstanding(&self) -> i64 {
        self.outstanding
    }

    pub fn set_outstanding(&mut self, outstanding: i64) {
        self.outstanding = outstanding;
    }
}

impl<'a> IntoIterator for &'a FragmentQueue {
    type Item = &'a Fragment;
    type IntoIter = std::slice::Iter<'a, Fragment>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
