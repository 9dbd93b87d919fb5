use core::fmt;
use std::alloc::Layout;

use thiserror::Error;

/// Returned by [`Stack::try_push`](crate::Stack::try_push) when no memory
/// could be allocated for the new node. The stack is left unchanged and the
/// value is handed back.
#[derive(Error)]
#[error("failed to allocate a {} byte stack node", .layout.size())]
pub struct PushError<T> {
    value: T,
    layout: Layout,
}

impl<T> PushError<T> {
    pub(crate) fn new(value: T, layout: Layout) -> Self {
        Self { value, layout }
    }

    /// Recovers the value that could not be pushed.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Layout of the allocation that failed.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushError")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
