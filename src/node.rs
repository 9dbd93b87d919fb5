use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};
use std::alloc::{self, Layout};

use crate::counted::Counted;
use crate::error::PushError;
use crate::loom::{AtomicIsize, UnsafeCell};

/// A stack entry.
///
/// `internal_count` collects the corrections for claims that were taken
/// through an external count and later given up. The node is freed by the
/// thread whose adjustment brings it to exactly zero.
pub(crate) struct Node<T> {
    value: UnsafeCell<ManuallyDrop<T>>,
    pub(crate) internal_count: AtomicIsize,
    next: UnsafeCell<Counted<T>>,
}

impl<T> Node<T> {
    pub(crate) fn allocate(value: T) -> Result<NonNull<Self>, PushError<T>> {
        let layout = Layout::new::<Self>();

        // SAFETY: `Node` holds an `AtomicIsize`, so the layout is never zero-sized.
        let raw = unsafe { alloc::alloc(layout) }.cast::<Self>();
        let node = match NonNull::new(raw) {
            Some(node) => node,
            None => return Err(PushError::new(value, layout)),
        };

        // SAFETY: freshly allocated with the layout of `Self`.
        unsafe {
            node.as_ptr().write(Node {
                value: UnsafeCell::new(ManuallyDrop::new(value)),
                internal_count: AtomicIsize::new(0),
                next: UnsafeCell::new(Counted::null()),
            });
        }

        Ok(node)
    }

    /// # Safety
    ///
    /// `node` must not be published yet.
    pub(crate) unsafe fn set_next(node: NonNull<Self>, next: Counted<T>) {
        node.as_ref().next.with_mut(|slot| *slot = next);
    }

    /// # Safety
    ///
    /// `node` must be live. `next` never changes once the node is published.
    pub(crate) unsafe fn next(node: NonNull<Self>) -> Counted<T> {
        node.as_ref().next.with(|next| *next)
    }

    /// Moves the value out of the node.
    ///
    /// # Safety
    ///
    /// `node` must be live, and the caller must be the only thread that ever
    /// takes its value.
    pub(crate) unsafe fn take_value(node: NonNull<Self>) -> T {
        node.as_ref()
            .value
            .with(|value| ManuallyDrop::into_inner(ptr::read(value)))
    }

    /// Releases the node's memory without dropping its value.
    ///
    /// # Safety
    ///
    /// `node` must come from [`Node::allocate`], its value must already have
    /// been taken, and no other thread may access it afterwards.
    pub(crate) unsafe fn free(node: NonNull<Self>) {
        // Freeing counts as a write to every field, so earlier reads by other
        // threads must happen before it.
        node.as_ref().value.with_mut(|_| ());
        node.as_ref().next.with_mut(|_| ());

        drop(Box::from_raw(node.as_ptr()));
    }
}
