use core::fmt;
use core::ptr::NonNull;
use std::alloc::handle_alloc_error;

use crossbeam_utils::CachePadded;

use crate::counted::{AtomicCounted, Counted};
use crate::error::PushError;
use crate::loom::{fence, spin_loop, Ordering};
use crate::node::Node;

/// A lock-free LIFO stack that reclaims its nodes with split reference
/// counting.
pub struct Stack<T> {
    head: CachePadded<AtomicCounted<T>>,
    #[cfg(test)]
    ledger: std::sync::Arc<ledger::NodeLedger>,
}

unsafe impl<T: Send> Sync for Stack<T> {}
unsafe impl<T: Send> Send for Stack<T> {}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self {
            head: CachePadded::new(AtomicCounted::new(Counted::null())),
            #[cfg(test)]
            ledger: Default::default(),
        }
    }
}

impl<T> Stack<T> {
    pub fn new() -> Stack<T> {
        Self::default()
    }

    /// Pushes `value` on top of the stack.
    ///
    /// Running out of memory for the node is handled like any other failed
    /// allocation, see [`handle_alloc_error`]. Use [`Stack::try_push`] to get
    /// the value back instead.
    pub fn push(&self, value: T) {
        if let Err(err) = self.try_push(value) {
            handle_alloc_error(err.layout());
        }
    }

    /// Pushes `value` on top of the stack, or returns it inside the error if
    /// its node cannot be allocated.
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        let node = Node::allocate(value)?;
        #[cfg(test)]
        self.ledger.record_allocation();

        let new_head = Counted::published(node);
        let mut next = self.head.load(Ordering::Relaxed);

        loop {
            // SAFETY: the node is not published yet, nobody else can see it.
            unsafe { Node::set_next(node, next) };

            match self
                .head
                .compare_exchange(next, new_head, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return Ok(()),
                Err(current) => {
                    next = current;
                    spin_loop();
                }
            }
        }
    }

    /// Removes the top element, or returns `None` if the stack is empty.
    pub fn pop(&self) -> Option<T> {
        let mut old_head = self.head.load(Ordering::Relaxed);

        loop {
            old_head = self.claim_head(old_head);
            let node = old_head.node()?;

            // SAFETY: our claim keeps the node allocated.
            let next = unsafe { Node::next(node) };

            match self
                .head
                .compare_exchange(old_head, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => {
                    // SAFETY: only the thread that unlinks the node gets here.
                    let value = unsafe { Node::take_value(node) };

                    // One for our own claim, one for the head slot that no
                    // longer refers to the node.
                    let delta = old_head.external_count - 2;
                    let prior = unsafe { node.as_ref() }
                        .internal_count
                        .fetch_add(delta, Ordering::AcqRel);
                    if prior == -delta {
                        // SAFETY: every other claim has been given back.
                        unsafe { self.reclaim(node) };
                    }

                    return Some(value);
                }
                Err(current) => {
                    self.release_claim(node);
                    old_head = current;
                    spin_loop();
                }
            }
        }
    }

    /// Registers one more claim on whatever the head currently refers to, and
    /// returns the head as it was left by the increment.
    fn claim_head(&self, mut old_head: Counted<T>) -> Counted<T> {
        loop {
            let claimed = old_head.claimed();

            match self
                .head
                .compare_exchange(old_head, claimed, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => {
                    debug_assert!(claimed.external_count > 0, "claimed {:?}", claimed);
                    return claimed;
                }
                Err(current) => {
                    old_head = current;
                    spin_loop();
                }
            }
        }
    }

    /// Gives back a claim on a node that some other thread unlinked or is
    /// about to unlink.
    fn release_claim(&self, node: NonNull<Node<T>>) {
        // SAFETY: the claim being released still keeps the node allocated.
        let prior = unsafe { node.as_ref() }
            .internal_count
            .fetch_sub(1, Ordering::Release);

        if prior == 1 {
            fence(Ordering::Acquire);

            // SAFETY: the node was unlinked and ours was the last claim.
            unsafe { self.reclaim(node) };
        }
    }

    /// # Safety
    ///
    /// The node must be unlinked, its value taken, and no claims on it left.
    unsafe fn reclaim(&self, node: NonNull<Node<T>>) {
        log::trace!("reclaiming node {:p}", node);
        #[cfg(test)]
        self.ledger.record_free();

        Node::free(node);
    }
}

impl<T> Drop for Stack<T> {
    fn drop(&mut self) {
        let mut drained = 0usize;
        while self.pop().is_some() {
            drained += 1;
        }

        if drained > 0 {
            log::debug!("dropped stack with {} elements left", drained);
        }
    }
}

impl<T> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack").field("head", &*self.head).finish()
    }
}
