use core::fmt;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use std::sync::Once;

use crate::loom::{AtomicWord, Ordering, Word};
use crate::node::Node;

/// A node pointer paired with the number of claims taken on it through the
/// slot that holds it.
pub(crate) struct Counted<T> {
    pub(crate) external_count: isize,
    pub(crate) node: *mut Node<T>,
}

impl<T> Clone for Counted<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Counted<T> {}

impl<T> fmt::Debug for Counted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counted")
            .field("external_count", &self.external_count)
            .field("node", &self.node)
            .finish()
    }
}

impl<T> Counted<T> {
    pub(crate) const fn null() -> Self {
        Self {
            external_count: 0,
            node: ptr::null_mut(),
        }
    }

    /// The reference a freshly pushed node is published with: the head slot
    /// itself accounts for one count.
    pub(crate) fn published(node: NonNull<Node<T>>) -> Self {
        Self {
            external_count: 1,
            node: node.as_ptr(),
        }
    }

    pub(crate) fn node(&self) -> Option<NonNull<Node<T>>> {
        NonNull::new(self.node)
    }

    /// The same reference with one more claim registered against it.
    pub(crate) fn claimed(self) -> Self {
        debug_assert!(
            self.external_count < isize::MAX,
            "external count overflow on {:p}",
            self.node
        );
        Self {
            external_count: self.external_count + 1,
            node: self.node,
        }
    }

    // Pointer in the low half, count in the high half.
    fn pack(self) -> Word {
        (self.node.expose_provenance() as Word)
            | ((self.external_count as usize as Word) << usize::BITS)
    }

    fn unpack(word: Word) -> Self {
        Self {
            external_count: (word >> usize::BITS) as usize as isize,
            node: ptr::with_exposed_provenance_mut(word as usize),
        }
    }
}

/// A [`Counted`] reference stored as a single double-width atomic word.
pub(crate) struct AtomicCounted<T> {
    word: AtomicWord,
    _marker: PhantomData<*mut Node<T>>,
}

impl<T> AtomicCounted<T> {
    pub(crate) fn new(counted: Counted<T>) -> Self {
        warn_if_not_lock_free();

        Self {
            word: AtomicWord::new(counted.pack()),
            _marker: PhantomData,
        }
    }

    pub(crate) fn load(&self, order: Ordering) -> Counted<T> {
        Counted::unpack(self.word.load(order))
    }

    /// On failure, returns the reference currently held by the slot.
    pub(crate) fn compare_exchange(
        &self,
        current: Counted<T>,
        new: Counted<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Counted<T>, Counted<T>> {
        self.word
            .compare_exchange(current.pack(), new.pack(), success, failure)
            .map(Counted::unpack)
            .map_err(Counted::unpack)
    }
}

impl<T> fmt::Debug for AtomicCounted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(Ordering::Relaxed), f)
    }
}

fn warn_if_not_lock_free() {
    static CHECK: Once = Once::new();

    CHECK.call_once(|| {
        if !AtomicWord::is_lock_free() {
            log::warn!(
                "no native {}-bit compare-and-swap on this CPU, counted references fall back to a lock",
                2 * usize::BITS
            );
        }
    });
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn claim_keeps_pointer_and_bumps_count() {
        let node = NonNull::<Node<u8>>::dangling();
        let counted = Counted::published(node).claimed().claimed();

        assert_eq!(counted.external_count, 3);
        assert_eq!(counted.node(), Some(node));
    }

    #[test]
    fn slot_round_trips_full_width_count() {
        let slot = AtomicCounted::<u8>::new(Counted::null());
        let high = Counted {
            external_count: isize::MAX - 1,
            node: NonNull::dangling().as_ptr(),
        };

        assert!(slot
            .compare_exchange(Counted::null(), high, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok());

        let seen = slot.load(Ordering::Relaxed);
        assert_eq!(seen.external_count, isize::MAX - 1);
        assert_eq!(seen.node, high.node);
    }

    #[test]
    fn failed_exchange_reports_current_reference() {
        let slot = AtomicCounted::<u8>::new(Counted::null());
        let stale = Counted::null().claimed();

        let current = slot
            .compare_exchange(stale, Counted::null(), Ordering::Relaxed, Ordering::Relaxed)
            .unwrap_err();

        assert_eq!(current.external_count, 0);
        assert!(current.node().is_none());
    }

    #[cfg(not(miri))]
    #[test]
    fn word_is_lock_free() {
        assert!(AtomicWord::is_lock_free());
    }
}
