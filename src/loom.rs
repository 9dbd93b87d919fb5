//! Synchronization facade, switched to loom's model-checked types under
//! `--cfg loom`.

#[cfg(not(loom))]
mod imp {
    pub(crate) use core::hint::spin_loop;
    pub(crate) use core::sync::atomic::{fence, AtomicIsize, Ordering};

    cfg_if::cfg_if! {
        if #[cfg(target_pointer_width = "64")] {
            pub(crate) use portable_atomic::AtomicU128 as AtomicWord;
            pub(crate) type Word = u128;
        } else if #[cfg(target_pointer_width = "32")] {
            pub(crate) use portable_atomic::AtomicU64 as AtomicWord;
            pub(crate) type Word = u64;
        } else {
            compile_error!("unsupported pointer width");
        }
    }

    #[derive(Debug)]
    pub(crate) struct UnsafeCell<T>(core::cell::UnsafeCell<T>);

    impl<T> UnsafeCell<T> {
        pub(crate) fn new(data: T) -> Self {
            UnsafeCell(core::cell::UnsafeCell::new(data))
        }

        #[inline(always)]
        pub(crate) fn with<R>(&self, f: impl FnOnce(*const T) -> R) -> R {
            f(self.0.get())
        }

        #[inline(always)]
        pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
            f(self.0.get())
        }
    }
}

#[cfg(loom)]
mod imp {
    pub(crate) use loom::cell::UnsafeCell;
    pub(crate) use loom::hint::spin_loop;
    pub(crate) use loom::sync::atomic::{fence, AtomicIsize, Ordering};

    use loom::sync::atomic::AtomicU64;

    cfg_if::cfg_if! {
        if #[cfg(target_pointer_width = "64")] {
            pub(crate) type Word = u128;
        } else {
            pub(crate) type Word = u64;
        }
    }

    /// Loom has no double-width atomics. Every distinct word stored in the
    /// slot gets a number, and the numbers live in a loom `AtomicU64`, so the
    /// slot's orderings are still modeled. Equal words share a number, which
    /// keeps compare-and-swap exact.
    #[derive(Debug)]
    pub(crate) struct AtomicWord {
        index: AtomicU64,
        words: std::sync::Mutex<Vec<Word>>,
    }

    impl AtomicWord {
        pub(crate) fn new(word: Word) -> Self {
            AtomicWord {
                index: AtomicU64::new(0),
                words: std::sync::Mutex::new(vec![word]),
            }
        }

        pub(crate) fn is_lock_free() -> bool {
            true
        }

        pub(crate) fn load(&self, order: Ordering) -> Word {
            self.word(self.index.load(order))
        }

        pub(crate) fn compare_exchange(
            &self,
            current: Word,
            new: Word,
            success: Ordering,
            failure: Ordering,
        ) -> Result<Word, Word> {
            let current = self.intern(current);
            let new = self.intern(new);
            self.index
                .compare_exchange(current, new, success, failure)
                .map(|index| self.word(index))
                .map_err(|index| self.word(index))
        }

        fn intern(&self, word: Word) -> u64 {
            let mut words = self.words();
            match words.iter().position(|seen| *seen == word) {
                Some(index) => index as u64,
                None => {
                    words.push(word);
                    (words.len() - 1) as u64
                }
            }
        }

        fn word(&self, index: u64) -> Word {
            self.words()[index as usize]
        }

        fn words(&self) -> std::sync::MutexGuard<'_, Vec<Word>> {
            match self.words.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }
    }
}

pub(crate) use imp::*;
