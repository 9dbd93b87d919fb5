//! A lock-free stack that frees its nodes with split reference counting.
//!
//! ```
//! use counted_stack::Stack;
//!
//! let stack = Stack::new();
//! stack.push(1);
//! stack.push(2);
//! assert_eq!(stack.pop(), Some(2));
//! assert_eq!(stack.pop(), Some(1));
//! assert_eq!(stack.pop(), None);
//! ```
//!
//! Model checking with loom:
//!
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test --lib --release
//! ```

mod counted;
mod error;
mod loom;
mod node;
mod stack;

pub use error::PushError;
pub use stack::Stack;
