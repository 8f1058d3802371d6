//! # SUB OS Kernel Storage
//!
//! The storage half of the SUB OS kernel:
//!
//! 1. **Block layer** (`block`): the block store contract plus the RAM disk
//!    and ATA PIO drivers behind it
//! 2. **File system** (`fs`): SFS, the flat on-disk file system
//!
//! ## Targets
//!
//! The crate is `no_std` and only needs `alloc` for the RAM disk. Unit tests
//! build against `std` on the host; the `sfs` tool links it the same way.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod block;
pub mod fs;
