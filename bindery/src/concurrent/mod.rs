// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concurrency primitives backing the inspection cache and the parallel
//! inspection fan-out.

mod map;
mod work;

pub use map::ConcurrentMap;
pub use work::WorkItem;
