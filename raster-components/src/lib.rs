// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Flow-control building blocks for rasterizer pipeline models.
//!
//! Pipeline stages talk to each other through fixed-latency
//! [signals](raster_engine::signal). Because a request for data takes a number
//! of cycles to be answered, a stage cannot know the exact occupancy of its
//! buffers at the time it asks for more work. The components here make that
//! accounting explicit:
//!
//!  - [`AdmissionFifo`](admission::AdmissionFifo): a bounded FIFO in which
//!    space is *reserved* when data is requested and *converted* to an
//!    occupied entry when the data arrives.
//!  - [`ReorderRing`](reorder_ring::ReorderRing): a fixed-capacity reorder
//!    buffer that accepts results out of order and releases them in
//!    submission order.
//!
//! Both report any violation of their capacity invariants as a
//! [SimError](raster_engine::types::SimError) prefixed with their entity name.

pub mod admission;
pub mod reorder_ring;
