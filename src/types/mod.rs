/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that are used across multiple components of taskgraph_rs.
//!
//! Types specific to a single component, for example the wire messages of the data pipeline, live in
//! the modules of those components, e.g., [`crate::networking::messages`].

pub mod data_types;
