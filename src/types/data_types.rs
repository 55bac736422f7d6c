/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store numbers and labels, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Add,
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Number that uniquely identifies a node in a computation.
///
/// Node IDs of a computation with `N` nodes are exactly the integers in `[0, N)`. The set of nodes
/// is fixed for the lifetime of the computation.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct NodeID(u64);

impl NodeID {
    /// Create a new `NodeID` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `NodeID`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for NodeID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for NodeID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "NodeID({})", self.0)
    }
}

/// Number of nodes taking part in a computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct NodeCount(u64);

impl NodeCount {
    /// Create a new `NodeCount` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `NodeCount`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Iterate through every `NodeID` in `[0, self)` in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeID> {
        (0..self.0).map(NodeID::new)
    }

    /// Check whether `node` is a valid ID for a computation of this size.
    pub const fn contains(&self, node: NodeID) -> bool {
        node.0 < self.0
    }
}

/// Iteration counter shared by every node of a computation.
///
/// Epochs start at [`Epoch::new(0)`](Epoch::new) unless the node is configured otherwise, and only ever
/// increase. Every message that travels between nodes is tagged with the epoch it belongs to, and a
/// receiver discards messages whose epoch has already passed.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Epoch(u64);

impl Epoch {
    /// Create a new `Epoch` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `Epoch`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Get the epoch that directly follows this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Check whether this epoch is even. The reference application alternates its work between even
    /// and odd epochs.
    pub const fn is_even(&self) -> bool {
        self.0 % 2 == 0
    }
}

impl Display for Epoch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for Epoch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({})", self.0)
    }
}

impl Add<u64> for Epoch {
    type Output = Epoch;
    fn add(self, rhs: u64) -> Self::Output {
        Epoch::new(self.0 + rhs)
    }
}

/// Label partitioning the neighbor relation of a [`Topology`](crate::topology::Topology).
///
/// A link kind is always named from the point of view of the node that uses it: a node sends data
/// requests and meta flags to its `Parents` or to its `Children`. The receiving node sees the same
/// link from the other end, see [`LinkKind::inverse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub enum LinkKind {
    Parents,
    Children,
}

impl LinkKind {
    /// Get the link kind that the other end of a link of this kind sees.
    ///
    /// If A reaches B over `Parents`, B is A's parent, so B sees A over `Children`.
    pub const fn inverse(&self) -> LinkKind {
        match self {
            LinkKind::Parents => LinkKind::Children,
            LinkKind::Children => LinkKind::Parents,
        }
    }

    /// Get the name of this link kind, for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            LinkKind::Parents => "Parents",
            LinkKind::Children => "Children",
        }
    }
}

impl Display for LinkKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Number that identifies a data request issued by a node within a single run of the node.
///
/// Request IDs are never reused, so a response carrying a request ID that the coordinator no longer
/// tracks is a duplicate or belongs to an epoch that has passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct RequestID(u64);

impl RequestID {
    /// Create a new `RequestID` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `RequestID`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Maximum number of messages that may be held in a buffer at any given moment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct BufferCapacity(usize);

impl BufferCapacity {
    /// Create a new `BufferCapacity` with an `int` value.
    pub const fn new(int: usize) -> Self {
        Self(int)
    }

    /// Get the `usize` value of this `BufferCapacity`.
    pub const fn int(&self) -> usize {
        self.0
    }
}
