// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local payload tiers.
//!
//! - [`MemoryTier`]: volatile, synchronous, lives for the process
//! - [`DurableTier`]: survives restarts; payload writes arrive only through
//!   the [`PersistScheduler`](crate::batching::persist::PersistScheduler)
//!
//! The remote tier lives behind [`RemoteStore`](crate::storage::traits::RemoteStore).

pub mod durable;
pub mod memory;

pub use durable::DurableTier;
pub use memory::MemoryTier;
