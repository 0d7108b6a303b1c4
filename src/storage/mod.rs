// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

pub mod http;
pub mod memory;
pub mod sqlite;
pub mod traits;
pub mod wire;

/// Fixed keys in the durable store.
pub mod keys {
    /// Last selected unit, as a raw number
    pub const ACTIVE_UNIT: &str = "blend.activeUnit";
    /// Local fallback of the unit → record id map
    pub const UNIT_MAP: &str = "blend.unitMap";
    /// Unit → Payload cache
    pub const UNIT_PAYLOADS: &str = "blend.unitPayloads";
    /// Coal id → display color, merged on population
    pub const COAL_COLORS: &str = "blend.coalColors";
}
