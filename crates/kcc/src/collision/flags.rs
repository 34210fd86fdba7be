//! Content flags for collision filtering.
//!
//! Every body in a [`CollisionWorld`](super::CollisionWorld) carries a set of
//! content flags. Casters only collide with bodies whose contents intersect
//! their mask, so triggers and other agents' sensors can live in the same
//! world without blocking movement.

use serde::{Deserialize, Serialize};

/// What kind of volume a body is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContentFlags(pub u32);

impl ContentFlags {
    /// Nothing.
    pub const EMPTY: Self = Self(0);

    /// Static or moving world geometry: floors, walls, platforms.
    pub const SOLID: Self = Self(1 << 0);

    /// Invisible wall that blocks agents only.
    pub const AGENT_CLIP: Self = Self(1 << 1);

    /// Another agent's body.
    pub const AGENT_BODY: Self = Self(1 << 2);

    /// Trigger volume; reported by overlap queries with a trigger mask, never blocks.
    pub const TRIGGER: Self = Self(1 << 3);

    /// Standard mask for agent movement queries.
    pub const MASK_AGENT_SOLID: Self =
        Self(Self::SOLID.0 | Self::AGENT_CLIP.0 | Self::AGENT_BODY.0);

    /// Check if these flags contain every flag in `other`.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if any of the given flags are set.
    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }
}

impl std::ops::BitOr for ContentFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
