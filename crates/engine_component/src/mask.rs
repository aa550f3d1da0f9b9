//! Component presence bitmask.
//!
//! One [`ComponentMask`] exists per live entity: bit `i` is set exactly when
//! the store holds an instance of the component with id `i`. Queries compile
//! their filters into masks of the same shape.
//!
//! The mask is a block bitset of `u64` words. Its width is chosen when the
//! world is finalized from the number of registered component types, and
//! grows on demand if a wider id is ever set.

use crate::component::ComponentId;

const BLOCK_BITS: usize = u64::BITS as usize;

/// A growable bitset over component type ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ComponentMask {
    blocks: Vec<u64>,
}

impl ComponentMask {
    /// Create an empty mask.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty mask with room for `bits` component ids.
    #[must_use]
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            blocks: vec![0; bits.div_ceil(BLOCK_BITS)],
        }
    }

    /// Builder-style helper setting every id in `ids`.
    #[must_use]
    pub fn with(mut self, ids: impl IntoIterator<Item = ComponentId>) -> Self {
        for id in ids {
            self.set(id, true);
        }
        self
    }

    /// Sets or clears the bit for `id`.
    pub fn set(&mut self, id: ComponentId, enabled: bool) {
        let (block, bit) = Self::locate(id);
        if block >= self.blocks.len() {
            if !enabled {
                return;
            }
            self.blocks.resize(block + 1, 0);
        }

        if enabled {
            self.blocks[block] |= bit;
        } else {
            self.blocks[block] &= !bit;
        }
    }

    /// Returns `true` if the bit for `id` is set.
    #[must_use]
    pub fn includes(&self, id: ComponentId) -> bool {
        let (block, bit) = Self::locate(id);
        self.block(block) & bit != 0
    }

    /// Returns `true` if every bit of `other` is also set in `self`.
    #[must_use]
    pub fn includes_all(&self, other: &ComponentMask) -> bool {
        other
            .blocks
            .iter()
            .enumerate()
            .all(|(i, &bits)| bits & !self.block(i) == 0)
    }

    /// Returns `true` if `self` and `other` share at least one bit.
    #[must_use]
    pub fn includes_some(&self, other: &ComponentMask) -> bool {
        !self.excludes_all(other)
    }

    /// Returns `true` if `self` and `other` share no bit.
    #[must_use]
    pub fn excludes_all(&self, other: &ComponentMask) -> bool {
        self.blocks
            .iter()
            .zip(other.blocks.iter())
            .all(|(a, b)| a & b == 0)
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|&b| b == 0)
    }

    /// Returns the number of set bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Iterates over the ids whose bit is set, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.blocks.iter().enumerate().flat_map(|(i, &block)| {
            (0..BLOCK_BITS)
                .filter(move |bit| block & (1 << bit) != 0)
                .map(move |bit| ComponentId((i * BLOCK_BITS + bit) as u32))
        })
    }

    fn block(&self, index: usize) -> u64 {
        self.blocks.get(index).copied().unwrap_or(0)
    }

    fn locate(id: ComponentId) -> (usize, u64) {
        let index = id.index();
        (index / BLOCK_BITS, 1u64 << (index % BLOCK_BITS))
    }
}

impl FromIterator<ComponentId> for ComponentMask {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        Self::new().with(iter)
    }
}
