bitflags::bitflags! {
    /// The id of a region in a [`CompactHeightfield`](crate::CompactHeightfield).
    /// Ids on the tile border carry the [`RegionId::BORDER_REGION`] flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct RegionId: u16 {
        /// The default region, which is used for spans that are not in a region, i.e. not walkable.
        const NONE = 0;

        /// Heightfield border flag.
        /// If a heightfield region ID has this bit set, then the region is a border
        /// region and its spans are considered un-walkable.
        /// (Used during the region and contour build process.)
        const BORDER_REGION = 0x8000;
    }
}

impl RegionId {
    /// The highest region id that can be assigned without colliding with [`RegionId::BORDER_REGION`].
    pub const MAX: Self = Self::from_bits_retain(0x7fff);

    /// The region id without the border flag.
    #[inline]
    pub fn id(self) -> u16 {
        self.bits() & Self::MAX.bits()
    }

    /// Returns `true` if this region is not [`RegionId::NONE`] and not a border region.
    #[inline]
    pub fn is_walkable_region(self) -> bool {
        self != Self::NONE && !self.contains(Self::BORDER_REGION)
    }
}

impl From<u16> for RegionId {
    #[inline]
    fn from(value: u16) -> Self {
        RegionId::from_bits_retain(value)
    }
}

impl From<RegionId> for u16 {
    #[inline]
    fn from(value: RegionId) -> Self {
        value.bits()
    }
}

/// Errors that can occur when building regions with [`CompactHeightfield::build_regions`](crate::CompactHeightfield::build_regions).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    /// More regions were created than fit into a [`RegionId`].
    #[error("Region id overflow, at most {max} regions can be created", max = RegionId::MAX.bits())]
    RegionIdOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_flag_is_not_part_of_the_id() {
        let region = RegionId::from(5) | RegionId::BORDER_REGION;
        assert_eq!(region.id(), 5);
        assert!(!region.is_walkable_region());
        assert!(RegionId::from(5).is_walkable_region());
        assert!(!RegionId::NONE.is_walkable_region());
    }
}
