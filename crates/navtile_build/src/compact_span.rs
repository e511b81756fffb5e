//! Packed spans of the compact heightfield.

use crate::region::RegionId;

const LINK_BITS: u32 = 6;
const LINK_MASK: u32 = (1 << LINK_BITS) - 1;
const CLEARANCE_SHIFT: u32 = 24;

/// The walkable top of a solid span in a [`CompactHeightfield`](crate::CompactHeightfield).
///
/// The four neighbor links take 6 bits each in the low 24 bits of a `u32`,
/// the clearance above the floor takes the high 8 bits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompactSpan {
    /// The floor, in cell heights above the field's base.
    pub y: u16,
    /// The region of the span, [`RegionId::NONE`] until regions are built.
    pub region: RegionId,
    pub(crate) packed: u32,
}

impl CompactSpan {
    /// Marks a direction without a link. Also bounds the layers a link can address.
    pub(crate) const NOT_CONNECTED: u8 = LINK_MASK as u8;

    /// Links the span to layer `neighbor` of the adjacent column in `direction`,
    /// or removes the link when `neighbor` is `None`.
    #[inline]
    pub fn set_con(&mut self, direction: u8, neighbor: impl Into<Option<u8>>) {
        let shift = direction as u32 * LINK_BITS;
        let layer = neighbor
            .into()
            .map_or(LINK_MASK, |layer| layer as u32 & LINK_MASK);
        self.packed = (self.packed & !(LINK_MASK << shift)) | (layer << shift);
    }

    /// The layer of the adjacent column in `direction` the span is linked to.
    #[inline]
    pub fn con(&self, direction: u8) -> Option<u8> {
        let layer = (self.packed >> (direction as u32 * LINK_BITS)) & LINK_MASK;
        (layer != LINK_MASK).then_some(layer as u8)
    }

    /// Free cells above [`CompactSpan::y`], saturated at 255.
    #[inline]
    pub fn height(&self) -> u8 {
        (self.packed >> CLEARANCE_SHIFT) as u8
    }

    /// See [`CompactSpan::height`].
    #[inline]
    pub fn set_height(&mut self, height: u8) {
        self.packed =
            (self.packed & !(0xff << CLEARANCE_SHIFT)) | ((height as u32) << CLEARANCE_SHIFT);
    }

    /// The first blocked cell above the floor.
    #[inline]
    pub(crate) fn top(&self) -> u32 {
        u32::from(self.y) + u32::from(self.height())
    }
}
