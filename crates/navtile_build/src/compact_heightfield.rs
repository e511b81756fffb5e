//! The walkable surface of a [`Heightfield`] with links between neighboring spans.
//!
//! Every later stage works on this layout: one [`CompactCell`] per column that
//! points at a contiguous run of [`CompactSpan`]s, with per-span distance and area
//! data in parallel vectors.

use crate::{
    Aabb3d,
    compact_cell::CompactCell,
    compact_span::CompactSpan,
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    region::RegionId,
    span::AreaType,
};

/// The walkable spans of a [`Heightfield`], stored column by column, linked to their neighbors.
#[derive(Debug, Clone)]
pub struct CompactHeightfield {
    /// Number of columns along x.
    pub width: u16,
    /// Number of columns along z.
    pub height: u16,
    /// Minimum clearance for two spans to be linked, in cell heights.
    pub walkable_height: u16,
    /// Maximum floor difference for two spans to be linked, in cell heights.
    pub walkable_climb: u16,
    /// Width of the padding around a tile, in cells. Zero for untiled builds.
    pub border_size: u16,
    /// The largest value in [`Self::dist`].
    pub max_distance: u16,
    /// The largest region id handed out.
    pub max_region: RegionId,
    /// World space bounds. The top is raised by the walkable height.
    pub aabb: Aabb3d,
    /// Column width and depth in world units.
    pub cell_size: f32,
    /// Span height unit in world units.
    pub cell_height: f32,
    /// One cell per column, row by row along x.
    pub cells: Vec<CompactCell>,
    /// The spans of all cells.
    pub spans: Vec<CompactSpan>,
    /// Distance of each span to the nearest border, once the distance field is built.
    pub dist: Vec<u16>,
    /// Area type of each span.
    pub areas: Vec<AreaType>,
}

impl Heightfield {
    /// Turns the walkable spans into a [`CompactHeightfield`]. See [`CompactHeightfield::from_heightfield`].
    ///
    /// # Errors
    ///
    /// See [`CompactHeightfield::from_heightfield`].
    pub fn into_compact(
        self,
        walkable_height: u16,
        walkable_climb: u16,
    ) -> Result<CompactHeightfield, CompactHeightfieldError> {
        CompactHeightfield::from_heightfield(self, walkable_height, walkable_climb)
    }
}

impl CompactHeightfield {
    /// The highest layer a neighbor link can address.
    const MAX_LAYERS: u8 = CompactSpan::NOT_CONNECTED - 1;

    /// Keeps the top of every walkable span and links spans of adjacent columns an agent
    /// can step between: the shared clearance is at least `walkable_height` and the floors
    /// differ by at most `walkable_climb`.
    ///
    /// # Errors
    ///
    /// If a column is so crowded that a linked neighbor sits above [`Self::MAX_LAYERS`].
    pub fn from_heightfield(
        heightfield: Heightfield,
        walkable_height: u16,
        walkable_climb: u16,
    ) -> Result<Self, CompactHeightfieldError> {
        let span_count = heightfield
            .allocated_spans
            .values()
            .filter(|span| span.area().is_walkable())
            .count();
        let mut aabb = heightfield.aabb;
        aabb.max.y += walkable_height as f32 * heightfield.cell_height;

        let mut chf = Self {
            width: heightfield.width,
            height: heightfield.height,
            walkable_height,
            walkable_climb,
            border_size: 0,
            max_distance: 0,
            max_region: RegionId::NONE,
            aabb,
            cell_size: heightfield.cell_size,
            cell_height: heightfield.cell_height,
            cells: vec![CompactCell::default(); heightfield.spans.len()],
            spans: Vec::with_capacity(span_count),
            dist: vec![0; span_count],
            areas: Vec::with_capacity(span_count),
        };
        chf.fill_columns(&heightfield);
        chf.link_neighbors()?;
        Ok(chf)
    }

    fn fill_columns(&mut self, heightfield: &Heightfield) {
        for z in 0..self.height {
            for x in 0..self.width {
                let column = self.column_index(x, z);
                self.cells[column].set_index(self.spans.len() as u32);
                for key in heightfield.column_span_keys(x, z) {
                    let span = heightfield.span(key);
                    if !span.area().is_walkable() {
                        continue;
                    }
                    // The free space reaches up to the next solid span.
                    let ceiling = span
                        .next()
                        .map_or(Heightfield::MAX_SPAN_HEIGHT, |next| heightfield.span(next).min());
                    let mut compact = CompactSpan {
                        y: span.max(),
                        ..Default::default()
                    };
                    let clearance = ceiling.saturating_sub(span.max()).min(u8::MAX.into());
                    compact.set_height(clearance as u8);
                    self.spans.push(compact);
                    self.areas.push(span.area());
                    self.cells[column].inc_count();
                }
            }
        }
    }

    fn link_neighbors(&mut self) -> Result<(), CompactHeightfieldError> {
        let mut highest_layer = 0_u32;
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    for dir in 0..4_u8 {
                        self.spans[i].set_con(dir, None);
                        let neighbor_x = x as i32 + dir_offset_x(dir) as i32;
                        let neighbor_z = z as i32 + dir_offset_z(dir) as i32;
                        if !self.contains(neighbor_x, neighbor_z) {
                            continue;
                        }
                        let neighbor_cell = *self.cell_at(neighbor_x as u16, neighbor_z as u16);
                        let Some(k) = neighbor_cell
                            .index_range()
                            .find(|&k| self.can_step(&self.spans[i], &self.spans[k]))
                        else {
                            continue;
                        };
                        let layer = (k - neighbor_cell.index() as usize) as u32;
                        if layer > Self::MAX_LAYERS as u32 {
                            highest_layer = highest_layer.max(layer);
                            continue;
                        }
                        self.spans[i].set_con(dir, Some(layer as u8));
                    }
                }
            }
        }
        if highest_layer > Self::MAX_LAYERS as u32 {
            return Err(CompactHeightfieldError::TooManyLayers {
                max_layer_index: Self::MAX_LAYERS,
                layer_index: highest_layer,
            });
        }
        Ok(())
    }

    /// Whether an agent fits through the gap between two spans and can climb the step.
    fn can_step(&self, from: &CompactSpan, to: &CompactSpan) -> bool {
        let floor = from.y.max(to.y) as i32;
        let ceiling = from.top().min(to.top()) as i32;
        ceiling - floor >= self.walkable_height as i32
            && (to.y as i32 - from.y as i32).abs() <= self.walkable_climb as i32
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width as i32 && z >= 0 && z < self.height as i32
    }

    /// # Panics
    ///
    /// If `(x, z)` lies outside of the field.
    #[inline]
    pub fn cell_at(&self, x: u16, z: u16) -> &CompactCell {
        &self.cells[self.column_index(x, z)]
    }

    /// Resolves the link `con` of a span in column `(x, z)` towards `dir`
    /// into the neighbor column and the neighbor's span index.
    #[inline]
    pub(crate) fn con_indices(&self, x: i32, z: i32, dir: u8, con: u8) -> (i32, i32, usize) {
        let neighbor_x = x + dir_offset_x(dir) as i32;
        let neighbor_z = z + dir_offset_z(dir) as i32;
        let column = (neighbor_x + neighbor_z * self.width as i32) as usize;
        let span = self.cells[column].index() as usize + con as usize;
        (neighbor_x, neighbor_z, span)
    }

    /// Follows the link of span `i` towards `dir`, see [`CompactHeightfield::con_indices`].
    #[inline]
    pub(crate) fn neighbor(&self, x: i32, z: i32, i: usize, dir: u8) -> Option<(i32, i32, usize)> {
        let con = self.spans[i].con(dir)?;
        Some(self.con_indices(x, z, dir, con))
    }

    /// The number of walkable spans.
    #[inline]
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }
}

/// Errors returned by [`CompactHeightfield::from_heightfield`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompactHeightfieldError {
    /// A linked neighbor sits in a layer the packed links cannot address.
    #[error("Neighbor span in layer {layer_index} exceeds the highest linkable layer {max_layer_index}")]
    TooManyLayers {
        /// The highest linkable layer
        max_layer_index: u8,
        /// The highest layer that had to be linked
        layer_index: u32,
    },
}
