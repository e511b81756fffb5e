//! The voxel grid that triangles are rasterized into.
//!
//! Every column of a [`Heightfield`] holds a sorted list of solid [`Span`]s.
//! The lists live in a shared arena and are linked from bottom to top.

use thiserror::Error;

use crate::{
    Aabb3d,
    span::{Span, SpanKey, Spans},
};

/// Solid space of the build area as columns of spans. Create one with [`HeightfieldBuilder`].
#[derive(Debug, Clone)]
pub struct Heightfield {
    /// Number of columns along x.
    pub width: u16,
    /// Number of columns along z.
    pub height: u16,
    /// World space bounds. `aabb.min` is the corner of column `(0, 0)` at span height zero.
    pub aabb: Aabb3d,
    /// Column width and depth in world units.
    pub cell_size: f32,
    /// Span height unit in world units.
    pub cell_height: f32,
    /// The bottom span of every column, row by row along x.
    pub spans: Vec<Option<SpanKey>>,
    /// The arena holding the spans of all columns.
    pub allocated_spans: Spans,
}

impl Heightfield {
    /// Span limits are stored as `u16`, so this is the top of every column.
    pub const MAX_SPAN_HEIGHT: u16 = u16::MAX;

    /// Adds a span to its column. Every span it overlaps is absorbed into it,
    /// so the column stays sorted and free of overlaps.
    pub(crate) fn add_span(&mut self, insertion: SpanInsertion) -> Result<(), SpanInsertionError> {
        let SpanInsertion {
            x,
            z,
            flag_merge_threshold,
            mut span,
        } = insertion;
        if x >= self.width || z >= self.height {
            return Err(SpanInsertionError::ColumnIndexOutOfBounds { x, z });
        }
        let column = self.column_index(x, z);

        // The last span that stays below the new one.
        let mut below = None;
        let mut cursor = self.spans[column];
        while let Some(key) = cursor {
            let existing = self.span(key).clone();
            if existing.min() > span.max() {
                break;
            }
            cursor = existing.next();
            if existing.max() < span.min() {
                below = Some(key);
                continue;
            }

            span.set_min(span.min().min(existing.min()));
            span.set_max(span.max().max(existing.max()));
            // When both tops are close, the higher area id wins.
            let top_distance = (span.max() as i32 - existing.max() as i32).unsigned_abs();
            if top_distance <= flag_merge_threshold as u32 {
                span.set_area(span.area().max(existing.area()));
            }
            self.allocated_spans.remove(key);
            self.link_after(column, below, cursor);
        }

        span.set_next(cursor);
        let key = self.allocated_spans.insert(span);
        self.link_after(column, below, Some(key));
        Ok(())
    }

    /// Points `below`, or the column itself if there is nothing below, at `next`.
    fn link_after(&mut self, column: usize, below: Option<SpanKey>, next: Option<SpanKey>) {
        match below {
            Some(below) => self.span_mut(below).set_next(next),
            None => self.spans[column] = next,
        }
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width as i32 && z >= 0 && z < self.height as i32
    }

    /// The number of spans over all columns.
    #[inline]
    pub fn span_count(&self) -> usize {
        self.allocated_spans.len()
    }

    /// The bottom span of column `(x, z)`, or `None` for empty or out of range columns.
    #[inline]
    pub fn span_key_at(&self, x: u16, z: u16) -> Option<SpanKey> {
        if !self.contains(x.into(), z.into()) {
            return None;
        }
        self.spans[self.column_index(x, z)]
    }

    /// See [`Heightfield::span_key_at`].
    #[inline]
    pub fn span_at(&self, x: u16, z: u16) -> Option<&Span> {
        self.span_key_at(x, z).map(|key| self.span(key))
    }

    /// See [`Heightfield::span_key_at`].
    #[inline]
    pub fn span_at_mut(&mut self, x: u16, z: u16) -> Option<&mut Span> {
        let key = self.span_key_at(x, z)?;
        Some(self.span_mut(key))
    }

    /// # Panics
    ///
    /// If `key` was removed from the arena.
    #[inline]
    pub fn span(&self, key: SpanKey) -> &Span {
        &self.allocated_spans[key]
    }

    /// # Panics
    ///
    /// If `key` was removed from the arena.
    #[inline]
    pub fn span_mut(&mut self, key: SpanKey) -> &mut Span {
        &mut self.allocated_spans[key]
    }

    /// The spans of column `(x, z)` from bottom to top.
    pub fn column_span_keys(&self, x: u16, z: u16) -> impl Iterator<Item = SpanKey> + '_ {
        std::iter::successors(self.span_key_at(x, z), |key| self.span(*key).next())
    }
}

/// Sizes a [`Heightfield`] to cover an area.
pub struct HeightfieldBuilder {
    /// The area to cover.
    pub aabb: Aabb3d,
    /// Column width and depth in world units.
    pub cell_size: f32,
    /// Span height unit in world units.
    pub cell_height: f32,
}

impl HeightfieldBuilder {
    /// Allocates an empty heightfield. Partial cells at the far edges are rounded to the nearest column.
    ///
    /// # Errors
    ///
    /// If the area is narrower than half a cell, or too wide for `u16` column indices.
    pub fn build(self) -> Result<Heightfield, HeightfieldBuilderError> {
        let size = self.aabb.size() / self.cell_size;
        let (width, height) = (size.x + 0.5, size.z + 0.5);
        if !(width >= 1.0 && height >= 1.0) {
            return Err(HeightfieldBuilderError::EmptyGrid { width, height });
        }
        if width > u16::MAX as f32 || height > u16::MAX as f32 {
            return Err(HeightfieldBuilderError::ColumnCountTooLarge { width, height });
        }
        let (width, height) = (width as u16, height as u16);
        let columns = width as usize * height as usize;
        Ok(Heightfield {
            width,
            height,
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            spans: vec![None; columns],
            allocated_spans: Spans::with_min_capacity(columns),
        })
    }
}

/// Errors returned by [`HeightfieldBuilder::build`].
#[derive(Error, Debug)]
pub enum HeightfieldBuilderError {
    /// One side needs more than `u16::MAX` columns.
    #[error("Heightfield of {width}x{height} columns exceeds {max} columns per side", max = u16::MAX)]
    ColumnCountTooLarge {
        /// Columns along x
        width: f32,
        /// Columns along z
        height: f32,
    },
    /// One side rounds to zero columns.
    #[error("Heightfield of {width}x{height} columns has no columns")]
    EmptyGrid {
        /// Columns along x
        width: f32,
        /// Columns along z
        height: f32,
    },
}

/// Errors raised while rasterizing into a [`Heightfield`].
#[derive(Error, Debug)]
pub enum SpanInsertionError {
    /// The span lies outside of the grid.
    #[error("Column ({x}, {z}) is outside of the heightfield")]
    ColumnIndexOutOfBounds {
        /// Column along x
        x: u16,
        /// Column along z
        z: u16,
    },
}

/// A span on its way into a column.
pub(crate) struct SpanInsertion {
    pub(crate) x: u16,
    pub(crate) z: u16,
    /// Spans whose tops are at most this far apart merge their area ids.
    pub(crate) flag_merge_threshold: u16,
    pub(crate) span: Span,
}
