//! Filters that remove or restore walkable spans of a [`Heightfield`] before compaction.

use crate::{
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    span::{AreaType, SpanKey},
};

impl Heightfield {
    /// Marks non-walkable spans as walkable if their maximum is within `walkable_climb` of the span below them.
    ///
    /// This removes small obstacles that the agent would be able to walk over such as curbs,
    /// and also allows agents to move up terraced structures like stairs.
    ///
    /// Obstacle spans are marked walkable if: `obstacle_span.max - walkable_span.max < walkable_climb`
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb: u16) {
        let mut column = Vec::new();
        for z in 0..self.height {
            for x in 0..self.width {
                column.clear();
                column.extend(self.column_span_keys(x, z));

                let mut previous_max = None::<u16>;
                let mut previous_was_walkable = false;
                let mut previous_area = AreaType::NOT_WALKABLE;

                // For each span in the column...
                for &key in &column {
                    let span = self.span_mut(key);
                    let walkable = span.area().is_walkable();

                    // If current span is not walkable, but there is walkable span just below it and the height difference
                    // is small enough for the agent to walk over, mark the current span as walkable too.
                    if let Some(previous_max) = previous_max {
                        if !walkable
                            && previous_was_walkable
                            && (span.max() as i32 - previous_max as i32) <= walkable_climb as i32
                        {
                            span.set_area(previous_area);
                        }
                    }

                    // Copy the original walkable value regardless of whether we changed it.
                    // This prevents multiple consecutive non-walkable spans from being erroneously marked as walkable.
                    previous_max = Some(span.max());
                    previous_was_walkable = walkable;
                    previous_area = span.area();
                }
            }
        }
    }

    /// Marks spans that are ledges as not-walkable.
    ///
    /// A ledge is a span with one or more neighbors whose maximum is further away than `walkable_climb`
    /// from the current span's maximum.
    /// This method removes the impact of the overestimation of conservative voxelization
    /// so the resulting mesh will not have regions hanging in the air over ledges.
    /// Spans on steep slopes, where the traversable neighbors differ by more than `walkable_climb`, are removed as well.
    ///
    /// Columns on the outer edge of the heightfield count as ledges.
    pub fn filter_ledge_spans(&mut self, walkable_height: u16, walkable_climb: u16) {
        let max_height = Self::MAX_SPAN_HEIGHT as i32;
        let walkable_height = walkable_height as i32;
        let walkable_climb = walkable_climb as i32;
        let mut column = Vec::new();

        // Mark spans that are adjacent to a ledge as unwalkable.
        for z in 0..self.height {
            for x in 0..self.width {
                column.clear();
                column.extend(self.column_span_keys(x, z));
                for &key in &column {
                    let span = self.span(key);
                    // Skip non-walkable spans.
                    if !span.area().is_walkable() {
                        continue;
                    }

                    let bot = span.max() as i32;
                    let top = self.ceiling(span.next());

                    // The difference between this walkable area and the lowest neighbor walkable area.
                    // This is the difference between the current span and all neighbor spans that have
                    // enough space for an agent to move between, but not accounting at all for surface slope.
                    let mut lowest_neighbor_floor_difference = max_height;

                    // Min and max height of accessible neighbours.
                    let mut lowest_traversable_neighbor_floor = bot;
                    let mut highest_traversable_neighbor_floor = bot;

                    for direction in 0..4 {
                        let neighbor_x = x as i32 + dir_offset_x(direction) as i32;
                        let neighbor_z = z as i32 + dir_offset_z(direction) as i32;
                        // Skip neighbours which are out of bounds.
                        if !self.contains(neighbor_x, neighbor_z) {
                            lowest_neighbor_floor_difference = -walkable_climb - 1;
                            break;
                        }
                        let neighbor_key = self.span_key_at(neighbor_x as u16, neighbor_z as u16);

                        // The most we can step down to the neighbor is the walkable climb distance.
                        // Skip neighbor if the gap between the spans is too small.
                        let neighbor_top = self.ceiling(neighbor_key);
                        if top.min(neighbor_top) - bot >= walkable_height {
                            lowest_neighbor_floor_difference = -walkable_climb - 1;
                            break;
                        }

                        // For each span in the neighboring column...
                        let neighbor_spans = std::iter::successors(neighbor_key, |key| {
                            self.span(*key).next()
                        });
                        for neighbor_key in neighbor_spans {
                            let neighbor_span = self.span(neighbor_key);
                            let neighbor_bot = neighbor_span.max() as i32;
                            let neighbor_top = self.ceiling(neighbor_span.next());

                            // Only consider neighboring areas that have enough overlap to be potentially traversable.
                            if top.min(neighbor_top) - bot.max(neighbor_bot) < walkable_height {
                                // No space to traverse between them.
                                continue;
                            }

                            let neighbor_floor_difference = neighbor_bot - bot;
                            lowest_neighbor_floor_difference =
                                lowest_neighbor_floor_difference.min(neighbor_floor_difference);

                            // Find min/max accessible neighbor height.
                            // Only consider neighbors that are at most walkable_climb away.
                            if neighbor_floor_difference.abs() <= walkable_climb {
                                // There is space to move to the neighbor cell and the slope isn't too much.
                                lowest_traversable_neighbor_floor =
                                    lowest_traversable_neighbor_floor.min(neighbor_bot);
                                highest_traversable_neighbor_floor =
                                    highest_traversable_neighbor_floor.max(neighbor_bot);
                            } else if neighbor_floor_difference < -walkable_climb {
                                // We already know this will be considered a ledge span so we can early-out
                                break;
                            }
                        }
                    }

                    // The current span is close to a ledge if the magnitude of the drop to any neighbour span
                    // is greater than the walkable_climb distance.
                    // That is, there is a gap that is large enough to let an agent move between them,
                    // but the drop (surface slope) is too large to allow it.
                    if lowest_neighbor_floor_difference < -walkable_climb
                        // If the difference between all neighbor floors is too large, this is a steep slope
                        || highest_traversable_neighbor_floor - lowest_traversable_neighbor_floor
                            > walkable_climb
                    {
                        self.span_mut(key).set_area(AreaType::NOT_WALKABLE);
                    }
                }
            }
        }
    }

    /// Marks walkable spans as not walkable if the clearance above the span is less than the specified `walkable_height`.
    ///
    /// For this filter, the clearance above the span is the distance from the span's
    /// maximum to the minimum of the next higher span in the same column.
    /// If there is no higher span in the column, the clearance is computed as the
    /// distance from the top of the span to [`Heightfield::MAX_SPAN_HEIGHT`].
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: u16) {
        let mut column = Vec::new();
        // Remove walkable flag from spans which do not have enough
        // space above them for the agent to stand there.
        for z in 0..self.height {
            for x in 0..self.width {
                column.clear();
                column.extend(self.column_span_keys(x, z));
                for &key in &column {
                    let span = self.span(key);
                    let bot = span.max() as i32;
                    let top = self.ceiling(span.next());
                    if top - bot < walkable_height as i32 {
                        self.span_mut(key).set_area(AreaType::NOT_WALKABLE);
                    }
                }
            }
        }
    }

    /// The minimum of the span with the given key, or [`Heightfield::MAX_SPAN_HEIGHT`] if there is none.
    #[inline]
    fn ceiling(&self, key: Option<SpanKey>) -> i32 {
        key.map(|key| self.span(key).min() as i32)
            .unwrap_or(Self::MAX_SPAN_HEIGHT as i32)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::{
        Aabb3d,
        heightfield::{HeightfieldBuilder, SpanInsertion},
        span::SpanBuilder,
    };

    fn heightfield(size: f32) -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3::ZERO, [size, 10.0, size]),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    fn insert(heightfield: &mut Heightfield, x: u16, z: u16, min: u16, max: u16, area: AreaType) {
        heightfield
            .add_span(SpanInsertion {
                x,
                z,
                flag_merge_threshold: 0,
                span: SpanBuilder {
                    min,
                    max,
                    area,
                    next: None,
                }
                .build(),
            })
            .unwrap();
    }

    fn areas(heightfield: &Heightfield, x: u16, z: u16) -> Vec<AreaType> {
        heightfield
            .column_span_keys(x, z)
            .map(|key| heightfield.span(key).area())
            .collect()
    }

    fn flat_ground(size: u16, floor: u16) -> Heightfield {
        let mut heightfield = heightfield(size as f32);
        for z in 0..size {
            for x in 0..size {
                insert(&mut heightfield, x, z, 0, floor, AreaType::DEFAULT_WALKABLE);
            }
        }
        heightfield
    }

    #[test]
    fn low_obstacle_on_walkable_span_becomes_walkable() {
        let mut heightfield = heightfield(1.0);
        insert(&mut heightfield, 0, 0, 0, 2, AreaType(7));
        insert(&mut heightfield, 0, 0, 3, 4, AreaType::NOT_WALKABLE);
        insert(&mut heightfield, 0, 0, 5, 6, AreaType::NOT_WALKABLE);

        heightfield.filter_low_hanging_walkable_obstacles(2);

        assert_eq!(
            areas(&heightfield, 0, 0),
            vec![AreaType(7), AreaType(7), AreaType::NOT_WALKABLE]
        );
    }

    #[test]
    fn high_obstacle_stays_unwalkable() {
        let mut heightfield = heightfield(1.0);
        insert(&mut heightfield, 0, 0, 0, 2, AreaType(7));
        insert(&mut heightfield, 0, 0, 3, 6, AreaType::NOT_WALKABLE);

        heightfield.filter_low_hanging_walkable_obstacles(2);

        assert_eq!(
            areas(&heightfield, 0, 0),
            vec![AreaType(7), AreaType::NOT_WALKABLE]
        );
    }

    #[test]
    fn ledge_filter_keeps_interior_and_removes_outer_ring() {
        let mut heightfield = flat_ground(5, 1);
        heightfield.filter_ledge_spans(2, 1);

        for z in 0..5 {
            for x in 0..5 {
                let on_edge = x == 0 || z == 0 || x == 4 || z == 4;
                let expected = if on_edge {
                    AreaType::NOT_WALKABLE
                } else {
                    AreaType::DEFAULT_WALKABLE
                };
                assert_eq!(areas(&heightfield, x, z), vec![expected], "({x}, {z})");
            }
        }
    }

    #[test]
    fn ledge_filter_removes_spans_next_to_a_drop() {
        let mut heightfield = heightfield(5.0);
        for z in 0..5 {
            for x in 0..5 {
                let floor = if x >= 3 { 5 } else { 1 };
                insert(&mut heightfield, x, z, 0, floor, AreaType::DEFAULT_WALKABLE);
            }
        }
        heightfield.filter_ledge_spans(2, 1);

        assert_eq!(areas(&heightfield, 1, 2), vec![AreaType::DEFAULT_WALKABLE]);
        // A wall in front of a span is not a ledge, the drop behind it is.
        assert_eq!(areas(&heightfield, 2, 2), vec![AreaType::DEFAULT_WALKABLE]);
        assert_eq!(areas(&heightfield, 3, 2), vec![AreaType::NOT_WALKABLE]);
    }

    #[test]
    fn low_ceiling_makes_span_unwalkable() {
        let mut heightfield = heightfield(2.0);
        insert(&mut heightfield, 0, 0, 0, 1, AreaType::DEFAULT_WALKABLE);
        insert(&mut heightfield, 0, 0, 3, 4, AreaType::DEFAULT_WALKABLE);
        insert(&mut heightfield, 1, 0, 0, 1, AreaType::DEFAULT_WALKABLE);
        insert(&mut heightfield, 1, 0, 6, 7, AreaType::DEFAULT_WALKABLE);

        heightfield.filter_walkable_low_height_spans(3);

        assert_eq!(
            areas(&heightfield, 0, 0),
            vec![AreaType::NOT_WALKABLE, AreaType::DEFAULT_WALKABLE]
        );
        assert_eq!(
            areas(&heightfield, 1, 0),
            vec![AreaType::DEFAULT_WALKABLE, AreaType::DEFAULT_WALKABLE]
        );
    }
}
