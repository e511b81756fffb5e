use crate::{CompactHeightfield, span::AreaType};

impl CompactHeightfield {
    /// Erode the walkable area by agent radius.
    ///
    /// Spans closer than `walkable_radius` cells to a boundary become [`AreaType::NOT_WALKABLE`].
    /// The distance is approximated with a two-pass chamfer transform, so it is measured in
    /// half cells: orthogonal steps cost 2 and diagonal steps cost 3.
    pub fn erode_walkable_area(&mut self, walkable_radius: u16) {
        let mut distance_to_boundary = vec![u8::MAX; self.spans.len()];

        // Mark boundary cells.
        for z in 0..self.height {
            for x in 0..self.width {
                for span_index in self.cell_at(x, z).index_range() {
                    if !self.areas[span_index].is_walkable() {
                        distance_to_boundary[span_index] = 0;
                        continue;
                    }
                    // Check that there is a non-null adjacent span in each of the 4 cardinal directions.
                    let neighbor_count = (0..4)
                        .filter_map(|dir| self.neighbor(x as i32, z as i32, span_index, dir))
                        .filter(|&(_, _, neighbor_index)| self.areas[neighbor_index].is_walkable())
                        .count();

                    // At least one missing neighbour, so this is a boundary cell.
                    if neighbor_count != 4 {
                        distance_to_boundary[span_index] = 0;
                    }
                }
            }
        }

        let relax = |dist: &mut [u8], i: usize, neighbor: usize, cost: u8| {
            let new_distance = dist[neighbor].saturating_add(cost);
            if new_distance < dist[i] {
                dist[i] = new_distance;
            }
        };

        // Pass 1
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let (x, z) = (x as i32, z as i32);
                    if let Some((a_x, a_z, a_i)) = self.neighbor(x, z, i, 0) {
                        // (-1,0)
                        relax(&mut distance_to_boundary, i, a_i, 2);
                        // (-1,-1)
                        if let Some((_, _, b_i)) = self.neighbor(a_x, a_z, a_i, 3) {
                            relax(&mut distance_to_boundary, i, b_i, 3);
                        }
                    }
                    if let Some((a_x, a_z, a_i)) = self.neighbor(x, z, i, 3) {
                        // (0,-1)
                        relax(&mut distance_to_boundary, i, a_i, 2);
                        // (1,-1)
                        if let Some((_, _, b_i)) = self.neighbor(a_x, a_z, a_i, 2) {
                            relax(&mut distance_to_boundary, i, b_i, 3);
                        }
                    }
                }
            }
        }

        // Pass 2
        for z in (0..self.height).rev() {
            for x in (0..self.width).rev() {
                for i in self.cell_at(x, z).index_range() {
                    let (x, z) = (x as i32, z as i32);
                    if let Some((a_x, a_z, a_i)) = self.neighbor(x, z, i, 2) {
                        // (1,0)
                        relax(&mut distance_to_boundary, i, a_i, 2);
                        // (1,1)
                        if let Some((_, _, b_i)) = self.neighbor(a_x, a_z, a_i, 1) {
                            relax(&mut distance_to_boundary, i, b_i, 3);
                        }
                    }
                    if let Some((a_x, a_z, a_i)) = self.neighbor(x, z, i, 1) {
                        // (0,1)
                        relax(&mut distance_to_boundary, i, a_i, 2);
                        // (-1,1)
                        if let Some((_, _, b_i)) = self.neighbor(a_x, a_z, a_i, 0) {
                            relax(&mut distance_to_boundary, i, b_i, 3);
                        }
                    }
                }
            }
        }

        let min_boundary_distance = (walkable_radius * 2).min(u8::MAX as u16) as u8;
        for (area, distance) in self.areas.iter_mut().zip(&distance_to_boundary) {
            if *distance < min_boundary_distance {
                *area = AreaType::NOT_WALKABLE;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{compact_heightfield::tests::flat_heightfield, span::AreaType};

    #[test]
    fn erosion_removes_border_ring() {
        let chf = flat_heightfield(7, |_, _| Some(1));
        let mut chf = chf.into_compact(2, 1).unwrap();
        chf.erode_walkable_area(2);

        for z in 0..7_u16 {
            for x in 0..7_u16 {
                let i = chf.cell_at(x, z).index() as usize;
                let ring = x.min(z).min(6 - x).min(6 - z);
                // Distances in half cells: the outer ring is 0, the next one 2, and so on.
                let expected = if ring * 2 < 4 {
                    AreaType::NOT_WALKABLE
                } else {
                    AreaType::DEFAULT_WALKABLE
                };
                assert_eq!(chf.areas[i], expected, "({x}, {z})");
            }
        }
    }

    #[test]
    fn zero_radius_keeps_everything_walkable() {
        let mut chf = flat_heightfield(3, |_, _| Some(1))
            .into_compact(2, 1)
            .unwrap();
        chf.erode_walkable_area(0);
        assert!(chf.areas.iter().all(|area| area.is_walkable()));
    }

    #[test]
    fn erosion_grows_around_holes() {
        let mut chf = flat_heightfield(9, |x, z| (x != 4 || z != 4).then_some(1))
            .into_compact(2, 1)
            .unwrap();
        chf.erode_walkable_area(1);
        let i = chf.cell_at(3, 4).index() as usize;
        assert_eq!(chf.areas[i], AreaType::NOT_WALKABLE);
        let i = chf.cell_at(2, 2).index() as usize;
        assert_eq!(chf.areas[i], AreaType::DEFAULT_WALKABLE);
    }
}
