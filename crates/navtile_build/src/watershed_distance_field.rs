//! Watershed partitioning
//!   - the classic partitioning of a compact heightfield into regions
//!   - creates the nicest tessellation
//!   - partitions the heightfield into nice regions without holes or overlaps
//!   - there are some corner cases where this method produces holes and overlaps
//!      - holes may appear when a small obstacle is close to a large open area (triangulation can handle this)
//!      - overlaps may occur if you have narrow spiral corridors (i.e stairs), this makes triangulation fail
//!
//! This module computes the distance field the watershed flooding in
//! [`CompactHeightfield::build_regions`] descends.

use crate::CompactHeightfield;

impl CompactHeightfield {
    /// Prepare for region partitioning, by calculating distance field along the walkable surface.
    ///
    /// The distance of a span is measured in half cells to the nearest border span, where a border span is
    /// one with fewer than four neighbors of the same area. The result is smoothed with a 3x3 box blur.
    pub fn build_distance_field(&mut self) {
        let mut src = vec![0_u16; self.spans.len()];
        let mut dst = vec![0_u16; self.spans.len()];

        self.max_distance = self.calculate_distance_field(&mut src);
        self.box_blur(1, &src, &mut dst);
        self.dist = dst;
    }

    fn calculate_distance_field(&self, src: &mut [u16]) -> u16 {
        src.fill(u16::MAX);

        // Mark boundary cells.
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let area = self.areas[i];
                    let same_area_neighbors = (0..4)
                        .filter_map(|dir| self.neighbor(x as i32, z as i32, i, dir))
                        .filter(|&(_, _, a_i)| self.areas[a_i] == area)
                        .count();
                    if same_area_neighbors != 4 {
                        src[i] = 0;
                    }
                }
            }
        }

        let relax = |src: &mut [u16], i: usize, neighbor: usize, cost: u16| {
            let distance = src[neighbor].saturating_add(cost);
            if distance < src[i] {
                src[i] = distance;
            }
        };

        // Pass 1
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let (x, z) = (x as i32, z as i32);
                    if let Some((a_x, a_z, a_i)) = self.neighbor(x, z, i, 0) {
                        // (-1,0)
                        relax(src, i, a_i, 2);
                        // (-1,-1)
                        if let Some((_, _, b_i)) = self.neighbor(a_x, a_z, a_i, 3) {
                            relax(src, i, b_i, 3);
                        }
                    }
                    if let Some((a_x, a_z, a_i)) = self.neighbor(x, z, i, 3) {
                        // (0,-1)
                        relax(src, i, a_i, 2);
                        // (1,-1)
                        if let Some((_, _, b_i)) = self.neighbor(a_x, a_z, a_i, 2) {
                            relax(src, i, b_i, 3);
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
                        relax(src, i, a_i, 2);
                        // (1,1)
                        if let Some((_, _, b_i)) = self.neighbor(a_x, a_z, a_i, 1) {
                            relax(src, i, b_i, 3);
                        }
                    }
                    if let Some((a_x, a_z, a_i)) = self.neighbor(x, z, i, 1) {
                        // (0,1)
                        relax(src, i, a_i, 2);
                        // (-1,1)
                        if let Some((_, _, b_i)) = self.neighbor(a_x, a_z, a_i, 0) {
                            relax(src, i, b_i, 3);
                        }
                    }
                }
            }
        }

        src.iter().copied().max().unwrap_or_default()
    }

    fn box_blur(&self, threshold: u16, src: &[u16], dst: &mut [u16]) {
        let threshold = threshold * 2;
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let cd = src[i];
                    if cd <= threshold {
                        dst[i] = cd;
                        continue;
                    }

                    let mut d = cd as u32;
                    for dir in 0..4 {
                        let Some((a_x, a_z, a_i)) = self.neighbor(x as i32, z as i32, i, dir)
                        else {
                            d += cd as u32 * 2;
                            continue;
                        };
                        d += src[a_i] as u32;
                        let dir2 = (dir + 1) & 0x3;
                        match self.neighbor(a_x, a_z, a_i, dir2) {
                            Some((_, _, b_i)) => d += src[b_i] as u32,
                            None => d += cd as u32,
                        }
                    }
                    dst[i] = ((d + 5) / 9) as u16;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compact_heightfield::tests::flat_heightfield;

    #[test]
    fn distance_grows_towards_the_center() {
        let mut chf = flat_heightfield(9, |_, _| Some(1))
            .into_compact(2, 1)
            .unwrap();
        chf.build_distance_field();

        let dist_at = |x: u16, z: u16| chf.dist[chf.cell_at(x, z).index() as usize];
        assert_eq!(dist_at(0, 0), 0);
        assert_eq!(dist_at(0, 4), 0);
        assert!(dist_at(1, 4) < dist_at(2, 4));
        assert!(dist_at(2, 4) < dist_at(4, 4));
        // The maximum is taken before blurring.
        assert_eq!(chf.max_distance, 8);
        assert_eq!(dist_at(4, 4), 6);
    }

    #[test]
    fn distance_is_symmetric() {
        let mut chf = flat_heightfield(7, |_, _| Some(1))
            .into_compact(2, 1)
            .unwrap();
        chf.build_distance_field();
        let dist_at = |x: u16, z: u16| chf.dist[chf.cell_at(x, z).index() as usize];
        for z in 0..7 {
            for x in 0..7 {
                assert_eq!(dist_at(x, z), dist_at(6 - x, z), "({x}, {z})");
                assert_eq!(dist_at(x, z), dist_at(z, x), "({x}, {z})");
            }
        }
    }
}
