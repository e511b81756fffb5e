use crate::{
    CompactHeightfield,
    region::{RegionError, RegionId},
};

impl CompactHeightfield {
    /// Non-null regions will consist of connected, non-overlapping walkable spans that form a single contour.
    /// Contours will form simple polygons.
    ///
    /// If multiple regions form an area that is smaller than `min_region_area`, then all spans will be
    /// re-assigned to [`RegionId::NONE`].
    ///
    /// Watershed partitioning can result in smaller than necessary regions, especially in diagonal corridors.
    /// `merge_region_area` helps reduce unnecessarily small regions.
    ///
    /// The region data will be available via the [`CompactHeightfield::max_region`]
    /// and [`CompactSpan::region`](crate::CompactSpan::region) fields.
    ///
    /// The distance field must be created using [`CompactHeightfield::build_distance_field`] before attempting to build regions.
    ///
    /// # Errors
    ///
    /// Returns an error if more regions are created than fit into a [`RegionId`].
    pub fn build_regions(
        &mut self,
        border_size: u16,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), RegionError> {
        const LOG_NB_STACKS: usize = 3;
        const NB_STACKS: usize = 1 << LOG_NB_STACKS;
        let mut level_stacks: [Vec<LevelStackEntry>; NB_STACKS] = [const { Vec::new() }; NB_STACKS];
        for stack in &mut level_stacks {
            stack.reserve(256);
        }

        let mut stack: Vec<LevelStackEntry> = Vec::with_capacity(256);

        let mut src_reg = vec![RegionId::NONE; self.spans.len()];
        let mut src_dist = vec![0_u16; self.spans.len()];

        let mut region_id = 1_u16;
        let mut level = self.max_distance.saturating_add(1) & !1;

        // How much the watershed "overflows" and simplifies the regions per level.
        let expand_iters = 8;

        if border_size > 0 {
            // Make sure border will not overflow.
            let border_width = border_size.min(self.width);
            let border_height = border_size.min(self.height);

            // Paint regions
            let rects = [
                (0, border_width, 0, self.height),
                (self.width - border_width, self.width, 0, self.height),
                (0, self.width, 0, border_height),
                (0, self.width, self.height - border_height, self.height),
            ];
            for (min_x, max_x, min_z, max_z) in rects {
                let region = RegionId::from(region_id) | RegionId::BORDER_REGION;
                self.paint_rect_region(min_x, max_x, min_z, max_z, region, &mut src_reg);
                region_id += 1;
            }
        }
        self.border_size = border_size;

        let mut s_id = usize::MAX;
        while level > 0 {
            level = level.saturating_sub(2);
            s_id = s_id.wrapping_add(1) & (NB_STACKS - 1);

            if s_id == 0 {
                self.sort_cells_by_level(level, &src_reg, &mut level_stacks, 1);
            } else {
                // copy left overs from last level
                let (src, dst) = level_stacks.split_at_mut(s_id);
                append_stacks(&src[s_id - 1], &mut dst[0], &src_reg);
            }

            self.expand_regions(
                expand_iters,
                level,
                &mut src_reg,
                &mut src_dist,
                &mut level_stacks[s_id],
                false,
            );

            // Mark new regions with IDs.
            for j in 0..level_stacks[s_id].len() {
                let entry = level_stacks[s_id][j].clone();
                let Some(i) = entry.index else {
                    continue;
                };
                if src_reg[i] != RegionId::NONE {
                    continue;
                }
                if self.flood_region(
                    entry,
                    level,
                    RegionId::from(region_id),
                    &mut src_reg,
                    &mut src_dist,
                    &mut stack,
                ) {
                    if region_id >= RegionId::MAX.bits() {
                        return Err(RegionError::RegionIdOverflow);
                    }
                    region_id += 1;
                }
            }
        }

        // Expand current regions until no empty connected cells found.
        self.expand_regions(
            expand_iters * 8,
            0,
            &mut src_reg,
            &mut src_dist,
            &mut stack,
            true,
        );

        // Merge regions and filter out small regions.
        let max_region = self.merge_and_filter_regions(
            min_region_area as usize,
            merge_region_area as usize,
            region_id,
            &mut src_reg,
        );
        self.max_region = RegionId::from(max_region);

        // Write the result out.
        for (span, region) in self.spans.iter_mut().zip(src_reg) {
            span.region = region;
        }
        Ok(())
    }

    fn paint_rect_region(
        &self,
        min_x: u16,
        max_x: u16,
        min_z: u16,
        max_z: u16,
        region: RegionId,
        src_reg: &mut [RegionId],
    ) {
        for z in min_z..max_z {
            for x in min_x..max_x {
                for i in self.cell_at(x, z).index_range() {
                    if self.areas[i].is_walkable() {
                        src_reg[i] = region;
                    }
                }
            }
        }
    }

    fn sort_cells_by_level(
        &self,
        start_level: u16,
        src_reg: &[RegionId],
        stacks: &mut [Vec<LevelStackEntry>],
        log_levels_per_stack: u16,
    ) {
        let start_level = start_level >> log_levels_per_stack;
        for stack in stacks.iter_mut() {
            stack.clear();
        }

        // put all cells in the level range into the appropriate stacks
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    if !self.areas[i].is_walkable() || src_reg[i] != RegionId::NONE {
                        continue;
                    }
                    let level = self.dist[i] >> log_levels_per_stack;
                    let s_id = start_level.saturating_sub(level) as usize;
                    if s_id >= stacks.len() {
                        continue;
                    }
                    stacks[s_id].push(LevelStackEntry {
                        x,
                        z,
                        index: Some(i),
                    });
                }
            }
        }
    }

    fn expand_regions(
        &self,
        max_iter: u16,
        level: u16,
        src_reg: &mut [RegionId],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
        fill_stack: bool,
    ) {
        if fill_stack {
            // Find cells revealed by the raised level.
            stack.clear();
            for z in 0..self.height {
                for x in 0..self.width {
                    for i in self.cell_at(x, z).index_range() {
                        if self.dist[i] >= level
                            && src_reg[i] == RegionId::NONE
                            && self.areas[i].is_walkable()
                        {
                            stack.push(LevelStackEntry {
                                x,
                                z,
                                index: Some(i),
                            });
                        }
                    }
                }
            }
        } else {
            // use cells in the input stack
            // mark all cells which already have a region
            for entry in stack.iter_mut() {
                if entry.index.is_some_and(|i| src_reg[i] != RegionId::NONE) {
                    entry.index = None;
                }
            }
        }

        let mut dirty_entries = Vec::new();
        let mut iter = 0;
        while !stack.is_empty() {
            let mut failed = 0;
            dirty_entries.clear();

            for entry in stack.iter_mut() {
                let Some(i) = entry.index else {
                    failed += 1;
                    continue;
                };

                let mut r = src_reg[i];
                let mut d2 = u16::MAX;
                let area = self.areas[i];
                for dir in 0..4 {
                    let Some((_, _, a_i)) = self.neighbor(entry.x as i32, entry.z as i32, i, dir)
                    else {
                        continue;
                    };
                    if self.areas[a_i] != area {
                        continue;
                    }
                    let a_region = src_reg[a_i];
                    let a_dist = src_dist[a_i].saturating_add(2);
                    // Take the closest region, the first one found wins ties.
                    if a_region.is_walkable_region() && a_dist < d2 {
                        r = a_region;
                        d2 = a_dist;
                    }
                }
                if r != RegionId::NONE {
                    // Mark as used
                    entry.index = None;
                    dirty_entries.push(DirtyEntry {
                        index: i,
                        region: r,
                        distance2: d2,
                    });
                } else {
                    failed += 1;
                }
            }
            // Copy entries that differ between src and dst to keep them in sync.
            for dirty_entry in &dirty_entries {
                src_reg[dirty_entry.index] = dirty_entry.region;
                src_dist[dirty_entry.index] = dirty_entry.distance2;
            }

            if failed == stack.len() {
                break;
            }

            if level > 0 {
                iter += 1;
                if iter >= max_iter {
                    break;
                }
            }
        }
    }

    /// Floods a new region from `entry` over all connected spans at or above `level - 2`.
    /// Returns `false` if the seed turned out to belong to an existing region.
    fn flood_region(
        &self,
        entry: LevelStackEntry,
        level: u16,
        region: RegionId,
        src_reg: &mut [RegionId],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
    ) -> bool {
        let Some(seed) = entry.index else {
            return false;
        };
        let area = self.areas[seed];

        // Flood fill mark region.
        stack.clear();
        stack.push(entry);
        src_reg[seed] = region;
        src_dist[seed] = 0;

        let lev = level.saturating_sub(2);
        let mut count = 0;

        while let Some(back) = stack.pop() {
            let Some(ci) = back.index else {
                continue;
            };
            let (cx, cz) = (back.x as i32, back.z as i32);

            // Check if any of the neighbours already have a valid region set.
            let mut ar = RegionId::NONE;
            for dir in 0..4 {
                // 8 connected
                let Some((a_x, a_z, a_i)) = self.neighbor(cx, cz, ci, dir) else {
                    continue;
                };
                if self.areas[a_i] != area {
                    continue;
                }
                let nr = src_reg[a_i];
                if nr.contains(RegionId::BORDER_REGION) {
                    // Do not take borders into account.
                    continue;
                }
                if nr != RegionId::NONE && nr != region {
                    ar = nr;
                    break;
                }

                let dir2 = (dir + 1) & 0x3;
                if let Some((_, _, a_i2)) = self.neighbor(a_x, a_z, a_i, dir2) {
                    if self.areas[a_i2] != area {
                        continue;
                    }
                    let nr2 = src_reg[a_i2];
                    if nr2 != RegionId::NONE && nr2 != region {
                        ar = nr2;
                        break;
                    }
                }
            }
            if ar != RegionId::NONE {
                src_reg[ci] = RegionId::NONE;
                continue;
            }

            count += 1;

            // Expand neighbours.
            for dir in 0..4 {
                let Some((a_x, a_z, a_i)) = self.neighbor(cx, cz, ci, dir) else {
                    continue;
                };
                if self.areas[a_i] != area {
                    continue;
                }
                if self.dist[a_i] >= lev && src_reg[a_i] == RegionId::NONE {
                    src_reg[a_i] = region;
                    src_dist[a_i] = 0;
                    stack.push(LevelStackEntry {
                        x: a_x as u16,
                        z: a_z as u16,
                        index: Some(a_i),
                    });
                }
            }
        }

        count > 0
    }

    /// Removes groups of regions that are too small, merges small regions into their neighbors
    /// and compacts the region ids. Returns the highest region id in use.
    fn merge_and_filter_regions(
        &self,
        min_region_area: usize,
        merge_region_size: usize,
        region_count: u16,
        src_reg: &mut [RegionId],
    ) -> u16 {
        let region_count = region_count as usize;
        let mut regions: Vec<Region> = (0..region_count).map(|i| Region::new(i as u16)).collect();

        // Find edge of a region and find connections around the contour.
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    let r = src_reg[i].bits() as usize;
                    if r == 0 || r >= region_count {
                        continue;
                    }

                    regions[r].span_count += 1;

                    // Update floors.
                    for j in cell.index_range() {
                        if i == j {
                            continue;
                        }
                        let floor_id = src_reg[j].bits();
                        if floor_id == 0 || floor_id as usize >= region_count {
                            continue;
                        }
                        if floor_id as usize == r {
                            regions[r].overlap = true;
                        }
                        regions[r].add_unique_floor_region(floor_id);
                    }

                    // Have found contour
                    if !regions[r].connections.is_empty() {
                        continue;
                    }

                    regions[r].area_type = self.areas[i];

                    // Check if this cell is next to a border.
                    let solid_edge =
                        (0..4).find(|&dir| self.is_solid_edge(src_reg, x as i32, z as i32, i, dir));
                    if let Some(dir) = solid_edge {
                        // The cell is at border.
                        // Walk around the contour to find all the neighbours.
                        let connections = self.walk_region_contour(x, z, i, dir, src_reg);
                        regions[r].connections = connections;
                    }
                }
            }
        }

        // Remove too small regions.
        let mut stack = Vec::with_capacity(32);
        let mut trace = Vec::with_capacity(32);
        for i in 0..region_count {
            let region = &regions[i];
            if region.id == 0 || region.id & RegionId::BORDER_REGION.bits() != 0 {
                continue;
            }
            if region.span_count == 0 || region.visited {
                continue;
            }

            // Count the total size of all the connected regions.
            // Also keep track of the regions connects to a tile border.
            let mut connects_to_border = false;
            let mut span_count = 0;
            stack.clear();
            trace.clear();

            regions[i].visited = true;
            stack.push(i);

            while let Some(ri) = stack.pop() {
                span_count += regions[ri].span_count;
                trace.push(ri);

                for j in 0..regions[ri].connections.len() {
                    let connection = regions[ri].connections[j];
                    if connection & RegionId::BORDER_REGION.bits() != 0 {
                        connects_to_border = true;
                        continue;
                    }
                    let neighbor = &mut regions[connection as usize];
                    if neighbor.visited {
                        continue;
                    }
                    if neighbor.id == 0 || neighbor.id & RegionId::BORDER_REGION.bits() != 0 {
                        continue;
                    }
                    // Visit
                    stack.push(neighbor.id as usize);
                    neighbor.visited = true;
                }
            }

            // If the accumulated regions size is too small, remove it.
            // Do not remove areas which connect to tile borders
            // as their size cannot be estimated correctly and removing them
            // can potentially remove necessary areas.
            if span_count < min_region_area && !connects_to_border {
                // Kill all visited regions.
                for &t in &trace {
                    regions[t].span_count = 0;
                    regions[t].id = 0;
                }
            }
        }

        // Merge too small regions to neighbour regions.
        loop {
            let mut merge_count = 0;
            for i in 0..region_count {
                let region = &regions[i];
                if region.id == 0 || region.id & RegionId::BORDER_REGION.bits() != 0 {
                    continue;
                }
                if region.overlap || region.span_count == 0 {
                    continue;
                }

                // Check to see if the region should be merged.
                if region.span_count > merge_region_size && region.is_connected_to_border() {
                    continue;
                }

                // Small region with more than 1 connection.
                // Or region which is not connected to a border at all.
                // Find smallest neighbour region that connects to this one.
                let mut smallest = usize::MAX;
                let mut merge_id = region.id;
                for &connection in &region.connections {
                    if connection & RegionId::BORDER_REGION.bits() != 0 {
                        continue;
                    }
                    let other = &regions[connection as usize];
                    if other.id == 0 || other.id & RegionId::BORDER_REGION.bits() != 0 || other.overlap
                    {
                        continue;
                    }
                    if other.span_count < smallest
                        && region.can_merge_with(other)
                        && other.can_merge_with(region)
                    {
                        smallest = other.span_count;
                        merge_id = other.id;
                    }
                }

                // Found new id.
                if merge_id != region.id {
                    let old_id = region.id;
                    let merged = {
                        let (target, source) = index_pair(&mut regions, merge_id as usize, i);
                        target.merge(source)
                    };
                    if merged {
                        // Fixup regions pointing to current region.
                        for other in regions.iter_mut() {
                            if other.id == 0 || other.id & RegionId::BORDER_REGION.bits() != 0 {
                                continue;
                            }
                            // If another region was already merged into current region
                            // change the nid of the previous region too.
                            if other.id == old_id {
                                other.id = merge_id;
                            }
                            // Replace the current region with the new one if the
                            // current regions is neighbour.
                            other.replace_neighbor(old_id, merge_id);
                        }
                        merge_count += 1;
                    }
                }
            }
            if merge_count == 0 {
                break;
            }
        }

        // Compress region Ids.
        let mut new_ids = vec![0_u16; region_count];
        let mut reg_id_gen = 0_u16;
        for region in &regions {
            if region.id == 0 || region.id & RegionId::BORDER_REGION.bits() != 0 {
                continue;
            }
            // Merged regions point at their target and carry no spans themselves.
            if region.span_count == 0 {
                continue;
            }
            reg_id_gen += 1;
            new_ids[region.id as usize] = reg_id_gen;
        }
        for region in regions.iter_mut() {
            if region.id & RegionId::BORDER_REGION.bits() == 0 {
                region.id = new_ids[region.id as usize];
            }
        }

        // Remap regions.
        for region in src_reg.iter_mut() {
            if !region.contains(RegionId::BORDER_REGION) {
                *region = RegionId::from(regions[region.bits() as usize].id);
            }
        }

        reg_id_gen
    }

    fn is_solid_edge(&self, src_reg: &[RegionId], x: i32, z: i32, i: usize, dir: u8) -> bool {
        let r = self
            .neighbor(x, z, i, dir)
            .map(|(_, _, a_i)| src_reg[a_i])
            .unwrap_or(RegionId::NONE);
        r != src_reg[i]
    }

    /// Walks around the region the span `i` belongs to and collects the regions on the other side
    /// of its outline, in order.
    fn walk_region_contour(
        &self,
        x: u16,
        z: u16,
        i: usize,
        dir: u8,
        src_reg: &[RegionId],
    ) -> Vec<u16> {
        let (mut x, mut z, mut i, mut dir) = (x as i32, z as i32, i, dir);
        let start_dir = dir;
        let start_i = i;

        let region_across = |x: i32, z: i32, i: usize, dir: u8| {
            self.neighbor(x, z, i, dir)
                .map(|(_, _, a_i)| src_reg[a_i].bits())
                .unwrap_or(0)
        };

        let mut cur_reg = region_across(x, z, i, dir);
        let mut connections = vec![cur_reg];

        for _ in 0..40_000 {
            if self.is_solid_edge(src_reg, x, z, i, dir) {
                // Choose the edge corner
                let r = region_across(x, z, i, dir);
                if r != cur_reg {
                    cur_reg = r;
                    connections.push(cur_reg);
                }
                // Rotate CW
                dir = (dir + 1) & 0x3;
            } else {
                let Some((n_x, n_z, n_i)) = self.neighbor(x, z, i, dir) else {
                    // Should not happen.
                    break;
                };
                x = n_x;
                z = n_z;
                i = n_i;
                // Rotate CCW
                dir = (dir + 3) & 0x3;
            }

            if start_i == i && start_dir == dir {
                break;
            }
        }

        // Remove adjacent duplicates.
        remove_adjacent_duplicates(&mut connections);
        connections
    }
}

fn append_stacks(
    src_stack: &[LevelStackEntry],
    dst_stack: &mut Vec<LevelStackEntry>,
    src_region: &[RegionId],
) {
    for entry in src_stack {
        let Some(i) = entry.index else {
            continue;
        };
        if src_region[i] != RegionId::NONE {
            continue;
        }
        dst_stack.push(entry.clone());
    }
}

/// Returns mutable references to two distinct elements.
fn index_pair<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

/// Removes consecutive duplicates of a circular list, keeping at least one element.
fn remove_adjacent_duplicates(items: &mut Vec<u16>) {
    let mut i = 0;
    while i < items.len() && items.len() > 1 {
        let ni = (i + 1) % items.len();
        if items[i] == items[ni] {
            items.remove(i);
        } else {
            i += 1;
        }
    }
}

#[derive(Clone, Debug)]
struct LevelStackEntry {
    x: u16,
    z: u16,
    index: Option<usize>,
}

#[derive(Clone, Debug)]
struct DirtyEntry {
    index: usize,
    region: RegionId,
    distance2: u16,
}

/// Bookkeeping for a single region while merging and filtering.
#[derive(Clone, Debug)]
struct Region {
    span_count: usize,
    id: u16,
    area_type: crate::AreaType,
    visited: bool,
    overlap: bool,
    /// Neighboring region ids in the order they appear around the region's outline.
    /// 0 stands for a solid edge.
    connections: Vec<u16>,
    /// Regions stacked above or below this one.
    floors: Vec<u16>,
}

impl Region {
    fn new(id: u16) -> Self {
        Self {
            span_count: 0,
            id,
            area_type: crate::AreaType::NOT_WALKABLE,
            visited: false,
            overlap: false,
            connections: Vec::new(),
            floors: Vec::new(),
        }
    }

    fn add_unique_floor_region(&mut self, floor: u16) {
        if !self.floors.contains(&floor) {
            self.floors.push(floor);
        }
    }

    fn is_connected_to_border(&self) -> bool {
        // Null region indicates border.
        self.connections.contains(&0)
    }

    fn can_merge_with(&self, other: &Region) -> bool {
        if self.area_type != other.area_type {
            return false;
        }
        let shared_edges = self
            .connections
            .iter()
            .filter(|&&connection| connection == other.id)
            .count();
        if shared_edges > 1 {
            return false;
        }
        !self.floors.contains(&other.id)
    }

    /// Merges `other` into `self` by splicing their outlines together at the shared edge.
    fn merge(&mut self, other: &mut Region) -> bool {
        let a_id = self.id;
        let b_id = other.id;

        // Duplicate current neighbourhood.
        let a_connections = self.connections.clone();
        let b_connections = &other.connections;

        // Find insertion point on A.
        let Some(ins_a) = a_connections.iter().position(|&c| c == b_id) else {
            return false;
        };
        // Find insertion point on B.
        let Some(ins_b) = b_connections.iter().position(|&c| c == a_id) else {
            return false;
        };

        // Merge neighbours.
        let ni = a_connections.len();
        let nj = b_connections.len();
        self.connections.clear();
        for i in 0..ni - 1 {
            self.connections.push(a_connections[(ins_a + 1 + i) % ni]);
        }
        for i in 0..nj - 1 {
            self.connections.push(b_connections[(ins_b + 1 + i) % nj]);
        }
        remove_adjacent_duplicates(&mut self.connections);

        for &floor in &other.floors {
            self.add_unique_floor_region(floor);
        }
        self.span_count += other.span_count;
        other.span_count = 0;
        other.connections.clear();
        true
    }

    fn replace_neighbor(&mut self, old_id: u16, new_id: u16) {
        let mut neighbor_changed = false;
        for connection in self.connections.iter_mut() {
            if *connection == old_id {
                *connection = new_id;
                neighbor_changed = true;
            }
        }
        for floor in self.floors.iter_mut() {
            if *floor == old_id {
                *floor = new_id;
            }
        }
        if neighbor_changed {
            remove_adjacent_duplicates(&mut self.connections);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        CompactHeightfield, compact_heightfield::tests::flat_heightfield, region::RegionId,
    };

    fn regions(size: u16, floor: impl Fn(u16, u16) -> Option<u16>) -> CompactHeightfield {
        let mut chf = flat_heightfield(size, floor).into_compact(2, 1).unwrap();
        chf.build_distance_field();
        chf
    }

    fn region_at(chf: &CompactHeightfield, x: u16, z: u16) -> RegionId {
        chf.spans[chf.cell_at(x, z).index() as usize].region
    }

    #[test]
    fn open_square_becomes_a_single_region() {
        let mut chf = regions(10, |_, _| Some(1));
        chf.build_regions(0, 0, 20).unwrap();
        assert_eq!(chf.max_region, RegionId::from(1));
        assert!(chf.spans.iter().all(|span| span.region == RegionId::from(1)));
    }

    #[test]
    fn disconnected_islands_get_separate_regions() {
        let mut chf = regions(9, |x, _| (x != 4).then_some(1));
        chf.build_regions(0, 0, 0).unwrap();
        let left = region_at(&chf, 1, 4);
        let right = region_at(&chf, 7, 4);
        assert!(left.is_walkable_region());
        assert!(right.is_walkable_region());
        assert_ne!(left, right);
        assert_eq!(chf.max_region, RegionId::from(2));
    }

    #[test]
    fn small_isolated_regions_are_removed() {
        // A 2x2 island next to a large open area.
        let mut chf = regions(12, |x, z| {
            let island = x >= 9 && z >= 9 && x <= 10 && z <= 10;
            let ground = x <= 6;
            (island || ground).then_some(1)
        });
        chf.build_regions(0, 8, 0).unwrap();
        assert_eq!(region_at(&chf, 9, 9), RegionId::NONE);
        assert!(region_at(&chf, 3, 3).is_walkable_region());
        assert_eq!(chf.max_region, RegionId::from(1));
    }

    #[test]
    fn border_regions_are_flagged() {
        let mut chf = regions(12, |_, _| Some(1));
        chf.build_regions(2, 0, 20).unwrap();
        assert_eq!(chf.border_size, 2);
        assert!(region_at(&chf, 0, 5).contains(RegionId::BORDER_REGION));
        assert!(region_at(&chf, 11, 5).contains(RegionId::BORDER_REGION));
        assert!(region_at(&chf, 5, 1).contains(RegionId::BORDER_REGION));
        let inner = region_at(&chf, 5, 5);
        assert!(inner.is_walkable_region());
        assert_eq!(chf.max_region, RegionId::from(1));
    }

    #[test]
    fn regions_are_compact_and_cover_every_walkable_span() {
        let mut chf = regions(16, |x, z| (!(6..10).contains(&x) || z < 3).then_some(1));
        chf.build_regions(0, 0, 0).unwrap();
        for span in &chf.spans {
            assert!(span.region.is_walkable_region());
            assert!(span.region.bits() <= chf.max_region.bits());
        }
    }
}
