//! The [`NavmeshBuilder`] runs the whole build pipeline for one tile.

use std::time::Instant;

use glam::Vec3;
use navtile_data::TileDataError;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    AgentSettings, AreaType, BuildSettings, CompactHeightfield, CompactHeightfieldError,
    ConfigError, ContourError, ContourSet, DetailPolygonMesh, DetailPolygonMeshError,
    Heightfield, HeightfieldBuilder, HeightfieldBuilderError, NavmeshConfig, PolygonMesh,
    PolygonMeshError, RegionError, SpanInsertionError, TileBuildError, TriMesh, TriMeshError,
    build_tile_data, math::grid_to_world,
};

/// The output of [`NavmeshBuilder::build_navmesh`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GeneratedData {
    /// Whether the build succeeded. The other fields are empty if not.
    pub success: bool,
    /// The navmesh polygons as a triangle list in world space, for debug visualization.
    pub navmesh_vertices: Vec<Vec3>,
    /// The serialized tile, ready to be loaded into a navmesh.
    pub tile_data: Vec<u8>,
}

/// Builds navmesh tiles out of triangle geometry.
///
/// The intermediate results of the last build are kept around for inspection
/// until the next build or [`NavmeshBuilder::cleanup`].
#[derive(Debug, Default)]
pub struct NavmeshBuilder {
    settings: BuildSettings,
    agent: AgentSettings,
    heightfield: Option<Heightfield>,
    compact_heightfield: Option<CompactHeightfield>,
    contour_set: Option<ContourSet>,
    polygon_mesh: Option<PolygonMesh>,
    detail_mesh: Option<DetailPolygonMesh>,
}

impl NavmeshBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the settings used by the following builds.
    pub fn set_settings(&mut self, settings: BuildSettings) {
        self.settings = settings;
    }

    /// Sets the agent the following builds are made for.
    pub fn set_agent_settings(&mut self, agent: AgentSettings) {
        self.agent = agent;
    }

    /// The current build settings.
    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// The current agent settings.
    pub fn agent_settings(&self) -> &AgentSettings {
        &self.agent
    }

    /// Builds a navmesh tile out of a vertex buffer and a triangle list index buffer.
    ///
    /// Never fails: errors are logged and reported as [`GeneratedData::success`] being `false`.
    pub fn build_navmesh(&mut self, vertices: &[Vec3], indices: &[i32]) -> GeneratedData {
        match self.try_build(vertices, indices) {
            Ok(data) => data,
            Err(err) => {
                error!("Navmesh build failed: {err}");
                GeneratedData::default()
            }
        }
    }

    /// Builds a navmesh tile out of a vertex buffer and a triangle list index buffer.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that failed.
    pub fn try_build(
        &mut self,
        vertices: &[Vec3],
        indices: &[i32],
    ) -> Result<GeneratedData, BuildError> {
        self.cleanup();
        if vertices.is_empty() || indices.is_empty() {
            return Err(BuildError::EmptyInput);
        }
        let config = NavmeshConfig::derive(&self.settings, &self.agent)?;
        let total = Instant::now();

        // Voxelize the input geometry.
        let start = Instant::now();
        let mut trimesh = TriMesh::from_raw(vertices, indices)?;
        trimesh.mark_walkable_triangles(config.walkable_slope_angle);
        let mut heightfield = HeightfieldBuilder {
            aabb: config.aabb,
            cell_size: config.cell_size,
            cell_height: config.cell_height,
        }
        .build()?;
        if let Err(err) = heightfield.rasterize_triangles(&trimesh, config.walkable_climb) {
            self.heightfield = Some(heightfield);
            return Err(err.into());
        }
        debug!(
            "Rasterized {} triangles into {} spans in {:.2} ms",
            trimesh.indices.len(),
            heightfield.span_count(),
            elapsed_ms(start)
        );

        // Once all geometry is rasterized, we do initial pass of filtering to
        // remove unwanted overhangs caused by the conservative rasterization
        // as well as filter spans where the character cannot possibly stand.
        let start = Instant::now();
        heightfield.filter_low_hanging_walkable_obstacles(config.walkable_climb);
        heightfield.filter_ledge_spans(config.walkable_height, config.walkable_climb);
        heightfield.filter_walkable_low_height_spans(config.walkable_height);
        debug!("Filtered spans in {:.2} ms", elapsed_ms(start));

        // Compact the heightfield so that it is faster to handle from now on.
        // This will result in more cache coherent data as well as the neighbours
        // between walkable cells will be calculated.
        let start = Instant::now();
        let mut chf = heightfield.into_compact(config.walkable_height, config.walkable_climb)?;
        debug!(
            "Compacted heightfield to {} spans in {:.2} ms",
            chf.span_count(),
            elapsed_ms(start)
        );

        // Erode the walkable area by agent radius.
        let start = Instant::now();
        chf.erode_walkable_area(config.walkable_radius);
        chf.mark_box_area(config.aabb, AreaType(1));
        for volume in &config.area_volumes {
            chf.mark_convex_poly_area(volume);
        }
        debug!("Eroded and marked areas in {:.2} ms", elapsed_ms(start));

        // Partition the walkable surface into simple regions without holes.
        let start = Instant::now();
        chf.build_distance_field();
        let regions = chf.build_regions(
            config.border_size,
            config.min_region_area,
            config.merge_region_area,
        );
        debug!(
            "Partitioned into {} regions in {:.2} ms",
            chf.max_region.bits(),
            elapsed_ms(start)
        );
        let chf = self.compact_heightfield.insert(chf);
        regions?;

        // Trace and simplify region contours.
        let start = Instant::now();
        let contours = chf.build_contours(
            config.max_simplification_error,
            config.max_edge_len,
            config.contour_flags,
        )?;
        debug!(
            "Traced {} contours in {:.2} ms",
            contours.contours.len(),
            elapsed_ms(start)
        );
        let contours = self.contour_set.insert(contours);

        // Build polygon navmesh from the contours.
        let start = Instant::now();
        let mut mesh = contours
            .clone()
            .into_polygon_mesh(config.max_vertices_per_polygon)?;
        mesh.flags.fill(1);
        debug!(
            "Built {} polygons out of {} vertices in {:.2} ms",
            mesh.polygon_count(),
            mesh.vertices.len(),
            elapsed_ms(start)
        );
        let mesh = self.polygon_mesh.insert(mesh);

        // Create detail mesh which allows to access approximate height on each polygon.
        let start = Instant::now();
        let detail = DetailPolygonMesh::new(
            mesh,
            chf,
            config.detail_sample_dist,
            config.detail_sample_max_error,
        )?;
        debug!(
            "Built {} detail triangles in {:.2} ms",
            detail.triangles.len(),
            elapsed_ms(start)
        );
        let detail = self.detail_mesh.insert(detail);

        let tile = build_tile_data(mesh, detail, &config, config.tile_position)?;
        let tile_data = tile.to_bytes()?;
        let navmesh_vertices = debug_triangles(mesh);

        info!(
            "Built navmesh tile {} with {} polygons ({} bytes) in {:.2} ms",
            config.tile_position,
            mesh.polygon_count(),
            tile_data.len(),
            elapsed_ms(total)
        );
        Ok(GeneratedData {
            success: true,
            navmesh_vertices,
            tile_data,
        })
    }

    /// Drops all intermediate results of the last build.
    pub fn cleanup(&mut self) {
        self.heightfield = None;
        self.compact_heightfield = None;
        self.contour_set = None;
        self.polygon_mesh = None;
        self.detail_mesh = None;
    }

    /// The heightfield of the last build.
    ///
    /// Compaction consumes the heightfield, so this is only available
    /// when the last build failed while rasterizing.
    pub fn heightfield(&self) -> Option<&Heightfield> {
        self.heightfield.as_ref()
    }

    /// The compact heightfield of the last build, with regions assigned.
    pub fn compact_heightfield(&self) -> Option<&CompactHeightfield> {
        self.compact_heightfield.as_ref()
    }

    /// The contours of the last build.
    pub fn contour_set(&self) -> Option<&ContourSet> {
        self.contour_set.as_ref()
    }

    /// The polygon mesh of the last build.
    pub fn polygon_mesh(&self) -> Option<&PolygonMesh> {
        self.polygon_mesh.as_ref()
    }

    /// The detail mesh of the last build.
    pub fn detail_mesh(&self) -> Option<&DetailPolygonMesh> {
        self.detail_mesh.as_ref()
    }
}

/// Fan-triangulates the polygons of `mesh` into a world space triangle list.
fn debug_triangles(mesh: &PolygonMesh) -> Vec<Vec3> {
    let cs = mesh.cell_size;
    let ch = mesh.cell_height;
    let origin = mesh.aabb.min;
    let to_world = |v: u16| {
        let v = mesh.vertices[v as usize];
        grid_to_world(origin, v.as_vec3() + Vec3::Y, cs, ch)
    };
    (0..mesh.polygon_count())
        .flat_map(|i| {
            let polygon = mesh.polygon(i);
            (2..polygon.len()).flat_map(move |j| [polygon[0], polygon[j - 1], polygon[j]])
        })
        .map(to_world)
        .collect()
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Errors that can occur when building a navmesh with [`NavmeshBuilder::try_build`].
#[derive(Error, Debug)]
pub enum BuildError {
    /// No vertices or no indices were given.
    #[error("Input geometry is empty")]
    EmptyInput,
    /// The settings are invalid.
    #[error("Invalid settings: {0}")]
    Config(#[from] ConfigError),
    /// The input geometry is malformed.
    #[error("Invalid input geometry: {0}")]
    TriMesh(#[from] TriMeshError),
    /// The heightfield could not be allocated.
    #[error("Failed to build heightfield: {0}")]
    Heightfield(#[from] HeightfieldBuilderError),
    /// Rasterization failed.
    #[error("Failed to rasterize triangles: {0}")]
    SpanInsertion(#[from] SpanInsertionError),
    /// Compaction failed.
    #[error("Failed to compact heightfield: {0}")]
    CompactHeightfield(#[from] CompactHeightfieldError),
    /// Region partitioning failed.
    #[error("Failed to build regions: {0}")]
    Region(#[from] RegionError),
    /// Contour tracing failed.
    #[error("Failed to build contours: {0}")]
    Contour(#[from] ContourError),
    /// Polygonization failed.
    #[error("Failed to build polygon mesh: {0}")]
    PolygonMesh(#[from] PolygonMeshError),
    /// Detail mesh generation failed.
    #[error("Failed to build detail mesh: {0}")]
    DetailPolygonMesh(#[from] DetailPolygonMeshError),
    /// The tile could not be assembled.
    #[error("Failed to build tile: {0}")]
    TileBuild(#[from] TileBuildError),
    /// The tile could not be serialized.
    #[error("Failed to serialize tile: {0}")]
    TileData(#[from] TileDataError),
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::Aabb3d;

    fn plane(size: f32) -> (Vec<Vec3>, Vec<i32>) {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, size),
            Vec3::new(size, 0.0, size),
            Vec3::new(size, 0.0, 0.0),
        ];
        (vertices, vec![0, 1, 2, 0, 2, 3])
    }

    fn builder(size: f32) -> NavmeshBuilder {
        let mut builder = NavmeshBuilder::new();
        builder.set_settings(BuildSettings {
            aabb: Aabb3d::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(size, 1.0, size)),
            cell_size: 0.25,
            cell_height: 0.2,
            ..Default::default()
        });
        builder
    }

    #[test]
    fn flat_plane_builds() {
        let (vertices, indices) = plane(5.0);
        let mut builder = builder(5.0);
        let data = builder.build_navmesh(&vertices, &indices);
        assert!(data.success);
        assert!(!data.tile_data.is_empty());
        assert!(!data.navmesh_vertices.is_empty());
        assert_eq!(data.navmesh_vertices.len() % 3, 0);

        let mesh = builder.polygon_mesh().unwrap();
        assert!(mesh.polygon_count() > 0);
        assert!(mesh.flags.iter().all(|&flags| flags == 1));
        assert!(mesh.areas.iter().all(|&area| area == AreaType(1)));
        assert!(builder.compact_heightfield().is_some());
        assert!(builder.contour_set().is_some());
        assert!(builder.detail_mesh().is_some());
    }

    #[test]
    fn debug_vertices_respect_the_agent_radius() {
        let (vertices, indices) = plane(5.0);
        let mut builder = builder(5.0);
        let data = builder.build_navmesh(&vertices, &indices);
        assert!(data.success);
        let radius = builder.agent_settings().radius;
        let cs = builder.settings().cell_size;
        for v in &data.navmesh_vertices {
            assert!(v.x >= radius - cs && v.x <= 5.0 - radius + cs, "{v}");
            assert!(v.z >= radius - cs && v.z <= 5.0 - radius + cs, "{v}");
        }
    }

    #[test]
    fn empty_input_fails_without_allocating() {
        let (vertices, indices) = plane(5.0);
        let mut builder = builder(5.0);
        assert!(!builder.build_navmesh(&[], &indices).success);
        assert!(!builder.build_navmesh(&vertices, &[]).success);
        assert!(builder.heightfield().is_none());
        assert!(builder.compact_heightfield().is_none());
        assert!(matches!(
            builder.try_build(&vertices, &[]),
            Err(BuildError::EmptyInput)
        ));
    }

    #[test]
    fn invalid_settings_fail() {
        let (vertices, indices) = plane(5.0);
        let mut builder = builder(5.0);
        builder.set_settings(BuildSettings {
            cell_size: 0.0,
            ..builder.settings().clone()
        });
        let data = builder.build_navmesh(&vertices, &indices);
        assert_eq!(data, GeneratedData::default());
        assert!(matches!(
            builder.try_build(&vertices, &indices),
            Err(BuildError::Config(ConfigError::InvalidCellSize { .. }))
        ));
    }

    #[test]
    fn malformed_indices_fail() {
        let (vertices, _) = plane(5.0);
        let mut builder = builder(5.0);
        assert!(matches!(
            builder.try_build(&vertices, &[0, 1, 7]),
            Err(BuildError::TriMesh(TriMeshError::IndexOutOfBounds { index: 7, .. }))
        ));
        assert!(!builder.build_navmesh(&vertices, &[0, 1]).success);
    }

    #[test]
    fn cleanup_drops_intermediates() {
        let (vertices, indices) = plane(5.0);
        let mut builder = builder(5.0);
        assert!(builder.build_navmesh(&vertices, &indices).success);
        builder.cleanup();
        assert!(builder.compact_heightfield().is_none());
        assert!(builder.contour_set().is_none());
        assert!(builder.polygon_mesh().is_none());
        assert!(builder.detail_mesh().is_none());
    }
}
