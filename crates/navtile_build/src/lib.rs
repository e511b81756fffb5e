#![doc = include_str!("../../../readme.md")]

mod builder;
mod compact_cell;
mod compact_heightfield;
mod compact_span;
mod config;
mod contours;
mod detail_mesh;
mod erosion;
mod heightfield;
mod incremental;
mod mark_convex_poly_area;
pub(crate) mod math;
mod poly_mesh;
mod rasterize;
mod region;
mod span;
mod span_filter;
mod tile;
pub mod tiling;
mod trimesh;
mod watershed_build_regions;
mod watershed_distance_field;

pub use builder::{BuildError, GeneratedData, NavmeshBuilder};
pub use compact_cell::CompactCell;
pub use compact_heightfield::{CompactHeightfield, CompactHeightfieldError};
pub use compact_span::CompactSpan;
pub use config::{AgentSettings, BuildSettings, ConfigError, NavmeshConfig};
pub use contours::{
    BuildContoursFlags, Contour, ContourError, ContourSet, ContourVertex, RegionVertexId,
};
pub use detail_mesh::{DetailPolygonMesh, DetailPolygonMeshError};
pub use heightfield::{Heightfield, HeightfieldBuilder, HeightfieldBuilderError, SpanInsertionError};
pub use incremental::{
    InputGeometry, TileLayer, TiledBuild, TiledBuildError, TiledNavmesh, build_tiles,
};
pub use mark_convex_poly_area::ConvexVolume;
pub use navtile_data::Aabb3d;
pub use poly_mesh::{PolygonMesh, PolygonMeshError};
pub use region::{RegionError, RegionId};
pub use span::{AreaType, Span, SpanKey, Spans};
pub use tile::{TileBuildError, build_tile_data};
pub use trimesh::{TriMesh, TriMeshError};
