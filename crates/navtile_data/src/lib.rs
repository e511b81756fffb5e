#![doc = include_str!("../../../readme.md")]

mod aabb;
mod serialization;
mod tile;

pub use aabb::Aabb3d;
pub use serialization::{TILE_FORMAT_VERSION, TILE_MAGIC, TileDataError};
pub use tile::{
    BvNode, DetailSubMesh, DetailTriangle, EdgeLink, TileData, TileHeader, TilePolygon, TileSide,
    TileValidationError,
};
