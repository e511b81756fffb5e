#![doc = include_str!("../../../readme.md")]

mod math;
mod navmesh;
mod query;

pub use navmesh::{Link, MeshTile, Navmesh, NavmeshError, PolyRef, TileKey};
pub use navtile_data::{TileData, TileDataError, TileValidationError};
pub use query::{NavmeshQuery, PathfindQuery, PathfindResult, RaycastQuery, RaycastResult};
