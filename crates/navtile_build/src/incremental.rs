//! Builds every tile of a level and rebuilds only the tiles touched by later changes.
//!
//! A [`TiledNavmesh`] remembers what it was built from: a hash of the build settings,
//! a hash and the bounds of every [`InputGeometry`] and the bounding boxes that selected
//! the tiles. [`TiledNavmesh::rebuild`] compares the new inputs against that and only
//! rebuilds the tiles overlapped by what changed, carrying all other tiles over.

use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};

use glam::{IVec2, Vec3};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    Aabb3d, AgentSettings, BuildError, BuildSettings, ConfigError, GeneratedData, NavmeshBuilder,
    NavmeshConfig, TileBuildError, TriMesh, TriMeshError, tiling,
};

/// Builds all non-empty tiles overlapped by `bounds` for a single agent.
///
/// Tiles without any walkable polygon are left out of the returned map.
///
/// # Errors
///
/// Returns an error if the settings are not tiled or invalid for `agent`, or the
/// geometry is malformed.
pub fn build_tiles(
    settings: &BuildSettings,
    agent: &AgentSettings,
    vertices: &[Vec3],
    indices: &[i32],
    bounds: &[Aabb3d],
) -> Result<HashMap<IVec2, GeneratedData>, TiledBuildError> {
    let input = InputGeometry {
        id: 0,
        vertices: vertices.to_vec(),
        indices: indices.to_vec(),
    };
    let build = TiledNavmesh::build(settings, &[*agent], &[input], bounds)?;
    Ok(build
        .navmesh
        .layers
        .into_iter()
        .next()
        .map(|layer| layer.tiles)
        .unwrap_or_default())
}

/// A piece of input geometry, identified so that rebuilds can tell what changed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputGeometry {
    /// Identifies this geometry across builds. Must be unique within one build.
    pub id: u64,
    /// The vertex positions in world space.
    pub vertices: Vec<Vec3>,
    /// The triangle list indices into [`Self::vertices`].
    pub indices: Vec<i32>,
}

impl InputGeometry {
    fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for vertex in &self.vertices {
            vertex.to_array().map(f32::to_bits).hash(&mut hasher);
        }
        self.indices.hash(&mut hasher);
        hasher.finish()
    }
}

/// What a [`TiledNavmesh`] remembers about an [`InputGeometry`].
#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedInput {
    hash: u64,
    bounds: Option<Aabb3d>,
}

/// The tiles built for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    agent: AgentSettings,
    tiles: HashMap<IVec2, GeneratedData>,
}

impl TileLayer {
    /// The agent these tiles were built for.
    pub fn agent(&self) -> &AgentSettings {
        &self.agent
    }

    /// All non-empty tiles by coordinate.
    pub fn tiles(&self) -> &HashMap<IVec2, GeneratedData> {
        &self.tiles
    }

    /// The tile at `coord`, if it has any polygons.
    pub fn tile(&self, coord: IVec2) -> Option<&GeneratedData> {
        self.tiles.get(&coord)
    }
}

/// The tiles of a level, one [`TileLayer`] per agent, together with what they were built from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TiledNavmesh {
    settings_hash: u64,
    inputs: HashMap<u64, CachedInput>,
    bounding_boxes: Vec<Aabb3d>,
    layers: Vec<TileLayer>,
}

/// The result of [`TiledNavmesh::build`] and [`TiledNavmesh::rebuild`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TiledBuild {
    /// The new tiles.
    pub navmesh: TiledNavmesh,
    /// The `(layer, coord)` pairs whose tiles were built in this pass.
    pub updated: Vec<(usize, IVec2)>,
    /// The `(layer, coord)` pairs of tiles of the previous build that no longer exist.
    pub removed: Vec<(usize, IVec2)>,
}

impl TiledNavmesh {
    /// Builds all tiles overlapped by `bounds`, one layer per agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are not tiled or invalid for an agent,
    /// or an input is malformed or not uniquely identified.
    pub fn build(
        settings: &BuildSettings,
        agents: &[AgentSettings],
        inputs: &[InputGeometry],
        bounds: &[Aabb3d],
    ) -> Result<TiledBuild, TiledBuildError> {
        build_layers(None, settings, agents, inputs, bounds)
    }

    /// Rebuilds the tiles affected by changes since the build that produced `self`.
    ///
    /// A tile is rebuilt when it is overlapped by an input that was added, removed or changed,
    /// or by a bounding box that was added or removed. Changed build settings rebuild everything,
    /// a changed agent rebuilds its layer.
    ///
    /// # Errors
    ///
    /// See [`TiledNavmesh::build`].
    pub fn rebuild(
        &self,
        settings: &BuildSettings,
        agents: &[AgentSettings],
        inputs: &[InputGeometry],
        bounds: &[Aabb3d],
    ) -> Result<TiledBuild, TiledBuildError> {
        build_layers(Some(self), settings, agents, inputs, bounds)
    }

    /// The tile layers, in the order of the agents they were built for.
    pub fn layers(&self) -> &[TileLayer] {
        &self.layers
    }

    /// The number of tiles over all layers.
    pub fn tile_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.tiles.len()).sum()
    }
}

fn build_layers(
    previous: Option<&TiledNavmesh>,
    settings: &BuildSettings,
    agents: &[AgentSettings],
    inputs: &[InputGeometry],
    bounds: &[Aabb3d],
) -> Result<TiledBuild, TiledBuildError> {
    if settings.tile_size == 0 {
        return Err(TiledBuildError::NotTiled);
    }
    let Some(total_bounds) = merge_bounds(bounds.iter().copied()) else {
        return Ok(TiledBuild {
            removed: previous.map(all_tiles).unwrap_or_default(),
            ..Default::default()
        });
    };
    let check = BuildSettings {
        aabb: total_bounds,
        ..settings.clone()
    };
    for agent in agents {
        NavmeshConfig::derive(&check, agent)?;
    }

    let mut cached_inputs = HashMap::with_capacity(inputs.len());
    for input in inputs {
        TriMesh::from_raw(&input.vertices, &input.indices)
            .map_err(|source| TiledBuildError::Input { id: input.id, source })?;
        let cached = CachedInput {
            hash: input.content_hash(),
            bounds: Aabb3d::from_verts(&input.vertices),
        };
        if cached_inputs.insert(input.id, cached).is_some() {
            return Err(TiledBuildError::DuplicateInput { id: input.id });
        }
    }

    let settings_hash = settings_hash(settings);
    let reusable = previous.filter(|previous| previous.settings_hash == settings_hash);
    let dirty = reusable
        .map(|previous| dirty_tiles(settings, previous, &cached_inputs, bounds))
        .unwrap_or_default();
    let all: Vec<IVec2> = bounds
        .iter()
        .flat_map(|b| tiling::overlapping_tiles(settings, *b))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let mut layers = Vec::with_capacity(agents.len());
    let mut jobs = Vec::new();
    for (index, agent) in agents.iter().enumerate() {
        let kept = reusable
            .and_then(|previous| previous.layers.get(index))
            .filter(|layer| layer.agent == *agent);
        let coords = if kept.is_some() { &dirty } else { &all };
        jobs.extend(coords.iter().map(|&coord| (index, coord)));
        layers.push(TileLayer {
            agent: *agent,
            tiles: kept.map(|layer| layer.tiles.clone()).unwrap_or_default(),
        });
    }
    jobs.sort_by_key(tile_order);

    let (vertices, indices) = merge_inputs(inputs);
    let build = |&(layer, coord): &(usize, IVec2)| {
        let tile = build_tile(settings, &agents[layer], coord, bounds, &vertices, &indices);
        ((layer, coord), tile)
    };
    #[cfg(feature = "parallel")]
    let built: Vec<_> = jobs.par_iter().map(build).collect();
    #[cfg(not(feature = "parallel"))]
    let built: Vec<_> = jobs.iter().map(build).collect();

    let mut updated = Vec::new();
    for ((layer, coord), tile) in built {
        let tiles = &mut layers[layer].tiles;
        match tile {
            Some(tile) => {
                tiles.insert(coord, tile);
                updated.push((layer, coord));
            }
            None => {
                tiles.remove(&coord);
            }
        }
    }

    let navmesh = TiledNavmesh {
        settings_hash,
        inputs: cached_inputs,
        bounding_boxes: bounds.to_vec(),
        layers,
    };
    let removed: Vec<_> = previous
        .map(all_tiles)
        .unwrap_or_default()
        .into_iter()
        .filter(|&(layer, coord)| {
            navmesh
                .layers
                .get(layer)
                .is_none_or(|layer| !layer.tiles.contains_key(&coord))
        })
        .collect();

    info!(
        "Built {} of {} tiles in {} layers, {} tiles removed",
        updated.len(),
        navmesh.tile_count(),
        navmesh.layers.len(),
        removed.len()
    );
    Ok(TiledBuild {
        navmesh,
        updated,
        removed,
    })
}

/// The tiles overlapped by inputs and bounding boxes that differ from `previous`.
fn dirty_tiles(
    settings: &BuildSettings,
    previous: &TiledNavmesh,
    inputs: &HashMap<u64, CachedInput>,
    bounds: &[Aabb3d],
) -> Vec<IVec2> {
    let mut dirty = HashSet::new();
    let mut mark = |aabb: Option<Aabb3d>| {
        if let Some(aabb) = aabb {
            dirty.extend(tiling::overlapping_tiles(settings, aabb));
        }
    };

    for (id, input) in inputs {
        match previous.inputs.get(id) {
            Some(old) if old.hash == input.hash => {}
            Some(old) => {
                mark(old.bounds);
                mark(input.bounds);
            }
            None => mark(input.bounds),
        }
    }
    for (id, old) in &previous.inputs {
        if !inputs.contains_key(id) {
            mark(old.bounds);
        }
    }
    for aabb in bounds {
        if !previous.bounding_boxes.contains(aabb) {
            mark(Some(*aabb));
        }
    }
    for aabb in &previous.bounding_boxes {
        if !bounds.contains(aabb) {
            mark(Some(*aabb));
        }
    }
    dirty.into_iter().collect()
}

/// Builds a single tile. Returns `None` for tiles that have no polygons or fail to build.
fn build_tile(
    settings: &BuildSettings,
    agent: &AgentSettings,
    coord: IVec2,
    bounds: &[Aabb3d],
    vertices: &[Vec3],
    indices: &[i32],
) -> Option<GeneratedData> {
    let tile = tiling::tile_bounds(settings, coord, 0.0..0.0);
    // The tile spans the heights of all bounding boxes it overlaps.
    let overlapping = bounds.iter().copied().filter(|b| overlaps_xz(b, &tile));
    let Some(height) = merge_bounds(overlapping) else {
        debug!("Tile {coord} is outside of all bounding boxes");
        return None;
    };

    let mut builder = NavmeshBuilder::new();
    builder.set_settings(BuildSettings {
        aabb: Aabb3d::new(
            Vec3::new(tile.min.x, height.min.y, tile.min.z),
            Vec3::new(tile.max.x, height.max.y, tile.max.z),
        ),
        tile_position: coord,
        ..settings.clone()
    });
    builder.set_agent_settings(*agent);
    match builder.try_build(vertices, indices) {
        Ok(data) => Some(data),
        Err(BuildError::TileBuild(TileBuildError::NoPolygons) | BuildError::EmptyInput) => {
            debug!("Tile {coord} is empty");
            None
        }
        Err(err) => {
            warn!("Skipping tile {coord}: {err}");
            None
        }
    }
}

fn overlaps_xz(a: &Aabb3d, b: &Aabb3d) -> bool {
    a.min.x < b.max.x && a.max.x > b.min.x && a.min.z < b.max.z && a.max.z > b.min.z
}

fn merge_bounds(bounds: impl IntoIterator<Item = Aabb3d>) -> Option<Aabb3d> {
    bounds.into_iter().reduce(|a, b| Aabb3d {
        min: a.min.min(b.min),
        max: a.max.max(b.max),
    })
}

/// Appends all inputs into a single vertex and index buffer.
fn merge_inputs(inputs: &[InputGeometry]) -> (Vec<Vec3>, Vec<i32>) {
    let mut vertices = Vec::with_capacity(inputs.iter().map(|i| i.vertices.len()).sum());
    let mut indices = Vec::with_capacity(inputs.iter().map(|i| i.indices.len()).sum());
    for input in inputs {
        let offset = vertices.len() as i32;
        vertices.extend_from_slice(&input.vertices);
        indices.extend(input.indices.iter().map(|&i| i + offset));
    }
    (vertices, indices)
}

/// All `(layer, coord)` pairs of `navmesh`, ordered by layer then row.
fn all_tiles(navmesh: &TiledNavmesh) -> Vec<(usize, IVec2)> {
    let mut tiles: Vec<_> = navmesh
        .layers
        .iter()
        .enumerate()
        .flat_map(|(index, layer)| layer.tiles.keys().map(move |&coord| (index, coord)))
        .collect();
    tiles.sort_by_key(tile_order);
    tiles
}

fn tile_order(&(layer, coord): &(usize, IVec2)) -> (usize, i32, i32) {
    (layer, coord.y, coord.x)
}

/// Hashes every setting that changes the tiles. The bounds and the tile position are
/// chosen per tile, so they are left out.
fn settings_hash(settings: &BuildSettings) -> u64 {
    let BuildSettings {
        aabb: _,
        cell_size,
        cell_height,
        tile_size,
        tile_position: _,
        region_min_size,
        region_merge_size,
        edge_max_len,
        edge_max_error,
        detail_sample_dist,
        detail_sample_max_error,
        max_vertices_per_polygon,
        contour_flags,
        area_volumes,
    } = settings;

    let mut hasher = DefaultHasher::new();
    for value in [
        cell_size,
        cell_height,
        region_min_size,
        region_merge_size,
        edge_max_len,
        edge_max_error,
        detail_sample_dist,
        detail_sample_max_error,
    ] {
        value.to_bits().hash(&mut hasher);
    }
    tile_size.hash(&mut hasher);
    max_vertices_per_polygon.hash(&mut hasher);
    contour_flags.hash(&mut hasher);
    for volume in area_volumes {
        for vertex in &volume.vertices {
            vertex.to_array().map(f32::to_bits).hash(&mut hasher);
        }
        volume.min_y.to_bits().hash(&mut hasher);
        volume.max_y.to_bits().hash(&mut hasher);
        volume.area.hash(&mut hasher);
    }
    hasher.finish()
}

/// Errors returned by [`TiledNavmesh::build`], [`TiledNavmesh::rebuild`] and [`build_tiles`].
#[derive(Error, Debug)]
pub enum TiledBuildError {
    /// The settings have a tile size of zero.
    #[error("Tiled builds need a tile size greater than zero")]
    NotTiled,
    /// The settings are invalid for one of the agents.
    #[error("Invalid settings: {0}")]
    Config(#[from] ConfigError),
    /// An input has malformed indices.
    #[error("Invalid input geometry {id}: {source}")]
    Input {
        /// The id of the offending input
        id: u64,
        /// What is wrong with it
        source: TriMeshError,
    },
    /// Two inputs share an id.
    #[error("Input geometry {id} was given more than once")]
    DuplicateInput {
        /// The shared id
        id: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BuildSettings {
        BuildSettings {
            cell_size: 0.2,
            tile_size: 25,
            ..Default::default()
        }
    }

    #[test]
    fn settings_hash_ignores_per_tile_fields() {
        let base = settings();
        let moved = BuildSettings {
            aabb: Aabb3d::new(Vec3::ZERO, Vec3::ONE),
            tile_position: IVec2::new(3, -2),
            ..settings()
        };
        assert_eq!(settings_hash(&base), settings_hash(&moved));

        let finer = BuildSettings {
            cell_height: 0.1,
            ..settings()
        };
        assert_ne!(settings_hash(&base), settings_hash(&finer));
    }

    #[test]
    fn merged_inputs_offset_their_indices() {
        let triangle = |id| InputGeometry {
            id,
            vertices: vec![Vec3::ZERO, Vec3::Z, Vec3::X],
            indices: vec![0, 1, 2],
        };
        let (vertices, indices) = merge_inputs(&[triangle(0), triangle(1)]);
        assert_eq!(vertices.len(), 6);
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn changed_inputs_mark_old_and_new_tiles() {
        let settings = settings();
        let cached = |hash, min: f32, max: f32| CachedInput {
            hash,
            bounds: Some(Aabb3d::new(Vec3::new(min, 0.0, 1.0), Vec3::new(max, 1.0, 2.0))),
        };
        let previous = TiledNavmesh {
            settings_hash: settings_hash(&settings),
            inputs: HashMap::from([(0, cached(1, 1.0, 2.0)), (1, cached(2, 6.0, 7.0))]),
            ..Default::default()
        };

        // Input 0 is unchanged, input 1 moved from tile 1 to tile 3.
        let inputs = HashMap::from([(0, cached(1, 1.0, 2.0)), (1, cached(3, 16.0, 17.0))]);
        let mut dirty = dirty_tiles(&settings, &previous, &inputs, &[]);
        dirty.sort_by_key(|c| c.x);
        assert_eq!(dirty, vec![IVec2::new(1, 0), IVec2::new(3, 0)]);

        // Input 1 was removed.
        let inputs = HashMap::from([(0, cached(1, 1.0, 2.0))]);
        assert_eq!(
            dirty_tiles(&settings, &previous, &inputs, &[]),
            vec![IVec2::new(1, 0)]
        );
    }

    #[test]
    fn untiled_settings_are_rejected() {
        let result = TiledNavmesh::build(
            &BuildSettings::default(),
            &[AgentSettings::default()],
            &[],
            &[Aabb3d::new(Vec3::ZERO, Vec3::ONE)],
        );
        assert!(matches!(result, Err(TiledBuildError::NotTiled)));
    }

    #[test]
    fn duplicate_inputs_are_rejected() {
        let input = InputGeometry {
            id: 7,
            vertices: vec![Vec3::ZERO, Vec3::Z, Vec3::X],
            indices: vec![0, 1, 2],
        };
        let result = TiledNavmesh::build(
            &settings(),
            &[AgentSettings::default()],
            &[input.clone(), input],
            &[Aabb3d::new(Vec3::new(0.0, -1.0, 0.0), Vec3::ONE)],
        );
        assert!(matches!(
            result,
            Err(TiledBuildError::DuplicateInput { id: 7 })
        ));
    }

    #[test]
    fn malformed_inputs_name_their_id() {
        let input = InputGeometry {
            id: 3,
            vertices: vec![Vec3::ZERO],
            indices: vec![0, 1, 2],
        };
        let result = TiledNavmesh::build(
            &settings(),
            &[AgentSettings::default()],
            &[input],
            &[Aabb3d::new(Vec3::new(0.0, -1.0, 0.0), Vec3::ONE)],
        );
        assert!(matches!(result, Err(TiledBuildError::Input { id: 3, .. })));
    }
}
