//! Build configuration.
//!
//! [`BuildSettings`] and [`AgentSettings`] are given in world units and are what users edit.
//! [`NavmeshConfig::derive`] turns them into the voxel-unit [`NavmeshConfig`] the build stages consume.

use glam::IVec2;
use thiserror::Error;

use crate::{Aabb3d, BuildContoursFlags, ConvexVolume, PolygonMesh, tiling};

/// Settings of a single navmesh build, mostly in world units.
///
/// The defaults are reasonable for an agent resembling an adult human in a world measured in meters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct BuildSettings {
    /// The world space bounds of the input geometry to voxelize. `[Units: wu]`
    ///
    /// For tiled builds this is only used for the vertical range of each tile.
    pub aabb: Aabb3d,

    /// The xz-plane cell size to use for fields. `[Limit: > 0] [Units: wu]`
    ///
    /// A recommended starting value is either r/2 or r/3, where r is the agent radius.
    /// Smaller values increase navmesh detail, but generation time grows quickly.
    /// Use as large a value as you can get away with.
    pub cell_size: f32,

    /// The y-axis cell size to use for fields. `[Limit: > 0] [Units: wu]`
    ///
    /// A good starting point is half of [`Self::cell_size`]. Lower it if curbs or stairs
    /// leave holes in the navmesh.
    pub cell_height: f32,

    /// The width and depth of a tile on the xz-plane. `[Limit: >= 0] [Units: vx]`
    ///
    /// Zero builds the whole [`Self::aabb`] as a single untiled mesh.
    pub tile_size: u16,

    /// The coordinate of the tile to build. Ignored when [`Self::tile_size`] is zero.
    pub tile_position: IVec2,

    /// The minimum size of isolated islands that are kept. `[Limit: >= 0] [Units: vx]`
    ///
    /// A region is removed if its span count is less than the square of this value.
    pub region_min_size: f32,

    /// Regions with a span count smaller than the square of this value will, if possible,
    /// be merged with larger regions. `[Limit: >= 0] [Units: vx]`
    pub region_merge_size: f32,

    /// The maximum allowed length for contour edges along the border of the mesh. `[Limit: >= 0] [Units: wu]`
    ///
    /// Long outer edges can result in long thin triangles. Zero disables edge splitting.
    pub edge_max_len: f32,

    /// The maximum distance a simplified contour's border edges may deviate
    /// from the raw contour. `[Limit: >= 0] [Units: vx]`
    ///
    /// Good values lie in `[1.1, 1.5]`. Only applies to the xz-plane.
    pub edge_max_error: f32,

    /// The sampling distance to use when generating the detail mesh. `[Limits: 0 or >= 0.9] [Units: multiples of cell size]`
    pub detail_sample_dist: f32,

    /// The maximum distance the detail mesh surface may deviate from the heightfield.
    /// `[Limit: >= 0] [Units: multiples of cell height]`
    pub detail_sample_max_error: f32,

    /// The maximum number of vertices of a polygon. `[Limit: 3..=6]`
    pub max_vertices_per_polygon: u8,

    /// Flags controlling contour tessellation.
    pub contour_flags: BuildContoursFlags,

    /// Volumes whose spans get a specific area type after erosion.
    pub area_volumes: Vec<ConvexVolume>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            aabb: Aabb3d::default(),
            cell_size: 0.3,
            cell_height: 0.2,
            tile_size: 0,
            tile_position: IVec2::ZERO,
            region_min_size: 0.1,
            region_merge_size: 20.0,
            edge_max_len: 12.0,
            edge_max_error: 1.3,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            max_vertices_per_polygon: 6,
            contour_flags: BuildContoursFlags::default(),
            area_volumes: Vec::new(),
        }
    }
}

/// The physical dimensions of the agent the navmesh is built for, in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct AgentSettings {
    /// The height of the agent. `[Limit: > 0] [Units: wu]`
    ///
    /// Adding some padding is a good idea: an agent 1.8 units tall might use 2.0.
    pub height: f32,
    /// The radius of the agent. The walkable area is eroded by this much. `[Limit: >= 0] [Units: wu]`
    pub radius: f32,
    /// The highest ledge or step the agent can walk up. `[Limit: >= 0] [Units: wu]`
    pub max_climb: f32,
    /// The steepest walkable slope. `[Limits: 0 <= value < 90] [Units: degrees]`
    pub max_slope: f32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            height: 1.0,
            radius: 0.5,
            max_climb: 0.25,
            max_slope: 45.0,
        }
    }
}

/// The configuration the build stages consume, derived from [`BuildSettings`] and [`AgentSettings`]
/// by [`NavmeshConfig::derive`].
///
/// Units are voxels (vx) or world units (wu). Voxel units are based on
/// [`Self::cell_size`] on the xz-plane and [`Self::cell_height`] along the y-axis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshConfig {
    /// The width of the field along the x-axis, border included. `[Units: vx]`
    pub width: u16,
    /// The height of the field along the z-axis, border included. `[Units: vx]`
    pub height: u16,
    /// The width/height size of tiles on the xz-plane, zero when untiled. `[Units: vx]`
    pub tile_size: u16,
    /// The coordinate of the tile being built.
    pub tile_position: IVec2,
    /// The size of the non-navigable border around the heightfield. `[Units: vx]`
    ///
    /// Tiles are voxelized with this much padding so that erosion and region
    /// partitioning see the geometry of their neighbors.
    pub border_size: u16,
    /// The xz-plane cell size. `[Units: wu]`
    pub cell_size: f32,
    /// The y-axis cell size. `[Units: wu]`
    pub cell_height: f32,
    /// The bounds of the field, border included. `[Units: wu]`
    pub aabb: Aabb3d,
    /// The agent the field is built for.
    pub agent: AgentSettings,
    /// The maximum walkable slope. `[Units: radians]`
    pub walkable_slope_angle: f32,
    /// Minimum floor to ceiling height that is still walkable. `[Limit: >= 3] [Units: vx]`
    pub walkable_height: u16,
    /// Maximum ledge height that is still traversable. `[Units: vx]`
    pub walkable_climb: u16,
    /// The distance to erode the walkable area away from obstructions. `[Units: vx]`
    pub walkable_radius: u16,
    /// The maximum length of contour edges along the border of the mesh. `[Units: vx]`
    pub max_edge_len: u16,
    /// The maximum deviation of simplified contours from the raw contours. `[Units: vx]`
    pub max_simplification_error: f32,
    /// Regions with fewer spans than this are removed. `[Units: vx]`
    pub min_region_area: u16,
    /// Regions with fewer spans than this are merged into neighbors if possible. `[Units: vx]`
    pub merge_region_area: u16,
    /// The maximum number of vertices per polygon. `[Limit: 3..=6]`
    pub max_vertices_per_polygon: usize,
    /// The detail mesh sampling distance, zero disables sampling. `[Units: wu]`
    pub detail_sample_dist: f32,
    /// The maximum deviation of the detail mesh from the heightfield. `[Units: wu]`
    pub detail_sample_max_error: f32,
    /// Flags controlling contour tessellation.
    pub contour_flags: BuildContoursFlags,
    /// Volumes whose spans get a specific area type after erosion.
    pub area_volumes: Vec<ConvexVolume>,
}

impl NavmeshConfig {
    /// Converts world unit settings into the voxel unit configuration of a build.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot produce a meaningful field.
    pub fn derive(settings: &BuildSettings, agent: &AgentSettings) -> Result<Self, ConfigError> {
        let cs = settings.cell_size;
        let ch = settings.cell_height;
        if !(cs.is_finite() && cs > 0.0) {
            return Err(ConfigError::InvalidCellSize { cell_size: cs });
        }
        if !(ch.is_finite() && ch > 0.0) {
            return Err(ConfigError::InvalidCellHeight { cell_height: ch });
        }
        let nvp = settings.max_vertices_per_polygon as usize;
        if !(3..=PolygonMesh::MAX_VERTICES_PER_POLYGON).contains(&nvp) {
            return Err(ConfigError::InvalidVerticesPerPolygon {
                max_vertices_per_polygon: nvp,
            });
        }
        if agent.max_climb < 0.0 {
            return Err(ConfigError::NegativeClimb {
                max_climb: agent.max_climb,
            });
        }
        let walkable_height = (agent.height / ch).ceil();
        if !(walkable_height >= 3.0) {
            return Err(ConfigError::WalkableHeightTooLow {
                walkable_height: walkable_height as i32,
            });
        }

        let tiled = settings.tile_size > 0;
        let walkable_radius = (agent.radius / cs).ceil().max(0.0) as u16;
        // Reserve enough padding.
        let border_size = if tiled { walkable_radius + 3 } else { 0 };

        let aabb = if tiled {
            let y_range = settings.aabb.min.y..settings.aabb.max.y;
            let pad = border_size as f32 * cs;
            let mut aabb = tiling::tile_bounds(settings, settings.tile_position, y_range);
            aabb.min.x -= pad;
            aabb.min.z -= pad;
            aabb.max.x += pad;
            aabb.max.z += pad;
            aabb
        } else {
            settings.aabb
        };
        if !aabb.is_valid() {
            return Err(ConfigError::InvalidBounds { aabb });
        }
        let (width, height) = if tiled {
            let side = settings.tile_size + border_size * 2;
            (side, side)
        } else {
            let size = aabb.size();
            (
                (size.x / cs + 0.5) as u16,
                (size.z / cs + 0.5) as u16,
            )
        };

        Ok(Self {
            width,
            height,
            tile_size: settings.tile_size,
            tile_position: if tiled {
                settings.tile_position
            } else {
                IVec2::ZERO
            },
            border_size,
            cell_size: cs,
            cell_height: ch,
            aabb,
            agent: *agent,
            walkable_slope_angle: agent.max_slope.to_radians(),
            walkable_height: walkable_height as u16,
            walkable_climb: (agent.max_climb / ch).floor() as u16,
            walkable_radius,
            max_edge_len: (settings.edge_max_len / cs) as u16,
            max_simplification_error: settings.edge_max_error,
            min_region_area: (settings.region_min_size * settings.region_min_size) as u16,
            merge_region_area: (settings.region_merge_size * settings.region_merge_size) as u16,
            max_vertices_per_polygon: nvp,
            detail_sample_dist: if settings.detail_sample_dist < 0.9 {
                0.0
            } else {
                cs * settings.detail_sample_dist
            },
            detail_sample_max_error: ch * settings.detail_sample_max_error,
            contour_flags: settings.contour_flags,
            area_volumes: settings.area_volumes.clone(),
        })
    }
}

/// Errors returned by [`NavmeshConfig::derive`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The cell size is not a positive number.
    #[error("Cell size must be positive, got {cell_size}")]
    InvalidCellSize {
        /// The rejected cell size
        cell_size: f32,
    },
    /// The cell height is not a positive number.
    #[error("Cell height must be positive, got {cell_height}")]
    InvalidCellHeight {
        /// The rejected cell height
        cell_height: f32,
    },
    /// The bounds are empty, inverted or not finite.
    #[error("Build bounds are empty or invalid: {aabb:?}")]
    InvalidBounds {
        /// The rejected bounds
        aabb: Aabb3d,
    },
    /// The vertex limit per polygon is out of range.
    #[error("Max vertices per polygon must be in 3..={max}, got {max_vertices_per_polygon}", max = PolygonMesh::MAX_VERTICES_PER_POLYGON)]
    InvalidVerticesPerPolygon {
        /// The rejected limit
        max_vertices_per_polygon: usize,
    },
    /// The agent is less than three cells tall.
    #[error("Agent height must span at least 3 cells, got {walkable_height}")]
    WalkableHeightTooLow {
        /// The agent height in cells
        walkable_height: i32,
    },
    /// The agent climb is negative.
    #[error("Agent max climb must not be negative, got {max_climb}")]
    NegativeClimb {
        /// The rejected climb
        max_climb: f32,
    },
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::Vec3;

    use super::*;

    fn settings() -> BuildSettings {
        BuildSettings {
            aabb: Aabb3d::new(Vec3::ZERO, Vec3::new(10.0, 2.0, 10.0)),
            cell_size: 0.2,
            cell_height: 0.2,
            ..Default::default()
        }
    }

    #[test]
    fn derives_voxel_units() {
        let config = NavmeshConfig::derive(&settings(), &AgentSettings::default()).unwrap();
        assert_eq!(config.width, 50);
        assert_eq!(config.height, 50);
        assert_eq!(config.border_size, 0);
        assert_eq!(config.walkable_height, 5);
        assert_eq!(config.walkable_climb, 1);
        assert_eq!(config.walkable_radius, 3);
        assert_eq!(config.max_edge_len, 60);
        assert_eq!(config.min_region_area, 0);
        assert_eq!(config.merge_region_area, 400);
        assert_relative_eq!(config.detail_sample_dist, 1.2);
        assert_relative_eq!(config.detail_sample_max_error, 0.2);
        assert_relative_eq!(config.walkable_slope_angle, 45.0_f32.to_radians());
    }

    #[test]
    fn small_detail_sample_distance_disables_sampling() {
        let settings = BuildSettings {
            detail_sample_dist: 0.5,
            ..settings()
        };
        let config = NavmeshConfig::derive(&settings, &AgentSettings::default()).unwrap();
        assert_eq!(config.detail_sample_dist, 0.0);
    }

    #[test]
    fn tiles_are_padded_with_a_border() {
        let settings = BuildSettings {
            tile_size: 16,
            tile_position: IVec2::new(1, -1),
            ..settings()
        };
        let config = NavmeshConfig::derive(&settings, &AgentSettings::default()).unwrap();
        assert_eq!(config.border_size, 6);
        assert_eq!(config.width, 28);
        assert_eq!(config.height, 28);
        assert_relative_eq!(config.aabb.min.x, 3.2 - 1.2, epsilon = 1e-5);
        assert_relative_eq!(config.aabb.min.z, -3.2 - 1.2, epsilon = 1e-5);
        assert_relative_eq!(config.aabb.max.x, 6.4 + 1.2, epsilon = 1e-5);
        assert_relative_eq!(config.aabb.size().x / config.cell_size, 28.0, epsilon = 1e-3);
    }

    #[test]
    fn rejects_invalid_settings() {
        let agent = AgentSettings::default();
        let err = |settings: BuildSettings| NavmeshConfig::derive(&settings, &agent).unwrap_err();
        assert!(matches!(
            err(BuildSettings {
                cell_size: 0.0,
                ..settings()
            }),
            ConfigError::InvalidCellSize { .. }
        ));
        assert!(matches!(
            err(BuildSettings {
                cell_height: -1.0,
                ..settings()
            }),
            ConfigError::InvalidCellHeight { .. }
        ));
        assert!(matches!(
            err(BuildSettings {
                max_vertices_per_polygon: 7,
                ..settings()
            }),
            ConfigError::InvalidVerticesPerPolygon { .. }
        ));
        assert!(matches!(
            err(BuildSettings {
                aabb: Aabb3d::new(Vec3::ONE, Vec3::ZERO),
                ..settings()
            }),
            ConfigError::InvalidBounds { .. }
        ));
        let short_agent = AgentSettings {
            height: 0.3,
            ..agent
        };
        assert!(matches!(
            NavmeshConfig::derive(&settings(), &short_agent),
            Err(ConfigError::WalkableHeightTooLow { walkable_height: 2 })
        ));
        let sinking_agent = AgentSettings {
            max_climb: -0.1,
            ..agent
        };
        assert!(matches!(
            NavmeshConfig::derive(&settings(), &sinking_agent),
            Err(ConfigError::NegativeClimb { .. })
        ));
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn settings_round_trip_through_json() -> anyhow::Result<()> {
        let settings = BuildSettings {
            tile_size: 32,
            ..settings()
        };
        let json = serde_json::to_string(&settings)?;
        let parsed: BuildSettings = serde_json::from_str(&json)?;
        assert_eq!(parsed, settings);

        let agent: AgentSettings = serde_json::from_str(r#"{ "radius": 0.4 }"#)?;
        assert_eq!(agent.radius, 0.4);
        assert_eq!(agent.height, AgentSettings::default().height);
        Ok(())
    }
}
