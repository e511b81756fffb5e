//! Builds navmeshes from simple levels and queries them.

use approx::assert_relative_eq;
use glam::{IVec2, Vec3};
use navtile_build::{Aabb3d, AgentSettings, BuildSettings, NavmeshBuilder, tiling};
use navtile_query::{
    Navmesh, NavmeshError, NavmeshQuery, PathfindQuery, PathfindResult, RaycastQuery,
};

/// Appends an upwards facing quad spanning `min` to `max` on the xz-plane at height `y`.
fn quad(vertices: &mut Vec<Vec3>, indices: &mut Vec<i32>, min: [f32; 2], max: [f32; 2], y: f32) {
    let first = vertices.len() as i32;
    vertices.extend([
        Vec3::new(min[0], y, min[1]),
        Vec3::new(min[0], y, max[1]),
        Vec3::new(max[0], y, max[1]),
        Vec3::new(max[0], y, min[1]),
    ]);
    indices.extend([0, 1, 2, 0, 2, 3].map(|i| first + i));
}

fn plane(size_x: f32, size_z: f32) -> (Vec<Vec3>, Vec<i32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    quad(&mut vertices, &mut indices, [0.0, 0.0], [size_x, size_z], 0.0);
    (vertices, indices)
}

fn settings(size_x: f32, size_z: f32) -> BuildSettings {
    BuildSettings {
        aabb: Aabb3d::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(size_x, 2.0, size_z)),
        cell_size: 0.2,
        cell_height: 0.2,
        ..Default::default()
    }
}

fn build(settings: BuildSettings, vertices: &[Vec3], indices: &[i32]) -> Vec<u8> {
    let mut builder = NavmeshBuilder::new();
    builder.set_settings(settings);
    builder.set_agent_settings(AgentSettings {
        radius: 0.5,
        ..Default::default()
    });
    let generated = builder.build_navmesh(vertices, indices);
    assert!(generated.success);
    generated.tile_data
}

fn pathfind(source: Vec3, target: Vec3) -> PathfindQuery {
    PathfindQuery {
        source,
        target,
        search_extent: Vec3::new(1.0, 2.0, 1.0),
        max_path_points: 0,
    }
}

fn raycast(start: Vec3, end: Vec3) -> RaycastQuery {
    RaycastQuery {
        start,
        end,
        search_extent: Vec3::new(1.0, 2.0, 1.0),
        max_path_points: 0,
    }
}

fn path_length(points: &[Vec3]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// A 10 by 10 plane built as a single tile.
fn open_plane() -> anyhow::Result<Navmesh> {
    let (vertices, indices) = plane(10.0, 10.0);
    let blob = build(settings(10.0, 10.0), &vertices, &indices);
    let mut navmesh = Navmesh::new(10.0)?;
    navmesh.add_tile(IVec2::ZERO, &blob)?;
    Ok(navmesh)
}

/// A 10 by 5 plane split into two tiles along x.
fn tiled_plane() -> anyhow::Result<(Navmesh, Vec<(IVec2, Vec<u8>)>)> {
    let (vertices, indices) = plane(10.0, 5.0);
    let base = BuildSettings {
        tile_size: 25,
        ..settings(10.0, 5.0)
    };
    let coords = tiling::overlapping_tiles(&base, base.aabb);
    assert_eq!(coords, vec![IVec2::new(0, 0), IVec2::new(1, 0)]);

    let mut navmesh = Navmesh::new(tiling::tile_world_size(&base))?;
    let mut blobs = Vec::new();
    for coord in coords {
        let blob = build(
            BuildSettings {
                tile_position: coord,
                ..base.clone()
            },
            &vertices,
            &indices,
        );
        navmesh.add_tile(coord, &blob)?;
        blobs.push((coord, blob));
    }
    Ok((navmesh, blobs))
}

#[test]
fn path_across_an_open_plane() -> anyhow::Result<()> {
    let navmesh = open_plane()?;
    let mut query = NavmeshQuery::new();
    let source = Vec3::new(1.0, 0.0, 1.0);
    let target = Vec3::new(8.0, 0.0, 8.0);
    let result = query.find_path(&navmesh, &pathfind(source, target));
    assert!(result.found);
    assert!(result.points.len() >= 2);

    let first = result.points[0];
    let last = result.points[result.points.len() - 1];
    assert_relative_eq!(first.x, source.x, epsilon = 1e-3);
    assert_relative_eq!(first.z, source.z, epsilon = 1e-3);
    assert_relative_eq!(last.x, target.x, epsilon = 1e-3);
    assert_relative_eq!(last.z, target.z, epsilon = 1e-3);
    assert!((first.y - source.y).abs() < 0.5);

    let mut travelled = 0.0;
    for pair in result.points.windows(2) {
        let step = pair[0].distance(pair[1]);
        assert!(step > 0.0);
        travelled += step;
    }
    assert_relative_eq!(travelled, first.distance(last), max_relative = 1e-3);
    Ok(())
}

#[test]
fn reloading_a_tile_gives_the_same_answers() -> anyhow::Result<()> {
    let mut navmesh = open_plane()?;
    let mut query = NavmeshQuery::new();
    let request = pathfind(Vec3::new(1.0, 0.0, 1.0), Vec3::new(8.0, 0.0, 3.0));
    let ray = raycast(Vec3::new(5.0, 0.0, 5.0), Vec3::new(15.0, 0.0, 6.0));
    let path_before = query.find_path(&navmesh, &request);
    let hit_before = query.raycast(&navmesh, &ray);

    let data = navmesh.remove_tile(IVec2::ZERO)?;
    assert_eq!(navmesh.tile_count(), 0);
    assert_eq!(query.find_path(&navmesh, &request), PathfindResult::default());

    navmesh.add_tile(IVec2::ZERO, &data.to_bytes()?)?;
    assert_eq!(query.find_path(&navmesh, &request), path_before);
    assert_eq!(query.raycast(&navmesh, &ray), hit_before);
    Ok(())
}

#[test]
fn removing_a_missing_tile_leaves_the_rest_alone() -> anyhow::Result<()> {
    let mut navmesh = open_plane()?;
    assert!(matches!(
        navmesh.remove_tile(IVec2::new(3, 3)),
        Err(NavmeshError::TileNotFound { coord }) if coord == IVec2::new(3, 3)
    ));
    assert_eq!(navmesh.tile_count(), 1);
    let mut query = NavmeshQuery::new();
    let result = query.find_path(
        &navmesh,
        &pathfind(Vec3::new(2.0, 0.0, 2.0), Vec3::new(7.0, 0.0, 7.0)),
    );
    assert!(result.found);
    Ok(())
}

#[test]
fn raycasts_on_an_open_plane() -> anyhow::Result<()> {
    let navmesh = open_plane()?;
    let mut query = NavmeshQuery::new();

    let end = Vec3::new(8.0, 0.0, 5.0);
    let miss = query.raycast(&navmesh, &raycast(Vec3::new(2.0, 0.0, 5.0), end));
    assert!(!miss.hit);
    assert_eq!(miss.position, end);

    let hit = query.raycast(
        &navmesh,
        &raycast(Vec3::new(5.0, 0.0, 5.0), Vec3::new(15.0, 0.0, 5.0)),
    );
    assert!(hit.hit);
    // The agent radius keeps the walkable area away from the plane's edge.
    assert!(hit.position.x > 9.0 && hit.position.x < 10.0, "{}", hit.position);
    assert_relative_eq!(hit.position.z, 5.0, epsilon = 1e-3);
    assert!(hit.normal.x < 0.0);
    assert_relative_eq!(hit.normal.length(), 1.0, epsilon = 1e-4);
    Ok(())
}

#[test]
fn obstacles_are_walked_around() -> anyhow::Result<()> {
    let (mut vertices, mut indices) = plane(10.0, 10.0);
    // A low block the agent can neither climb nor crawl under.
    quad(&mut vertices, &mut indices, [4.0, 0.0], [6.0, 7.0], 0.5);
    let side = |vertices: &mut Vec<Vec3>, indices: &mut Vec<i32>, a: Vec3, b: Vec3| {
        let first = vertices.len() as i32;
        vertices.extend([a, b, b + Vec3::Y * 0.5, a + Vec3::Y * 0.5]);
        indices.extend([0, 1, 2, 0, 2, 3].map(|i| first + i));
    };
    side(&mut vertices, &mut indices, Vec3::new(4.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 7.0));
    side(&mut vertices, &mut indices, Vec3::new(4.0, 0.0, 7.0), Vec3::new(6.0, 0.0, 7.0));
    side(&mut vertices, &mut indices, Vec3::new(6.0, 0.0, 7.0), Vec3::new(6.0, 0.0, 0.0));
    side(&mut vertices, &mut indices, Vec3::new(6.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 0.0));

    let blob = build(settings(10.0, 10.0), &vertices, &indices);
    let mut navmesh = Navmesh::new(10.0)?;
    navmesh.add_tile(IVec2::ZERO, &blob)?;
    let mut query = NavmeshQuery::new();

    let source = Vec3::new(2.0, 0.0, 2.0);
    let target = Vec3::new(8.0, 0.0, 2.0);
    let result = query.find_path(&navmesh, &pathfind(source, target));
    assert!(result.found);
    assert!(result.points.len() > 2);
    // The path has to pass above the block.
    assert!(result.points.iter().any(|p| p.z > 7.0));
    assert!(path_length(&result.points) > source.distance(target) + 5.0);

    let blocked = query.raycast(&navmesh, &raycast(source, target));
    assert!(blocked.hit);
    assert!(blocked.position.x < 4.0);
    assert!(blocked.normal.x < 0.0);
    Ok(())
}

#[test]
fn paths_cross_tile_borders() -> anyhow::Result<()> {
    let (navmesh, _) = tiled_plane()?;
    assert_eq!(navmesh.tile_count(), 2);
    let mut query = NavmeshQuery::new();

    let source = Vec3::new(1.0, 0.0, 2.5);
    let target = Vec3::new(9.0, 0.0, 2.5);
    let result = query.find_path(&navmesh, &pathfind(source, target));
    assert!(result.found);
    let first = result.points[0];
    let last = result.points[result.points.len() - 1];
    assert!(path_length(&result.points) <= first.distance(last) * 1.05);

    let ray = query.raycast(&navmesh, &raycast(source, target));
    assert!(!ray.hit);
    Ok(())
}

#[test]
fn removed_tiles_become_walls() -> anyhow::Result<()> {
    let (mut navmesh, _) = tiled_plane()?;
    navmesh.remove_tile(IVec2::new(1, 0))?;
    let mut query = NavmeshQuery::new();

    let source = Vec3::new(1.0, 0.0, 2.5);
    let target = Vec3::new(9.0, 0.0, 2.5);
    assert!(!query.find_path(&navmesh, &pathfind(source, target)).found);

    let ray = query.raycast(&navmesh, &raycast(source, target));
    assert!(ray.hit);
    assert_relative_eq!(ray.position.x, 5.0, epsilon = 1e-2);
    assert!(ray.normal.x < 0.0);
    Ok(())
}

#[test]
fn tiles_can_be_reloaded_in_any_order() -> anyhow::Result<()> {
    let (_, blobs) = tiled_plane()?;
    let mut navmesh = Navmesh::new(5.0)?;
    for (coord, blob) in blobs.iter().rev() {
        navmesh.add_tile(*coord, blob)?;
    }
    assert!(matches!(
        navmesh.add_tile(blobs[0].0, &blobs[0].1),
        Err(NavmeshError::TileOccupied { .. })
    ));
    let mut query = NavmeshQuery::new();
    let result = query.find_path(
        &navmesh,
        &pathfind(Vec3::new(9.0, 0.0, 2.5), Vec3::new(1.0, 0.0, 2.5)),
    );
    assert!(result.found);
    Ok(())
}
