//! Contains the [`TriMesh`] input geometry and its conversion from raw vertex and index buffers.

use glam::{UVec3, Vec3, Vec3A};
use thiserror::Error;

use crate::{Aabb3d, math::TriangleIndices as _, span::AreaType};

/// A mesh used as input for [`Heightfield`](crate::Heightfield) rasterization.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TriMesh {
    /// The vertices composing the mesh.
    /// Follows the convention of a triangle list.
    pub vertices: Vec<Vec3A>,

    /// The indices composing the mesh.
    /// Follows the convention of a triangle list.
    pub indices: Vec<UVec3>,

    /// The area types of the trimesh. Each index corresponds 1:1 to the [`TriMesh::indices`].
    pub area_types: Vec<AreaType>,
}

impl TriMesh {
    /// Creates a trimesh from a vertex buffer and a triangle list index buffer.
    /// All triangles start out as [`AreaType::NOT_WALKABLE`].
    ///
    /// # Errors
    ///
    /// Returns an error if the index count is not a multiple of 3 or an index does not reference a vertex.
    pub fn from_raw(vertices: &[Vec3], indices: &[i32]) -> Result<Self, TriMeshError> {
        if indices.len() % 3 != 0 {
            return Err(TriMeshError::IncompleteTriangle {
                index_count: indices.len(),
            });
        }
        let vertex_count = vertices.len();
        let to_index = |index: i32| -> Result<u32, TriMeshError> {
            match u32::try_from(index) {
                Ok(i) if (i as usize) < vertex_count => Ok(i),
                _ => Err(TriMeshError::IndexOutOfBounds {
                    index,
                    vertex_count,
                }),
            }
        };
        let indices = indices
            .chunks_exact(3)
            .map(|tri| {
                Ok(UVec3::new(
                    to_index(tri[0])?,
                    to_index(tri[1])?,
                    to_index(tri[2])?,
                ))
            })
            .collect::<Result<Vec<_>, TriMeshError>>()?;
        Ok(Self {
            vertices: vertices.iter().copied().map(Vec3A::from).collect(),
            area_types: vec![AreaType::NOT_WALKABLE; indices.len()],
            indices,
        })
    }

    /// Extends the trimesh with the vertices and indices of another trimesh.
    /// The indices of `other` will be offset by the number of vertices in `self`.
    pub fn extend(&mut self, other: TriMesh) {
        let next_vertex_index = self.vertices.len() as u32;
        self.vertices.extend(other.vertices);
        self.indices
            .extend(other.indices.iter().map(|i| i + next_vertex_index));
        self.area_types.extend(other.area_types);
    }

    /// Computes the AABB of the trimesh.
    /// Returns `None` if the trimesh is empty.
    pub fn compute_aabb(&self) -> Option<Aabb3d> {
        Aabb3d::from_verts(&self.vertices)
    }

    /// Marks the triangles as walkable or not based on the threshold angle.
    ///
    /// The triangles are marked as walkable if the angle between their normal and the up axis is below the threshold.
    ///
    /// # Arguments
    ///
    /// * `threshold_rad` - The threshold angle in radians.
    ///
    pub fn mark_walkable_triangles(&mut self, threshold_rad: f32) {
        let threshold_cos = threshold_rad.cos();
        for (i, indices) in self.indices.iter().enumerate() {
            let normal = indices.normal(&self.vertices);

            if normal.y > threshold_cos {
                self.area_types[i] = AreaType::DEFAULT_WALKABLE;
            }
        }
    }
}

/// Errors that can occur when creating a [`TriMesh`] with [`TriMesh::from_raw`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriMeshError {
    /// The index buffer does not describe whole triangles.
    #[error("index count {index_count} is not a multiple of 3")]
    IncompleteTriangle {
        /// The number of indices
        index_count: usize,
    },
    /// An index does not reference a vertex.
    #[error("index {index} is out of bounds for {vertex_count} vertices")]
    IndexOutOfBounds {
        /// The offending index
        index: i32,
        /// The number of vertices
        vertex_count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> (Vec<Vec3>, Vec<i32>) {
        (
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 0.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn from_raw_groups_indices_into_triangles() {
        let (vertices, indices) = quad();
        let trimesh = TriMesh::from_raw(&vertices, &indices).unwrap();
        assert_eq!(trimesh.indices, vec![UVec3::new(0, 1, 2), UVec3::new(0, 2, 3)]);
        assert_eq!(trimesh.area_types, vec![AreaType::NOT_WALKABLE; 2]);
    }

    #[test]
    fn from_raw_rejects_dangling_indices() {
        let (vertices, _) = quad();
        assert_eq!(
            TriMesh::from_raw(&vertices, &[0, 1, 4]),
            Err(TriMeshError::IndexOutOfBounds {
                index: 4,
                vertex_count: 4
            })
        );
        assert!(TriMesh::from_raw(&vertices, &[0, -1, 2]).is_err());
        assert_eq!(
            TriMesh::from_raw(&vertices, &[0, 1]),
            Err(TriMeshError::IncompleteTriangle { index_count: 2 })
        );
    }

    #[test]
    fn flat_ground_is_walkable_and_walls_are_not() {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let mut trimesh = TriMesh::from_raw(&vertices, &[0, 1, 2, 0, 3, 1]).unwrap();
        trimesh.mark_walkable_triangles(45.0_f32.to_radians());
        assert_eq!(
            trimesh.area_types,
            vec![AreaType::DEFAULT_WALKABLE, AreaType::NOT_WALKABLE]
        );
    }

    #[test]
    fn extend_offsets_indices() {
        let (vertices, indices) = quad();
        let mut a = TriMesh::from_raw(&vertices, &indices).unwrap();
        let b = a.clone();
        a.extend(b);
        assert_eq!(a.vertices.len(), 8);
        assert_eq!(a.indices[2], UVec3::new(4, 5, 6));
        assert_eq!(a.area_types.len(), 4);
    }
}
