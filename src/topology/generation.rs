//! Structured mesh generators with box boundary attributes.
//!
//! Boundary entities get attribute 1/2 on the min/max x side, 3/4 on y and
//! 5/6 on z (first match wins at corners).

use crate::dof_error::DofSieveError;
use crate::topology::cell_type::CellType;
use crate::topology::in_memory::{BoundaryAttributes, InMemoryMesh, MeshBuilder};

pub const BOUNDARY_X_MIN: u32 = 1;
pub const BOUNDARY_X_MAX: u32 = 2;
pub const BOUNDARY_Y_MIN: u32 = 3;
pub const BOUNDARY_Y_MAX: u32 = 4;
pub const BOUNDARY_Z_MIN: u32 = 5;
pub const BOUNDARY_Z_MAX: u32 = 6;

fn invalid(message: &str) -> DofSieveError {
    DofSieveError::InconsistentMesh(message.to_string())
}

fn box_attributes(min: Vec<f64>, max: Vec<f64>) -> BoundaryAttributes {
    BoundaryAttributes::new(move |c| {
        let tol = 1e-12;
        for (d, &x) in c.iter().enumerate() {
            if (x - min[d]).abs() < tol {
                return 2 * d as u32 + 1;
            }
            if (x - max[d]).abs() < tol {
                return 2 * d as u32 + 2;
            }
        }
        0
    })
}

/// 1D interval mesh with `n` segments over `[min, max]`.
pub fn interval_mesh(n: usize, min: f64, max: f64) -> Result<InMemoryMesh, DofSieveError> {
    if n == 0 {
        return Err(invalid("n must be positive"));
    }
    let dx = (max - min) / n as f64;
    let mut b = MeshBuilder::new(1).boundary_attributes(box_attributes(vec![min], vec![max]));
    for i in 0..=n {
        b.add_vertex(vec![min + dx * i as f64]);
    }
    for i in 0..n {
        b.add_element(CellType::Segment, vec![i, i + 1], 1);
    }
    b.build()
}

/// Structured quadrilateral mesh over `[min, max]` with `nx`×`ny` cells.
pub fn quad_mesh(
    nx: usize,
    ny: usize,
    min: [f64; 2],
    max: [f64; 2],
) -> Result<InMemoryMesh, DofSieveError> {
    if nx == 0 || ny == 0 {
        return Err(invalid("nx and ny must be positive"));
    }
    let mut b = MeshBuilder::new(2).boundary_attributes(box_attributes(min.to_vec(), max.to_vec()));
    push_grid_vertices_2d(&mut b, nx, ny, min, max);
    let row_stride = nx + 1;
    for j in 0..ny {
        for i in 0..nx {
            let v0 = j * row_stride + i;
            let v1 = v0 + 1;
            let v3 = v0 + row_stride;
            let v2 = v3 + 1;
            b.add_element(CellType::Quadrilateral, vec![v0, v1, v2, v3], 1);
        }
    }
    b.build()
}

/// Structured triangle mesh: every grid cell split along its `v0-v2` diagonal.
pub fn triangle_mesh(
    nx: usize,
    ny: usize,
    min: [f64; 2],
    max: [f64; 2],
) -> Result<InMemoryMesh, DofSieveError> {
    if nx == 0 || ny == 0 {
        return Err(invalid("nx and ny must be positive"));
    }
    let mut b = MeshBuilder::new(2).boundary_attributes(box_attributes(min.to_vec(), max.to_vec()));
    push_grid_vertices_2d(&mut b, nx, ny, min, max);
    let row_stride = nx + 1;
    for j in 0..ny {
        for i in 0..nx {
            let v0 = j * row_stride + i;
            let v1 = v0 + 1;
            let v3 = v0 + row_stride;
            let v2 = v3 + 1;
            b.add_element(CellType::Triangle, vec![v0, v1, v2], 1);
            b.add_element(CellType::Triangle, vec![v0, v2, v3], 1);
        }
    }
    b.build()
}

fn push_grid_vertices_2d(b: &mut MeshBuilder, nx: usize, ny: usize, min: [f64; 2], max: [f64; 2]) {
    let dx = (max[0] - min[0]) / nx as f64;
    let dy = (max[1] - min[1]) / ny as f64;
    for j in 0..=ny {
        let y = min[1] + dy * j as f64;
        for i in 0..=nx {
            b.add_vertex(vec![min[0] + dx * i as f64, y]);
        }
    }
}

/// Structured hexahedral mesh over `[min, max]` with `nx`×`ny`×`nz` cells.
pub fn hex_mesh(
    nx: usize,
    ny: usize,
    nz: usize,
    min: [f64; 3],
    max: [f64; 3],
) -> Result<InMemoryMesh, DofSieveError> {
    if nx == 0 || ny == 0 || nz == 0 {
        return Err(invalid("nx, ny, and nz must be positive"));
    }
    let dx = (max[0] - min[0]) / nx as f64;
    let dy = (max[1] - min[1]) / ny as f64;
    let dz = (max[2] - min[2]) / nz as f64;
    let mut b = MeshBuilder::new(3).boundary_attributes(box_attributes(min.to_vec(), max.to_vec()));
    for k in 0..=nz {
        let z = min[2] + dz * k as f64;
        for j in 0..=ny {
            let y = min[1] + dy * j as f64;
            for i in 0..=nx {
                b.add_vertex(vec![min[0] + dx * i as f64, y, z]);
            }
        }
    }
    let row_stride = nx + 1;
    let slab_stride = row_stride * (ny + 1);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let base = k * slab_stride + j * row_stride + i;
                let v0 = base;
                let v1 = base + 1;
                let v3 = base + row_stride;
                let v2 = v3 + 1;
                let v4 = base + slab_stride;
                let v5 = v4 + 1;
                let v7 = v4 + row_stride;
                let v6 = v7 + 1;
                b.add_element(
                    CellType::Hexahedron,
                    vec![v0, v1, v2, v3, v4, v5, v6, v7],
                    1,
                );
            }
        }
    }
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::mesh::MeshTopology;

    #[test]
    fn quad_mesh_counts() {
        let m = quad_mesh(3, 2, [0.0, 0.0], [1.0, 1.0]).expect("mesh");
        assert_eq!(m.num_vertices(), 12);
        assert_eq!(m.num_elements(), 6);
        assert_eq!(m.num_edges(), 3 * 3 + 4 * 2);
        assert_eq!(m.num_boundary_elements(), 10);
    }

    #[test]
    fn hex_mesh_counts() {
        let m = hex_mesh(2, 1, 1, [0.0; 3], [1.0; 3]).expect("mesh");
        assert_eq!(m.num_elements(), 2);
        assert_eq!(m.num_faces(), 11);
        assert_eq!(m.num_edges(), 20);
        assert_eq!(m.num_boundary_elements(), 10);
    }

    #[test]
    fn boundary_attributes_follow_box_sides() {
        let m = interval_mesh(4, 0.0, 2.0).expect("mesh");
        let attrs: Vec<u32> = (0..m.num_boundary_elements())
            .map(|b| m.boundary_entity(b).attribute)
            .collect();
        assert_eq!(attrs, vec![BOUNDARY_X_MIN, BOUNDARY_X_MAX]);
    }
}
