//! Local refinement of conforming meshes and the matching derefinement.
//!
//! Marked elements are split isotropically (segments in 2, triangles and
//! quads in 4, hexes in 8). Unmarked neighbours keep their entities, which
//! leaves one level of hanging vertices/edges/faces; those are recorded as
//! master/slave lists with point matrices so that a finite element space can
//! build its conforming constraints. Every new vertex is identified by the set
//! of old vertices it is the average of, so midpoints and face centers are
//! shared between neighbouring refined elements.

use std::collections::HashMap;

use itertools::Itertools;

use crate::dof_error::DofSieveError;
use crate::topology::cell_type::CellType;
use crate::topology::in_memory::{InMemoryMesh, MeshBuilder};
use crate::topology::mesh::{MeshOperation, MeshTopology};
use crate::topology::nonconforming::{NcList, SlaveEntity};
use crate::topology::point_matrix::PointMatrix;
use crate::topology::transforms::CoarseFineTransforms;

/// A child cell given as local corner sets: each child vertex is the average
/// of the listed parent vertices.
type ChildTemplate = Vec<Vec<usize>>;

/// Reference 1→4 subdivision of a triangle.
fn triangle_subdivision() -> Vec<ChildTemplate> {
    let (v0, v1, v2) = (vec![0], vec![1], vec![2]);
    let (m01, m12, m20) = (vec![0, 1], vec![1, 2], vec![0, 2]);
    vec![
        vec![v0, m01.clone(), m20.clone()],
        vec![v1, m12.clone(), m01.clone()],
        vec![v2, m20.clone(), m12.clone()],
        vec![m01, m12, m20],
    ]
}

/// Tensor-product subdivision in lattice coordinates `{0, 1, 2}^d`, children
/// listed in the parent's vertex order (`[v0, m01, center, m30]` for the first quad child).
fn tensor_subdivision(geometry: CellType) -> Vec<ChildTemplate> {
    let dim = geometry.dimension();
    let refs = geometry.reference_vertices();
    let corner_set = |lattice: &[u8]| -> Vec<usize> {
        refs.iter()
            .enumerate()
            .filter(|(_, v)| {
                lattice.iter().zip(v.iter()).all(|(&c, &vd)| match c {
                    0 => vd < 0.5,
                    2 => vd > 0.5,
                    _ => true,
                })
            })
            .map(|(i, _)| i)
            .collect()
    };
    refs.iter()
        .map(|child_origin| {
            refs.iter()
                .map(|corner| {
                    let lattice: Vec<u8> = (0..dim)
                        .map(|d| child_origin[d] as u8 + corner[d] as u8)
                        .collect();
                    corner_set(&lattice)
                })
                .collect()
        })
        .collect()
}

fn subdivision(geometry: CellType) -> Result<Vec<ChildTemplate>, DofSieveError> {
    match geometry {
        CellType::Segment | CellType::Quadrilateral | CellType::Hexahedron => {
            Ok(tensor_subdivision(geometry))
        }
        CellType::Triangle => Ok(triangle_subdivision()),
        other => Err(DofSieveError::UnsupportedGeometry {
            geometry: other,
            context: "isotropic refinement",
        }),
    }
}

/// Reference coordinates, in the frame of `cycle` (a vertex list of `geometry`),
/// of the average of the old vertices in `corners`.
fn frame_coordinates(
    corners: &[usize],
    cycle: &[usize],
    geometry: CellType,
) -> Result<Vec<f64>, DofSieveError> {
    let refs = geometry.reference_vertices();
    let mut x = vec![0.0; geometry.dimension()];
    for c in corners {
        let pos = cycle.iter().position(|v| v == c).ok_or_else(|| {
            DofSieveError::InconsistentMesh(format!("vertex {c} not on entity {cycle:?}"))
        })?;
        for (xd, rd) in x.iter_mut().zip(refs[pos].iter()) {
            *xd += rd / corners.len() as f64;
        }
    }
    Ok(x)
}

struct VertexPool<'a> {
    builder: MeshBuilder,
    old: &'a InMemoryMesh,
    by_corners: HashMap<Vec<usize>, usize>,
    corners: Vec<Vec<usize>>,
}

impl VertexPool<'_> {
    fn vertex(&mut self, corners: Vec<usize>) -> usize {
        let key: Vec<usize> = corners.into_iter().sorted_unstable().dedup().collect();
        if let Some(&v) = self.by_corners.get(&key) {
            return v;
        }
        let dim = self.old.dimension();
        let mut x = vec![0.0; dim];
        for &c in &key {
            for (xd, cd) in x.iter_mut().zip(self.old.vertex_coordinates(c)) {
                *xd += cd / key.len() as f64;
            }
        }
        let v = self.builder.add_vertex(x);
        self.corners.push(key.clone());
        self.by_corners.insert(key, v);
        v
    }
}

/// Refine the elements listed in `marked`. Returns a new mesh one sequence
/// step ahead, carrying refinement embeddings and master/slave lists.
pub fn refine(mesh: &InMemoryMesh, marked: &[usize]) -> Result<InMemoryMesh, DofSieveError> {
    if mesh.is_nonconforming() {
        return Err(DofSieveError::Unsupported(
            "refining a mesh that already has hanging entities",
        ));
    }
    let ne = mesh.num_elements();
    let mut is_marked = vec![false; ne];
    for &e in marked {
        *is_marked
            .get_mut(e)
            .ok_or_else(|| DofSieveError::out_of_range("element", e, ne))? = true;
    }

    let mut pool = VertexPool {
        builder: MeshBuilder::new(mesh.dimension()).boundary_attributes(mesh.boundary_rule().clone()),
        old: mesh,
        by_corners: HashMap::new(),
        corners: Vec::new(),
    };
    for v in 0..mesh.num_vertices() {
        pool.vertex(vec![v]);
    }

    let mut transforms = CoarseFineTransforms::new();
    for elem in 0..ne {
        let geometry = mesh.element_geometry(elem);
        let verts = mesh.element_vertices(elem).to_vec();
        let attribute = mesh.element_attribute(elem);
        if !is_marked[elem] {
            pool.builder.add_element(geometry, verts, attribute);
            transforms.push_embedding(elem, PointMatrix::identity(geometry));
            continue;
        }
        let refs = geometry.reference_vertices();
        for child in subdivision(geometry)? {
            let mut child_verts = Vec::with_capacity(child.len());
            let mut points = Vec::with_capacity(child.len());
            for corners in &child {
                child_verts.push(pool.vertex(corners.iter().map(|&c| verts[c]).collect()));
                let mut x = vec![0.0; geometry.dimension()];
                for &c in corners {
                    for (xd, rd) in x.iter_mut().zip(refs[c].iter()) {
                        *xd += rd / corners.len() as f64;
                    }
                }
                points.push(x);
            }
            pool.builder.add_element(geometry, child_verts, attribute);
            transforms.push_embedding(elem, PointMatrix::new(geometry, points)?);
        }
    }

    let VertexPool {
        builder,
        by_corners,
        corners,
        ..
    } = pool;
    let mut fine = builder.build()?;
    let (edges, faces) = hanging_entities(mesh, &fine, &by_corners, &corners)?;
    if !edges.is_empty() || !faces.is_empty() {
        log::debug!(
            "refinement left {} hanging edges and {} hanging faces",
            edges.masters().len(),
            faces.masters().len()
        );
    }
    fine.set_nc_lists(edges, faces)?;
    fine.record_operation(mesh.sequence(), MeshOperation::Refine, Some(transforms));
    Ok(fine)
}

/// Refine every element.
pub fn refine_uniformly(mesh: &InMemoryMesh) -> Result<InMemoryMesh, DofSieveError> {
    let all: Vec<usize> = (0..mesh.num_elements()).collect();
    refine(mesh, &all)
}

fn hanging_entities(
    old: &InMemoryMesh,
    fine: &InMemoryMesh,
    by_corners: &HashMap<Vec<usize>, usize>,
    corners: &[Vec<usize>],
) -> Result<(NcList, NcList), DofSieveError> {
    let mut edges = NcList::new();
    for e in 0..old.num_edges() {
        let [a, b] = old.edge_vertices(e);
        let (Some(&mid), Some(master)) = (by_corners.get(&vec![a, b]), fine.find_edge(a, b)) else {
            continue;
        };
        let m = edges.add_master(master, CellType::Segment);
        for (p, q) in [(a, mid), (mid, b)] {
            let slave = fine.find_edge(p, q).ok_or_else(|| {
                DofSieveError::InconsistentMesh(format!("half edge {p}-{q} missing after refinement"))
            })?;
            let cycle = fine.edge_vertices(slave);
            let points = cycle
                .iter()
                .map(|&v| frame_coordinates(&corners[v], &[a, b], CellType::Segment))
                .collect::<Result<Vec<_>, _>>()?;
            edges.add_slave(m, SlaveEntity::Regular(slave), PointMatrix::new(CellType::Segment, points)?)?;
        }
    }

    let mut faces = NcList::new();
    for f in 0..old.num_faces() {
        let key: Vec<usize> = old.face_vertices(f).iter().copied().sorted_unstable().collect();
        let (Some(_), Some(master)) = (by_corners.get(&key), fine.find_face(&key)) else {
            continue;
        };
        let geometry = fine.face_geometry(master);
        let cycle = fine.face_vertices(master).to_vec();
        let m = faces.add_master(master, geometry);
        let pool_lookup = |set: Vec<usize>| -> Result<usize, DofSieveError> {
            let k: Vec<usize> = set.into_iter().sorted_unstable().dedup().collect();
            by_corners.get(&k).copied().ok_or_else(|| {
                DofSieveError::InconsistentMesh(format!("refined face vertex {k:?} missing"))
            })
        };
        for child in subdivision(geometry)? {
            let child_verts = child
                .iter()
                .map(|cs| pool_lookup(cs.iter().map(|&c| cycle[c]).collect()))
                .collect::<Result<Vec<_>, _>>()?;
            let slave = fine.find_face(&child_verts).ok_or_else(|| {
                DofSieveError::InconsistentMesh(format!("sub-face {child_verts:?} missing after refinement"))
            })?;
            let points = fine
                .face_vertices(slave)
                .iter()
                .map(|&v| frame_coordinates(&corners[v], &cycle, geometry))
                .collect::<Result<Vec<_>, _>>()?;
            faces.add_slave(m, SlaveEntity::Regular(slave), PointMatrix::new(geometry, points)?)?;
        }
    }
    Ok((edges, faces))
}

/// Undo the refinement that produced `fine` from `coarse`. The result has the
/// topology of `coarse`, one sequence step past `fine`, and carries the
/// embeddings of `fine`'s elements as derefinement transforms.
pub fn derefine(fine: &InMemoryMesh, coarse: &InMemoryMesh) -> Result<InMemoryMesh, DofSieveError> {
    if fine.last_operation() != MeshOperation::Refine || fine.sequence() != coarse.sequence() + 1 {
        return Err(DofSieveError::UpdateSequence {
            expected_from: coarse.sequence(),
            found: fine.sequence(),
        });
    }
    let transforms = fine
        .refinement_transforms()
        .ok_or(DofSieveError::MissingTransforms("refinement"))?;
    if transforms.embeddings().len() != fine.num_elements() {
        return Err(DofSieveError::InconsistentMesh(
            "refinement embeddings do not cover the fine mesh".into(),
        ));
    }
    if let Some(e) = transforms.embeddings().iter().find(|e| e.parent >= coarse.num_elements()) {
        return Err(DofSieveError::out_of_range("coarse element", e.parent, coarse.num_elements()));
    }
    let mut out = coarse.clone();
    out.record_operation(fine.sequence(), MeshOperation::Derefine, Some(transforms.clone()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::generation::{hex_mesh, quad_mesh};
    use crate::topology::mesh::EntityKind;

    #[test]
    fn first_quad_child_matches_reference_layout() {
        let t = tensor_subdivision(CellType::Quadrilateral);
        assert_eq!(t.len(), 4);
        assert_eq!(t[0], vec![vec![0], vec![0, 1], vec![0, 1, 2, 3], vec![0, 3]]);
        assert_eq!(t[2], vec![vec![0, 1, 2, 3], vec![1, 2], vec![2], vec![2, 3]]);
    }

    #[test]
    fn uniform_quad_refinement_is_conforming() {
        let m = quad_mesh(2, 1, [0.0, 0.0], [2.0, 1.0]).expect("mesh");
        let f = refine_uniformly(&m).expect("refine");
        assert_eq!(f.num_elements(), 8);
        assert_eq!(f.num_vertices(), 15);
        assert!(!f.is_nonconforming());
        assert_eq!(f.sequence(), 1);
        assert_eq!(f.num_boundary_elements(), 12);
    }

    #[test]
    fn partial_quad_refinement_records_hanging_edge() {
        let m = quad_mesh(2, 1, [0.0, 0.0], [2.0, 1.0]).expect("mesh");
        let f = refine(&m, &[1]).expect("refine");
        let list = f.nc_list(EntityKind::Edge).expect("edge list");
        assert_eq!(list.masters().len(), 1);
        let master = &list.masters()[0];
        assert_eq!(master.slaves.len(), 2);
        let mut ends: Vec<Vec<f64>> = master
            .slaves
            .iter()
            .map(|s| list.point_matrix(s).expect("pm").points().concat())
            .collect();
        ends.sort_by(|a, b| a.partial_cmp(b).expect("finite"));
        assert_eq!(ends, vec![vec![0.0, 0.5], vec![1.0, 0.5]]);
        // the shared coarse edge is neither boundary nor lost
        assert_eq!(f.num_boundary_elements(), 4 + 2 + 2 + 1);
    }

    #[test]
    fn partial_hex_refinement_records_hanging_face() {
        let m = hex_mesh(2, 1, 1, [0.0; 3], [2.0, 1.0, 1.0]).expect("mesh");
        let f = refine(&m, &[0]).expect("refine");
        let faces = f.nc_list(EntityKind::Face).expect("faces");
        assert_eq!(faces.masters().len(), 1);
        assert_eq!(faces.masters()[0].slaves.len(), 4);
        let edges = f.nc_list(EntityKind::Edge).expect("edges");
        assert_eq!(edges.masters().len(), 4);
    }

    #[test]
    fn derefine_restores_coarse_topology() {
        let m = quad_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).expect("mesh");
        let f = refine_uniformly(&m).expect("refine");
        let c = derefine(&f, &m).expect("derefine");
        assert_eq!(c.num_elements(), 1);
        assert_eq!(c.sequence(), 2);
        assert_eq!(c.last_operation(), MeshOperation::Derefine);
        assert_eq!(c.derefinement_transforms().expect("t").embeddings().len(), 4);
    }
}
