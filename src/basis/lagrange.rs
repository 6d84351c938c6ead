//! Equispaced nodal H1 (Lagrange) elements.
//!
//! Local DOFs are numbered vertices first, then edge nodes per local edge
//! (walking in the edge's direction), then face nodes per local
//! face (3D only, in the frame of the face's local vertex cycle), then
//! interior nodes in lexicographic order. Shape functions are obtained by
//! inverting the monomial Vandermonde matrix at the nodes.

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::DMatrix;
use parking_lot::RwLock;

use crate::basis::{BasisCatalog, FiniteElement};
use crate::dof_error::DofSieveError;
use crate::topology::cell_type::CellType;
use crate::topology::orientation::Orientation;

/// Highest order the collection builds elements for.
pub const MAX_LAGRANGE_ORDER: u8 = 12;

#[derive(Debug)]
pub struct LagrangeElement {
    geometry: CellType,
    order: u8,
    nodes: Vec<Vec<f64>>,
    exponents: Vec<Vec<i32>>,
    /// Inverse Vandermonde: `shape_k(x) = sum_j mono_j(x) * coeffs[(j, k)]`.
    coeffs: DMatrix<f64>,
}

impl LagrangeElement {
    pub fn new(geometry: CellType, order: u8) -> Result<Self, DofSieveError> {
        if order == 0 || order > MAX_LAGRANGE_ORDER {
            return Err(DofSieveError::OrderOutOfRange {
                order: order as u32,
                min: 1,
                max: MAX_LAGRANGE_ORDER,
            });
        }
        let nodes = element_nodes(geometry, order)?;
        let exponents = monomial_exponents(geometry, order);
        if exponents.len() != nodes.len() {
            return Err(DofSieveError::SizeMismatch {
                what: "Lagrange monomials",
                expected: nodes.len(),
                found: exponents.len(),
            });
        }
        let n = nodes.len();
        let vandermonde = DMatrix::from_fn(n, n, |i, j| monomial(&exponents[j], &nodes[i]));
        let coeffs = vandermonde.try_inverse().ok_or_else(|| {
            DofSieveError::SingularLocalMatrix(format!("Vandermonde of {geometry:?} P{order}"))
        })?;
        Ok(Self {
            geometry,
            order,
            nodes,
            exponents,
            coeffs,
        })
    }
}

impl FiniteElement for LagrangeElement {
    fn geometry(&self) -> CellType {
        self.geometry
    }

    fn order(&self) -> u8 {
        self.order
    }

    fn num_dofs(&self) -> usize {
        self.nodes.len()
    }

    fn nodes(&self) -> &[Vec<f64>] {
        &self.nodes
    }

    fn shape(&self, x: &[f64]) -> Vec<f64> {
        let mono: Vec<f64> = self.exponents.iter().map(|e| monomial(e, x)).collect();
        (0..self.nodes.len())
            .map(|k| {
                mono.iter()
                    .enumerate()
                    .map(|(j, m)| m * self.coeffs[(j, k)])
                    .sum()
            })
            .collect()
    }
}

fn monomial(exponents: &[i32], x: &[f64]) -> f64 {
    exponents
        .iter()
        .zip(x)
        .map(|(&e, &xd)| xd.powi(e))
        .product()
}

fn monomial_exponents(geometry: CellType, p: u8) -> Vec<Vec<i32>> {
    let p = p as i32;
    match geometry {
        CellType::Vertex => vec![vec![]],
        CellType::Segment => (0..=p).map(|a| vec![a]).collect(),
        CellType::Quadrilateral => (0..=p)
            .flat_map(|b| (0..=p).map(move |a| vec![a, b]))
            .collect(),
        CellType::Hexahedron => (0..=p)
            .flat_map(|c| (0..=p).flat_map(move |b| (0..=p).map(move |a| vec![a, b, c])))
            .collect(),
        CellType::Triangle => (0..=p)
            .flat_map(|b| (0..=p - b).map(move |a| vec![a, b]))
            .collect(),
        CellType::Tetrahedron => (0..=p)
            .flat_map(|c| (0..=p - c).flat_map(move |b| (0..=p - b - c).map(move |a| vec![a, b, c])))
            .collect(),
    }
}

fn lerp(a: &[f64], b: &[f64], t: f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x + t * (y - x)).collect()
}

/// Interior lattice of a 2D cell in units of `1/p`, in canonical local order.
fn polygon_interior(geometry: CellType, p: u8) -> Vec<(u8, u8)> {
    match geometry {
        CellType::Quadrilateral => (1..p).flat_map(|j| (1..p).map(move |i| (i, j))).collect(),
        CellType::Triangle => (1..p)
            .flat_map(|j| (1..p.saturating_sub(j)).map(move |i| (i, j)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Position of lattice point `(i, j)` of a polygon whose corners sit at `corners`.
fn polygon_point(geometry: CellType, corners: &[&[f64]], p: u8, (i, j): (u8, u8)) -> Vec<f64> {
    let s = i as f64 / p as f64;
    let t = j as f64 / p as f64;
    let last = if geometry == CellType::Quadrilateral { 3 } else { 2 };
    let along = lerp(corners[0], corners[1], s);
    let up = lerp(corners[0], corners[last], t);
    along
        .iter()
        .zip(&up)
        .zip(corners[0].iter())
        .map(|((a, u), o)| a + u - o)
        .collect()
}

fn element_nodes(geometry: CellType, p: u8) -> Result<Vec<Vec<f64>>, DofSieveError> {
    let refs = geometry.reference_vertices();
    let pf = p as f64;
    let mut nodes: Vec<Vec<f64>> = match geometry {
        CellType::Vertex => return Ok(vec![vec![]]),
        CellType::Tetrahedron => {
            return Err(DofSieveError::UnsupportedGeometry {
                geometry,
                context: "Lagrange element",
            });
        }
        _ => refs.iter().map(|v| v.to_vec()).collect(),
    };
    // a segment has no sub-edges; its inner nodes are added as interior below
    for &[a, b] in geometry.edge_vertices() {
        for k in 1..p {
            nodes.push(lerp(refs[a], refs[b], k as f64 / pf));
        }
    }
    for f in 0..geometry.num_faces() {
        let cycle = geometry.face_vertices()[f];
        let face_geom = geometry.face_geometry(f);
        let corners: Vec<&[f64]> = cycle.iter().map(|&c| refs[c]).collect();
        for ij in polygon_interior(face_geom, p) {
            nodes.push(polygon_point(face_geom, &corners, p, ij));
        }
    }
    match geometry {
        CellType::Segment => nodes.extend((1..p).map(|k| vec![k as f64 / pf])),
        CellType::Triangle | CellType::Quadrilateral => {
            for (i, j) in polygon_interior(geometry, p) {
                nodes.push(vec![i as f64 / pf, j as f64 / pf]);
            }
        }
        CellType::Hexahedron => {
            for k in 1..p {
                for j in 1..p {
                    for i in 1..p {
                        nodes.push(vec![i as f64 / pf, j as f64 / pf, k as f64 / pf]);
                    }
                }
            }
        }
        CellType::Vertex | CellType::Tetrahedron => {}
    }
    Ok(nodes)
}

/// H1 collection of a given default order for meshes of dimension `dim`.
#[derive(Debug)]
pub struct LagrangeCollection {
    dim: usize,
    order: u8,
    cache: RwLock<HashMap<(CellType, u8), Arc<LagrangeElement>>>,
}

impl LagrangeCollection {
    pub fn new(order: u8, dim: usize) -> Result<Self, DofSieveError> {
        if order == 0 || order > MAX_LAGRANGE_ORDER {
            return Err(DofSieveError::OrderOutOfRange {
                order: order as u32,
                min: 1,
                max: MAX_LAGRANGE_ORDER,
            });
        }
        Ok(Self {
            dim,
            order,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }
}

impl BasisCatalog for LagrangeCollection {
    type Element = LagrangeElement;

    fn name(&self) -> String {
        format!("H1_{}D_P{}", self.dim, self.order)
    }

    fn from_name(name: &str) -> Result<Self, DofSieveError> {
        let parse_err = || DofSieveError::Parse {
            line: 0,
            message: format!("unknown basis collection `{name}`"),
        };
        let rest = name.strip_prefix("H1_").ok_or_else(parse_err)?;
        let (dim, order) = rest.split_once("D_P").ok_or_else(parse_err)?;
        let dim: usize = dim.parse().map_err(|_| parse_err())?;
        let order: u8 = order.parse().map_err(|_| parse_err())?;
        LagrangeCollection::new(order, dim)
    }

    fn default_order(&self) -> u8 {
        self.order
    }

    fn num_dofs(&self, geometry: CellType, order: u8) -> usize {
        let p = order as usize;
        if p == 0 {
            return 0;
        }
        match geometry {
            CellType::Vertex => 1,
            CellType::Segment => p - 1,
            CellType::Triangle => (p - 1) * p.saturating_sub(2) / 2,
            CellType::Quadrilateral => (p - 1) * (p - 1),
            CellType::Tetrahedron => (p - 1) * p.saturating_sub(2) * p.saturating_sub(3) / 6,
            CellType::Hexahedron => (p - 1) * (p - 1) * (p - 1),
        }
    }

    fn dof_ordering(&self, geometry: CellType, order: u8, orientation: Orientation) -> Vec<i64> {
        let n = self.num_dofs(geometry, order);
        if orientation.is_identity() {
            return (0..n as i64).collect();
        }
        match geometry {
            CellType::Segment => {
                if orientation.corner_map(2, 0) == 0 {
                    (0..n as i64).collect()
                } else {
                    (0..n as i64).rev().collect()
                }
            }
            CellType::Triangle | CellType::Quadrilateral => {
                let nv = geometry.num_vertices();
                let canonical = polygon_interior(geometry, order);
                let index: HashMap<(u8, u8), usize> =
                    canonical.iter().enumerate().map(|(k, &ij)| (ij, k)).collect();
                let refs = geometry.reference_vertices();
                let corners: Vec<&[f64]> =
                    (0..nv).map(|k| refs[orientation.corner_map(nv, k)]).collect();
                canonical
                    .iter()
                    .map(|&ij| {
                        let x = polygon_point(geometry, &corners, order, ij);
                        let key = (
                            (x[0] * order as f64).round() as u8,
                            (x[1] * order as f64).round() as u8,
                        );
                        index.get(&key).map_or(-1, |&k| k as i64)
                    })
                    .collect()
            }
            _ => (0..n as i64).collect(),
        }
    }

    fn element(&self, geometry: CellType, order: u8) -> Result<Arc<LagrangeElement>, DofSieveError> {
        if let Some(fe) = self.cache.read().get(&(geometry, order)) {
            return Ok(Arc::clone(fe));
        }
        let fe = Arc::new(LagrangeElement::new(geometry, order)?);
        self.cache
            .write()
            .entry((geometry, order))
            .or_insert_with(|| Arc::clone(&fe));
        Ok(fe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::point_matrix::PointMatrix;

    #[test]
    fn node_counts_match_entity_counts() {
        let c = LagrangeCollection::new(3, 3).expect("collection");
        for geom in [
            CellType::Segment,
            CellType::Triangle,
            CellType::Quadrilateral,
            CellType::Hexahedron,
        ] {
            let fe = c.element(geom, 3).expect("element");
            let mut expect = geom.num_vertices() * c.num_dofs(CellType::Vertex, 3)
                + geom.num_edges() * c.num_dofs(CellType::Segment, 3)
                + c.num_dofs(geom, 3);
            for f in 0..geom.num_faces() {
                expect += c.num_dofs(geom.face_geometry(f), 3);
            }
            assert_eq!(fe.num_dofs(), expect, "{geom:?}");
        }
    }

    #[test]
    fn segment_nodes_are_ends_then_interior() {
        for p in 1..=4u8 {
            let fe = LagrangeElement::new(CellType::Segment, p).expect("segment");
            assert_eq!(fe.num_dofs(), p as usize + 1);
        }
        let fe = LagrangeElement::new(CellType::Segment, 3).expect("P3");
        let x: Vec<f64> = fe.nodes().iter().map(|n| n[0]).collect();
        let want = [0.0, 1.0, 1.0 / 3.0, 2.0 / 3.0];
        for (a, b) in x.iter().zip(want) {
            assert!((a - b).abs() < 1e-14, "{x:?}");
        }
    }

    #[test]
    fn shapes_are_nodal_and_partition_unity() {
        let fe = LagrangeElement::new(CellType::Triangle, 3).expect("P3");
        for (i, x) in fe.nodes().iter().enumerate() {
            let phi = fe.shape(x);
            for (j, v) in phi.iter().enumerate() {
                let e = if i == j { 1.0 } else { 0.0 };
                assert!((v - e).abs() < 1e-10);
            }
        }
        let s: f64 = fe.shape(&[0.21, 0.33]).iter().sum();
        assert!((s - 1.0).abs() < 1e-12);
    }

    #[test]
    fn transfer_to_left_half_of_segment() {
        let fe = LagrangeElement::new(CellType::Segment, 1).expect("P1");
        let pm = PointMatrix::new(CellType::Segment, vec![vec![0.0], vec![0.5]]).expect("pm");
        let i = fe.transfer_matrix(&fe, &pm);
        assert!((i[(1, 0)] - 0.5).abs() < 1e-14 && (i[(1, 1)] - 0.5).abs() < 1e-14);
        assert!((i[(0, 0)] - 1.0).abs() < 1e-14 && i[(0, 1)].abs() < 1e-14);
    }

    #[test]
    fn reversed_edge_ordering() {
        let c = LagrangeCollection::new(4, 2).expect("collection");
        assert_eq!(
            c.dof_ordering(CellType::Segment, 4, Orientation::REVERSED_EDGE),
            vec![2, 1, 0]
        );
    }

    #[test]
    fn quad_face_ordering_is_a_permutation() {
        let c = LagrangeCollection::new(4, 3).expect("collection");
        for rot in 0..4 {
            for flip in [false, true] {
                let mut ord = c.dof_ordering(CellType::Quadrilateral, 4, Orientation { rot, flip });
                ord.sort_unstable();
                assert_eq!(ord, (0..9).collect::<Vec<i64>>());
            }
        }
    }

    #[test]
    fn name_round_trip() {
        let c = LagrangeCollection::from_name("H1_2D_P3").expect("parse");
        assert_eq!(c.default_order(), 3);
        assert_eq!(c.name(), "H1_2D_P3");
        assert!(LagrangeCollection::from_name("ND_2D_P1").is_err());
    }
}
