//! Cell type metadata and reference-cell tables.
//!
//! Local numbering follows one fixed convention throughout the crate. A
//! simplex edge runs from its lower to its higher local vertex. A tensor-cell
//! edge runs along a positive reference axis, so a quadrilateral's third edge
//! runs `3 -> 2`. Every local face lists its vertices counter-clockwise seen
//! from outside the cell.

use serde::{Deserialize, Serialize};

/// Cell types supported by the DOF machinery.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CellType {
    /// 0D vertex.
    #[default]
    Vertex,
    /// 1D segment/edge.
    Segment,
    /// 2D simplex (triangle).
    Triangle,
    /// 2D tensor-product cell (quad).
    Quadrilateral,
    /// 3D simplex (tet).
    Tetrahedron,
    /// 3D tensor-product cell (hex).
    Hexahedron,
}

const TRIANGLE_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [0, 2]];
const QUAD_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [3, 2], [0, 3]];
const TET_EDGES: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];
const HEX_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [3, 2],
    [0, 3],
    [4, 5],
    [5, 6],
    [7, 6],
    [4, 7],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

const TRIANGLE_FACE: [&[usize]; 1] = [&[0, 1, 2]];
const QUAD_FACE: [&[usize]; 1] = [&[0, 1, 2, 3]];
const TET_FACES: [&[usize]; 4] = [&[1, 2, 3], &[0, 3, 2], &[0, 1, 3], &[0, 2, 1]];
const HEX_FACES: [&[usize]; 6] = [
    &[3, 2, 1, 0],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[3, 0, 4, 7],
    &[4, 5, 6, 7],
];

const VERTEX_REF: [&[f64]; 1] = [&[]];
const SEGMENT_REF: [&[f64]; 2] = [&[0.0], &[1.0]];
const TRIANGLE_REF: [&[f64]; 3] = [&[0.0, 0.0], &[1.0, 0.0], &[0.0, 1.0]];
const QUAD_REF: [&[f64]; 4] = [&[0.0, 0.0], &[1.0, 0.0], &[1.0, 1.0], &[0.0, 1.0]];
const TET_REF: [&[f64]; 4] = [
    &[0.0, 0.0, 0.0],
    &[1.0, 0.0, 0.0],
    &[0.0, 1.0, 0.0],
    &[0.0, 0.0, 1.0],
];
const HEX_REF: [&[f64]; 8] = [
    &[0.0, 0.0, 0.0],
    &[1.0, 0.0, 0.0],
    &[1.0, 1.0, 0.0],
    &[0.0, 1.0, 0.0],
    &[0.0, 0.0, 1.0],
    &[1.0, 0.0, 1.0],
    &[1.0, 1.0, 1.0],
    &[0.0, 1.0, 1.0],
];

impl CellType {
    /// Every supported cell type, lowest dimension first.
    pub const ALL: [CellType; 6] = [
        CellType::Vertex,
        CellType::Segment,
        CellType::Triangle,
        CellType::Quadrilateral,
        CellType::Tetrahedron,
        CellType::Hexahedron,
    ];

    /// Returns the topological dimension of the cell.
    pub fn dimension(self) -> usize {
        match self {
            CellType::Vertex => 0,
            CellType::Segment => 1,
            CellType::Triangle | CellType::Quadrilateral => 2,
            CellType::Tetrahedron | CellType::Hexahedron => 3,
        }
    }

    /// `true` for simplices (reference domain bounded by `sum(x) <= 1`).
    pub fn is_simplex(self) -> bool {
        matches!(
            self,
            CellType::Segment | CellType::Triangle | CellType::Tetrahedron
        )
    }

    pub fn num_vertices(self) -> usize {
        self.reference_vertices().len()
    }

    pub fn num_edges(self) -> usize {
        self.edge_vertices().len()
    }

    /// Number of 2D faces; zero for cells of dimension below 3.
    pub fn num_faces(self) -> usize {
        if self.dimension() == 3 {
            self.face_vertices().len()
        } else {
            0
        }
    }

    /// Local vertex pairs of each local edge, in the edge's direction.
    ///
    /// Only proper sub-edges are listed: a segment has none, so its nodes
    /// between the two vertices are interior nodes. Code that needs a 1D
    /// cell as an edge uses the cell itself.
    pub fn edge_vertices(self) -> &'static [[usize; 2]] {
        match self {
            CellType::Vertex | CellType::Segment => &[],
            CellType::Triangle => &TRIANGLE_EDGES,
            CellType::Quadrilateral => &QUAD_EDGES,
            CellType::Tetrahedron => &TET_EDGES,
            CellType::Hexahedron => &HEX_EDGES,
        }
    }

    /// Local vertex cycles of each 2D sub-cell. A 2D cell is its own single face.
    pub fn face_vertices(self) -> &'static [&'static [usize]] {
        match self {
            CellType::Vertex | CellType::Segment => &[],
            CellType::Triangle => &TRIANGLE_FACE,
            CellType::Quadrilateral => &QUAD_FACE,
            CellType::Tetrahedron => &TET_FACES,
            CellType::Hexahedron => &HEX_FACES,
        }
    }

    /// Geometry of local face `i`.
    pub fn face_geometry(self, i: usize) -> CellType {
        match self.face_vertices().get(i).map(|f| f.len()) {
            Some(3) => CellType::Triangle,
            Some(4) => CellType::Quadrilateral,
            _ => CellType::Vertex,
        }
    }

    /// Polygon geometry with `n` vertices, if any.
    pub fn polygon(n: usize) -> Option<CellType> {
        match n {
            1 => Some(CellType::Vertex),
            2 => Some(CellType::Segment),
            3 => Some(CellType::Triangle),
            4 => Some(CellType::Quadrilateral),
            _ => None,
        }
    }

    /// Reference-domain coordinates of the cell's vertices.
    pub fn reference_vertices(self) -> &'static [&'static [f64]] {
        match self {
            CellType::Vertex => &VERTEX_REF,
            CellType::Segment => &SEGMENT_REF,
            CellType::Triangle => &TRIANGLE_REF,
            CellType::Quadrilateral => &QUAD_REF,
            CellType::Tetrahedron => &TET_REF,
            CellType::Hexahedron => &HEX_REF,
        }
    }

    /// Reference-domain barycenter.
    pub fn center(self) -> Vec<f64> {
        let verts = self.reference_vertices();
        let mut c = vec![0.0; self.dimension()];
        for v in verts {
            for (ci, vi) in c.iter_mut().zip(v.iter()) {
                *ci += vi / verts.len() as f64;
            }
        }
        c
    }

    /// Whether `x` lies inside the reference cell, up to `eps`.
    pub fn contains_reference_point(self, x: &[f64], eps: f64) -> bool {
        if x.len() != self.dimension() || x.iter().any(|&xi| xi < -eps) {
            return false;
        }
        if self.is_simplex() {
            x.iter().sum::<f64>() <= 1.0 + eps
        } else {
            x.iter().all(|&xi| xi <= 1.0 + eps)
        }
    }

    /// Values of the (multi)linear vertex shape functions at `x`.
    pub fn vertex_shape(self, x: &[f64]) -> Vec<f64> {
        if self.is_simplex() {
            let mut out = Vec::with_capacity(x.len() + 1);
            out.push(1.0 - x.iter().sum::<f64>());
            out.extend_from_slice(x);
            return out;
        }
        self.reference_vertices()
            .iter()
            .map(|v| {
                v.iter()
                    .zip(x)
                    .map(|(&vd, &xd)| if vd > 0.5 { xd } else { 1.0 - xd })
                    .product()
            })
            .collect()
    }

    /// Gradients of the vertex shape functions at `x`: `[vertex][dim]`.
    pub fn vertex_shape_grad(self, x: &[f64]) -> Vec<Vec<f64>> {
        let dim = self.dimension();
        if self.is_simplex() {
            let mut out = Vec::with_capacity(dim + 1);
            out.push(vec![-1.0; dim]);
            for d in 0..dim {
                let mut g = vec![0.0; dim];
                g[d] = 1.0;
                out.push(g);
            }
            return out;
        }
        self.reference_vertices()
            .iter()
            .map(|v| {
                (0..dim)
                    .map(|k| {
                        (0..dim)
                            .map(|d| {
                                let upper = v[d] > 0.5;
                                match (d == k, upper) {
                                    (true, true) => 1.0,
                                    (true, false) => -1.0,
                                    (false, true) => x[d],
                                    (false, false) => 1.0 - x[d],
                                }
                            })
                            .product()
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_have_no_sub_edges() {
        assert_eq!(CellType::Segment.num_edges(), 0);
        assert_eq!(CellType::Triangle.num_edges(), 3);
        assert_eq!(CellType::Hexahedron.num_edges(), 12);
    }

    #[test]
    fn simplex_edges_run_low_to_high() {
        for cell in [CellType::Triangle, CellType::Tetrahedron] {
            for e in cell.edge_vertices() {
                assert!(e[0] < e[1], "{cell:?} edge {e:?}");
            }
        }
    }

    #[test]
    fn tensor_edges_run_along_positive_axes() {
        for cell in [CellType::Quadrilateral, CellType::Hexahedron] {
            let refs = cell.reference_vertices();
            for &[a, b] in cell.edge_vertices() {
                let step: Vec<f64> = refs[b].iter().zip(refs[a]).map(|(x, y)| x - y).collect();
                assert_eq!(step.iter().filter(|&&d| d == 1.0).count(), 1, "{cell:?} edge {a}-{b}");
                assert_eq!(step.iter().filter(|&&d| d == 0.0).count(), step.len() - 1);
            }
        }
    }

    #[test]
    fn vertex_shapes_are_nodal() {
        for cell in CellType::ALL.into_iter().skip(1) {
            for (i, v) in cell.reference_vertices().iter().enumerate() {
                let phi = cell.vertex_shape(v);
                for (j, p) in phi.iter().enumerate() {
                    let expect = if i == j { 1.0 } else { 0.0 };
                    assert!((p - expect).abs() < 1e-14, "{cell:?} {i} {j}");
                }
            }
        }
    }

    #[test]
    fn vertex_shape_gradients_sum_to_zero() {
        let x = [0.3, 0.2, 0.1];
        for cell in [CellType::Quadrilateral, CellType::Hexahedron, CellType::Triangle] {
            let dim = cell.dimension();
            let grads = cell.vertex_shape_grad(&x[..dim]);
            for d in 0..dim {
                let s: f64 = grads.iter().map(|g| g[d]).sum();
                assert!(s.abs() < 1e-14);
            }
        }
    }

    #[test]
    fn containment() {
        assert!(CellType::Triangle.contains_reference_point(&[0.5, 0.5], 1e-12));
        assert!(!CellType::Triangle.contains_reference_point(&[0.6, 0.5], 1e-12));
        assert!(CellType::Quadrilateral.contains_reference_point(&[1.0, 0.0], 1e-12));
        assert!(!CellType::Segment.contains_reference_point(&[1.1], 1e-12));
    }
}
