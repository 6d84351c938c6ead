//! The mesh topology provider consumed by a finite element space.
//!
//! Implementors expose entity counts, incidences with orientations,
//! non-conforming master/slave lists and the transforms of the last
//! adaptation step. Only 3D meshes have faces; in 2D the element boundary
//! is made of edges, in 1D of vertices.

use crate::topology::cell_type::CellType;
use crate::topology::nonconforming::NcList;
use crate::topology::orientation::Orientation;
use crate::topology::transforms::CoarseFineTransforms;

/// Entity kinds owning DOFs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Vertex,
    Edge,
    Face,
}

impl EntityKind {
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Vertex => "vertex",
            EntityKind::Edge => "edge",
            EntityKind::Face => "face",
        }
    }
}

/// The kind of change that produced the current mesh sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MeshOperation {
    #[default]
    None,
    Refine,
    Derefine,
    Rebalance,
}

/// The mesh entity covered by a boundary element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundaryEntity {
    pub kind: EntityKind,
    pub index: usize,
    /// Element on the inner side of the boundary entity.
    pub element: usize,
    pub attribute: u32,
}

pub trait MeshTopology {
    fn dimension(&self) -> usize;

    /// Topology version; advances by one per refinement/derefinement step.
    fn sequence(&self) -> u64;

    fn num_vertices(&self) -> usize;
    fn num_edges(&self) -> usize;
    /// Number of 2D faces (zero below dimension 3).
    fn num_faces(&self) -> usize;
    fn num_elements(&self) -> usize;
    fn num_boundary_elements(&self) -> usize;

    fn element_geometry(&self, elem: usize) -> CellType;
    fn face_geometry(&self, face: usize) -> CellType;

    fn element_vertices(&self, elem: usize) -> &[usize];
    /// Edges of an element in local order, with the element's view of each edge.
    fn element_edges(&self, elem: usize) -> &[(usize, Orientation)];
    /// Faces of a 3D element in local order, with orientations.
    fn element_faces(&self, elem: usize) -> &[(usize, Orientation)];

    /// Canonical vertex pair of an edge.
    fn edge_vertices(&self, edge: usize) -> [usize; 2];
    /// Canonical vertex cycle of a face.
    fn face_vertices(&self, face: usize) -> &[usize];
    /// Edges of a face, in the face's local order, oriented relative to the face cycle.
    fn face_edges(&self, face: usize) -> &[(usize, Orientation)];

    fn boundary_entity(&self, bel: usize) -> BoundaryEntity;

    /// Whether the mesh has hanging entities.
    fn is_nonconforming(&self) -> bool {
        self.nc_list(EntityKind::Edge).is_some_and(|l| !l.is_empty())
            || self.nc_list(EntityKind::Face).is_some_and(|l| !l.is_empty())
    }

    /// Master/slave list for edges or faces.
    fn nc_list(&self, kind: EntityKind) -> Option<&NcList>;

    fn last_operation(&self) -> MeshOperation;

    /// Embeddings of the current elements in the elements of the previous sequence.
    fn refinement_transforms(&self) -> Option<&CoarseFineTransforms>;

    /// Embeddings of the previous sequence's elements in the current elements.
    fn derefinement_transforms(&self) -> Option<&CoarseFineTransforms>;

    fn num_entities(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Vertex => self.num_vertices(),
            EntityKind::Edge => self.num_edges(),
            EntityKind::Face => self.num_faces(),
        }
    }
}
