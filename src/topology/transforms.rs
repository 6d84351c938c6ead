//! Coarse/fine element relations recorded by one refinement or derefinement step.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::dof_error::DofSieveError;
use crate::topology::cell_type::CellType;
use crate::topology::point_matrix::PointMatrix;

/// Where a fine element sits inside its coarse parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Embedding {
    /// Coarse parent element.
    pub parent: usize,
    /// Geometry of the fine element (and of the parent).
    pub geometry: CellType,
    /// Index into the point matrices of `geometry`.
    pub matrix: usize,
}

/// One embedding per fine element plus the reference transforms they use.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoarseFineTransforms {
    embeddings: Vec<Embedding>,
    point_matrices: BTreeMap<CellType, Vec<PointMatrix>>,
}

/// A distinct way a coarse element is split: its geometry and the sorted list
/// of transforms taken by its children.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RefinementType {
    pub geometry: CellType,
    pub matrices: Vec<usize>,
}

/// Children of each coarse element grouped by refinement type.
#[derive(Clone, Debug, Default)]
pub struct CoarseToFine {
    /// Fine elements of each coarse element, ordered like its type's `matrices`.
    pub fine: Vec<Vec<usize>>,
    /// Refinement type of each coarse element.
    pub ref_type: Vec<usize>,
    pub ref_types: Vec<RefinementType>,
}

impl CoarseFineTransforms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    pub fn embedding(&self, fine: usize) -> Result<&Embedding, DofSieveError> {
        self.embeddings
            .get(fine)
            .ok_or_else(|| DofSieveError::out_of_range("fine element", fine, self.embeddings.len()))
    }

    /// Point matrices used by fine elements of `geometry`.
    pub fn point_matrices(&self, geometry: CellType) -> &[PointMatrix] {
        self.point_matrices
            .get(&geometry)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Geometries that have at least one transform.
    pub fn geometries(&self) -> impl Iterator<Item = CellType> + '_ {
        self.point_matrices.keys().copied()
    }

    pub fn point_matrix(&self, emb: &Embedding) -> Result<&PointMatrix, DofSieveError> {
        let pms = self.point_matrices(emb.geometry);
        pms.get(emb.matrix)
            .ok_or_else(|| DofSieveError::out_of_range("reference transform", emb.matrix, pms.len()))
    }

    /// Register a transform (deduplicated) and return its index.
    pub fn add_point_matrix(&mut self, pm: PointMatrix) -> usize {
        let list = self.point_matrices.entry(pm.geometry()).or_default();
        match list.iter().position(|p| *p == pm) {
            Some(i) => i,
            None => {
                list.push(pm);
                list.len() - 1
            }
        }
    }

    /// Append the embedding of the next fine element.
    pub fn push_embedding(&mut self, parent: usize, pm: PointMatrix) {
        let geometry = pm.geometry();
        let matrix = self.add_point_matrix(pm);
        self.embeddings.push(Embedding {
            parent,
            geometry,
            matrix,
        });
    }

    /// Group fine elements by coarse parent. Every coarse element must have at
    /// least one child.
    pub fn coarse_to_fine(&self, num_coarse: usize) -> Result<CoarseToFine, DofSieveError> {
        let mut children: Vec<Vec<(usize, usize)>> = vec![Vec::new(); num_coarse];
        for (fine, emb) in self.embeddings.iter().enumerate() {
            let slot = children
                .get_mut(emb.parent)
                .ok_or_else(|| DofSieveError::out_of_range("coarse element", emb.parent, num_coarse))?;
            slot.push((emb.matrix, fine));
        }

        let mut out = CoarseToFine {
            fine: Vec::with_capacity(num_coarse),
            ref_type: Vec::with_capacity(num_coarse),
            ref_types: Vec::new(),
        };
        let mut lookup: HashMap<RefinementType, usize> = HashMap::new();
        for (coarse, mut kids) in children.into_iter().enumerate() {
            let Some(&(_, first)) = kids.first() else {
                return Err(DofSieveError::InconsistentMesh(format!(
                    "coarse element {coarse} has no fine elements"
                )));
            };
            kids.sort_unstable();
            let key = RefinementType {
                geometry: self.embeddings[first].geometry,
                matrices: kids.iter().map(|&(m, _)| m).collect(),
            };
            let id = *lookup.entry(key.clone()).or_insert_with(|| {
                out.ref_types.push(key);
                out.ref_types.len() - 1
            });
            out.ref_type.push(id);
            out.fine.push(kids.into_iter().map(|(_, f)| f).collect());
        }
        Ok(out)
    }
}
