//! Master/slave lists of a non-conforming mesh.
//!
//! A master edge or face is a coarse entity whose trace constrains a set of
//! smaller slave entities lying inside it. Each slave carries a point matrix
//! giving its position in the master's reference domain, with columns ordered
//! like the slave's canonical vertices.

use serde::{Deserialize, Serialize};

use crate::dof_error::DofSieveError;
use crate::topology::cell_type::CellType;
use crate::topology::point_matrix::PointMatrix;

/// The mesh entity a slave refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlaveEntity {
    /// An ordinary edge (in an edge list) or face (in a face list).
    Regular(usize),
    /// An edge constrained by a master face, treated as a zero-height face.
    DegenerateEdge(usize),
}

impl SlaveEntity {
    pub fn index(self) -> usize {
        match self {
            SlaveEntity::Regular(i) | SlaveEntity::DegenerateEdge(i) => i,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NcSlave {
    pub entity: SlaveEntity,
    pub geometry: CellType,
    /// Index into [`NcList::point_matrices`].
    pub matrix: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NcMaster {
    pub index: usize,
    pub geometry: CellType,
    pub slaves: Vec<NcSlave>,
}

/// Masters with their slaves for one entity dimension (edges or faces).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NcList {
    masters: Vec<NcMaster>,
    point_matrices: Vec<PointMatrix>,
}

impl NcList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.masters.is_empty()
    }

    pub fn masters(&self) -> &[NcMaster] {
        &self.masters
    }

    pub fn point_matrices(&self) -> &[PointMatrix] {
        &self.point_matrices
    }

    pub fn num_slaves(&self) -> usize {
        self.masters.iter().map(|m| m.slaves.len()).sum()
    }

    /// Register a master entity; returns its position in [`NcList::masters`].
    pub fn add_master(&mut self, index: usize, geometry: CellType) -> usize {
        self.masters.push(NcMaster {
            index,
            geometry,
            slaves: Vec::new(),
        });
        self.masters.len() - 1
    }

    /// Attach a slave to master `master` (a position returned by [`NcList::add_master`]).
    pub fn add_slave(
        &mut self,
        master: usize,
        entity: SlaveEntity,
        pm: PointMatrix,
    ) -> Result<(), DofSieveError> {
        let len = self.masters.len();
        let m = self
            .masters
            .get_mut(master)
            .ok_or_else(|| DofSieveError::out_of_range("nc master", master, len))?;
        if pm.master_dimension() != m.geometry.dimension() {
            return Err(DofSieveError::InconsistentMesh(format!(
                "slave point matrix has dimension {}, master {:?} needs {}",
                pm.master_dimension(),
                m.geometry,
                m.geometry.dimension()
            )));
        }
        let matrix = match self.point_matrices.iter().position(|p| *p == pm) {
            Some(i) => i,
            None => {
                self.point_matrices.push(pm.clone());
                self.point_matrices.len() - 1
            }
        };
        m.slaves.push(NcSlave {
            entity,
            geometry: pm.geometry(),
            matrix,
        });
        Ok(())
    }

    pub fn point_matrix(&self, slave: &NcSlave) -> Result<&PointMatrix, DofSieveError> {
        self.point_matrices.get(slave.matrix).ok_or_else(|| {
            DofSieveError::out_of_range("point matrix", slave.matrix, self.point_matrices.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_matrices_are_shared() {
        let mut list = NcList::new();
        let m = list.add_master(3, CellType::Segment);
        let half = PointMatrix::new(CellType::Segment, vec![vec![0.0], vec![0.5]]).expect("pm");
        list.add_slave(m, SlaveEntity::Regular(7), half.clone()).expect("slave");
        let m2 = list.add_master(4, CellType::Segment);
        list.add_slave(m2, SlaveEntity::Regular(8), half).expect("slave");
        assert_eq!(list.point_matrices().len(), 1);
        assert_eq!(list.num_slaves(), 2);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut list = NcList::new();
        let m = list.add_master(0, CellType::Quadrilateral);
        let seg = PointMatrix::new(CellType::Segment, vec![vec![0.0], vec![0.5]]).expect("pm");
        assert!(list.add_slave(m, SlaveEntity::Regular(1), seg).is_err());
    }
}
