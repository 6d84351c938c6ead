//! Top-level module for mesh topology abstractions.
//!
//! This module provides the mesh side of a finite element space:
//! - Cell types with their reference vertex/edge/face tables
//! - Orientations of shared edges and faces
//! - Non-conforming master/slave lists and point matrices
//! - Coarse/fine embeddings recorded by refinement and derefinement
//! - The [`MeshTopology`] provider trait with an in-memory implementation,
//!   structured generators and a local refiner

pub mod cell_type;
pub mod generation;
pub mod in_memory;
pub mod mesh;
pub mod nonconforming;
pub mod orientation;
pub mod point_matrix;
pub mod refine;
pub mod transforms;

pub use cell_type::CellType;
pub use in_memory::{InMemoryMesh, MeshBuilder};
pub use mesh::{BoundaryEntity, EntityKind, MeshOperation, MeshTopology};
pub use nonconforming::{NcList, NcMaster, NcSlave, SlaveEntity};
pub use orientation::Orientation;
pub use point_matrix::PointMatrix;
pub use transforms::{CoarseFineTransforms, CoarseToFine, Embedding};
