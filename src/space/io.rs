//! Text format of a finite element space.
//!
//! # Format
//! ```text
//! FiniteElementSpace                 (v0.9)  |  MFEM FiniteElementSpace v1.0
//! FiniteElementCollection: <name>
//! VDim: <vdim>
//! Ordering: <0|1>
//! ```
//! A v1.0 header is followed by sections, each a keyword line and its
//! values, terminated by `End: MFEM FiniteElementSpace v1.0`. Lines starting
//! with `#` between sections are comments.
//!
//! | Section | Values |
//! |---|---|
//! | `NURBS_order` | one order |
//! | `NURBS_orders` | count, then one order per knot vector |
//! | `NURBS_periodic` | count and master boundaries, count and slave boundaries |
//! | `NURBS_weights` | count, then the weights |
//! | `element_orders` | count, then one order per element |
//!
//! Variable-order spaces are written as v1.0 with an `element_orders`
//! section; everything else is written as v0.9. The mesh is not part of the
//! format: [`load`] attaches the space to a caller-supplied mesh.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::basis::BasisCatalog;
use crate::dof_error::DofSieveError;
use crate::space::fespace::{FiniteElementSpace, SpaceOptions};
use crate::space::ordering::Ordering;
use crate::topology::mesh::MeshTopology;

const HEADER_V0_9: &str = "FiniteElementSpace";
const HEADER_V1_0: &str = "MFEM FiniteElementSpace v1.0";
const END_V1_0: &str = "End: MFEM FiniteElementSpace v1.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatVersion {
    V0_9,
    V1_0,
}

/// NURBS sections of a v1.0 file, kept verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NurbsMetadata {
    pub order: Option<u32>,
    pub orders: Option<Vec<u32>>,
    /// Master and slave boundary lists.
    pub periodic: Option<(Vec<i64>, Vec<i64>)>,
    pub weights: Option<Vec<f64>>,
}

impl NurbsMetadata {
    pub fn is_empty(&self) -> bool {
        self.order.is_none() && self.orders.is_none() && self.periodic.is_none() && self.weights.is_none()
    }
}

/// Everything the text format stores about a space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpaceHeader {
    pub version: FormatVersion,
    pub collection: String,
    pub vdim: usize,
    pub ordering: Ordering,
    pub element_orders: Option<Vec<u8>>,
    pub nurbs: NurbsMetadata,
}

impl SpaceHeader {
    pub fn from_space<M: MeshTopology, C: BasisCatalog>(space: &FiniteElementSpace<M, C>) -> Self {
        let element_orders = space
            .is_variable_order()
            .then(|| space.element_orders().to_vec());
        Self {
            version: if element_orders.is_some() {
                FormatVersion::V1_0
            } else {
                FormatVersion::V0_9
            },
            collection: space.catalog().name(),
            vdim: space.vdim(),
            ordering: space.ordering(),
            element_orders,
            nurbs: NurbsMetadata::default(),
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
    writeln!(f, "{}", values.len())?;
    if !values.is_empty() {
        writeln!(f, "{}", values.iter().join("\n"))?;
    }
    Ok(())
}

impl fmt::Display for SpaceHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v1 = self.version == FormatVersion::V1_0;
        writeln!(f, "{}", if v1 { HEADER_V1_0 } else { HEADER_V0_9 })?;
        writeln!(f, "FiniteElementCollection: {}", self.collection)?;
        writeln!(f, "VDim: {}", self.vdim)?;
        writeln!(f, "Ordering: {}", self.ordering.code())?;
        if !v1 {
            return Ok(());
        }
        if let Some(order) = self.nurbs.order {
            writeln!(f, "NURBS_order\n{order}")?;
        }
        if let Some(orders) = &self.nurbs.orders {
            writeln!(f, "NURBS_orders")?;
            write_list(f, orders)?;
        }
        if let Some((master, slave)) = &self.nurbs.periodic {
            writeln!(f, "NURBS_periodic")?;
            write_list(f, master)?;
            write_list(f, slave)?;
        }
        if let Some(weights) = &self.nurbs.weights {
            writeln!(f, "NURBS_weights")?;
            write_list(f, weights)?;
        }
        if let Some(orders) = &self.element_orders {
            writeln!(f, "element_orders")?;
            write_list(f, orders)?;
        }
        writeln!(f, "{END_V1_0}")
    }
}

/// Line and token reader over the whole input.
struct Reader<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    tokens: std::vec::IntoIter<&'a str>,
    line: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
            tokens: Vec::new().into_iter(),
            line: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> DofSieveError {
        DofSieveError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    /// Next non-blank line, trimmed; with `comments`, `#` lines are skipped too.
    fn line(&mut self, comments: bool) -> Option<&'a str> {
        for (i, raw) in self.lines.by_ref() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || (comments && trimmed.starts_with('#')) {
                continue;
            }
            self.line = i + 1;
            self.tokens = Vec::new().into_iter();
            return Some(trimmed);
        }
        None
    }

    fn token<T: FromStr>(&mut self, what: &str) -> Result<T, DofSieveError> {
        loop {
            if let Some(tok) = self.tokens.next() {
                return tok
                    .parse()
                    .map_err(|_| self.error(format!("invalid {what}: `{tok}`")));
            }
            let line = self
                .line(false)
                .ok_or_else(|| self.error(format!("unexpected end of input reading {what}")))?;
            self.tokens = line.split_whitespace().collect::<Vec<_>>().into_iter();
        }
    }

    fn list<T: FromStr>(&mut self, what: &str) -> Result<Vec<T>, DofSieveError> {
        let n: usize = self.token(&format!("{what} count"))?;
        (0..n).map(|_| self.token(what)).collect()
    }

    fn key_value(&mut self, key: &str) -> Result<&'a str, DofSieveError> {
        let line = self
            .line(false)
            .ok_or_else(|| self.error(format!("missing `{key}:` line")))?;
        match line.split_once(':') {
            Some((k, v)) if k.trim() == key => Ok(v.trim()),
            _ => Err(DofSieveError::InvalidHeader {
                expected: format!("{key}: ..."),
                found: line.to_string(),
            }),
        }
    }
}

impl FromStr for SpaceHeader {
    type Err = DofSieveError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut r = Reader::new(text);
        let first = r.line(false).unwrap_or_default();
        let version = match first {
            HEADER_V0_9 => FormatVersion::V0_9,
            HEADER_V1_0 => FormatVersion::V1_0,
            other => {
                return Err(DofSieveError::InvalidHeader {
                    expected: format!("{HEADER_V0_9} | {HEADER_V1_0}"),
                    found: other.to_string(),
                });
            }
        };
        let collection = r.key_value("FiniteElementCollection")?.to_string();
        let vdim: usize = r
            .key_value("VDim")?
            .parse()
            .map_err(|_| r.error("invalid VDim"))?;
        let code: u32 = r
            .key_value("Ordering")?
            .parse()
            .map_err(|_| r.error("invalid Ordering"))?;
        let ordering = Ordering::from_code(code)?;

        let mut header = SpaceHeader {
            version,
            collection,
            vdim,
            ordering,
            element_orders: None,
            nurbs: NurbsMetadata::default(),
        };
        if version == FormatVersion::V0_9 {
            return Ok(header);
        }
        loop {
            let section = r
                .line(true)
                .ok_or_else(|| r.error(format!("missing `{END_V1_0}`")))?;
            match section {
                "NURBS_order" | "NURBS_orders" => {
                    if header.nurbs.order.is_some() || header.nurbs.orders.is_some() {
                        return Err(r.error(format!("{section}: order redefinition")));
                    }
                    if section == "NURBS_order" {
                        header.nurbs.order = Some(r.token("NURBS order")?);
                    } else {
                        header.nurbs.orders = Some(r.list("NURBS order")?);
                    }
                }
                "NURBS_periodic" => {
                    let master = r.list("periodic master")?;
                    let slave = r.list("periodic slave")?;
                    header.nurbs.periodic = Some((master, slave));
                }
                "NURBS_weights" => {
                    if header.nurbs.order.is_none() && header.nurbs.orders.is_none() {
                        return Err(r.error("NURBS_weights before NURBS_order(s)"));
                    }
                    header.nurbs.weights = Some(r.list("NURBS weight")?);
                }
                "element_orders" => {
                    header.element_orders = Some(r.list("element order")?);
                }
                END_V1_0 => break,
                other => return Err(r.error(format!("unknown section `{other}`"))),
            }
        }
        Ok(header)
    }
}

/// Write `space` in the text format.
pub fn save<M, C, W>(space: &FiniteElementSpace<M, C>, mut out: W) -> Result<(), DofSieveError>
where
    M: MeshTopology,
    C: BasisCatalog,
    W: Write,
{
    write!(out, "{}", SpaceHeader::from_space(space))?;
    Ok(())
}

/// Read a space from the text format and attach it to `mesh`.
pub fn load<M, C, R>(mesh: Arc<M>, mut input: R) -> Result<FiniteElementSpace<M, C>, DofSieveError>
where
    M: MeshTopology,
    C: BasisCatalog,
    R: Read,
{
    let mut text = String::new();
    input.read_to_string(&mut text)?;
    let header: SpaceHeader = text.parse()?;
    if !header.nurbs.is_empty() {
        return Err(DofSieveError::Unsupported(
            "NURBS sections require a NURBS collection",
        ));
    }
    let catalog = C::from_name(&header.collection)?;
    let options = SpaceOptions::default()
        .with_vdim(header.vdim)
        .with_ordering(header.ordering);
    log::debug!(
        "loading {} space (vdim {}, {:?})",
        header.collection,
        header.vdim,
        header.ordering
    );
    FiniteElementSpace::with_element_orders(
        mesh,
        Arc::new(catalog),
        options,
        header.element_orders.unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v0_9_header_round_trip() {
        let text = "FiniteElementSpace\nFiniteElementCollection: H1_2D_P3\nVDim: 2\nOrdering: 1\n";
        let h: SpaceHeader = text.parse().unwrap();
        assert_eq!(h.version, FormatVersion::V0_9);
        assert_eq!(h.collection, "H1_2D_P3");
        assert_eq!(h.vdim, 2);
        assert_eq!(h.ordering, Ordering::ComponentMajor);
        assert_eq!(h.to_string(), text);
    }

    #[test]
    fn v1_0_sections_and_comments() {
        let text = "MFEM FiniteElementSpace v1.0\n\
                    FiniteElementCollection: NURBS2\n\
                    VDim: 1\n\
                    Ordering: 0\n\
                    # knot orders\n\
                    NURBS_orders\n2\n2 3\n\
                    NURBS_periodic\n1\n4\n1\n5\n\
                    NURBS_weights\n3\n1 0.5 1\n\
                    End: MFEM FiniteElementSpace v1.0\n";
        let h: SpaceHeader = text.parse().unwrap();
        assert_eq!(h.nurbs.orders, Some(vec![2, 3]));
        assert_eq!(h.nurbs.periodic, Some((vec![4], vec![5])));
        assert_eq!(h.nurbs.weights, Some(vec![1.0, 0.5, 1.0]));
        let again: SpaceHeader = h.to_string().parse().unwrap();
        assert_eq!(again, h);
    }

    #[test]
    fn malformed_inputs() {
        assert!(matches!(
            "Mesh\n".parse::<SpaceHeader>(),
            Err(DofSieveError::InvalidHeader { .. })
        ));
        let unknown = "MFEM FiniteElementSpace v1.0\nFiniteElementCollection: X\nVDim: 1\nOrdering: 0\nbogus\n";
        assert!(matches!(
            unknown.parse::<SpaceHeader>(),
            Err(DofSieveError::Parse { line: 5, .. })
        ));
        let unterminated = "MFEM FiniteElementSpace v1.0\nFiniteElementCollection: X\nVDim: 1\nOrdering: 0\n";
        assert!(unterminated.parse::<SpaceHeader>().is_err());
        let weights_first = "MFEM FiniteElementSpace v1.0\nFiniteElementCollection: X\nVDim: 1\nOrdering: 0\nNURBS_weights\n1\n1\n";
        assert!(weights_first.parse::<SpaceHeader>().is_err());
    }

    #[test]
    fn header_serde_round_trip() {
        let h = SpaceHeader {
            version: FormatVersion::V1_0,
            collection: "H1_2D_P1".into(),
            vdim: 1,
            ordering: Ordering::NodeMajor,
            element_orders: Some(vec![1, 2]),
            nurbs: NurbsMetadata::default(),
        };
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(serde_json::from_str::<SpaceHeader>(&json).unwrap(), h);
    }
}
