//! Quadrature rules on the unit reference cells.

use crate::dof_error::DofSieveError;
use crate::topology::cell_type::CellType;

/// Quadrature rule on the reference element.
#[derive(Clone, Debug)]
pub struct QuadratureRule {
    /// Name for diagnostics.
    pub name: String,
    /// Quadrature points in reference coordinates.
    pub points: Vec<Vec<f64>>,
    /// Quadrature weights.
    pub weights: Vec<f64>,
}

impl QuadratureRule {
    /// Rule with `n` points per direction on `cell_type`, exact for tensor
    /// polynomials of degree `2n - 1` (`2n - 2` on triangles).
    pub fn for_cell(cell_type: CellType, n: usize) -> Result<Self, DofSieveError> {
        let line = gauss_legendre_1d(n);
        match cell_type {
            CellType::Vertex => Ok(QuadratureRule {
                name: "point".into(),
                points: vec![vec![]],
                weights: vec![1.0],
            }),
            CellType::Segment => Ok(line),
            CellType::Quadrilateral => Ok(tensor_product_quadrature(&line, &line, "gauss-quad")),
            CellType::Hexahedron => {
                let quad = tensor_product_quadrature(&line, &line, "gauss-quad");
                Ok(tensor_product_quadrature(&quad, &line, "gauss-hex"))
            }
            CellType::Triangle => Ok(collapsed_triangle(&line)),
            other => Err(DofSieveError::UnsupportedGeometry {
                geometry: other,
                context: "quadrature",
            }),
        }
    }

    /// Dimension of the quadrature points.
    pub fn dimension(&self) -> usize {
        self.points.first().map(|p| p.len()).unwrap_or(0)
    }
}

/// Gauss–Legendre rule with `n` points on `[0, 1]`.
pub fn gauss_legendre_1d(n: usize) -> QuadratureRule {
    let n = n.max(1);
    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for i in 0..n {
        // Newton on P_n starting from the Chebyshev-like guess
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = 1.0;
        for _ in 0..100 {
            let (p, d) = legendre(n, x);
            dp = d;
            let dx = p / d;
            x -= dx;
            if dx.abs() < 1e-16 {
                break;
            }
        }
        let (_, d) = legendre(n, x);
        if d != 0.0 {
            dp = d;
        }
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        points.push(vec![0.5 * (1.0 - x)]);
        weights.push(0.5 * w);
    }
    QuadratureRule {
        name: format!("gauss{n}"),
        points,
        weights,
    }
}

/// Value and derivative of the Legendre polynomial `P_n` at `x`.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let d = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, d)
}

fn tensor_product_quadrature(a: &QuadratureRule, b: &QuadratureRule, name: &str) -> QuadratureRule {
    let mut points = Vec::with_capacity(a.points.len() * b.points.len());
    let mut weights = Vec::with_capacity(a.points.len() * b.points.len());
    for (pb, wb) in b.points.iter().zip(b.weights.iter()) {
        for (pa, wa) in a.points.iter().zip(a.weights.iter()) {
            let mut pt = Vec::with_capacity(pa.len() + pb.len());
            pt.extend_from_slice(pa);
            pt.extend_from_slice(pb);
            points.push(pt);
            weights.push(wa * wb);
        }
    }
    QuadratureRule {
        name: name.to_string(),
        points,
        weights,
    }
}

/// Duffy-collapsed tensor rule: `(u, v) -> (u, v (1 - u))`.
fn collapsed_triangle(line: &QuadratureRule) -> QuadratureRule {
    let wider = gauss_legendre_1d(line.points.len() + 1);
    let mut points = Vec::new();
    let mut weights = Vec::new();
    for (pu, wu) in wider.points.iter().zip(&wider.weights) {
        for (pv, wv) in line.points.iter().zip(&line.weights) {
            let u = pu[0];
            points.push(vec![u, pv[0] * (1.0 - u)]);
            weights.push(wu * wv * (1.0 - u));
        }
    }
    QuadratureRule {
        name: format!("collapsed{}", line.points.len()),
        points,
        weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integrate(rule: &QuadratureRule, f: impl Fn(&[f64]) -> f64) -> f64 {
        rule.points
            .iter()
            .zip(&rule.weights)
            .map(|(p, w)| w * f(p))
            .sum()
    }

    #[test]
    fn gauss_is_exact_for_odd_degree() {
        let rule = gauss_legendre_1d(3);
        let val = integrate(&rule, |x| x[0].powi(5));
        assert!((val - 1.0 / 6.0).abs() < 1e-14);
    }

    #[test]
    fn reference_volumes() {
        for (cell, vol) in [
            (CellType::Segment, 1.0),
            (CellType::Triangle, 0.5),
            (CellType::Quadrilateral, 1.0),
            (CellType::Hexahedron, 1.0),
        ] {
            let rule = QuadratureRule::for_cell(cell, 2).expect("rule");
            assert!((rule.weights.iter().sum::<f64>() - vol).abs() < 1e-14, "{cell:?}");
        }
    }

    #[test]
    fn triangle_moments() {
        let rule = QuadratureRule::for_cell(CellType::Triangle, 3).expect("rule");
        // ∫ x y over the unit triangle = 1/24
        let val = integrate(&rule, |p| p[0] * p[1]);
        assert!((val - 1.0 / 24.0).abs() < 1e-14);
    }
}
