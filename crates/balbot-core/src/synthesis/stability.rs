//! Stability classification from the spectrum of A

use std::fmt;

use nalgebra::{Complex, DMatrix};
use serde::{Deserialize, Serialize};

use super::{Dynamics, EquilibriumPoint, LinearModel};
use crate::{Error, Result};

/// Eigenvalues closer than this are one root with multiplicity
const CLUSTER_TOLERANCE: f64 = 1e-9;

/// Local stability of an equilibrium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StabilityLabel {
    /// Every eigenvalue has strictly negative real part
    Stable,
    /// At least one eigenvalue has real part `>= 0`
    Unstable,
}

impl fmt::Display for StabilityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => write!(f, "stable"),
            Self::Unstable => write!(f, "unstable"),
        }
    }
}

/// One distinct eigenvalue and its algebraic multiplicity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eigenvalue {
    /// The eigenvalue; real ones have a zero imaginary part
    pub value: Complex<f64>,
    /// How many times it repeats in the spectrum
    pub multiplicity: usize,
}

impl fmt::Display for Eigenvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.im == 0.0 {
            write!(f, "{:.6}", self.value.re)?;
        } else {
            let sign = if self.value.im < 0.0 { '-' } else { '+' };
            write!(f, "{:.6} {} {:.6}i", self.value.re, sign, self.value.im.abs())?;
        }
        if self.multiplicity > 1 {
            write!(f, " (x{})", self.multiplicity)?;
        }
        Ok(())
    }
}

/// Eigenvalues of a state matrix, sorted by real part (largest first)
///
/// The stability label is derived on demand and never stored, so it cannot
/// disagree with the values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EigenSpectrum {
    entries: Vec<Eigenvalue>,
}

impl EigenSpectrum {
    /// Compute the spectrum of a square matrix
    ///
    /// 2×2 matrices use the closed form, so repeated roots get an exact
    /// multiplicity. Larger matrices go through a real Schur decomposition.
    pub fn of(a: &DMatrix<f64>) -> Self {
        debug_assert!(a.is_square());
        let values = match a.nrows() {
            0 => Vec::new(),
            1 => vec![Complex::new(a[(0, 0)], 0.0)],
            2 => return Self::closed_form_2x2(a),
            _ => a.complex_eigenvalues().iter().copied().collect(),
        };
        Self::from_values(values)
    }

    fn closed_form_2x2(a: &DMatrix<f64>) -> Self {
        let (p, q, r, s) = (a[(0, 0)], a[(0, 1)], a[(1, 0)], a[(1, 1)]);
        let mean = 0.5 * (p + s);
        let half_gap = 0.5 * (p - s);
        let disc = half_gap * half_gap + q * r;

        let entries = if 2.0 * disc.abs().sqrt() <= CLUSTER_TOLERANCE {
            vec![Eigenvalue {
                value: Complex::new(mean, 0.0),
                multiplicity: 2,
            }]
        } else if disc > 0.0 {
            let root = disc.sqrt();
            vec![
                Eigenvalue {
                    value: Complex::new(mean + root, 0.0),
                    multiplicity: 1,
                },
                Eigenvalue {
                    value: Complex::new(mean - root, 0.0),
                    multiplicity: 1,
                },
            ]
        } else {
            let root = (-disc).sqrt();
            vec![
                Eigenvalue {
                    value: Complex::new(mean, root),
                    multiplicity: 1,
                },
                Eigenvalue {
                    value: Complex::new(mean, -root),
                    multiplicity: 1,
                },
            ]
        };
        Self { entries }
    }

    fn from_values(values: Vec<Complex<f64>>) -> Self {
        let mut entries: Vec<Eigenvalue> = Vec::with_capacity(values.len());
        for value in values {
            match entries
                .iter_mut()
                .find(|e| (e.value - value).norm() <= CLUSTER_TOLERANCE)
            {
                Some(entry) => entry.multiplicity += 1,
                None => entries.push(Eigenvalue {
                    value,
                    multiplicity: 1,
                }),
            }
        }
        entries.sort_by(|x, y| {
            y.value
                .re
                .total_cmp(&x.value.re)
                .then(y.value.im.total_cmp(&x.value.im))
        });
        Self { entries }
    }

    /// Distinct eigenvalues with multiplicities
    pub fn entries(&self) -> &[Eigenvalue] {
        &self.entries
    }

    /// Iterate eigenvalues, repeating each by its multiplicity
    pub fn values(&self) -> impl Iterator<Item = Complex<f64>> + '_ {
        self.entries
            .iter()
            .flat_map(|e| std::iter::repeat(e.value).take(e.multiplicity))
    }

    /// Largest real part (`-inf` for an empty spectrum)
    pub fn max_real_part(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| e.value.re)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Stable iff every real part is strictly negative
    pub fn label(&self) -> StabilityLabel {
        if self.max_real_part() < 0.0 {
            StabilityLabel::Stable
        } else {
            StabilityLabel::Unstable
        }
    }

    /// Check for a strictly Hurwitz spectrum
    pub fn is_stable(&self) -> bool {
        self.label() == StabilityLabel::Stable
    }

    /// Check for an eigenvalue with strictly positive real part
    pub fn has_growing_mode(&self) -> bool {
        self.max_real_part() > 0.0
    }
}

impl fmt::Display for EigenSpectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", e)?;
        }
        write!(f, "]")
    }
}

/// An equilibrium with its linearization and spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEquilibrium {
    pub point: EquilibriumPoint,
    pub model: LinearModel,
    pub spectrum: EigenSpectrum,
}

impl ClassifiedEquilibrium {
    /// Linearize `dynamics` at `point` and classify it
    pub fn new<D: Dynamics>(dynamics: &D, point: EquilibriumPoint) -> Self {
        let model = LinearModel::at(dynamics, &point);
        let spectrum = EigenSpectrum::of(&model.a);
        Self {
            point,
            model,
            spectrum,
        }
    }

    /// Stability label derived from the spectrum
    pub fn label(&self) -> StabilityLabel {
        self.spectrum.label()
    }
}

/// Classify every point, preserving solver order
pub fn classify<D: Dynamics>(dynamics: &D, points: &[EquilibriumPoint]) -> Vec<ClassifiedEquilibrium> {
    points
        .iter()
        .map(|p| {
            let classified = ClassifiedEquilibrium::new(dynamics, p.clone());
            tracing::debug!(
                point = %classified.point,
                spectrum = %classified.spectrum,
                label = %classified.label(),
                "classified equilibrium"
            );
            classified
        })
        .collect()
}

/// First point (in solver order) with an eigenvalue in the open right half-plane
pub fn select_unstable(classified: &[ClassifiedEquilibrium]) -> Result<&ClassifiedEquilibrium> {
    classified
        .iter()
        .find(|c| c.spectrum.has_growing_mode())
        .ok_or(Error::NoUnstableEquilibrium)
}
