use nalgebra::Point3;
use thiserror::Error;

/// Represents a single atomic site in a conformer geometry.
///
/// A site pairs a normalized element symbol with Cartesian coordinates.
/// The position order of sites within a geometry is significant: per-atom
/// descriptors produced by the engine are aligned positionally to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// The element symbol (e.g., "C", "H", "Cl"), normalized capitalization.
    pub element: String,
    /// The 3D coordinates of the atom in Angstroms.
    pub position: Point3<f64>,
}

impl Site {
    pub fn new(element: &str, position: Point3<f64>) -> Self {
        Self {
            element: element.to_string(),
            position,
        }
    }
}

/// One conformer to be processed by the descriptor pipeline.
///
/// Conformers are identified by a stable index within their ensemble; the
/// index is used for provenance tracking and output file naming. The
/// relative energy is expressed in kcal/mol against the ensemble minimum.
#[derive(Debug, Clone, PartialEq)]
pub struct ConformerInput {
    /// Stable identity of this conformer within its ensemble (1-based).
    pub id: usize,
    /// Ordered atomic sites; identical count and element sequence across the ensemble.
    pub geometry: Vec<Site>,
    /// Energy relative to the ensemble minimum, in kcal/mol (>= 0).
    pub relative_energy: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum EnsembleError {
    #[error("Ensemble contains no conformers")]
    Empty,

    #[error("Conformer {id} has {found} atoms, expected {expected}")]
    AtomCountMismatch {
        id: usize,
        expected: usize,
        found: usize,
    },

    #[error("Conformer {id} has element '{found}' at position {index}, expected '{expected}'")]
    ElementMismatch {
        id: usize,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Duplicate conformer identity: {0}")]
    DuplicateId(usize),

    #[error("Conformer {0} has a non-finite energy")]
    NonFiniteEnergy(usize),
}

/// The full set of conformers considered together for one molecule.
///
/// Construction validates the batch invariants once, so downstream stages
/// can rely on them: the ensemble is non-empty, every conformer has the same
/// atom count and element sequence, identities are unique, and energies are
/// re-referenced so the minimum-energy conformer sits at exactly 0 kcal/mol.
#[derive(Debug, Clone)]
pub struct Ensemble {
    molecule: String,
    conformers: Vec<ConformerInput>,
}

impl Ensemble {
    pub fn new(molecule: &str, mut conformers: Vec<ConformerInput>) -> Result<Self, EnsembleError> {
        let first = conformers.first().ok_or(EnsembleError::Empty)?;
        let expected_elements: Vec<String> =
            first.geometry.iter().map(|s| s.element.clone()).collect();

        let mut seen_ids = std::collections::HashSet::new();
        for conformer in &conformers {
            if !seen_ids.insert(conformer.id) {
                return Err(EnsembleError::DuplicateId(conformer.id));
            }
            if !conformer.relative_energy.is_finite() {
                return Err(EnsembleError::NonFiniteEnergy(conformer.id));
            }
            if conformer.geometry.len() != expected_elements.len() {
                return Err(EnsembleError::AtomCountMismatch {
                    id: conformer.id,
                    expected: expected_elements.len(),
                    found: conformer.geometry.len(),
                });
            }
            for (index, (site, expected)) in conformer
                .geometry
                .iter()
                .zip(expected_elements.iter())
                .enumerate()
            {
                if site.element != *expected {
                    return Err(EnsembleError::ElementMismatch {
                        id: conformer.id,
                        index,
                        expected: expected.clone(),
                        found: site.element.clone(),
                    });
                }
            }
        }

        // Re-reference energies to the ensemble minimum; input files may
        // carry absolute energies.
        let min_energy = conformers
            .iter()
            .map(|c| c.relative_energy)
            .fold(f64::INFINITY, f64::min);
        for conformer in &mut conformers {
            conformer.relative_energy -= min_energy;
        }

        Ok(Self {
            molecule: molecule.to_string(),
            conformers,
        })
    }

    pub fn molecule(&self) -> &str {
        &self.molecule
    }

    pub fn conformers(&self) -> &[ConformerInput] {
        &self.conformers
    }

    pub fn len(&self) -> usize {
        self.conformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conformers.is_empty()
    }

    /// The element sequence shared by every conformer in the ensemble.
    pub fn atom_elements(&self) -> Vec<String> {
        self.conformers[0]
            .geometry
            .iter()
            .map(|s| s.element.clone())
            .collect()
    }

    /// Identity of the minimum-energy conformer (lowest id wins on ties).
    pub fn lowest_energy_id(&self) -> usize {
        self.conformers
            .iter()
            .min_by(|a, b| {
                a.relative_energy
                    .partial_cmp(&b.relative_energy)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.id.cmp(&b.id))
            })
            .map(|c| c.id)
            .expect("ensemble is non-empty by construction")
    }
}
