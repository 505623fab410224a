use std::collections::BTreeMap;
use thiserror::Error;
use tracing::instrument;

/// Boltzmann constant in kcal/(mol*K), matching the kcal/mol energy scale
/// used for relative conformer energies.
pub const BOLTZMANN_KCAL_PER_MOL_K: f64 = 0.0019872041;

/// Normalized population weight per conformer identity. Weights sum to 1
/// over the conformers that were handed in (successful ones only); the set
/// is recomputed from scratch whenever the usable-conformer set changes.
pub type WeightSet = BTreeMap<usize, f64>;

#[derive(Debug, Error, PartialEq)]
pub enum WeightingError {
    #[error("Invalid weighting temperature: {0} K. Temperature must be positive and finite")]
    InvalidTemperature(f64),

    #[error("No conformer produced a usable descriptor record")]
    NoUsableConformers,
}

/// Computes normalized Boltzmann population weights at `temperature_kelvin`
/// from relative energies in kcal/mol.
///
/// All energies are shifted by the set minimum before exponentiation, so the
/// best conformer always has unnormalized weight 1 and no term can overflow.
/// The shift is a no-op on the normalized result but is mandatory for
/// numerical stability.
#[instrument(level = "trace", skip(relative_energies))]
pub fn weights(
    relative_energies: &BTreeMap<usize, f64>,
    temperature_kelvin: f64,
) -> Result<WeightSet, WeightingError> {
    if !temperature_kelvin.is_finite() || temperature_kelvin <= 0.0 {
        return Err(WeightingError::InvalidTemperature(temperature_kelvin));
    }
    if relative_energies.is_empty() {
        return Err(WeightingError::NoUsableConformers);
    }

    let beta = 1.0 / (BOLTZMANN_KCAL_PER_MOL_K * temperature_kelvin);
    let min_energy = relative_energies
        .values()
        .fold(f64::INFINITY, |acc, &e| acc.min(e));

    let unnormalized: BTreeMap<usize, f64> = relative_energies
        .iter()
        .map(|(&id, &energy)| (id, (-(energy - min_energy) * beta).exp()))
        .collect();

    // The minimum-shifted best conformer contributes exactly 1, so the sum
    // is always >= 1 and the division below is safe.
    let total: f64 = unnormalized.values().sum();

    Ok(unnormalized
        .into_iter()
        .map(|(id, w)| (id, w / total))
        .collect())
}
