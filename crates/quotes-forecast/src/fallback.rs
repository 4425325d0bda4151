//! Moving-average fallback.

use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use tracing::warn;

use crate::stats::{mean, population_std};

/// Trailing observations averaged by the fallback.
pub const FALLBACK_WINDOW: usize = 7;

/// Noise standard deviation as a fraction of the closing-price deviation.
pub const NOISE_SCALE: f64 = 0.01;

/// Trailing mean of `closes`, repeated `n_steps` times with independent
/// Gaussian noise at [`NOISE_SCALE`] of the population standard deviation.
///
/// Fewer than [`FALLBACK_WINDOW`] observations are averaged as they are.
pub(crate) fn moving_average(closes: &[f64], n_steps: usize, seed: Option<u64>) -> Vec<f64> {
    let window = &closes[closes.len().saturating_sub(FALLBACK_WINDOW)..];
    let center = mean(window);
    let scale = population_std(closes) * NOISE_SCALE;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match Normal::new(0.0, scale) {
        Ok(noise) => (0..n_steps).map(|_| center + noise.sample(&mut rng)).collect(),
        Err(e) => {
            warn!(error = %e, scale, "Unusable noise scale, returning the bare average");
            vec![center; n_steps]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_input_has_no_noise() {
        let values = moving_average(&[100.0; 30], 5, None);
        assert_eq!(values, vec![100.0; 5]);
    }

    #[test]
    fn test_short_input_averages_what_exists() {
        let values = moving_average(&[10.0, 20.0], 3, Some(1));
        let spread = population_std(&[10.0, 20.0]) * NOISE_SCALE;
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(|v| (v - 15.0).abs() < 6.0 * spread));
    }

    #[test]
    fn test_centered_on_trailing_window() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + f64::from(i)).collect();
        let center = mean(&closes[43..]);
        let spread = population_std(&closes) * NOISE_SCALE;

        let values = moving_average(&closes, 10, Some(7));
        assert!(values.iter().all(|v| (v - center).abs() < 6.0 * spread));
        // Steps draw independent noise.
        assert!(values.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_seed_is_reproducible() {
        let closes: Vec<f64> = (0..20).map(|i| f64::from(i).sin() + 10.0).collect();
        assert_eq!(
            moving_average(&closes, 4, Some(42)),
            moving_average(&closes, 4, Some(42))
        );
        assert_ne!(
            moving_average(&closes, 4, Some(42)),
            moving_average(&closes, 4, Some(43))
        );
    }

    #[test]
    fn test_zero_steps() {
        assert!(moving_average(&[1.0, 2.0], 0, Some(1)).is_empty());
    }
}
