//! Feature-level processing between extraction and synthesis

use crate::capabilities::{Features, IndexMatches};

/// Neighbors requested from the retrieval index per frame
pub const INDEX_NEIGHBORS: usize = 8;

/// Floor for index distances, so an exact match does not divide by zero
const MIN_SCORE: f32 = 1e-6;

/// Blend features toward their inverse-square-distance weighted neighbors
///
/// `features = blended * ratio + features * (1 - ratio)`. Frames without
/// valid neighbors (all ids negative) keep their original features.
pub fn blend_with_index(features: &mut Features, matches: &IndexMatches, ratio: f32) {
    let dim = features.dim();
    let k = matches.k;
    if k == 0
        || matches.vectors.len() < matches.ids.len() * dim
        || matches.scores.len() < matches.ids.len()
    {
        return;
    }

    let frames = features.frames().min(matches.frames());
    let mut blended = vec![0.0f32; dim];
    for f in 0..frames {
        let slots = f * k..(f + 1) * k;
        let weights: Vec<(usize, f32)> = slots
            .filter(|&s| matches.ids[s] >= 0)
            .map(|s| (s, (1.0 / matches.scores[s].max(MIN_SCORE)).powi(2)))
            .collect();
        let total: f32 = weights.iter().map(|w| w.1).sum();
        if weights.is_empty() || !total.is_finite() || total <= 0.0 {
            continue;
        }

        blended.iter_mut().for_each(|v| *v = 0.0);
        for &(slot, weight) in &weights {
            let neighbor = &matches.vectors[slot * dim..(slot + 1) * dim];
            for (acc, &value) in blended.iter_mut().zip(neighbor) {
                *acc += value * weight / total;
            }
        }

        for (value, &b) in features.frame_mut(f).iter_mut().zip(&blended) {
            *value = b * ratio + *value * (1.0 - ratio);
        }
    }
}

/// Mix pre-retrieval features back in on unvoiced frames
///
/// Voiced frames (`fine >= 1`) keep the retrieved features; the rest use
/// `features * protect + original * (1 - protect)`.
pub fn protect_consonants(
    features: &mut Features,
    original: &Features,
    fine_pitch: &[f32],
    protect: f32,
) {
    let frames = features
        .frames()
        .min(original.frames())
        .min(fine_pitch.len());
    for (f, &pitch) in fine_pitch.iter().enumerate().take(frames) {
        if pitch >= 1.0 {
            continue;
        }
        let source = original.frame(f);
        for (value, &orig) in features.frame_mut(f).iter_mut().zip(source) {
            *value = *value * protect + orig * (1.0 - protect);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_full_ratio_uses_weighted_neighbors() {
        let mut features = Features::new(2, vec![0.0, 0.0]);
        // Neighbor 0 at distance 1, neighbor 1 at distance 2: weights 4/5, 1/5
        let matches = IndexMatches {
            k: 2,
            scores: vec![1.0, 2.0],
            ids: vec![10, 11],
            vectors: vec![1.0, 1.0, 6.0, 6.0],
        };
        blend_with_index(&mut features, &matches, 1.0);
        for v in features.data() {
            assert!((v - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_blend_ratio_interpolates() {
        let mut features = Features::new(1, vec![10.0]);
        let matches = IndexMatches {
            k: 1,
            scores: vec![0.5],
            ids: vec![3],
            vectors: vec![0.0],
        };
        blend_with_index(&mut features, &matches, 0.25);
        assert!((features.data()[0] - 7.5).abs() < 1e-5);
    }

    #[test]
    fn test_invalid_and_empty_matches_leave_features() {
        let mut features = Features::new(1, vec![4.0, 5.0]);
        let matches = IndexMatches {
            k: 1,
            scores: vec![1.0, 1.0],
            ids: vec![-1, 0],
            vectors: vec![9.0, 1.0],
        };
        blend_with_index(&mut features, &matches, 1.0);
        assert_eq!(features.data(), &[4.0, 1.0]);

        let empty = IndexMatches {
            k: 8,
            scores: vec![],
            ids: vec![],
            vectors: vec![],
        };
        blend_with_index(&mut features, &empty, 1.0);
        assert_eq!(features.data(), &[4.0, 1.0]);
    }

    #[test]
    fn test_short_scores_leave_features() {
        let mut features = Features::new(1, vec![4.0, 5.0]);
        let matches = IndexMatches {
            k: 1,
            scores: vec![1.0],
            ids: vec![0, 1],
            vectors: vec![9.0, 9.0],
        };
        blend_with_index(&mut features, &matches, 1.0);
        assert_eq!(features.data(), &[4.0, 5.0]);
    }

    #[test]
    fn test_zero_distance_does_not_produce_nan() {
        let mut features = Features::new(1, vec![1.0]);
        let matches = IndexMatches {
            k: 2,
            scores: vec![0.0, 0.0],
            ids: vec![0, 1],
            vectors: vec![2.0, 4.0],
        };
        blend_with_index(&mut features, &matches, 1.0);
        assert!((features.data()[0] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_protect_only_touches_unvoiced_frames() {
        let mut features = Features::new(1, vec![10.0, 10.0, 10.0]);
        let original = Features::new(1, vec![0.0, 0.0, 0.0]);
        protect_consonants(&mut features, &original, &[220.0, 0.0, 0.5], 0.3);
        assert_eq!(features.data()[0], 10.0);
        assert!((features.data()[1] - 3.0).abs() < 1e-5);
        assert!((features.data()[2] - 3.0).abs() < 1e-5);
    }
}
