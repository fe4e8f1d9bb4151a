//! Cosine similarity between embedding vectors.

/// Compute cosine similarity between two vectors.
///
/// Returns `0.0` when either vector is empty, when their lengths differ, or
/// when either has zero magnitude, so degraded zero-vector embeddings never
/// rank above real matches. Otherwise the result lies in `[-1, 1]`.
///
/// The computation accumulates in `f64` and is symmetric in its arguments.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    similarity.clamp(-1.0, 1.0) as f32
}

/// Whether every component of the vector is zero.
pub fn is_zero_vector(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = [0.3, -1.2, 4.0, 0.0];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_and_orthogonal_vectors() {
        assert!((cosine(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn undefined_inputs_score_zero() {
        assert_eq!(cosine(&[], &[]), 0.0);
        assert_eq!(cosine(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn is_symmetric() {
        let a = [0.1, 0.7, -0.2];
        let b = [0.9, -0.4, 0.3];
        assert_eq!(cosine(&a, &b), cosine(&b, &a));
    }

    #[test]
    fn detects_zero_vectors() {
        assert!(is_zero_vector(&[0.0, 0.0, 0.0]));
        assert!(is_zero_vector(&[]));
        assert!(!is_zero_vector(&[0.0, 1e-9]));
    }
}
