//! The similarity seam between the graph core and user payloads

/// User-supplied similarity measure over item payloads.
///
/// Contract: the returned value is non-negative, symmetric
/// (`sim(a, b) == sim(b, a)`) and higher means more similar. No metric
/// axioms (triangle inequality, boundedness, exact `sim(a, a)`) are
/// assumed anywhere in the crate.
///
/// Builders and queries call this from many worker threads at once, so
/// implementations must be thread safe; pure functions qualify. Any
/// `Fn(&T, &T) -> f64` closure implements the trait.
pub trait Similarity<T>: Send + Sync {
    fn similarity(&self, a: &T, b: &T) -> f64;
}

impl<T, F> Similarity<T> for F
where
    F: Fn(&T, &T) -> f64 + Send + Sync,
{
    fn similarity(&self, a: &T, b: &T) -> f64 {
        self(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_closure_implements_similarity() {
        let sim: Arc<dyn Similarity<i64>> =
            Arc::new(|a: &i64, b: &i64| 1.0 / (1.0 + (a - b).abs() as f64));
        assert_eq!(sim.similarity(&3, &3), 1.0);
        assert!(sim.similarity(&0, &10) < sim.similarity(&0, &1));
    }
}
