use proptest::prelude::*;

use docsearch::search::types::rank;
use docsearch::search::{cosine_similarity, SearchResult};
use docsearch::Document;

fn result(i: usize, similarity: f32) -> SearchResult {
    SearchResult::vector(Document::new(format!("doc-{:03}", i), "t", "b"), similarity)
}

proptest! {
    #[test]
    fn ranked_results_are_ordered_and_bounded(
        scores in prop::collection::vec(-1.0f32..=1.0, 0..40),
        limit in 0usize..50,
    ) {
        let results: Vec<_> = scores.iter().enumerate().map(|(i, s)| result(i, *s)).collect();
        let ranked = rank(results, limit);

        prop_assert_eq!(ranked.len(), limit.min(scores.len()));
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].similarity >= pair[1].similarity);
            if pair[0].similarity.total_cmp(&pair[1].similarity).is_eq() {
                prop_assert!(pair[0].id() < pair[1].id());
            }
        }
        if let (Some(first), Some(best)) = (ranked.first(), scores.iter().cloned().reduce(f32::max)) {
            prop_assert_eq!(first.similarity, best);
        }
    }

    #[test]
    fn cosine_similarity_is_bounded(
        a in prop::collection::vec(-100.0f32..100.0, 16),
        b in prop::collection::vec(-100.0f32..100.0, 16),
    ) {
        let s = cosine_similarity(&a, &b);
        prop_assert!(!s.is_nan());
        prop_assert!((-1.0..=1.0).contains(&s));
        prop_assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_matches_nothing(b in prop::collection::vec(-100.0f32..100.0, 16)) {
        prop_assert_eq!(cosine_similarity(&[0.0; 16], &b), 0.0);
    }
}
