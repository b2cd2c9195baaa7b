//! Property-Based Tests for the Page Cache
//!
//! # Test Properties
//!
//! 1. **Addressing**: `get(i)` is the i-th item for `i < total`, absent beyond
//! 2. **Single fetch**: under a non-expiring policy each page is fetched at
//!    most once, whatever the access order
//! 3. **Hint independence**: a single-page hint converges to the same answers
//! 4. **Range order**: `get_range` equals per-index `get`, in range order
//! 5. **Policy bounds**: construction accepts exactly `hard >= soft`

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use super::cache::PageCache;
use super::fetcher::InMemoryListing;
use super::policy::FreshnessPolicy;

// =============================================================================
// Property Strategies
// =============================================================================

/// Listing shape: (total items, page size)
fn listing_strategy() -> impl Strategy<Value = (usize, usize)> {
    (0usize..120, 1usize..=16)
}

/// Indexes to read, some past the end
fn access_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..140, 1..60)
}

fn caching_policy_strategy() -> impl Strategy<Value = FreshnessPolicy> {
    prop_oneof![
        Just(FreshnessPolicy::NO_REVALIDATION),
        Just(FreshnessPolicy::BOARD),
        Just(FreshnessPolicy::PORTFOLIO_LIST),
    ]
}

fn item(i: usize) -> String {
    format!("item-{}", i)
}

fn source(total: usize, page_size: usize) -> Arc<InMemoryListing<String>> {
    Arc::new(InMemoryListing::new((0..total).map(item).collect(), page_size))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// =============================================================================
// Addressing Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: every index resolves to its item or to absent past the end.
    #[test]
    fn prop_get_addresses_listing(
        (total, page_size) in listing_strategy(),
        accesses in access_strategy(),
        policy in caching_policy_strategy(),
    ) {
        let source = source(total, page_size);
        let cache =
            PageCache::from_first_page(source.first_page(), policy, source.clone()).unwrap();

        let results = runtime().block_on(async {
            let mut results = Vec::new();
            for &index in &accesses {
                results.push(cache.get(index).await.unwrap());
            }
            results
        });

        for (&index, result) in accesses.iter().zip(results) {
            let expected = (index < total).then(|| item(index));
            prop_assert_eq!(result, expected);
        }
    }

    /// Property: a page is fetched at most once under a non-expiring policy.
    #[test]
    fn prop_each_page_fetched_at_most_once(
        (total, page_size) in listing_strategy(),
        accesses in access_strategy(),
    ) {
        let source = source(total, page_size);
        let cache = PageCache::from_first_page(
            source.first_page(),
            FreshnessPolicy::NO_REVALIDATION,
            source.clone(),
        )
        .unwrap();

        runtime().block_on(async {
            futures::future::join_all(accesses.iter().map(|&index| cache.get(index))).await
        });

        let pages = total.div_ceil(page_size);
        for page in 1..pages {
            prop_assert!(source.fetches_for(page) <= 1, "page {} fetched twice", page);
        }
        if pages > 1 {
            prop_assert_eq!(source.fetches_for(0), 0);
        }
    }

    /// Property: starting from a single-page hint gives the same answers.
    #[test]
    fn prop_single_page_hint_converges(
        (total, page_size) in (1usize..120, 1usize..=16),
        hint in 1usize..=16,
        accesses in access_strategy(),
    ) {
        let hint = hint.min(total);
        let source = source(total, page_size);
        // The cache was built when the listing held only `hint` items
        let cache = PageCache::new(
            (0..hint).map(item).collect(),
            hint,
            hint,
            FreshnessPolicy::NO_REVALIDATION,
            source.clone(),
        )
        .unwrap();

        let results = runtime().block_on(async {
            let mut results = Vec::new();
            for &index in &accesses {
                results.push(cache.get(index).await.unwrap());
            }
            results
        });

        for (&index, result) in accesses.iter().zip(results) {
            let expected = (index < total).then(|| item(index));
            prop_assert_eq!(result, expected);
        }
    }

    /// Property: range reads match individual reads, in order.
    #[test]
    fn prop_range_matches_individual_gets(
        (total, page_size) in listing_strategy(),
        start in 0usize..100,
        len in 0usize..40,
    ) {
        let source = source(total, page_size);
        let cache = PageCache::from_first_page(
            source.first_page(),
            FreshnessPolicy::NO_REVALIDATION,
            source.clone(),
        )
        .unwrap();

        let range = start..start + len;
        let rt = runtime();
        let ranged = rt.block_on(cache.get_range(range.clone())).unwrap();
        for (index, result) in range.zip(ranged) {
            let single = rt.block_on(cache.get(index)).unwrap();
            prop_assert_eq!(result, single);
        }
    }
}

// =============================================================================
// Policy Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: construction succeeds exactly when hard >= soft.
    #[test]
    fn prop_policy_bounds(soft in 0u64..10_000, hard in 0u64..10_000) {
        let result = FreshnessPolicy::new(Duration::from_millis(soft), Duration::from_millis(hard));
        prop_assert_eq!(result.is_ok(), hard >= soft);
    }

    /// Property: once a limit fires it keeps firing as time passes.
    #[test]
    fn prop_expiry_is_monotonic(
        soft in 1u64..1_000,
        extra in 0u64..1_000,
        elapsed in 0u64..3_000,
        later in 0u64..3_000,
    ) {
        let policy = FreshnessPolicy::new(
            Duration::from_millis(soft),
            Duration::from_millis(soft + extra),
        )
        .unwrap();
        let now = Duration::from_millis(elapsed);
        let then = now + Duration::from_millis(later);

        if policy.soft_expired(now) {
            prop_assert!(policy.soft_expired(then));
        }
        if policy.hard_expired(now) {
            prop_assert!(policy.hard_expired(then));
            prop_assert!(policy.soft_expired(now));
        }
    }
}
