//! Offer reconciliation.
//!
//! Converges the cached offers of one product to a freshly fetched upstream
//! snapshot while touching only rows that actually change:
//!
//! 1. every incoming offer that is not cached yet becomes an **insert**;
//! 2. every incoming offer whose price or stock differs from the cached row
//!    becomes an **update** (identical rows are left alone);
//! 3. every cached offer that is absent from the snapshot becomes a **delete**.
//!
//! Planning is pure. Storage adapters execute a [`ReconcilePlan`] inside a
//! single transaction so that a product's inserts, updates and deletes commit
//! together or not at all.
//!
//! When the same offer id occurs more than once in a snapshot, the **last
//! occurrence wins**: the plan carries exactly one operation per id, holding
//! the values of its final occurrence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use aggregator_core::{Entity, OfferId, ProductId};

use crate::offer::{ExternalOffer, Offer};

/// Changes required to make the cached offers of a product match a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub inserts: Vec<ExternalOffer>,
    pub updates: Vec<ExternalOffer>,
    pub deletes: Vec<OfferId>,
    pub unchanged: Vec<OfferId>,
}

/// Counts reported after a reconciliation has been committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ReconcilePlan {
    /// True when the cache already matches the snapshot.
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn summary(&self) -> ReconcileSummary {
        ReconcileSummary {
            inserted: self.inserts.len(),
            updated: self.updates.len(),
            deleted: self.deletes.len(),
            unchanged: self.unchanged.len(),
        }
    }

    /// Apply the plan to an id-keyed offer map.
    ///
    /// The caller must have checked that inserted ids are not owned by another
    /// product; this only writes rows for `product_id`.
    pub fn apply(&self, product_id: ProductId, offers: &mut HashMap<OfferId, Offer>, now: DateTime<Utc>) {
        for external in &self.inserts {
            offers.insert(external.id, Offer::from_external(product_id, external, now));
        }
        for external in &self.updates {
            if let Some(offer) = offers.get_mut(&external.id) {
                offer.apply_external(external, now);
            }
        }
        for id in &self.deletes {
            offers.remove(id);
        }
    }
}

/// Collapse duplicate ids, keeping first-seen order and last-seen values.
fn last_occurrence_wins(incoming: &[ExternalOffer]) -> Vec<ExternalOffer> {
    let mut position: HashMap<OfferId, usize> = HashMap::with_capacity(incoming.len());
    let mut collapsed: Vec<ExternalOffer> = Vec::with_capacity(incoming.len());

    for external in incoming {
        match position.get(&external.id) {
            Some(&idx) => collapsed[idx] = *external,
            None => {
                position.insert(external.id, collapsed.len());
                collapsed.push(*external);
            }
        }
    }

    collapsed
}

/// Compute the changes that turn `existing` (the cached offers of a single
/// product) into `incoming` (the full upstream snapshot for that product).
pub fn plan<'a, I>(existing: I, incoming: &[ExternalOffer]) -> ReconcilePlan
where
    I: IntoIterator<Item = &'a Offer>,
{
    let existing: Vec<&Offer> = existing.into_iter().collect();
    let by_id: HashMap<OfferId, &Offer> = existing.iter().map(|o| (o.id(), *o)).collect();

    let incoming = last_occurrence_wins(incoming);
    let mut plan = ReconcilePlan::default();

    for external in &incoming {
        match by_id.get(&external.id()) {
            Some(current) if current.matches(external) => plan.unchanged.push(external.id()),
            Some(_) => plan.updates.push(*external),
            None => plan.inserts.push(*external),
        }
    }

    let seen: std::collections::HashSet<OfferId> = incoming.iter().map(Entity::id).collect();
    plan.deletes = existing
        .iter()
        .map(|o| o.id())
        .filter(|id| !seen.contains(id))
        .collect();

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn offer_id() -> OfferId {
        OfferId::from_uuid(Uuid::new_v4())
    }

    fn external(id: OfferId, price: i64, items_in_stock: i64) -> ExternalOffer {
        ExternalOffer {
            id,
            price,
            items_in_stock,
        }
    }

    fn cached(product_id: ProductId, id: OfferId, price: i64, items_in_stock: i64) -> Offer {
        Offer::from_external(product_id, &external(id, price, items_in_stock), Utc::now())
    }

    fn as_map(offers: Vec<Offer>) -> HashMap<OfferId, Offer> {
        offers.into_iter().map(|o| (o.id, o)).collect()
    }

    #[test]
    fn mixed_snapshot_updates_inserts_and_removes() {
        let product_id = ProductId::new();
        let (id1, id2, id3) = (offer_id(), offer_id(), offer_id());

        let mut offers = as_map(vec![
            cached(product_id, id1, 1000, 5),
            cached(product_id, id2, 3000, 1),
        ]);
        let incoming = vec![external(id1, 1200, 4), external(id3, 5000, 10)];

        let plan = plan(offers.values(), &incoming);
        assert_eq!(plan.updates, vec![external(id1, 1200, 4)]);
        assert_eq!(plan.inserts, vec![external(id3, 5000, 10)]);
        assert_eq!(plan.deletes, vec![id2]);
        assert!(plan.unchanged.is_empty());

        plan.apply(product_id, &mut offers, Utc::now());
        assert_eq!(offers.len(), 2);
        assert_eq!((offers[&id1].price, offers[&id1].items_in_stock), (1200, 4));
        assert_eq!((offers[&id3].price, offers[&id3].items_in_stock), (5000, 10));
        assert!(!offers.contains_key(&id2));
    }

    #[test]
    fn empty_snapshot_deletes_everything() {
        let product_id = ProductId::new();
        let mut offers = as_map(vec![
            cached(product_id, offer_id(), 1000, 5),
            cached(product_id, offer_id(), 2000, 0),
        ]);

        let plan = plan(offers.values(), &[]);
        assert_eq!(plan.deletes.len(), 2);
        assert!(plan.inserts.is_empty() && plan.updates.is_empty());

        plan.apply(product_id, &mut offers, Utc::now());
        assert!(offers.is_empty());
    }

    #[test]
    fn unchanged_rows_are_not_rewritten() {
        let product_id = ProductId::new();
        let id = offer_id();
        let original = cached(product_id, id, 2000, 3);
        let mut offers = as_map(vec![original.clone()]);

        let plan = plan(offers.values(), &[external(id, 2000, 3)]);
        assert!(plan.is_noop());
        assert_eq!(plan.unchanged, vec![id]);

        plan.apply(product_id, &mut offers, Utc::now() + chrono::Duration::minutes(1));
        assert_eq!(offers[&id], original);
    }

    #[test]
    fn stock_only_change_is_an_update() {
        let product_id = ProductId::new();
        let id = offer_id();
        let offers = [cached(product_id, id, 2000, 3)];

        let plan = plan(offers.iter(), &[external(id, 2000, 0)]);
        assert_eq!(plan.updates, vec![external(id, 2000, 0)]);
    }

    #[test]
    fn duplicate_ids_last_occurrence_wins() {
        let id = offer_id();
        let incoming = vec![external(id, 100, 1), external(id, 300, 3), external(id, 200, 2)];

        let plan = plan(std::iter::empty(), &incoming);
        assert_eq!(plan.inserts, vec![external(id, 200, 2)]);
        assert!(plan.updates.is_empty());
    }

    #[test]
    fn duplicate_ids_whose_last_value_matches_cache_are_unchanged() {
        let product_id = ProductId::new();
        let id = offer_id();
        let offers = [cached(product_id, id, 500, 5)];

        let incoming = vec![external(id, 999, 9), external(id, 500, 5)];
        let plan = plan(offers.iter(), &incoming);
        assert!(plan.is_noop());
        assert_eq!(plan.unchanged, vec![id]);
    }

    #[test]
    fn reconciling_twice_is_idempotent() {
        let product_id = ProductId::new();
        let (id1, id2) = (offer_id(), offer_id());
        let mut offers = as_map(vec![cached(product_id, id1, 10, 1)]);
        let incoming = vec![external(id1, 20, 2), external(id2, 30, 3)];

        let first = plan(offers.values(), &incoming);
        first.apply(product_id, &mut offers, Utc::now());
        let after_first = offers.clone();

        let second = plan(offers.values(), &incoming);
        assert!(second.is_noop());
        second.apply(product_id, &mut offers, Utc::now() + chrono::Duration::minutes(1));
        assert_eq!(offers, after_first);
    }

    #[test]
    fn summary_counts_each_bucket() {
        let product_id = ProductId::new();
        let (keep, change, drop) = (offer_id(), offer_id(), offer_id());
        let offers = [
            cached(product_id, keep, 1, 1),
            cached(product_id, change, 1, 1),
            cached(product_id, drop, 1, 1),
        ];
        let incoming = vec![external(keep, 1, 1), external(change, 2, 1), external(offer_id(), 3, 3)];

        let summary = plan(offers.iter(), &incoming).summary();
        assert_eq!(
            summary,
            ReconcileSummary {
                inserted: 1,
                updated: 1,
                deleted: 1,
                unchanged: 1,
            }
        );
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        // Small id pool so that snapshots and caches overlap often.
        fn id_pool() -> Vec<OfferId> {
            (0..8u128).map(|n| OfferId::from_uuid(Uuid::from_u128(n + 1))).collect()
        }

        fn snapshot() -> impl Strategy<Value = Vec<(usize, i64, i64)>> {
            prop::collection::vec((0usize..8, 0i64..5, 0i64..5), 0..12)
        }

        fn build(entries: &[(usize, i64, i64)]) -> Vec<ExternalOffer> {
            let pool = id_pool();
            entries
                .iter()
                .map(|&(i, price, stock)| external(pool[i], price, stock))
                .collect()
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: after applying the plan, the cache equals the snapshot
            /// (last occurrence per id), and a second pass is a no-op.
            #[test]
            fn converges_and_is_idempotent(cached_entries in snapshot(), incoming_entries in snapshot()) {
                let product_id = ProductId::new();
                let now = Utc::now();

                let mut offers: HashMap<OfferId, Offer> = HashMap::new();
                for e in build(&cached_entries) {
                    offers.insert(e.id, Offer::from_external(product_id, &e, now));
                }
                let incoming = build(&incoming_entries);

                let first = plan(offers.values(), &incoming);
                first.apply(product_id, &mut offers, now);

                let mut expected: HashMap<OfferId, (i64, i64)> = HashMap::new();
                for e in &incoming {
                    expected.insert(e.id, (e.price, e.items_in_stock));
                }
                let actual: HashMap<OfferId, (i64, i64)> = offers
                    .values()
                    .map(|o| (o.id, (o.price, o.items_in_stock)))
                    .collect();
                prop_assert_eq!(actual, expected);

                let snapshot_before = offers.clone();
                let second = plan(offers.values(), &incoming);
                prop_assert!(second.is_noop());
                second.apply(product_id, &mut offers, now + chrono::Duration::seconds(30));
                prop_assert_eq!(offers, snapshot_before);
            }

            /// Property: inserts are exactly the new ids, deletes exactly the
            /// missing ids, updates exactly the changed ids.
            #[test]
            fn buckets_partition_ids(cached_entries in snapshot(), incoming_entries in snapshot()) {
                let product_id = ProductId::new();
                let now = Utc::now();

                let mut offers: HashMap<OfferId, Offer> = HashMap::new();
                for e in build(&cached_entries) {
                    offers.insert(e.id, Offer::from_external(product_id, &e, now));
                }
                let incoming = build(&incoming_entries);
                let p = plan(offers.values(), &incoming);

                let cached_ids: HashSet<OfferId> = offers.keys().copied().collect();
                let incoming_ids: HashSet<OfferId> = incoming.iter().map(|e| e.id).collect();

                let inserted: HashSet<OfferId> = p.inserts.iter().map(|e| e.id).collect();
                let deleted: HashSet<OfferId> = p.deletes.iter().copied().collect();
                let updated: HashSet<OfferId> = p.updates.iter().map(|e| e.id).collect();
                let unchanged: HashSet<OfferId> = p.unchanged.iter().copied().collect();

                let new_ids: HashSet<OfferId> = incoming_ids.difference(&cached_ids).copied().collect();
                let missing_ids: HashSet<OfferId> = cached_ids.difference(&incoming_ids).copied().collect();
                let shared_ids: HashSet<OfferId> = cached_ids.intersection(&incoming_ids).copied().collect();
                let touched_or_kept: HashSet<OfferId> = updated.union(&unchanged).copied().collect();

                prop_assert_eq!(inserted, new_ids);
                prop_assert_eq!(deleted, missing_ids);
                prop_assert_eq!(touched_or_kept, shared_ids);
                prop_assert!(updated.is_disjoint(&unchanged));
                for e in &p.updates {
                    prop_assert!(!offers[&e.id].matches(e));
                }
            }
        }
    }
}
