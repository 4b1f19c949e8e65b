//! Runs against a real database when `TEST_DATABASE_URL` is set; otherwise
//! every test returns early.

use chrono::Utc;
use uuid::Uuid;

use aggregator_core::{ExternalProductId, OfferId, ProductId};
use aggregator_infra::store::{CatalogStore, PostgresCatalogStore, StoreError};
use aggregator_products::{ExternalOffer, NewProduct, Product, ProductUpdate};

async fn store() -> Option<PostgresCatalogStore> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    Some(PostgresCatalogStore::connect(&url).await.unwrap())
}

async fn registered_product(store: &PostgresCatalogStore, name: &str) -> Product {
    let product = Product::create(
        ProductId::new(),
        NewProduct {
            name: name.to_string(),
            description: Some("from tests".to_string()),
        },
        Some(ExternalProductId::from_uuid(Uuid::new_v4())),
        Utc::now(),
    )
    .unwrap();
    store.insert_product(&product).await.unwrap();
    product
}

fn offer(id: Uuid, price: i64, stock: i64) -> ExternalOffer {
    ExternalOffer {
        id: OfferId::from_uuid(id),
        price,
        items_in_stock: stock,
    }
}

#[tokio::test]
async fn reconcile_round_trip() {
    let Some(store) = store().await else { return };
    let p = registered_product(&store, "pg-reconcile").await;
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let first = store
        .reconcile_offers(p.id, &[offer(a, 100, 1), offer(b, 200, 2)], Utc::now())
        .await
        .unwrap();
    assert_eq!(first.inserted, 2);

    let second = store
        .reconcile_offers(p.id, &[offer(b, 250, 2), offer(c, 300, 0)], Utc::now())
        .await
        .unwrap();
    assert_eq!((second.inserted, second.updated, second.deleted), (1, 1, 1));

    let ids: Vec<OfferId> = store.list_offers(p.id).await.unwrap().iter().map(|o| o.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&OfferId::from_uuid(b)));
    assert!(ids.contains(&OfferId::from_uuid(c)));

    assert!(store.delete_product(p.id).await.unwrap());
    assert!(store.list_offers(p.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn conflicting_offer_rolls_back_everything() {
    let Some(store) = store().await else { return };
    let owner = registered_product(&store, "pg-owner").await;
    let other = registered_product(&store, "pg-other").await;
    let shared = Uuid::new_v4();
    let fresh = Uuid::new_v4();

    store.reconcile_offers(owner.id, &[offer(shared, 1, 1)], Utc::now()).await.unwrap();

    let err = store
        .reconcile_offers(other.id, &[offer(fresh, 5, 5), offer(shared, 9, 9)], Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { owner: o, .. } if o == owner.id), "got {err:?}");
    assert!(store.list_offers(other.id).await.unwrap().is_empty());

    store.delete_product(owner.id).await.unwrap();
    store.delete_product(other.id).await.unwrap();
}

#[tokio::test]
async fn update_and_missing_rows() {
    let Some(store) = store().await else { return };
    let p = registered_product(&store, "pg-update").await;

    let updated = store
        .update_product(
            p.id,
            ProductUpdate {
                name: "renamed".to_string(),
                description: None,
            },
            Utc::now(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.name, "renamed");
    assert_eq!(updated.description, None);
    assert_eq!(updated.external_id, p.external_id);

    let missing = ProductId::new();
    assert!(store.get_product(missing).await.unwrap().is_none());
    assert_eq!(
        store.reconcile_offers(missing, &[], Utc::now()).await.unwrap_err(),
        StoreError::NotFound(missing)
    );

    store.delete_product(p.id).await.unwrap();
    store.close().await;
    store.close().await;
}
