use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use feed_composition::config::{CompositionConfig, LogFormat};
use feed_composition::models::{
    AccountStanding, AuthorTier, CompositionSeed, FeedItem, MediaFilter, MediaType, PageRequest,
    Post, SearchHistoryEntry, Viewer, Visibility,
};
use feed_composition::services::AffinityProfile;
use feed_composition::sources::{
    AccountDirectory, InMemoryCatalog, SearchHistorySource, SponsoredInventory,
};
use feed_composition::{telemetry, BusinessEligibilityResolver, CompositionService};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn post(author: Uuid, handle: &str, caption: &str, minutes_ago: i64, media_type: MediaType) -> Post {
    Post {
        id: Uuid::new_v4(),
        author_id: author,
        author_handle: handle.to_string(),
        caption: Some(caption.to_string()),
        hashtags: vec![],
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
        visibility: Visibility::Public,
        media_type,
    }
}

fn business_standing(expires_in: ChronoDuration) -> AccountStanding {
    AccountStanding {
        tier: AuthorTier::Business,
        business_expires_at: Some(Utc::now() + expires_in),
    }
}

/// Catalog with `organic` user posts (newest first) and `businesses` shops with two ads each.
fn seeded_catalog(organic: usize, businesses: usize, media_type: MediaType) -> (Arc<InMemoryCatalog>, Vec<Uuid>) {
    let catalog = Arc::new(InMemoryCatalog::new());

    for i in 0..organic {
        let author = Uuid::new_v4();
        catalog.upsert_account(
            author,
            AccountStanding {
                tier: AuthorTier::User,
                business_expires_at: None,
            },
            None,
        );
        catalog.add_post(post(author, "creator", "daily life", i as i64, media_type));
    }

    let mut shops = Vec::new();
    for i in 0..businesses {
        let shop = Uuid::new_v4();
        catalog.upsert_account(shop, business_standing(ChronoDuration::days(30)), Some(Utc::now()));
        catalog.add_post(post(shop, "shop", "spring sale", i as i64, media_type));
        catalog.add_post(post(shop, "shop", "new arrivals", 60 + i as i64, media_type));
        shops.push(shop);
    }

    (catalog, shops)
}

fn service_over(catalog: Arc<InMemoryCatalog>, config: &CompositionConfig) -> CompositionService {
    CompositionService::new(
        catalog.clone(),
        catalog.clone(),
        catalog.clone(),
        catalog,
        config,
    )
}

fn sponsored_positions(items: &[FeedItem]) -> Vec<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_sponsored)
        .map(|(i, _)| i)
        .collect()
}

#[tokio::test]
async fn test_feed_page_places_sponsored_at_cadence() {
    let _ = telemetry::init_tracing(LogFormat::Plain);

    let (catalog, _) = seeded_catalog(30, 4, MediaType::Image);
    let service = service_over(catalog, &CompositionConfig::default());

    let items = service
        .feed_page(Viewer::Anonymous(0), PageRequest::new(1, 20))
        .await
        .unwrap();

    assert_eq!(items.len(), 20);
    assert_eq!(sponsored_positions(&items), vec![5, 11, 17]);

    let sponsored_ids: Vec<Uuid> = items
        .iter()
        .filter(|i| i.is_sponsored)
        .map(|i| i.post.id)
        .collect();
    let unique: HashSet<Uuid> = sponsored_ids.iter().copied().collect();
    assert_eq!(unique.len(), sponsored_ids.len());
}

#[tokio::test]
async fn test_feed_page_is_idempotent_and_concurrency_safe() {
    let (catalog, _) = seeded_catalog(25, 6, MediaType::Image);
    let service = Arc::new(service_over(catalog, &CompositionConfig::default()));
    let viewer = Viewer::Authenticated(Uuid::new_v4());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.feed_page(viewer, PageRequest::new(2, 20)).await })
        })
        .collect();

    let mut pages = Vec::new();
    for handle in handles {
        pages.push(handle.await.unwrap().unwrap());
    }
    assert!(pages.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn test_slot_bound_holds_for_many_page_sizes() {
    let (catalog, _) = seeded_catalog(40, 10, MediaType::Image);
    let config = CompositionConfig::default();
    let service = service_over(catalog, &config);

    for page_size in 1..=50 {
        let items = service
            .feed_page(Viewer::Anonymous(0), PageRequest::new(1, page_size))
            .await
            .unwrap();
        let sponsored = items.iter().filter(|i| i.is_sponsored).count();

        assert!(items.len() <= page_size);
        assert!(sponsored <= page_size / (config.feed_cadence + 1));
    }
}

#[tokio::test]
async fn test_short_organic_page_is_not_padded() {
    let (catalog, _) = seeded_catalog(0, 2, MediaType::Image);
    let service = service_over(catalog, &CompositionConfig::default());
    let organic: Vec<Post> = (0..6)
        .map(|i| post(Uuid::new_v4(), "creator", "walk", i, MediaType::Image))
        .collect();

    let items = service
        .inject_business_into_feed(organic.clone(), Viewer::Anonymous(0), PageRequest::new(1, 10))
        .await
        .unwrap();

    // budget floor(10 / 6) = 1
    assert_eq!(items.len(), 7);
    assert_eq!(items.iter().filter(|i| !i.is_sponsored).count(), 6);
    assert_eq!(sponsored_positions(&items), vec![5]);
}

#[tokio::test]
async fn test_no_inventory_yields_pure_organic() {
    let (catalog, _) = seeded_catalog(15, 0, MediaType::Image);
    let service = service_over(catalog, &CompositionConfig::default());
    let organic: Vec<Post> = (0..15)
        .map(|i| post(Uuid::new_v4(), "creator", "walk", i, MediaType::Image))
        .collect();

    let items = service
        .inject_business_into_feed(organic.clone(), Viewer::Anonymous(0), PageRequest::new(1, 12))
        .await
        .unwrap();

    let expected: Vec<FeedItem> = organic.into_iter().take(12).map(FeedItem::organic).collect();
    assert_eq!(items, expected);
}

#[tokio::test]
async fn test_search_history_reorders_feed() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let user = Uuid::new_v4();
    let author = Uuid::new_v4();

    let newest = post(author, "traveller", "airport coffee", 1, MediaType::Image);
    let middle = post(author, "traveller", "mountain hiking at dawn", 2, MediaType::Image);
    let oldest = post(author, "traveller", "homemade pasta", 3, MediaType::Image);
    for p in [&newest, &middle, &oldest] {
        catalog.add_post(p.clone());
    }
    catalog.record_search(user, "Hiking", Utc::now() - ChronoDuration::hours(2));

    let service = service_over(catalog, &CompositionConfig::default());

    let ranked = service
        .prioritize_and_mix(
            vec![newest.clone(), middle.clone(), oldest.clone()],
            &Viewer::Authenticated(user),
        )
        .await;
    let ids: Vec<Uuid> = ranked.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![middle.id, newest.id, oldest.id]);

    let items = service
        .feed_page(Viewer::Authenticated(user), PageRequest::new(1, 3))
        .await
        .unwrap();
    assert_eq!(items[0].post.id, middle.id);
}

#[tokio::test]
async fn test_no_history_is_pass_through() {
    let (catalog, _) = seeded_catalog(0, 0, MediaType::Image);
    let service = service_over(catalog, &CompositionConfig::default());
    let candidates: Vec<Post> = (0..8)
        .map(|i| post(Uuid::new_v4(), "creator", "hiking", i, MediaType::Image))
        .collect();

    let output = service
        .prioritize_and_mix(candidates.clone(), &Viewer::Authenticated(Uuid::new_v4()))
        .await;
    assert_eq!(output, candidates);
}

struct StalledSearchHistory;

#[async_trait]
impl SearchHistorySource for StalledSearchHistory {
    async fn recent_queries(&self, _user_id: Uuid, _limit: usize) -> anyhow::Result<Vec<SearchHistoryEntry>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![SearchHistoryEntry {
            query: "daily".to_string(),
            searched_at: Utc::now(),
        }])
    }
}

#[tokio::test]
async fn test_stalled_search_history_degrades_to_organic_order() {
    let (catalog, _) = seeded_catalog(12, 2, MediaType::Image);
    let config = CompositionConfig {
        affinity_timeout_ms: 20,
        ..Default::default()
    };
    let service = CompositionService::new(
        catalog.clone(),
        Arc::new(StalledSearchHistory),
        catalog.clone(),
        catalog.clone(),
        &config,
    );

    let organic: Vec<Post> = (0..5)
        .map(|i| post(Uuid::new_v4(), "creator", "daily walk", i, MediaType::Image))
        .collect();
    let output = service
        .prioritize_and_mix(organic.clone(), &Viewer::Authenticated(Uuid::new_v4()))
        .await;
    assert_eq!(output, organic);

    let items = service
        .feed_page(Viewer::Authenticated(Uuid::new_v4()), PageRequest::new(1, 12))
        .await
        .unwrap();
    assert_eq!(items.len(), 12);
}

#[tokio::test]
async fn test_expired_business_drops_out_between_calls() {
    let (catalog, shops) = seeded_catalog(0, 1, MediaType::Image);
    let shop = shops[0];
    let config = CompositionConfig::default();
    let resolver =
        BusinessEligibilityResolver::new(catalog.clone(), catalog.clone(), &config);
    let seed = CompositionSeed::new(Viewer::Anonymous(0), 1, 20);

    let affinity = AffinityProfile::empty();

    let before = resolver
        .select_sponsored(&seed, 3, MediaFilter::Any, &affinity)
        .await;
    assert!(!before.is_empty());
    assert!(before.iter().all(|p| p.author_id == shop));

    catalog.set_business_expiry(shop, Some(Utc::now() - ChronoDuration::seconds(1)));

    let after = resolver
        .select_sponsored(&seed, 3, MediaFilter::Any, &affinity)
        .await;
    assert!(after.is_empty());
}

#[tokio::test]
async fn test_reels_only_emit_video() {
    let (catalog, _) = seeded_catalog(20, 3, MediaType::Video);
    for i in 0..5 {
        catalog.add_post(post(Uuid::new_v4(), "photographer", "still", i, MediaType::Image));
    }
    let image_shop = Uuid::new_v4();
    catalog.upsert_account(image_shop, business_standing(ChronoDuration::days(1)), None);
    catalog.add_post(post(image_shop, "banner", "promo", 0, MediaType::Image));

    let service = service_over(catalog, &CompositionConfig::default());

    let page = service
        .reels_page(Viewer::Anonymous(0), PageRequest::new(1, 16))
        .await
        .unwrap();
    assert!(page.len() <= 16);
    assert!(page.iter().all(|i| i.post.media_type == MediaType::Video));
    // reel cadence 3: floor(16 / 4) = 4
    assert_eq!(page.iter().filter(|i| i.is_sponsored).count(), 4);

    let all = service.all_reels(Viewer::Anonymous(0)).await.unwrap();
    assert!(all.iter().all(|i| i.post.media_type == MediaType::Video));
    assert_eq!(all.iter().filter(|i| !i.is_sponsored).count(), 20);
    // floor(20 / 4) = 5 slots, 6 video ads available
    assert_eq!(all.iter().filter(|i| i.is_sponsored).count(), 5);

    let again = service.all_reels(Viewer::Anonymous(0)).await.unwrap();
    assert_eq!(all, again);
}

#[tokio::test]
async fn test_followed_business_leads_first_page() {
    let (catalog, shops) = seeded_catalog(20, 5, MediaType::Image);
    let viewer = Uuid::new_v4();
    let favourite = shops[4];
    catalog.follow(viewer, favourite);

    let config = CompositionConfig {
        eligibility_window_multiplier: 1,
        ..Default::default()
    };
    let resolver = BusinessEligibilityResolver::new(catalog.clone(), catalog.clone(), &config);

    // page 0 starts the window at the head of the rotation
    let seed = CompositionSeed::new(Viewer::Authenticated(viewer), 0, 20);
    let selected = resolver
        .select_sponsored(&seed, 1, MediaFilter::Any, &AffinityProfile::empty())
        .await;
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].author_id, favourite);
}

#[tokio::test]
async fn test_searched_business_leads_rotation() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let viewer = Uuid::new_v4();

    let garage = Uuid::new_v4();
    let bakery = Uuid::new_v4();
    catalog.upsert_account(garage, business_standing(ChronoDuration::days(5)), Some(Utc::now()));
    catalog.upsert_account(
        bakery,
        business_standing(ChronoDuration::days(5)),
        Some(Utc::now() - ChronoDuration::days(90)),
    );
    catalog.add_post(post(garage, "garage", "winter tyres fitted", 0, MediaType::Image));
    let bread = post(bakery, "bakery", "fresh sourdough every morning", 30, MediaType::Image);
    catalog.add_post(bread.clone());

    let config = CompositionConfig {
        eligibility_window_multiplier: 1,
        ..Default::default()
    };
    let resolver = BusinessEligibilityResolver::new(catalog.clone(), catalog.clone(), &config);
    let seed = CompositionSeed::new(Viewer::Authenticated(viewer), 0, 6);

    // without search history the recently verified garage leads
    let before = resolver
        .select_sponsored(&seed, 1, MediaFilter::Any, &AffinityProfile::empty())
        .await;
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].author_id, garage);

    let profile = AffinityProfile::from_history(
        &[SearchHistoryEntry {
            query: "Sourdough".to_string(),
            searched_at: Utc::now(),
        }],
        Utc::now(),
        config.affinity_half_life_hours,
    );
    let after = resolver
        .select_sponsored(&seed, 1, MediaFilter::Any, &profile)
        .await;
    assert_eq!(after, vec![bread]);
}

struct StalledInventory;

#[async_trait]
impl SponsoredInventory for StalledInventory {
    async fn business_posts(
        &self,
        _viewer: Viewer,
        _filter: MediaFilter,
        _keywords: Vec<String>,
        _limit: usize,
    ) -> anyhow::Result<Vec<Post>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![])
    }
}

struct StalledAccounts;

#[async_trait]
impl AccountDirectory for StalledAccounts {
    async fn standings(&self, _author_ids: Vec<Uuid>) -> anyhow::Result<HashMap<Uuid, AccountStanding>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(HashMap::new())
    }
}

#[tokio::test]
async fn test_stalled_business_side_serves_organic_only() {
    let (catalog, _) = seeded_catalog(20, 3, MediaType::Image);
    let config = CompositionConfig {
        eligibility_timeout_ms: 20,
        ..Default::default()
    };

    let stalled_inventory = CompositionService::new(
        catalog.clone(),
        catalog.clone(),
        Arc::new(StalledInventory),
        catalog.clone(),
        &config,
    );
    let stalled_accounts = CompositionService::new(
        catalog.clone(),
        catalog.clone(),
        catalog.clone(),
        Arc::new(StalledAccounts),
        &config,
    );

    for service in [stalled_inventory, stalled_accounts] {
        let items = tokio::time::timeout(
            Duration::from_secs(2),
            service.feed_page(Viewer::Anonymous(0), PageRequest::new(1, 12)),
        )
        .await
        .expect("deadline should cut the stalled dependency short")
        .unwrap();

        assert_eq!(items.len(), 12);
        assert!(items.iter().all(|i| !i.is_sponsored));
    }
}

#[tokio::test]
async fn test_stalled_accounts_empty_resolver_selection() {
    let (catalog, _) = seeded_catalog(0, 4, MediaType::Image);
    let config = CompositionConfig {
        eligibility_timeout_ms: 20,
        ..Default::default()
    };
    let resolver = BusinessEligibilityResolver::new(catalog, Arc::new(StalledAccounts), &config);

    let selected = resolver
        .select_sponsored(
            &CompositionSeed::new(Viewer::Anonymous(0), 1, 20),
            3,
            MediaFilter::Any,
            &AffinityProfile::empty(),
        )
        .await;
    assert!(selected.is_empty());
}
