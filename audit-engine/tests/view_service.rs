// End-to-end tests for the read path against the in-memory seams.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use audit_engine::cursor::PagePosition;
use audit_engine::permissions::StaticPermissionResolver;
use audit_engine::rate_limit::{RateLimitConfig, RateLimiter};
use audit_engine::store::{AuditEventStore, EventPage, InMemoryAuditEventStore};
use audit_engine::{
    AuditError, AuditEvent, AuditLogFilter, AuditViewService, EngineConfig, PermissionSet,
    ScopedFilter, UserContext, REDACTED_PLACEHOLDER,
};

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

struct Fixture {
    store: Arc<InMemoryAuditEventStore>,
    resolver: Arc<StaticPermissionResolver>,
    views: AuditViewService,
    org: Uuid,
}

fn fixture() -> Fixture {
    fixture_with_limits(RateLimitConfig {
        view_queries_per_minute: 10_000,
        ..Default::default()
    })
}

fn fixture_with_limits(limits: RateLimitConfig) -> Fixture {
    let store = Arc::new(InMemoryAuditEventStore::new());
    let resolver = Arc::new(StaticPermissionResolver::new());
    let limiter = Arc::new(RateLimiter::new(limits));
    let config = EngineConfig::default();
    let views = AuditViewService::new(store.clone(), resolver.clone(), limiter, config);
    Fixture {
        store,
        resolver,
        views,
        org: Uuid::new_v4(),
    }
}

fn seed_event(
    fixture: &Fixture,
    resource_type: &str,
    action: &str,
    at: DateTime<Utc>,
) -> AuditEvent {
    let mut fields = serde_json::Map::new();
    fields.insert("description".into(), json!(format!("{action} on {resource_type}")));
    fields.insert("ip_address".into(), json!("10.1.2.3"));
    let mut event = AuditEvent::record(Uuid::new_v4(), fixture.org, resource_type, action, fields);
    event.timestamp = at;
    fixture.store.append(event.clone());
    event
}

fn filter_for(types: &[&str]) -> AuditLogFilter {
    AuditLogFilter {
        resource_types: Some(types.iter().map(|t| t.to_string()).collect()),
        ..Default::default()
    }
}

// =============================================================================
// PERMISSION SCOPING
// =============================================================================

#[tokio::test]
async fn resource_type_filter_returns_only_matching_events() {
    let fx = fixture();
    let ctx = UserContext::new(Uuid::new_v4(), fx.org);
    fx.resolver.insert(
        &ctx,
        PermissionSet::new()
            .grant("payment", "capture")
            .grant("login", "create"),
    );

    let t0 = Utc::now() - Duration::hours(2);
    for i in 0..3 {
        seed_event(&fx, "payment", "capture", t0 + Duration::minutes(i));
    }
    for i in 0..2 {
        seed_event(&fx, "login", "create", t0 + Duration::minutes(10 + i));
    }

    let page = fx
        .views
        .search(&ctx, &filter_for(&["payment"]))
        .await
        .unwrap();

    assert_eq!(page.entries.len(), 3);
    assert!(page.entries.iter().all(|e| e.resource_type == "payment"));
}

#[tokio::test]
async fn unpermitted_resource_types_are_dropped_silently() {
    let fx = fixture();
    let ctx = UserContext::new(Uuid::new_v4(), fx.org);
    fx.resolver
        .insert(&ctx, PermissionSet::new().grant("login", "create"));

    let t0 = Utc::now() - Duration::hours(1);
    seed_event(&fx, "login", "create", t0);
    seed_event(&fx, "secret_rotation", "rotate", t0 + Duration::minutes(1));

    // Requesting a restricted type alongside a permitted one is not an error;
    // the restricted type simply contributes nothing.
    let page = fx
        .views
        .search(&ctx, &filter_for(&["login", "secret_rotation"]))
        .await
        .unwrap();

    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].resource_type, "login");
}

#[tokio::test]
async fn events_outside_the_permission_set_are_never_returned() {
    let fx = fixture();
    let ctx = UserContext::new(Uuid::new_v4(), fx.org);
    fx.resolver
        .insert(&ctx, PermissionSet::new().grant("login", "create"));

    let t0 = Utc::now() - Duration::hours(1);
    seed_event(&fx, "login", "create", t0);
    seed_event(&fx, "login", "delete", t0 + Duration::minutes(1));
    seed_event(&fx, "payment", "capture", t0 + Duration::minutes(2));

    let page = fx
        .views
        .search(&ctx, &AuditLogFilter::default())
        .await
        .unwrap();

    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].action, "create");
}

struct CountingStore {
    inner: InMemoryAuditEventStore,
    queries: AtomicUsize,
}

#[async_trait]
impl AuditEventStore for CountingStore {
    async fn query(
        &self,
        filter: &ScopedFilter,
        after: Option<PagePosition>,
        limit: usize,
    ) -> Result<EventPage, AuditError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(filter, after, limit).await
    }

    async fn fetch(
        &self,
        organization_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<AuditEvent>, AuditError> {
        self.inner.fetch(organization_id, event_id).await
    }

    async fn count(&self, filter: &ScopedFilter) -> Result<u64, AuditError> {
        self.inner.count(filter).await
    }
}

#[tokio::test]
async fn empty_intersection_skips_the_store() {
    let store = Arc::new(CountingStore {
        inner: InMemoryAuditEventStore::new(),
        queries: AtomicUsize::new(0),
    });
    let resolver = Arc::new(StaticPermissionResolver::new());
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
    let views = AuditViewService::new(
        store.clone(),
        resolver,
        limiter,
        EngineConfig::default(),
    );

    // No permission set registered: the caller sees nothing.
    let ctx = UserContext::new(Uuid::new_v4(), Uuid::new_v4());
    let page = views.search(&ctx, &AuditLogFilter::default()).await.unwrap();

    assert!(page.entries.is_empty());
    assert!(page.next_cursor.is_none());
    assert_eq!(store.queries.load(Ordering::SeqCst), 0);
}

// =============================================================================
// REDACTION
// =============================================================================

#[tokio::test]
async fn redacted_fields_use_the_placeholder_and_keep_shape() {
    let fx = fixture();
    let restricted = UserContext::new(Uuid::new_v4(), fx.org);
    let privileged = UserContext::new(Uuid::new_v4(), fx.org);
    fx.resolver.insert(
        &restricted,
        PermissionSet::new()
            .grant("payment", "capture")
            .redact_field("payment", "ip_address"),
    );
    fx.resolver
        .insert(&privileged, PermissionSet::new().grant("payment", "capture"));

    seed_event(&fx, "payment", "capture", Utc::now() - Duration::minutes(5));

    let redacted = fx
        .views
        .search(&restricted, &AuditLogFilter::default())
        .await
        .unwrap();
    let full = fx
        .views
        .search(&privileged, &AuditLogFilter::default())
        .await
        .unwrap();

    assert_eq!(
        redacted.entries[0].fields["ip_address"],
        json!(REDACTED_PLACEHOLDER)
    );
    assert_eq!(full.entries[0].fields["ip_address"], json!("10.1.2.3"));

    // Same field names in the same order at both permission levels.
    let redacted_keys: Vec<&String> = redacted.entries[0].fields.keys().collect();
    let full_keys: Vec<&String> = full.entries[0].fields.keys().collect();
    assert_eq!(redacted_keys, full_keys);
}

// =============================================================================
// PAGINATION
// =============================================================================

#[tokio::test]
async fn cursor_pages_have_no_gaps_or_duplicates() {
    let fx = fixture();
    let ctx = UserContext::new(Uuid::new_v4(), fx.org);
    fx.resolver
        .insert(&ctx, PermissionSet::new().grant("login", "create"));

    let t0 = Utc::now() - Duration::hours(1);
    let mut expected: Vec<Uuid> = (0..10)
        .map(|i| seed_event(&fx, "login", "create", t0 + Duration::seconds(i)).id)
        .collect();
    expected.reverse(); // results come back newest first

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let filter = AuditLogFilter {
            page_size: Some(3),
            cursor: cursor.clone(),
            ..Default::default()
        };
        let page = fx.views.search(&ctx, &filter).await.unwrap();
        seen.extend(page.entries.iter().map(|e| e.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(seen, expected);
}

#[tokio::test]
async fn tampered_cursor_is_rejected_not_reset() {
    let fx = fixture();
    let ctx = UserContext::new(Uuid::new_v4(), fx.org);
    fx.resolver
        .insert(&ctx, PermissionSet::new().grant("login", "create"));

    let filter = AuditLogFilter {
        cursor: Some("bm90LWEtY3Vyc29y".into()),
        ..Default::default()
    };
    assert!(matches!(
        fx.views.search(&ctx, &filter).await,
        Err(AuditError::InvalidCursor)
    ));
}

// =============================================================================
// VALIDATION AND RATE LIMITING
// =============================================================================

#[tokio::test]
async fn invalid_filters_are_rejected() {
    let fx = fixture();
    let ctx = UserContext::new(Uuid::new_v4(), fx.org);

    let oversized = AuditLogFilter {
        page_size: Some(501),
        ..Default::default()
    };
    assert!(matches!(
        fx.views.search(&ctx, &oversized).await,
        Err(AuditError::InvalidFilter(_))
    ));

    let inverted = AuditLogFilter {
        date_from: Some(Utc::now()),
        date_to: Some(Utc::now() - Duration::hours(1)),
        ..Default::default()
    };
    assert!(matches!(
        fx.views.search(&ctx, &inverted).await,
        Err(AuditError::InvalidFilter(_))
    ));
}

#[tokio::test]
async fn exhausted_view_budget_is_rate_limited() {
    let fx = fixture_with_limits(RateLimitConfig {
        view_queries_per_minute: 1,
        ..Default::default()
    });
    let ctx = UserContext::new(Uuid::new_v4(), fx.org);
    fx.resolver
        .insert(&ctx, PermissionSet::new().grant("login", "create"));

    assert!(fx.views.search(&ctx, &AuditLogFilter::default()).await.is_ok());
    assert!(matches!(
        fx.views.search(&ctx, &AuditLogFilter::default()).await,
        Err(AuditError::RateLimited(_))
    ));
}

// =============================================================================
// SINGLE-ENTRY LOOKUP AND STATISTICS
// =============================================================================

#[tokio::test]
async fn entry_lookup_hides_unpermitted_events() {
    let fx = fixture();
    let ctx = UserContext::new(Uuid::new_v4(), fx.org);
    fx.resolver.insert(
        &ctx,
        PermissionSet::new()
            .grant("login", "create")
            .redact_field("login", "ip_address"),
    );

    let visible = seed_event(&fx, "login", "create", Utc::now() - Duration::minutes(2));
    let hidden = seed_event(&fx, "payment", "capture", Utc::now() - Duration::minutes(1));

    let entry = fx.views.fetch_entry(&ctx, visible.id).await.unwrap().unwrap();
    assert_eq!(entry.id, visible.id);
    assert_eq!(entry.fields["ip_address"], json!(REDACTED_PLACEHOLDER));

    // Unpermitted and nonexistent entries are indistinguishable.
    assert!(fx.views.fetch_entry(&ctx, hidden.id).await.unwrap().is_none());
    assert!(fx
        .views
        .fetch_entry(&ctx, Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn statistics_report_totals_and_last_activity() {
    let fx = fixture();
    let ctx = UserContext::new(Uuid::new_v4(), fx.org);
    fx.resolver
        .insert(&ctx, PermissionSet::new().grant("login", "create"));

    let t0 = Utc::now() - Duration::hours(1);
    let newest = t0 + Duration::minutes(30);
    seed_event(&fx, "login", "create", t0);
    seed_event(&fx, "login", "create", newest);
    seed_event(&fx, "payment", "capture", t0 + Duration::minutes(10));

    let stats = fx.views.statistics(&ctx, None, None).await.unwrap();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.last_activity, Some(newest));
}
