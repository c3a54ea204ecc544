//! End-to-end scenarios for the access engine.
//!
//! Each test builds an engine over in-memory stores whose fault handles it
//! keeps, seeds a small hierarchy and exercises the public engine surface:
//! 1. Subtree and exact policies at `/club/cpsk`
//! 2. The `/fac/eng` member scenario
//! 3. Private audience visibility across sibling faculties
//! 4. Deactivation flipping `can`
//! 5. Page concatenation over a shuffled dataset
//! 6. Store outages and timeouts

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use campus_access::{AccessEngine, EngineConfig, Stores};
use campus_content::{
    can_view, ContentDraft, ContentItem, ContentStore, ContentVisibility, FeedFilter,
    MemoryContentStore,
};
use campus_events::{EventBus, MemoryEventBus};
use campus_org::{
    AccessError, MemoryMembershipStore, MemoryOrgStore, OrgNode, OrgPath, ViewerAccess,
};
use campus_rbac::{MemoryPolicyStore, PolicyDraft, PolicyScope};
use chrono::{Duration as ChronoDuration, SubsecRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

/// Engine plus the concrete stores behind it.
struct TestFixture {
    engine: AccessEngine,
    orgs: Arc<MemoryOrgStore>,
    memberships: Arc<MemoryMembershipStore>,
    content: Arc<MemoryContentStore>,
    admin: Uuid,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    async fn with_config(config: EngineConfig) -> Self {
        let orgs = Arc::new(MemoryOrgStore::new());
        let memberships = Arc::new(MemoryMembershipStore::new());
        let policies = Arc::new(MemoryPolicyStore::new());
        let content = Arc::new(MemoryContentStore::new());

        let stores = Stores {
            orgs: orgs.clone(),
            memberships: memberships.clone(),
            policies,
            content: content.clone(),
        };
        let events: Arc<dyn EventBus> = Arc::new(MemoryEventBus::new());
        let engine = AccessEngine::new(config, stores, events).unwrap();

        let admin = Uuid::now_v7();
        engine.bootstrap_superuser(admin).await.unwrap();

        Self {
            engine,
            orgs,
            memberships,
            content,
            admin,
        }
    }

    async fn node(&self, path: &str) -> OrgNode {
        let name = path.rsplit('/').next().unwrap_or("root").to_string();
        self.engine.create_org_node(self.admin, path, &name).await.unwrap()
    }

    async fn member(&self, path: &str, position: &str) -> Uuid {
        let user = Uuid::now_v7();
        self.engine
            .grant_membership(self.admin, user, path, position)
            .await
            .unwrap();
        user
    }

    async fn policy(&self, position: &str, prefix: &str, scope: PolicyScope, actions: &[&str]) {
        self.engine
            .upsert_policy(self.admin, &PolicyDraft::new(position, prefix, scope, actions))
            .await
            .unwrap();
    }

    /// Faculty tree with a member policy for posting.
    async fn faculties(&self) -> (OrgNode, OrgNode) {
        self.node("/fac").await;
        let eng = self.node("/fac/eng").await;
        let sci = self.node("/fac/sci").await;
        self.policy("member", "/fac", PolicyScope::Subtree, &["post:create"])
            .await;
        (eng, sci)
    }

    /// Store an item bypassing the feed, so its timestamp can be chosen.
    async fn insert_raw(&self, item: ContentItem) {
        let id = item.id;
        let (record, visibility, categories) = item.into_records();
        let mut tx = self.content.begin().await.unwrap();
        tx.insert_item(record);
        tx.insert_visibility(id, visibility);
        tx.insert_categories(id, categories);
        tx.commit().await.unwrap();
    }
}

async fn all_pages(
    engine: &AccessEngine,
    viewer: &ViewerAccess,
    limit: usize,
    filter: &FeedFilter,
) -> Vec<ContentItem> {
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = engine
            .list_visible(viewer, cursor.as_deref(), Some(limit), filter)
            .await
            .unwrap();
        assert!(page.items.len() <= limit);
        items.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return items,
        }
    }
}

#[tokio::test]
async fn test_club_subtree_policy() {
    let fx = TestFixture::new().await;
    fx.node("/club").await;
    fx.node("/club/cpsk").await;
    fx.node("/club/cpsk/sub").await;
    fx.node("/other").await;
    fx.policy("head", "/club", PolicyScope::Subtree, &["event:create"])
        .await;
    let head = fx.member("/club/cpsk", "head").await;

    assert!(fx.engine.can(head, "event:create", "/club/cpsk/sub").await.unwrap());
    assert!(fx.engine.can(head, "event:create", "/club/cpsk").await.unwrap());
    assert!(!fx.engine.can(head, "event:create", "/other").await.unwrap());
    assert!(!fx.engine.can(head, "post:create", "/club/cpsk").await.unwrap());
}

#[tokio::test]
async fn test_club_exact_policy() {
    let fx = TestFixture::new().await;
    fx.node("/club").await;
    fx.node("/club/cpsk").await;
    fx.node("/club/cpsk/sub").await;
    fx.policy("head", "/club", PolicyScope::Exact, &["event:create"])
        .await;
    let head = fx.member("/club/cpsk", "head").await;

    assert!(fx.engine.can(head, "event:create", "/club/cpsk").await.unwrap());
    assert!(!fx.engine.can(head, "event:create", "/club/cpsk/sub").await.unwrap());
    assert!(!fx.engine.can(head, "event:create", "/club").await.unwrap());
}

#[tokio::test]
async fn test_faculty_member_can_post_below_not_above() {
    let fx = TestFixture::new().await;
    fx.faculties().await;
    let u = fx.member("/fac/eng", "member").await;

    assert!(fx.engine.can(u, "post:create", "/fac/eng").await.unwrap());
    assert!(!fx.engine.can(u, "post:create", "/fac").await.unwrap());

    let abilities = fx
        .engine
        .abilities_for(u, "/fac/eng", &["post:create", "event:create", "not-an-action"])
        .await
        .unwrap();
    assert!(abilities["post:create"]);
    assert!(!abilities["event:create"]);
    assert!(!abilities["not-an-action"]);
}

#[tokio::test]
async fn test_private_post_stays_in_its_faculty() {
    let fx = TestFixture::new().await;
    let (eng, _) = fx.faculties().await;
    let u = fx.member("/fac/eng", "member").await;
    let v = fx.member("/fac/sci", "member").await;

    let mut published = fx.engine.events().subscribe("content.item.published").await.unwrap();

    let post = fx
        .engine
        .create_content(
            u,
            ContentDraft::post("/fac/eng", "Lab open day")
                .with_visibility(ContentVisibility::private([eng.id])),
        )
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), published.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.actor_id, Some(u));

    let u_view = fx.engine.viewer(Some(u)).await.unwrap();
    let v_view = fx.engine.viewer(Some(v)).await.unwrap();
    let admin_view = fx.engine.viewer(Some(fx.admin)).await.unwrap();

    let filter = FeedFilter::default();
    let u_page = fx.engine.list_visible(&u_view, None, None, &filter).await.unwrap();
    let v_page = fx.engine.list_visible(&v_view, None, None, &filter).await.unwrap();
    let admin_page = fx.engine.list_visible(&admin_view, None, None, &filter).await.unwrap();

    assert_eq!(u_page.items.len(), 1);
    assert_eq!(u_page.items[0].id, post.id);
    assert!(v_page.items.is_empty());
    assert_eq!(admin_page.items.len(), 1);

    assert!(matches!(
        fx.engine.get_content(&v_view, post.id).await,
        Err(AccessError::Forbidden(_))
    ));
    assert_eq!(fx.engine.get_content(&u_view, post.id).await.unwrap().id, post.id);
    assert!(matches!(
        fx.engine.get_content(&u_view, Uuid::now_v7()).await,
        Err(AccessError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_member_above_audience_reaches_it() {
    let fx = TestFixture::new().await;
    let (eng, _) = fx.faculties().await;
    let author = fx.member("/fac/eng", "member").await;
    let dean = fx.member("/fac", "dean").await;

    fx.engine
        .create_content(
            author,
            ContentDraft::post("/fac/eng", "Budget")
                .with_visibility(ContentVisibility::private([eng.id])),
        )
        .await
        .unwrap();

    let dean_view = fx.engine.build_viewer_access(dean).await.unwrap();
    assert!(dean_view.reaches_node(&eng.id));
    let page = fx
        .engine
        .list_visible(&dean_view, None, None, &FeedFilter::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
}

#[tokio::test]
async fn test_posting_outside_scope_is_forbidden() {
    let fx = TestFixture::new().await;
    fx.faculties().await;
    let u = fx.member("/fac/eng", "member").await;

    let err = fx
        .engine
        .create_content(u, ContentDraft::post("/fac", "Faculty wide"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Forbidden(_)));
    assert!(fx.content.is_empty().await);

    let err = fx
        .engine
        .create_content(u, ContentDraft::post("/fac/nowhere", "Lost"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::NotFound(_)));
}

#[tokio::test]
async fn test_deactivation_flips_can() {
    let fx = TestFixture::new().await;
    fx.faculties().await;
    let u = Uuid::now_v7();
    let membership = fx
        .engine
        .grant_membership(fx.admin, u, "/fac/eng", "member")
        .await
        .unwrap();

    assert!(fx.engine.can(u, "post:create", "/fac/eng").await.unwrap());
    fx.engine.end_membership(fx.admin, membership.id).await.unwrap();
    assert!(!fx.engine.can(u, "post:create", "/fac/eng").await.unwrap());

    let viewer = fx.engine.build_viewer_access(u).await.unwrap();
    assert!(viewer.reachable_node_ids.is_empty());

    // Re-granting the ended assignment is a fresh row.
    fx.engine
        .grant_membership(fx.admin, u, "/fac/eng", "member")
        .await
        .unwrap();
    assert!(fx.engine.can(u, "post:create", "/fac/eng").await.unwrap());
    assert_eq!(fx.engine.membership_history(u).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_membership_managers_cannot_mint_superusers() {
    let fx = TestFixture::new().await;
    fx.policy("registrar", "/", PolicyScope::Subtree, &["membership:manage"])
        .await;
    let registrar = fx.member("/", "registrar").await;
    assert!(!fx.engine.can(registrar, "policy:manage", "/").await.unwrap());

    let err = fx
        .engine
        .grant_membership(registrar, registrar, "/", "root_admin")
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Forbidden(_)));

    assert!(!fx.engine.can(registrar, "policy:manage", "/").await.unwrap());
    let viewer = fx.engine.build_viewer_access(registrar).await.unwrap();
    assert!(!viewer.superuser);

    // Ordinary grants still work for the registrar.
    let student = Uuid::now_v7();
    fx.engine
        .grant_membership(registrar, student, "/", "student")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_policy_managers_cannot_escalate_through_membership_policies() {
    let fx = TestFixture::new().await;
    fx.policy("council", "/", PolicyScope::Subtree, &["policy:manage"])
        .await;
    let council = fx.member("/", "council").await;

    fx.engine
        .upsert_policy(
            council,
            &PolicyDraft::new("council", "/", PolicyScope::Subtree, &["membership:manage"]),
        )
        .await
        .unwrap();
    assert!(fx.engine.can(council, "membership:manage", "/").await.unwrap());

    assert!(matches!(
        fx.engine.grant_membership(council, council, "/", "root_admin").await,
        Err(AccessError::Forbidden(_))
    ));
    assert!(!fx.engine.build_viewer_access(council).await.unwrap().superuser);
}

#[tokio::test]
async fn test_viewer_without_memberships_sees_public_only() {
    let fx = TestFixture::new().await;
    let (eng, sci) = fx.faculties().await;
    let author = fx.member("/fac/eng", "member").await;

    fx.engine
        .create_content(author, ContentDraft::post("/fac/eng", "Open lecture"))
        .await
        .unwrap();
    fx.engine
        .create_content(
            author,
            ContentDraft::post("/fac/eng", "Staff only")
                .with_visibility(ContentVisibility::private([eng.id, sci.id])),
        )
        .await
        .unwrap();

    let nobody = Uuid::now_v7();
    let viewer = fx.engine.build_viewer_access(nobody).await.unwrap();
    assert!(viewer.reachable_paths.is_empty());
    assert!(viewer.reachable_node_ids.is_empty());
    assert!(!viewer.superuser);

    for viewer in [viewer, ViewerAccess::anonymous()] {
        let page = fx
            .engine
            .list_visible(&viewer, None, None, &FeedFilter::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].visibility.is_public());
    }
}

#[tokio::test]
async fn test_pages_concatenate_to_the_full_set() {
    let fx = TestFixture::new().await;
    let (eng, sci) = fx.faculties().await;
    let u = fx.member("/fac/eng", "member").await;
    let v = fx.member("/fac/sci", "member").await;

    let mut rng = StdRng::seed_from_u64(7);
    let base = Utc::now().trunc_subsecs(6);
    let authors = [u, v, Uuid::now_v7()];
    let mut everything = Vec::new();

    for i in 0..80 {
        let visibility = match rng.gen_range(0..3) {
            0 => ContentVisibility::Public,
            1 => ContentVisibility::private([eng.id]),
            _ => ContentVisibility::private([sci.id]),
        };
        let path = if rng.gen_bool(0.5) { "/fac/eng" } else { "/fac/sci" };
        let author = authors[rng.gen_range(0..authors.len())];

        let mut item = ContentDraft::post(path, format!("Item {}", i))
            .with_visibility(visibility)
            .into_item(author, OrgPath::parse(path).unwrap())
            .unwrap();
        // Coarse timestamps force ties broken by id.
        item.sort_at = base - ChronoDuration::seconds(rng.gen_range(0..15));
        everything.push(item.clone());
        fx.insert_raw(item).await;
    }

    for user in [Some(u), Some(v), None, Some(fx.admin)] {
        let viewer = fx.engine.viewer(user).await.unwrap();
        let filter = FeedFilter::default();

        let mut expected: Vec<&ContentItem> =
            everything.iter().filter(|it| can_view(&viewer, it)).collect();
        expected.sort_by(|a, b| b.position().cmp(&a.position()));
        let expected: Vec<Uuid> = expected.iter().map(|it| it.id).collect();

        let unbounded = fx.engine.list_visible(&viewer, None, Some(100), &filter).await.unwrap();
        assert!(unbounded.next_cursor.is_none());
        let unbounded: Vec<Uuid> = unbounded.items.iter().map(|it| it.id).collect();
        assert_eq!(unbounded, expected);

        for limit in [1, 7, 20] {
            let paged: Vec<Uuid> = all_pages(&fx.engine, &viewer, limit, &filter)
                .await
                .iter()
                .map(|it| it.id)
                .collect();
            let distinct: HashSet<&Uuid> = paged.iter().collect();
            assert_eq!(distinct.len(), paged.len(), "duplicates at limit {}", limit);
            assert_eq!(paged, expected, "limit {}", limit);
        }
    }

    // Filters compose with visibility and paging.
    let viewer = fx.engine.viewer(Some(u)).await.unwrap();
    let filter = FeedFilter::default().org_subtree("/fac/sci");
    let paged = all_pages(&fx.engine, &viewer, 3, &filter).await;
    assert!(paged
        .iter()
        .all(|it| it.org_path.as_str() == "/fac/sci" && can_view(&viewer, it)));
}

#[tokio::test]
async fn test_tampered_cursor_is_rejected() {
    let fx = TestFixture::new().await;
    fx.faculties().await;
    let u = fx.member("/fac/eng", "member").await;
    for i in 0..3 {
        fx.engine
            .create_content(u, ContentDraft::post("/fac/eng", format!("Post {}", i)))
            .await
            .unwrap();
    }

    let viewer = fx.engine.viewer(Some(u)).await.unwrap();
    let page = fx
        .engine
        .list_visible(&viewer, None, Some(1), &FeedFilter::default())
        .await
        .unwrap();
    let cursor = page.next_cursor.unwrap();

    let mut tampered = cursor.clone().into_bytes();
    tampered[5] = if tampered[5] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    assert!(matches!(
        fx.engine
            .list_visible(&viewer, Some(&tampered), Some(1), &FeedFilter::default())
            .await,
        Err(AccessError::Validation(_))
    ));
    assert!(matches!(
        fx.engine
            .list_visible(&viewer, Some(&cursor), Some(0), &FeedFilter::default())
            .await,
        Err(AccessError::Validation(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_outage_surfaces_as_transient() {
    let fx = TestFixture::new().await;
    fx.faculties().await;
    let u = fx.member("/fac/eng", "member").await;

    fx.memberships.faults().set_unavailable(true);
    let err = fx.engine.can(u, "post:create", "/fac/eng").await.unwrap_err();
    assert!(matches!(err, AccessError::TransientStore(_)));
    assert!(err.is_retryable());
    assert!(matches!(
        fx.engine.build_viewer_access(u).await,
        Err(AccessError::TransientStore(_))
    ));
    fx.memberships.faults().set_unavailable(false);

    fx.content.faults().set_unavailable(true);
    let viewer = fx.engine.viewer(Some(u)).await.unwrap();
    assert!(matches!(
        fx.engine.list_visible(&viewer, None, None, &FeedFilter::default()).await,
        Err(AccessError::TransientStore(_))
    ));
    assert!(matches!(
        fx.engine
            .create_content(u, ContentDraft::post("/fac/eng", "During outage"))
            .await,
        Err(AccessError::TransientStore(_))
    ));
    fx.content.faults().set_unavailable(false);
    assert!(fx.content.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_reads_recover_within_retry_budget() {
    let fx = TestFixture::new().await;
    fx.faculties().await;
    let u = fx.member("/fac/eng", "member").await;

    let faults = fx.orgs.faults();
    faults.set_unavailable(true);
    let healer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(15)).await;
        faults.set_unavailable(false);
    });

    let viewer = fx.engine.build_viewer_access(u).await.unwrap();
    assert_eq!(viewer.reachable_paths.len(), 1);
    healer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_times_out() {
    let config = EngineConfig {
        store_timeout_ms: 100,
        store_max_retries: 1,
        ..EngineConfig::default()
    };
    let fx = TestFixture::with_config(config).await;
    fx.faculties().await;
    let u = fx.member("/fac/eng", "member").await;

    fx.memberships.faults().set_latency(Duration::from_secs(5));
    assert!(matches!(
        fx.engine.can(u, "post:create", "/fac/eng").await,
        Err(AccessError::TransientStore(_))
    ));
}
