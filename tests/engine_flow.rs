//! End-to-end engine flows over the in-memory store
//!
//! Exercises the cross-service behavior the engine promises:
//! - Weekly assignments are idempotent, race-safe and stable all week
//! - Mission completion awards points exactly once across devices
//! - Achievement unlocks announce once and never revoke
//! - Upvote toggling keeps the count equal to the upvoter set
//! - The mirror keeps records readable without the store

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;

use auxano::achievements::AchievementService;
use auxano::catalog::{
    AchievementDefinition, ContentCatalog, Criteria, CriteriaKind, MissionDefinition,
    ProgressSnapshot,
};
use auxano::missions::{CompletionOutcome, MissionService, SeededPicker};
use auxano::mirror::{MirrorLayer, MirrorStoreKind};
use auxano::reflections::ReflectionService;
use auxano::store::MemoryStore;
use auxano::week::week_key;

static TRACING: std::sync::Once = std::sync::Once::new();

// Opt-in log output for debugging: RUST_LOG=debug cargo test
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

fn mission(id: &str, points: u32) -> MissionDefinition {
    MissionDefinition {
        id: id.to_string(),
        title: format!("Mission {}", id),
        description: "integration mission".to_string(),
        points,
        route: None,
    }
}

fn achievement(id: &str, kind: CriteriaKind, threshold: u32) -> AchievementDefinition {
    AchievementDefinition {
        id: id.to_string(),
        name: format!("Badge {}", id),
        description: "integration badge".to_string(),
        criteria: Criteria { kind, threshold },
    }
}

fn catalog() -> Arc<ContentCatalog> {
    Arc::new(ContentCatalog::new(
        vec![
            mission("m1", 10),
            mission("m2", 5),
            mission("m3", 15),
            mission("m4", 20),
        ],
        vec![
            achievement("journal_1", CriteriaKind::JournalEntries, 1),
            achievement("streak_7", CriteriaKind::Streak, 7),
        ],
    ))
}

fn mission_service(store: Arc<MemoryStore>, seed: u64) -> MissionService<MemoryStore> {
    MissionService::new(store, catalog()).with_picker(Arc::new(SeededPicker::new(seed)))
}

fn wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 24, 9, 0, 0).unwrap()
}

// =============================================================================
// Weekly Rotation
// =============================================================================

#[tokio::test]
async fn test_first_weekly_request_assigns_three_of_four() {
    let store = Arc::new(MemoryStore::new());
    let service = mission_service(Arc::clone(&store), 42);

    let assignment = service
        .get_or_create_assignment("user_1", wednesday())
        .await
        .unwrap();

    assert_eq!(assignment.week_id, "2024-w30");
    assert_eq!(assignment.missions.len(), 3);
    assert!(assignment.missions.iter().all(|m| !m.completed));

    let mut ids: Vec<_> = assignment
        .missions
        .iter()
        .map(|m| m.mission_id.as_str())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3, "assigned missions must be distinct");
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_assignment_is_stable_across_the_whole_week() {
    let store = Arc::new(MemoryStore::new());
    let service = mission_service(Arc::clone(&store), 42);

    let first = service
        .get_or_create_assignment("user_1", wednesday())
        .await
        .unwrap();

    // Monday 2024-07-22 through Sunday 2024-07-28 all land in 2024-w30
    for (day, hour) in [(22, 0), (23, 6), (24, 12), (25, 18), (26, 23), (27, 3), (28, 21)] {
        let moment = Utc.with_ymd_and_hms(2024, 7, day, hour, 30, 0).unwrap();
        let again = service
            .get_or_create_assignment("user_1", moment)
            .await
            .unwrap();
        assert_eq!(again.week_id, "2024-w30");
        assert_eq!(again, first);
    }
    assert_eq!(store.len(), 1);

    // Monday of the next ISO week starts a fresh rotation
    let next_week = Utc.with_ymd_and_hms(2024, 7, 29, 0, 0, 0).unwrap();
    let fresh = service
        .get_or_create_assignment("user_1", next_week)
        .await
        .unwrap();
    assert_eq!(fresh.week_id, "2024-w31");
    assert!(fresh.missions.iter().all(|m| !m.completed));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_week_key_matches_service_rotation() {
    let date = NaiveDate::from_ymd_opt(2024, 7, 24).unwrap();
    assert_eq!(week_key(date), "2024-w30");

    // Year boundary: 2024-12-30 is a Monday belonging to ISO 2025-W01
    let boundary = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
    assert_eq!(week_key(boundary), "2025-w1");
}

#[tokio::test]
async fn test_two_devices_racing_on_first_access_agree() {
    let store = Arc::new(MemoryStore::new());
    let phone = Arc::new(mission_service(Arc::clone(&store), 1));
    let tablet = Arc::new(mission_service(Arc::clone(&store), 99));

    let (a, b) = tokio::join!(
        {
            let phone = Arc::clone(&phone);
            async move { phone.get_or_create_assignment("user_1", wednesday()).await }
        },
        {
            let tablet = Arc::clone(&tablet);
            async move { tablet.get_or_create_assignment("user_1", wednesday()).await }
        }
    );

    // Different pickers, but exactly one selection was stored
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(store.len(), 1);
}

// =============================================================================
// Exactly-Once Completion
// =============================================================================

#[tokio::test]
async fn test_points_awarded_once_across_devices() {
    let store = Arc::new(MemoryStore::new());
    let phone = mission_service(Arc::clone(&store), 42);
    let tablet = mission_service(Arc::clone(&store), 42);
    let definitions = catalog();

    let assignment = phone
        .get_or_create_assignment("user_1", wednesday())
        .await
        .unwrap();
    let target = assignment.missions[0].mission_id.clone();
    let expected = definitions.mission(&target).unwrap().points;

    // The caller awards points only when it observes the flip
    let mut awarded = 0u32;
    for service in [&phone, &tablet] {
        let outcome = service
            .complete_mission("user_1", &assignment.week_id, &target)
            .await
            .unwrap();
        assert!(outcome.succeeded());
        if outcome == CompletionOutcome::Completed {
            awarded += definitions.mission(&target).unwrap().points;
        }
    }

    assert_eq!(awarded, expected);
}

#[tokio::test]
async fn test_concurrent_completion_flips_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(mission_service(store, 42));

    let assignment = service
        .get_or_create_assignment("user_1", wednesday())
        .await
        .unwrap();
    let target = assignment.missions[1].mission_id.clone();
    let week_id = assignment.week_id.clone();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = Arc::clone(&service);
        let week_id = week_id.clone();
        let target = target.clone();
        handles.push(tokio::spawn(async move {
            service
                .complete_mission("user_1", &week_id, &target)
                .await
                .unwrap()
        }));
    }

    let mut completed = 0;
    for handle in handles {
        if handle.await.unwrap() == CompletionOutcome::Completed {
            completed += 1;
        }
    }
    assert_eq!(completed, 1);

    let refreshed = service
        .get_or_create_assignment("user_1", wednesday())
        .await
        .unwrap();
    assert_eq!(refreshed.missions.iter().filter(|m| m.completed).count(), 1);
}

// =============================================================================
// Achievement Unlocks
// =============================================================================

#[tokio::test]
async fn test_journal_badge_unlocks_once_at_threshold() {
    let store = Arc::new(MemoryStore::new());
    let service = AchievementService::new(store, catalog());

    let before = ProgressSnapshot::default();
    assert!(service.evaluate("user_1", &before).await.unwrap().is_empty());
    assert!(!service.is_unlocked("user_1", "journal_1").await.unwrap());

    let at_threshold = ProgressSnapshot {
        journal_entries: 1,
        ..ProgressSnapshot::default()
    };
    let unlocked = service.evaluate("user_1", &at_threshold).await.unwrap();
    assert_eq!(unlocked, vec!["journal_1".to_string()]);

    // Counter keeps growing; the badge is not announced again
    let later = ProgressSnapshot {
        journal_entries: 5,
        ..ProgressSnapshot::default()
    };
    assert!(service.evaluate("user_1", &later).await.unwrap().is_empty());
    assert!(service.is_unlocked("user_1", "journal_1").await.unwrap());

    let records = service.unlocks_for("user_1").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].achievement_id, "journal_1");
}

#[tokio::test]
async fn test_unlocks_survive_counter_regression() {
    let store = Arc::new(MemoryStore::new());
    let service = AchievementService::new(store, catalog());

    let streak = ProgressSnapshot {
        streak: 7,
        ..ProgressSnapshot::default()
    };
    assert_eq!(
        service.evaluate("user_1", &streak).await.unwrap(),
        vec!["streak_7".to_string()]
    );

    // The streak broke; the badge stays
    let broken = ProgressSnapshot::default();
    assert!(service.evaluate("user_1", &broken).await.unwrap().is_empty());
    assert!(service.is_unlocked("user_1", "streak_7").await.unwrap());
}

// =============================================================================
// Reflection Upvotes
// =============================================================================

#[tokio::test]
async fn test_reflection_feed_flow() {
    let store = Arc::new(MemoryStore::new());
    let service = ReflectionService::new(store);

    let shared = service
        .share("dev_psalm23", "user_1", "Hannah", "He restores my soul")
        .await
        .unwrap();

    for voter in ["user_2", "user_3", "user_4"] {
        let outcome = service.toggle_upvote(&shared.id, voter).await.unwrap();
        assert!(outcome.ok);
        assert!(outcome.upvoted);
        assert_eq!(outcome.upvotes as usize, outcome.upvoted_by.len());
    }

    // One voter changes their mind
    let withdrawn = service.toggle_upvote(&shared.id, "user_3").await.unwrap();
    assert!(!withdrawn.upvoted);
    assert_eq!(withdrawn.upvotes, 2);

    let feed = service.list_for("dev_psalm23").await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].upvotes, 2);
    assert!(feed[0].is_upvoted_by("user_2"));
    assert!(!feed[0].is_upvoted_by("user_3"));
}

#[tokio::test]
async fn test_optimistic_client_reconciles_with_server() {
    let store = Arc::new(MemoryStore::new());
    let service = ReflectionService::new(store);

    let mut local = service
        .share("dev_1", "author", "Author", "text")
        .await
        .unwrap();

    // Flip the display immediately, then confirm against the server
    let _token = local.toggle_locally("user_1");
    assert_eq!(local.upvotes, 1);

    let outcome = service.toggle_upvote(&local.id, "user_1").await.unwrap();
    assert!(outcome.ok);
    local.reconcile(&outcome);
    assert_eq!(local.upvotes, 1);
    assert!(local.is_upvoted_by("user_1"));

    // A toggle against a deleted reflection is refused; the client reverts
    let mut ghost = local.clone();
    let token2 = ghost.toggle_locally("user_2");
    let refused = service.toggle_upvote("gone", "user_2").await.unwrap();
    assert!(!refused.ok);
    ghost.revert(&token2);
    assert_eq!(ghost, local);
}

// =============================================================================
// Offline Mirror
// =============================================================================

#[tokio::test]
async fn test_mirror_serves_journal_after_snapshot() {
    let dir = tempfile::TempDir::new().unwrap();
    let mirror = MirrorLayer::open(dir.path()).unwrap();

    let snapshot = vec![
        json!({ "id": "j1", "text": "Morning gratitude", "date": "2024-07-22" }),
        json!({ "id": "j2", "text": "Evening reflection", "date": "2024-07-23" }),
    ];
    assert_eq!(mirror.put(MirrorStoreKind::Journal, &snapshot).unwrap(), 2);

    // Network gone; a fresh session still reads the snapshot
    drop(mirror);
    let offline = MirrorLayer::open(dir.path()).unwrap();
    let entries = offline.get_all(MirrorStoreKind::Journal);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["text"], "Morning gratitude");

    // Environments without storage read empty rather than failing
    let disabled = MirrorLayer::disabled();
    assert!(disabled.get_all(MirrorStoreKind::Journal).is_empty());
}

// =============================================================================
// Full Week of Engagement
// =============================================================================

#[tokio::test]
async fn test_full_week_of_engagement() {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let definitions = catalog();
    let missions = mission_service(Arc::clone(&store), 42);
    let achievements = AchievementService::new(Arc::clone(&store), Arc::clone(&definitions));
    let reflections = ReflectionService::new(Arc::clone(&store));

    // Monday: the week's missions appear
    let assignment = missions
        .get_or_create_assignment("user_1", wednesday())
        .await
        .unwrap();
    assert_eq!(assignment.missions.len(), 3);

    // Two missions get done over the week
    let mut points = 0u32;
    for slot in &assignment.missions[..2] {
        let outcome = missions
            .complete_mission("user_1", &assignment.week_id, &slot.mission_id)
            .await
            .unwrap();
        assert_eq!(outcome, CompletionOutcome::Completed);
        points += definitions.mission(&slot.mission_id).unwrap().points;
    }
    assert!(points > 0);

    // A journal entry pushes the first badge over its threshold
    let snapshot = ProgressSnapshot {
        journal_entries: 1,
        ..ProgressSnapshot::default()
    };
    let unlocked = achievements.evaluate("user_1", &snapshot).await.unwrap();
    assert_eq!(unlocked, vec!["journal_1".to_string()]);

    // The user shares a reflection and a friend upvotes it
    let shared = reflections
        .share("dev_psalm23", "user_1", "Hannah", "Grateful for this week")
        .await
        .unwrap();
    let upvote = reflections
        .toggle_upvote(&shared.id, "user_2")
        .await
        .unwrap();
    assert!(upvote.ok);
    assert_eq!(upvote.upvotes, 1);

    // One store carried every record family
    let refreshed = missions
        .get_or_create_assignment("user_1", wednesday())
        .await
        .unwrap();
    assert_eq!(refreshed.missions.iter().filter(|m| m.completed).count(), 2);
    assert!(achievements.is_unlocked("user_1", "journal_1").await.unwrap());
    assert_eq!(reflections.list_for("dev_psalm23").await.unwrap().len(), 1);
}
