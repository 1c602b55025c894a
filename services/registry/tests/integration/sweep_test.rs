use chrono::{Duration, Utc};

use checkpoint_registry::domain::types::VerificationCode;
use checkpoint_registry::usecase::sweep::{
    FormationTimeoutSweepUseCase, SweepExpiredCodesUseCase,
};
use checkpoint_registry::usecase::team::{CreateTeamInput, CreateTeamUseCase, CreatedTeam};

use crate::helpers::{MemoryStore, MockPlatform, email, ext, role_map, team_policy};

async fn create(
    store: &MemoryStore,
    platform: &MockPlatform,
    requester: &str,
    name: &str,
    invitees: &[&str],
) -> CreatedTeam {
    CreateTeamUseCase {
        registrants: store.clone(),
        accounts: store.clone(),
        teams: store.clone(),
        platform: platform.clone(),
        policy: team_policy(),
        roles: role_map(),
    }
    .execute(CreateTeamInput {
        requester: ext(requester),
        name: name.to_owned(),
        invitees: invitees.iter().map(|id| ext(id)).collect(),
    })
    .await
    .unwrap()
}

fn sweep_uc(
    store: &MemoryStore,
    platform: &MockPlatform,
) -> FormationTimeoutSweepUseCase<MemoryStore, MockPlatform> {
    FormationTimeoutSweepUseCase {
        teams: store.clone(),
        platform: platform.clone(),
        roles: role_map(),
    }
}

#[tokio::test]
async fn should_delete_undersized_team_past_deadline() {
    let store = MemoryStore::new();
    let platform = MockPlatform::new();
    store.verified("1", false);
    let solo = create(&store, &platform, "1", "Solo", &[]).await;
    let now = Utc::now();
    store.set_deadline(solo.team.id, now - Duration::seconds(1));

    let deleted = sweep_uc(&store, &platform).execute(now).await.unwrap();

    assert_eq!(deleted, 1);
    assert!(store.team(solo.team.id).is_none());
    assert_eq!(store.account("1").unwrap().team_id, None);
    assert!(!platform.holds("1", &solo.team.resources.role_id));
    assert!(!platform.holds("1", "role-team-assigned"));
    assert_eq!(platform.deleted(), vec![solo.team.resources]);
}

#[tokio::test]
async fn should_keep_team_that_reached_two_members() {
    let store = MemoryStore::new();
    let platform = MockPlatform::new();
    store.verified("1", false);
    store.verified("2", false);
    let pair = create(&store, &platform, "1", "Pair", &["2"]).await;
    let now = Utc::now();
    store.set_deadline(pair.team.id, now - Duration::minutes(10));

    let deleted = sweep_uc(&store, &platform).execute(now).await.unwrap();

    assert_eq!(deleted, 0);
    assert!(store.team(pair.team.id).is_some());
    assert!(platform.deleted().is_empty());
}

#[tokio::test]
async fn should_keep_forming_team_before_deadline() {
    let store = MemoryStore::new();
    let platform = MockPlatform::new();
    store.verified("1", false);
    let solo = create(&store, &platform, "1", "Solo", &[]).await;

    let deleted = sweep_uc(&store, &platform)
        .execute(Utc::now())
        .await
        .unwrap();

    assert_eq!(deleted, 0);
    assert!(store.team(solo.team.id).is_some());
}

#[tokio::test]
async fn should_sweep_only_expired_codes() {
    let store = MemoryStore::new();
    let now = Utc::now();
    for (code, external_id, expires_at) in [
        ("111111", "1", now - Duration::minutes(1)),
        ("222222", "2", now),
        ("333333", "3", now + Duration::minutes(5)),
    ] {
        store.push_code(VerificationCode {
            code: code.to_owned(),
            external_id: ext(external_id),
            registrant_email: email(&format!("{external_id}@example.com")),
            issued_at: now - Duration::minutes(15),
            expires_at,
        });
    }

    let removed = SweepExpiredCodesUseCase {
        codes: store.clone(),
    }
    .execute(now)
    .await
    .unwrap();

    assert_eq!(removed, 2);
    let left: Vec<_> = store.codes().into_iter().map(|c| c.code).collect();
    assert_eq!(left, vec!["333333".to_owned()]);
}
