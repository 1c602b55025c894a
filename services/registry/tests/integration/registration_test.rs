use checkpoint_domain::role::{EventRole, RoleFlags};

use checkpoint_registry::domain::types::TeamResources;
use checkpoint_registry::error::RegistryError;
use checkpoint_registry::usecase::registration::{
    RemoveRegistrantUseCase, UpsertRegistrantInput, UpsertRegistrantUseCase, parse_role_codes,
};
use checkpoint_registry::usecase::team::{CreateTeamInput, CreateTeamUseCase};

use crate::helpers::{MemoryStore, MockPlatform, ext, participant, role_map, team_policy};

fn upsert_input(email: &str, roles: RoleFlags) -> UpsertRegistrantInput {
    UpsertRegistrantInput {
        email: email.to_owned(),
        first_name: Some("  Grace ".to_owned()),
        last_name: None,
        roles,
        is_capstone: false,
    }
}

#[tokio::test]
async fn should_normalize_email_and_trim_names_on_upsert() {
    let store = MemoryStore::new();
    let uc = UpsertRegistrantUseCase {
        registrants: store.clone(),
    };

    uc.execute(upsert_input("  Grace@Example.COM ", participant()))
        .await
        .unwrap();

    let stored = store.registrant("grace@example.com").unwrap();
    assert_eq!(stored.first_name, "Grace");
    assert_eq!(stored.last_name, "");
    assert!(stored.roles.participant);
}

#[tokio::test]
async fn should_replace_roles_of_unverified_registrant() {
    let store = MemoryStore::new();
    let uc = UpsertRegistrantUseCase {
        registrants: store.clone(),
    };

    let first = uc
        .execute(upsert_input("a@x.com", participant()))
        .await
        .unwrap();
    let second = uc
        .execute(upsert_input("a@x.com", parse_role_codes("1")))
        .await
        .unwrap();

    assert_eq!(first, second, "upsert must keep the registrant id");
    let stored = store.registrant("a@x.com").unwrap();
    assert_eq!(stored.roles, RoleFlags::from_roles([EventRole::Judge]));
}

#[tokio::test]
async fn should_refuse_upsert_once_email_is_verified() {
    let store = MemoryStore::new();
    store.verified("555", false);
    let uc = UpsertRegistrantUseCase {
        registrants: store.clone(),
    };

    let result = uc
        .execute(upsert_input("555@example.com", parse_role_codes("2")))
        .await;

    assert!(
        matches!(result, Err(RegistryError::AlreadyVerified)),
        "expected AlreadyVerified, got {result:?}"
    );
    assert!(store.registrant("555@example.com").unwrap().roles.participant);
}

#[tokio::test]
async fn should_reject_malformed_email() {
    let uc = UpsertRegistrantUseCase {
        registrants: MemoryStore::new(),
    };

    let result = uc.execute(upsert_input("not-an-email", participant())).await;

    assert!(matches!(result, Err(RegistryError::Validation(_))));
}

#[tokio::test]
async fn should_cascade_removal_through_team_departure() {
    let store = MemoryStore::new();
    let platform = MockPlatform::new();
    for id in ["1", "2"] {
        store.verified(id, false);
    }
    let created = CreateTeamUseCase {
        registrants: store.clone(),
        accounts: store.clone(),
        teams: store.clone(),
        platform: platform.clone(),
        policy: team_policy(),
        roles: role_map(),
    }
    .execute(CreateTeamInput {
        requester: ext("1"),
        name: "Foo".to_owned(),
        invitees: vec![ext("2")],
    })
    .await
    .unwrap();
    let team_id = created.team.id;

    let uc = RemoveRegistrantUseCase {
        registrants: store.clone(),
        accounts: store.clone(),
        teams: store.clone(),
        platform: platform.clone(),
        roles: role_map(),
    };
    uc.execute("1@example.com").await.unwrap();

    assert!(store.registrant("1@example.com").is_none());
    assert!(store.account("1").is_none());
    assert_eq!(store.members(team_id), vec![ext("2")]);
    assert_eq!(store.team(team_id).unwrap().lead, Some(ext("2")));
    assert!(!platform.holds("1", &created.team.resources.role_id));
    assert!(!platform.holds("1", &role_map().team_assigned));
}

#[tokio::test]
async fn should_delete_team_when_removed_registrant_was_last_member() {
    let store = MemoryStore::new();
    let platform = MockPlatform::new();
    store.verified("1", false);
    let created = CreateTeamUseCase {
        registrants: store.clone(),
        accounts: store.clone(),
        teams: store.clone(),
        platform: platform.clone(),
        policy: team_policy(),
        roles: role_map(),
    }
    .execute(CreateTeamInput {
        requester: ext("1"),
        name: "Solo".to_owned(),
        invitees: vec![],
    })
    .await
    .unwrap();

    RemoveRegistrantUseCase {
        registrants: store.clone(),
        accounts: store.clone(),
        teams: store.clone(),
        platform: platform.clone(),
        roles: role_map(),
    }
    .execute("1@example.com")
    .await
    .unwrap();

    assert!(store.team(created.team.id).is_none());
    let deleted: Vec<TeamResources> = platform.deleted();
    assert_eq!(deleted, vec![created.team.resources]);
}

#[tokio::test]
async fn should_report_unknown_registrant_on_removal() {
    let store = MemoryStore::new();
    let uc = RemoveRegistrantUseCase {
        registrants: store.clone(),
        accounts: store.clone(),
        teams: store.clone(),
        platform: MockPlatform::new(),
        roles: role_map(),
    };

    let result = uc.execute("ghost@x.com").await;

    assert!(matches!(result, Err(RegistryError::NotRegistered)));
}
