//! Registration and lookup of users, teams and players.

use std::time::SystemTime;

use tracing::info;

use crate::{
    dao::{
        models::{DirectoryEntity, PlayerEntity, Sequence, TeamEntity, UserEntity},
        store::{DirectoryStore, PlatformStore},
    },
    dto::directory::{CreatePlayerRequest, CreateTeamRequest, CreateUserRequest, EntityView},
    error::ServiceError,
    mention::{EntityKind, EntityRef},
    state::SharedState,
};

/// Fetch `target` or fail with [`ServiceError::NotFound`].
pub async fn require_entity(
    store: &dyn PlatformStore,
    target: EntityRef,
) -> Result<DirectoryEntity, ServiceError> {
    store
        .find_entity(target)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("{} {} not found", target.kind, target.id)))
}

/// Reject rows whose names would make existing tokens ambiguous.
async fn ensure_unclaimed(
    store: &dyn PlatformStore,
    kind: EntityKind,
    keys: Vec<String>,
) -> Result<(), ServiceError> {
    for key in keys {
        if let Some(existing) = store.find_by_handle(kind, key.clone()).await? {
            return Err(ServiceError::Conflict(format!(
                "`{key}` is already used by {}",
                existing.target()
            )));
        }
    }
    Ok(())
}

async fn register(
    state: &SharedState,
    draft: DirectoryEntity,
) -> Result<EntityView, ServiceError> {
    let store = state.require_store().await?;
    let kind = draft.kind();
    ensure_unclaimed(store.as_ref(), kind, draft.lookup_keys()).await?;

    let id = store.allocate_id(Sequence::Directory(kind)).await?;
    let entity = match draft {
        DirectoryEntity::User(user) => DirectoryEntity::User(UserEntity { id, ..user }),
        DirectoryEntity::Team(team) => DirectoryEntity::Team(TeamEntity { id, ..team }),
        DirectoryEntity::Player(player) => DirectoryEntity::Player(PlayerEntity { id, ..player }),
    };
    store.save_entity(entity.clone()).await?;

    info!(target = %entity.target(), handle = entity.handle(), "directory entity registered");
    Ok(EntityView::from_entity(
        &entity,
        &state.config().links.base_url,
    ))
}

/// Register a platform user.
pub async fn register_user(
    state: &SharedState,
    payload: CreateUserRequest,
) -> Result<EntityView, ServiceError> {
    register(
        state,
        DirectoryEntity::User(UserEntity {
            id: 0,
            name: payload.name,
            avatar: payload.avatar,
            status: payload.status,
            created_at: SystemTime::now(),
        }),
    )
    .await
}

/// Register an esports team.
pub async fn register_team(
    state: &SharedState,
    payload: CreateTeamRequest,
) -> Result<EntityView, ServiceError> {
    register(
        state,
        DirectoryEntity::Team(TeamEntity {
            id: 0,
            name: payload.name,
            short_name: payload.short_name,
            logo: payload.logo,
            region: payload.region,
            created_at: SystemTime::now(),
        }),
    )
    .await
}

/// Register a professional player, optionally on an existing team.
pub async fn register_player(
    state: &SharedState,
    payload: CreatePlayerRequest,
) -> Result<EntityView, ServiceError> {
    if let Some(team_id) = payload.team_id {
        let store = state.require_store().await?;
        if store
            .find_entity(EntityRef::new(EntityKind::Team, team_id))
            .await?
            .is_none()
        {
            return Err(ServiceError::InvalidInput(format!(
                "team {team_id} does not exist"
            )));
        }
    }

    register(
        state,
        DirectoryEntity::Player(PlayerEntity {
            id: 0,
            username: payload.username,
            real_name: payload.real_name,
            avatar: payload.avatar,
            role: payload.role,
            team_id: payload.team_id,
            created_at: SystemTime::now(),
        }),
    )
    .await
}

/// Fetch one directory entity.
pub async fn get_entity(state: &SharedState, target: EntityRef) -> Result<EntityView, ServiceError> {
    let store = state.require_store().await?;
    let entity = require_entity(store.as_ref(), target).await?;
    Ok(EntityView::from_entity(
        &entity,
        &state.config().links.base_url,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::models::UserStatus, services::test_support::seeded};

    fn team(name: &str, short_name: &str) -> CreateTeamRequest {
        CreateTeamRequest {
            name: name.into(),
            short_name: short_name.into(),
            logo: None,
            region: None,
        }
    }

    #[tokio::test]
    async fn registered_entities_get_fresh_ids() {
        let (state, _store, _rx) = seeded().await;

        let c9 = register_team(&state, team("Cloud9", "c9")).await.unwrap();
        assert_eq!(c9.id, 2);
        assert_eq!(c9.mention_text, "@team:c9");

        let bob = register_user(
            &state,
            CreateUserRequest {
                name: "bob".into(),
            avatar: None,
            status: UserStatus::Active,
            },
        )
        .await
        .unwrap();
        assert_eq!(bob.id, 3);

        let fetched = get_entity(&state, EntityRef::new(EntityKind::Team, 2))
            .await
            .unwrap();
        assert_eq!(fetched.display_name, "Cloud9");
    }

    #[tokio::test]
    async fn names_already_in_use_conflict() {
        let (state, _store, _rx) = seeded().await;

        let err = register_team(&state, team("Other", "TSM")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = register_team(&state, team("team solomid", "tsm2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn players_need_an_existing_team() {
        let (state, _store, _rx) = seeded().await;
        let err = register_player(
            &state,
            CreatePlayerRequest {
            username: "s1mple".into(),
            real_name: None,
            avatar: None,
            role: Some("awper".into()),
            team_id: Some(99),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn missing_entities_are_not_found() {
        let (state, _store, _rx) = seeded().await;
        assert!(matches!(
            get_entity(&state, EntityRef::new(EntityKind::Player, 7)).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
