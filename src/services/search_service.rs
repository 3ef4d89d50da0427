//! Mention autocomplete over the directory.

use std::time::SystemTime;

use tracing::debug;

use crate::{
    dao::{
        models::{DirectoryEntity, search_rank},
        store::{DirectoryStore, MentionStore},
    },
    dto::{
        directory::EntityView,
        mention::{SearchKind, SearchQuery, SuggestionView},
    },
    error::ServiceError,
    mention::EntityKind,
    state::SharedState,
};

/// Cap for single-character queries across every kind.
const SHORT_QUERY_LIMIT: usize = 5;
/// Newest users and newest teams suggested when nothing was mentioned recently.
const FALLBACK_PER_KIND: usize = 3;

fn suggestion(
    entity: &DirectoryEntity,
    base_url: &str,
    mention_count: Option<u64>,
) -> SuggestionView {
    SuggestionView {
        entity: EntityView::from_entity(entity, base_url),
        mention_count,
    }
}

/// Suggestions for the text typed after `@`, prefix matches first, then shorter handles.
pub async fn search(
    state: &SharedState,
    query: SearchQuery,
) -> Result<Vec<SuggestionView>, ServiceError> {
    let needle = query.q.trim().trim_start_matches('@').to_ascii_lowercase();
    if needle.is_empty() {
        return popular(state, query.limit).await;
    }

    let settings = &state.config().search;
    let mut limit = query
        .limit
        .unwrap_or(settings.default_limit)
        .clamp(1, settings.max_limit);
    if query.kind == SearchKind::All && needle.chars().count() == 1 {
        limit = limit.min(SHORT_QUERY_LIMIT);
    }

    let store = state.require_store().await?;
    let mut matches = Vec::new();
    for kind in query.kind.kinds() {
        // each kind arrives ranked and already cut to `limit`
        matches.extend(store.search_entities(kind, needle.clone(), limit).await?);
    }

    matches.sort_by_cached_key(|entity: &DirectoryEntity| {
        let (not_prefix, handle_len, id) = search_rank(entity, &needle);
        (not_prefix, handle_len, entity.kind(), id)
    });
    matches.truncate(limit);
    debug!(query = %needle, results = matches.len(), "mention search");

    let base_url = &state.config().links.base_url;
    Ok(matches
        .iter()
        .map(|entity| suggestion(entity, base_url, None))
        .collect())
}

/// Entities mentioned most inside the popularity window.
///
/// Falls back to the newest users and teams when the window holds no mentions.
pub async fn popular(
    state: &SharedState,
    limit: Option<usize>,
) -> Result<Vec<SuggestionView>, ServiceError> {
    let settings = &state.config().search;
    let limit = limit
        .unwrap_or(settings.default_limit)
        .clamp(1, settings.max_limit);
    let base_url = &state.config().links.base_url;
    let store = state.require_store().await?;

    let since = SystemTime::now()
        .checked_sub(settings.popular_window())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let ranked = store.popular_targets(since, limit).await?;

    let mut suggestions = Vec::with_capacity(ranked.len());
    for entry in ranked {
        match store.find_entity(entry.target).await? {
            Some(entity) if entity.is_mentionable() => {
                suggestions.push(suggestion(&entity, base_url, Some(entry.count)));
            }
            _ => debug!(target = %entry.target, "skipping popular target that is gone or inactive"),
        }
    }

    if suggestions.is_empty() {
        for kind in [EntityKind::User, EntityKind::Team] {
            let recent = store.recent_entities(kind, FALLBACK_PER_KIND).await?;
            suggestions.extend(
                recent
                    .iter()
                    .filter(|entity| entity.is_mentionable())
                    .map(|entity| suggestion(entity, base_url, None)),
            );
        }
        suggestions.truncate(limit);
    }

    Ok(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::UserStatus,
        dto::directory::{CreateTeamRequest, CreateUserRequest},
        mention::{ContentKind, ContentRef},
        services::{
            directory_service, mention_service,
            test_support::{save_news, seeded},
        },
    };

    fn query(q: &str, kind: SearchKind, limit: Option<usize>) -> SearchQuery {
        SearchQuery {
            q: q.into(),
            kind,
            limit,
        }
    }

    async fn add_team(state: &SharedState, name: &str, short_name: &str) {
        directory_service::register_team(
            state,
            CreateTeamRequest {
                name: name.into(),
                short_name: short_name.into(),
                logo: None,
                region: None,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn prefix_matches_come_first() {
        let (state, _store, _rx) = seeded().await;
        add_team(&state, "Outsiders", "outsiders").await;
        add_team(&state, "Tsunami", "tsunami").await;

        let results = search(&state, query("ts", SearchKind::Team, None))
            .await
            .unwrap();
        let handles: Vec<&str> = results.iter().map(|r| r.entity.handle.as_str()).collect();
        assert_eq!(handles, vec!["tsm", "tsunami", "outsiders"]);
    }

    #[tokio::test]
    async fn inactive_users_are_not_suggested() {
        let (state, _store, _rx) = seeded().await;
        let results = search(&state, query("@gho", SearchKind::User, None))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn banned_rows_do_not_use_up_the_limit() {
        let (state, _store, _rx) = seeded().await;
        directory_service::register_user(
            &state,
            CreateUserRequest {
                name: "ghost2".into(),
                avatar: None,
                status: UserStatus::Active,
            },
        )
        .await
        .unwrap();

        let results = search(&state, query("gh", SearchKind::User, Some(1)))
            .await
            .unwrap();
        let handles: Vec<&str> = results.iter().map(|r| r.entity.handle.as_str()).collect();
        assert_eq!(handles, vec!["ghost2"]);
    }

    #[tokio::test]
    async fn prefix_matches_survive_a_small_limit() {
        let (state, _store, _rx) = seeded().await;
        add_team(&state, "Squad", "sq").await;

        let results = search(&state, query("s", SearchKind::Team, Some(1)))
            .await
            .unwrap();
        let handles: Vec<&str> = results.iter().map(|r| r.entity.handle.as_str()).collect();
        assert_eq!(handles, vec!["sq"]);
    }

    #[tokio::test]
    async fn single_character_queries_are_capped() {
        let (state, _store, _rx) = seeded().await;
        for idx in 0..8 {
            add_team(&state, &format!("Squad {idx}"), &format!("s{idx}")).await;
        }

        let all = search(&state, query("s", SearchKind::All, Some(20)))
            .await
            .unwrap();
        assert_eq!(all.len(), 5);

        let teams = search(&state, query("s", SearchKind::Team, Some(20)))
            .await
            .unwrap();
        assert!(teams.len() > 5);
    }

    #[tokio::test]
    async fn popular_falls_back_to_newest_entities() {
        let (state, _store, _rx) = seeded().await;
        let results = search(&state, query("  ", SearchKind::All, None))
            .await
            .unwrap();
        let kinds: Vec<EntityKind> = results.iter().map(|r| r.entity.kind).collect();
        assert_eq!(kinds, vec![EntityKind::User, EntityKind::Team]);
        assert!(results.iter().all(|r| r.mention_count.is_none()));
    }

    #[tokio::test]
    async fn popular_ranks_by_recent_mentions() {
        let (state, store, _rx) = seeded().await;
        let owner = |id| ContentRef::new(ContentKind::News, id);
        save_news(store.as_ref(), 1).await;
        save_news(store.as_ref(), 2).await;
        mention_service::store_mentions(&state, store.as_ref(), "@team:tsm @alice", owner(1), 1)
            .await;
        mention_service::store_mentions(&state, store.as_ref(), "@team:tsm", owner(2), 1).await;

        let results = popular(&state, None).await.unwrap();
        let ranked: Vec<(EntityKind, Option<u64>)> = results
            .iter()
            .map(|r| (r.entity.kind, r.mention_count))
            .collect();
        assert_eq!(
            ranked,
            vec![(EntityKind::Team, Some(2)), (EntityKind::User, Some(1))]
        );
    }
}
