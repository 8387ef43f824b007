//! Entity tracker tests: push updates from the gateway, edits over REST
//!
//! Run with: cargo test -p integration-tests --test cache_tests

use std::sync::Arc;

use anyhow::Result;
use chat_cache::{ApplyError, EditState, EntityCache, RemoteOutcome, RestChangeSender};
use chat_common::{RestConfig, Supervisor};
use chat_core::{CoreError, InFlight, Snowflake};
use chat_gateway::DispatchEvent;
use chat_rest::RestClient;
use integration_tests::{role_json, role_patch, Role, RoleField, RoleValue, GUILD_ID};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROLE_ID: u64 = 42;

fn rest(server: &MockServer) -> Result<RestClient> {
    let config = RestConfig {
        api_base: server.uri(),
        max_retries: 0,
        ..RestConfig::default()
    };
    Ok(RestClient::new(config, "test-token", InFlight::new(), Supervisor::detached())?)
}

fn role_path() -> String {
    format!("/guilds/{GUILD_ID}/roles/{ROLE_ID}")
}

fn role_update(name: &str, color: u32) -> DispatchEvent {
    DispatchEvent::new(
        "GUILD_ROLE_UPDATE",
        Some(2),
        json!({"guild_id": GUILD_ID.to_string(), "role": role_json(ROLE_ID, name, color)}),
    )
}

fn observe(cache: &EntityCache<Role>, event: &DispatchEvent) -> RemoteOutcome {
    let role = Role::from_json(&event.data["role"]).expect("role payload");
    cache.observe(role).1
}

#[tokio::test]
async fn test_apply_sends_latest_values_with_reason() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(role_path()))
        .and(header("X-Audit-Log-Reason", "rebrand"))
        .and(body_json(json!({"name": "Mods", "color": 255})))
        .respond_with(ResponseTemplate::new(200).set_body_json(role_json(ROLE_ID, "Mods", 255)))
        .expect(1)
        .mount(&server)
        .await;

    let cache = EntityCache::new();
    assert_eq!(observe(&cache, &role_update("Staff", 0)), RemoteOutcome::Created);
    let role = cache.get(Snowflake::new(ROLE_ID)).unwrap();

    role.begin_changes()?;
    role.set_property(RoleValue::Name("Moderators".into()))?;
    role.set_property(RoleValue::Color(255))?;
    role.set_property(RoleValue::Name("Mods".into()))?;

    let sender = RestChangeSender::new(rest(&server)?, role_patch);
    role.apply_changes(&sender, Some("rebrand")).await?;

    assert_eq!(role.state(), EditState::Locked);
    assert_eq!(role.get(RoleField::Name), RoleValue::Name("Mods".into()));
    assert_eq!(role.get(RoleField::Color), RoleValue::Color(255));
    Ok(())
}

#[tokio::test]
async fn test_server_error_rolls_back_every_field() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(role_path()))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let cache = EntityCache::new();
    let role = cache.insert(Role::new(ROLE_ID, "Staff"));
    let before = role.cloned();

    role.begin_changes()?;
    role.set_property(RoleValue::Name("X".into()))?;
    role.set_property(RoleValue::Permissions(vec!["ADMINISTRATOR".into()]))?;
    role.set_property(RoleValue::Hoist(true))?;

    let sender = RestChangeSender::new(rest(&server)?, role_patch);
    let err = role.apply_changes(&sender, None).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(matches!(err, ApplyError::Rejected { .. }));

    assert_eq!(role.cloned(), before);
    assert_eq!(role.state(), EditState::Locked);
    assert_eq!(role.pending_changes(), 0);
    Ok(())
}

#[tokio::test]
async fn test_push_updates_discarded_mid_edit() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(role_path()))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let cache = EntityCache::new();
    observe(&cache, &role_update("Staff", 1));
    let role = cache.get(Snowflake::new(ROLE_ID)).unwrap();

    role.begin_changes()?;
    role.set_property(RoleValue::Color(7))?;
    assert_eq!(observe(&cache, &role_update("Remote", 9)), RemoteOutcome::Discarded);
    assert_eq!(role.get(RoleField::Name), RoleValue::Name("Staff".into()));

    let sender = RestChangeSender::new(rest(&server)?, role_patch);
    role.apply_changes(&sender, None).await?;
    assert_eq!(role.get(RoleField::Color), RoleValue::Color(7));
    assert_eq!(role.discarded_updates(), 1);

    // Locked again, so the next push lands
    assert_eq!(observe(&cache, &role_update("Remote", 9)), RemoteOutcome::Applied);
    assert_eq!(role.get(RoleField::Name), RoleValue::Name("Remote".into()));
    Ok(())
}

#[tokio::test]
async fn test_second_editor_waits_for_first() -> Result<()> {
    let cache = EntityCache::new();
    let role = cache.insert(Role::new(ROLE_ID, "Staff"));

    role.begin_changes()?;
    assert_eq!(role.begin_changes(), Err(CoreError::EditInProgress));

    let waiter = tokio::spawn({
        let role = Arc::clone(&role);
        async move { role.begin_changes_wait().await }
    });
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    role.undo_changes()?;
    waiter.await??;
    assert_eq!(role.state(), EditState::Editable);
    Ok(())
}

#[tokio::test]
async fn test_delete_evicts_and_rejects_edits() -> Result<()> {
    let cache = EntityCache::new();
    let role = cache.insert(Role::new(ROLE_ID, "Staff"));

    cache.delete(Snowflake::new(ROLE_ID)).unwrap();
    assert!(cache.is_empty());
    assert_eq!(role.begin_changes(), Err(CoreError::Deleted));
    assert_eq!(
        role.set_property(RoleValue::Hoist(true)),
        Err(CoreError::Deleted)
    );
    Ok(())
}
