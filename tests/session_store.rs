use anyhow::Result;
use homestock_lib::members::Role;
use homestock_lib::session::{
    JsonFileStore, KeyValueStore, PendingAction, SessionContext, SessionStore,
};

#[test]
fn session_survives_a_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("device").join("session.json");

    let store = SessionStore::json_file(&path)?;
    let mut ctx = SessionContext::sign_in(Role::Wife);
    ctx.connect("house-1")?;
    ctx.remember_email("Sara@Example.com");
    store.save(&ctx)?;
    assert!(path.exists());

    let reopened = SessionStore::json_file(&path)?;
    let loaded = reopened.load();
    assert_eq!(loaded, ctx);
    assert_eq!(loaded.remembered_email.as_deref(), Some("sara@example.com"));
    Ok(())
}

#[test]
fn clear_forgets_the_session() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    let store = SessionStore::json_file(&path)?;
    store.save(&SessionContext::sign_in(Role::Husband))?;
    store.clear()?;

    let reopened = SessionStore::json_file(&path)?;
    assert_eq!(reopened.load(), SessionContext::default());
    Ok(())
}

#[test]
fn unreadable_session_value_loads_blank() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    let raw = JsonFileStore::open(&path)?;
    raw.set("session", "{ definitely not a session");
    raw.save()?;

    let store = SessionStore::json_file(&path)?;
    assert_eq!(store.load(), SessionContext::default());
    Ok(())
}

#[test]
fn corrupt_store_file_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    std::fs::write(&path, "[1, 2")?;
    assert!(JsonFileStore::open(&path).is_err());
    Ok(())
}

#[test]
fn deferred_actions_survive_the_sign_in_round_trip() -> Result<()> {
    let store = SessionStore::in_memory();
    let mut before = SessionContext::default();
    before.defer(PendingAction::AutoGenerate, Role::Husband);
    store.save(&before)?;

    let mut after = store.load();
    assert_eq!(after.take_pending(), Some(PendingAction::AutoGenerate));
    assert_eq!(after.role, Some(Role::Husband));
    assert_eq!(after.take_pending(), None);
    Ok(())
}
