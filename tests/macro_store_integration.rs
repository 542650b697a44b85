//! End-to-end coverage of `MacroStore::bootstrap` against real files on
//! disk: the embedded defaults plus a user macro file loaded from a temp
//! `$HOME`-shaped directory, exercising the add policy asymmetry (§4.2)
//! across the actual file-loading path rather than just `parse_macro_source`.

use cyphernetes::macros::MacroStore;

#[test]
fn user_file_extends_defaults_without_overwriting() {
    let dir = tempfile::tempdir().unwrap();
    let macros_path = dir.path().join("macros");
    std::fs::write(
        &macros_path,
        "\
:po # user override attempt, should be ignored\n\
MATCH (x:Pod) RETURN x;\n\
\n\
:whoami # a brand new user macro\n\
MATCH (n:Node) RETURN n.metadata.name;\n",
    )
    .unwrap();

    let (store, warning) = MacroStore::bootstrap(Some(&macros_path));
    assert!(warning.is_none());

    // The built-in `:po` macro ships with a different statement than the
    // user file declares; since the user source never overwrites, the
    // default wins.
    let po = store.get("po").expect("default macro po must still exist");
    assert_eq!(po.statements, vec!["MATCH (pods:Pod) RETURN pods.metadata.name;".to_string()]);

    // The user's new macro is merged in alongside the defaults.
    let whoami = store.get("whoami").expect("user macro whoami must be loaded");
    assert_eq!(whoami.statements, vec!["MATCH (n:Node) RETURN n.metadata.name;".to_string()]);

    assert!(store.get("svc").is_some(), "other defaults must still be present");
}

#[test]
fn missing_user_file_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    let (store, warning) = MacroStore::bootstrap(Some(&missing));
    assert!(warning.is_none());
    assert!(store.get("po").is_some());
}

#[test]
fn malformed_user_file_warns_but_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let macros_path = dir.path().join("macros");
    std::fs::write(&macros_path, "MATCH (x:Pod) RETURN x;\n").unwrap();

    let (store, warning) = MacroStore::bootstrap(Some(&macros_path));
    assert!(warning.is_some());
    assert!(store.get("po").is_some(), "defaults must load even when the user file is malformed");
}

#[test]
fn execute_on_bootstrapped_store_matches_literal_scenario_2() {
    let (store, _warning) = MacroStore::bootstrap(None);
    let out = store.execute("po", &[]).unwrap();
    assert_eq!(out, vec!["MATCH (pods:Pod) RETURN pods.metadata.name;".to_string()]);
}
