//! End-to-end editing, export and persistence scenarios.

use contextual_sets::{
    ExportDocument, FunctionRef, JsonWorkingCopy, Repository, SetError, WorkingCopyStore,
    export_all, export_set, resolve_closure,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn auth_and_api() -> Repository {
    let mut repo = Repository::new();
    repo.create("auth").unwrap();
    repo.create("api").unwrap();
    repo.add_path_to_set("auth", "src/login.ts").unwrap();
    repo.add_use("api", "auth").unwrap();
    repo
}

#[test]
fn exporting_api_includes_auth_files() {
    let repo = auth_and_api();

    let document = export_set(&repo, "api").unwrap();
    let paths: Vec<&str> = document
        .files_index
        .values()
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(paths, vec!["src/login.ts"]);
}

#[test]
fn reversing_the_edge_is_a_cycle() {
    let mut repo = auth_and_api();

    let err = repo.add_use("auth", "api").unwrap_err();
    match err {
        SetError::CircularDependency { from, to, cycle } => {
            assert_eq!(from, "auth");
            assert_eq!(to, "api");
            assert_eq!(cycle, vec!["auth", "api", "auth"]);
        }
        other => panic!("expected a circular dependency, got {other:?}"),
    }
    assert!(repo.get("auth").unwrap().uses.is_empty());
}

#[test]
fn deleting_a_used_set_keeps_the_graph_consistent() {
    let mut repo = auth_and_api();
    repo.delete("context:auth").unwrap();

    let document = export_all(&repo);
    assert_eq!(document.sets["context:api"].uses, Vec::<String>::new());
    // Files outlive the sets that referenced them.
    assert_eq!(document.files_index.len(), 1);

    let reimported = Repository::from_document(document).unwrap();
    assert_eq!(reimported, repo);
}

#[test]
fn function_refs_survive_json() {
    let mut repo = auth_and_api();
    let id = repo.manifest().id_for_path("src/login.ts").unwrap().to_string();
    repo.set_function_refs(
        "auth",
        &id,
        vec![
            FunctionRef::new("login").at_line(4),
            FunctionRef::new("logout").with_comment("clears cookie"),
        ],
    )
    .unwrap();
    repo.set_reference_comment("auth", &id, Some("session handling".to_string()))
        .unwrap();

    let json = export_all(&repo).to_json().unwrap();
    let reimported = Repository::from_document(ExportDocument::from_json(&json).unwrap()).unwrap();
    assert_eq!(reimported, repo);
    assert_eq!(export_all(&reimported).to_json().unwrap(), json);

    let closure = resolve_closure(&reimported, "api").unwrap();
    assert_eq!(closure.files[0].comment, Some("session handling"));
}

#[tokio::test]
async fn working_copy_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = JsonWorkingCopy::in_project(dir.path());
    let repo = auth_and_api();

    store.save_working_copy(&repo).await.unwrap();
    let first = tokio::fs::read_to_string(store.path()).await.unwrap();
    store.save_working_copy(&repo).await.unwrap();
    let second = tokio::fs::read_to_string(store.path()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.load_working_copy().await.unwrap(), Some(repo));
}
