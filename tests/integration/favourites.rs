use std::collections::BTreeSet;

use filecity::error::FileCityError;
use filecity::favourites::FavouritesStore;
use filecity::sandbox::ClientPath;

use crate::helpers::TestRoot;

fn client(path: &str) -> ClientPath {
    ClientPath::parse(Some(path)).unwrap()
}

fn rendered(set: &BTreeSet<ClientPath>) -> Vec<String> {
    set.iter().map(ToString::to_string).collect()
}

#[test]
fn test_load_creates_missing_file() {
    let data = tempfile::tempdir().unwrap();
    let path = data.path().join("nested").join("favourites.json");
    let store = FavouritesStore::new(&path);

    assert!(store.load().unwrap().is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
}

#[test]
fn test_set_and_clear_round_trip() {
    let root = TestRoot::new();
    root.write("notes.txt", "hello");
    root.mkdir("sub");
    let sandbox = root.sandbox();
    let data = tempfile::tempdir().unwrap();
    let store = FavouritesStore::new(data.path().join("favourites.json"));

    let after = store.set_favourite(&sandbox, &client("/sub/"), true).unwrap();
    assert_eq!(rendered(&after), vec!["sub"]);
    let after = store.set_favourite(&sandbox, &client("notes.txt"), true).unwrap();
    assert_eq!(rendered(&after), vec!["notes.txt", "sub"]);
    assert!(store.load().unwrap().contains(&client("./notes.txt")));

    let after = store.set_favourite(&sandbox, &client("notes.txt"), false).unwrap();
    assert_eq!(rendered(&after), vec!["sub"]);
    assert!(!store.load().unwrap().contains(&client("notes.txt")));
}

#[test]
fn test_file_is_sorted_json_array() {
    let root = TestRoot::new();
    for name in ["zeta", "alpha", "mid/dle"] {
        root.write(name, "x");
    }
    let sandbox = root.sandbox();
    let data = tempfile::tempdir().unwrap();
    let path = data.path().join("favourites.json");
    let store = FavouritesStore::new(&path);

    for name in ["zeta", "alpha", "mid/dle", "alpha"] {
        store.set_favourite(&sandbox, &client(name), true).unwrap();
    }

    let on_disk: Vec<String> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, vec!["alpha", "mid/dle", "zeta"]);
}

#[test]
fn test_favouriting_missing_path_is_rejected() {
    let root = TestRoot::new();
    let sandbox = root.sandbox();
    let data = tempfile::tempdir().unwrap();
    let store = FavouritesStore::new(data.path().join("favourites.json"));

    let err = store
        .set_favourite(&sandbox, &client("ghost.txt"), true)
        .unwrap_err();
    assert!(matches!(err, FileCityError::NotFound(_)), "got {:?}", err);
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_stale_favourite_can_be_removed() {
    let root = TestRoot::new();
    let file = root.write("gone.txt", "soon");
    let sandbox = root.sandbox();
    let data = tempfile::tempdir().unwrap();
    let store = FavouritesStore::new(data.path().join("favourites.json"));

    store.set_favourite(&sandbox, &client("gone.txt"), true).unwrap();
    std::fs::remove_file(file).unwrap();

    let after = store.set_favourite(&sandbox, &client("gone.txt"), false).unwrap();
    assert!(after.is_empty());
}

#[test]
fn test_malformed_documents_load_as_empty() {
    let data = tempfile::tempdir().unwrap();
    let path = data.path().join("favourites.json");
    let store = FavouritesStore::new(&path);

    for contents in ["{not json", "{\"a\": 1}", "42", "\"text\""] {
        std::fs::write(&path, contents).unwrap();
        assert!(store.load().unwrap().is_empty(), "contents {:?}", contents);
    }
}

#[test]
fn test_load_normalizes_and_drops_bad_entries() {
    let data = tempfile::tempdir().unwrap();
    let path = data.path().join("favourites.json");
    std::fs::write(
        &path,
        r#"["a/./b", "a/b", "/docs/", "../escape", "C:\\win", null, ["nested"], {"k": 1}, "x\\y"]"#,
    )
    .unwrap();
    let store = FavouritesStore::new(&path);

    assert_eq!(rendered(&store.load().unwrap()), vec!["a/b", "docs", "x/y"]);
}

#[test]
fn test_load_stringifies_scalar_entries() {
    let data = tempfile::tempdir().unwrap();
    let path = data.path().join("favourites.json");
    std::fs::write(&path, r#"[2024, "2024", 7, true, "photos"]"#).unwrap();
    let store = FavouritesStore::new(&path);

    assert_eq!(
        rendered(&store.load().unwrap()),
        vec!["2024", "7", "photos", "true"]
    );
}

#[test]
fn test_save_writes_sorted_unique_entries() {
    let data = tempfile::tempdir().unwrap();
    let path = data.path().join("favourites.json");
    let store = FavouritesStore::new(&path);

    let set: BTreeSet<ClientPath> = ["b", "a", "a/./"].iter().map(|p| client(p)).collect();
    store.save(&set).unwrap();

    let on_disk: Vec<String> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, vec!["a", "b"]);
}
