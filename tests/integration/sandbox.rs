use std::collections::BTreeSet;

use filecity::error::FileCityError;
use filecity::sandbox::ClientPath;

use crate::helpers::TestRoot;

fn parse(input: &str) -> String {
    ClientPath::parse(Some(input)).unwrap().to_string()
}

#[test]
fn test_root_spellings_normalize_to_slash() {
    assert!(ClientPath::parse(None).unwrap().is_root());
    for input in ["", ".", "./", "/", "  ", "//", "/./"] {
        assert_eq!(parse(input), "/", "input {:?}", input);
    }
}

#[test]
fn test_segments_are_folded() {
    assert_eq!(parse("a/./b//c/../d"), "a/b/d");
    assert_eq!(parse("/notes.txt"), "notes.txt");
    assert_eq!(parse("a\\b\\c"), "a/b/c");
    assert_eq!(parse("sub/"), "sub");
    assert_eq!(parse("a/.."), "/");
}

#[test]
fn test_ascending_above_root_is_denied() {
    for input in ["..", "../../etc", "/../x", "a/../../b", "a\\..\\..\\b"] {
        let err = ClientPath::parse(Some(input)).unwrap_err();
        assert!(
            matches!(err, FileCityError::AccessDenied(_)),
            "input {:?} gave {:?}",
            input,
            err
        );
    }
}

#[test]
fn test_drive_letters_are_invalid() {
    for input in ["C:\\Windows", "c:/temp", "Z:"] {
        let err = ClientPath::parse(Some(input)).unwrap_err();
        assert!(matches!(err, FileCityError::InvalidInput(_)), "input {:?}", input);
    }
    // Only a single leading letter counts as a drive.
    assert_eq!(parse("ab:c"), "ab:c");
}

#[test]
fn test_parent_join_and_within() {
    let path = ClientPath::parse(Some("a/b/c")).unwrap();
    assert_eq!(path.parent().unwrap().to_string(), "a/b");
    assert_eq!(ClientPath::parse(Some("a")).unwrap().parent(), Some(ClientPath::root()));
    assert_eq!(ClientPath::root().parent(), None);
    assert_eq!(ClientPath::root().join("x").to_string(), "x");

    let dir = ClientPath::parse(Some("sub")).unwrap();
    assert!(ClientPath::parse(Some("sub/file")).unwrap().is_within(&dir));
    assert!(dir.is_within(&dir));
    assert!(!ClientPath::parse(Some("subway/file")).unwrap().is_within(&dir));
    assert!(dir.is_within(&ClientPath::root()));
}

#[test]
fn test_order_is_lexicographic_on_string_form() {
    let set: BTreeSet<ClientPath> = ["b", "a/z", "a", "/"]
        .iter()
        .map(|p| ClientPath::parse(Some(p)).unwrap())
        .collect();
    let rendered: Vec<String> = set.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["/", "a", "a/z", "b"]);
}

#[test]
fn test_resolve_stays_inside_root() {
    let root = TestRoot::new();
    root.write("sub/file.txt", "x");
    let sandbox = root.sandbox();

    assert_eq!(sandbox.resolve(None).unwrap(), root.path());
    assert_eq!(
        sandbox.resolve(Some("/sub/file.txt")).unwrap(),
        root.path().join("sub").join("file.txt")
    );
    // Missing paths still resolve; existence is checked separately.
    assert_eq!(
        sandbox.resolve(Some("sub/missing")).unwrap(),
        root.path().join("sub").join("missing")
    );
}

#[test]
fn test_symlink_escape_is_denied_both_ways() {
    let root = TestRoot::new();
    let outside = TestRoot::new();
    outside.write("secret.txt", "secret");
    std::os::unix::fs::symlink(outside.path(), root.path().join("escape")).unwrap();
    let sandbox = root.sandbox();

    let err = sandbox.resolve(Some("escape/secret.txt")).unwrap_err();
    assert!(matches!(err, FileCityError::AccessDenied(_)), "got {:?}", err);

    let err = sandbox
        .to_client_path(&root.path().join("escape").join("secret.txt"))
        .unwrap_err();
    assert!(matches!(err, FileCityError::InternalMapping), "got {:?}", err);

    let err = sandbox.to_client_path(outside.path()).unwrap_err();
    assert!(matches!(err, FileCityError::InternalMapping));
}

#[test]
fn test_symlink_inside_root_is_allowed() {
    let root = TestRoot::new();
    root.write("real/data.bin", [1u8, 2, 3]);
    std::os::unix::fs::symlink(root.path().join("real"), root.path().join("alias")).unwrap();
    let sandbox = root.sandbox();

    let resolved = sandbox.resolve(Some("alias/data.bin")).unwrap();
    assert_eq!(resolved, root.path().join("real").join("data.bin"));
    assert_eq!(
        sandbox.to_client_path(&root.path().join("alias").join("data.bin")).unwrap().to_string(),
        "real/data.bin"
    );
}

#[test]
fn test_client_path_round_trip() {
    let root = TestRoot::new();
    root.write("a/b/c.txt", "c");
    root.mkdir("a/empty");
    let sandbox = root.sandbox();

    for absolute in [
        root.path().to_path_buf(),
        root.path().join("a"),
        root.path().join("a/b/c.txt"),
        root.path().join("a/empty"),
    ] {
        let client = sandbox.to_client_path(&absolute).unwrap();
        let again = sandbox
            .to_client_path(&sandbox.resolve(Some(&client.to_string())).unwrap())
            .unwrap();
        assert_eq!(client, again, "round trip of {}", absolute.display());
    }
}

#[test]
fn test_lexical_client_path_does_not_follow_links() {
    let root = TestRoot::new();
    root.write("real/x", "x");
    std::os::unix::fs::symlink(root.path().join("real"), root.path().join("alias")).unwrap();
    let sandbox = root.sandbox();

    let lexical = sandbox
        .lexical_client_path(&root.path().join("alias").join("x"))
        .unwrap();
    assert_eq!(lexical.to_string(), "alias/x");
    assert_eq!(
        sandbox
            .lexical_client_path(&root.path().join("a").join("..").join("b"))
            .unwrap()
            .to_string(),
        "b"
    );
    assert!(sandbox
        .lexical_client_path(&root.path().join(".."))
        .is_err());
}

#[test]
fn test_locate_reports_missing_paths() {
    let root = TestRoot::new();
    root.write("present.txt", "here");
    let sandbox = root.sandbox();

    let (client, absolute) = sandbox.locate(Some("present.txt")).unwrap();
    assert_eq!(client.to_string(), "present.txt");
    assert!(absolute.is_file());

    let err = sandbox.locate(Some("absent.txt")).unwrap_err();
    assert!(matches!(err, FileCityError::NotFound(_)));
    assert!(sandbox.assert_accessible(root.path()).is_ok());
}
