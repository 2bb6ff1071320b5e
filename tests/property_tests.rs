use proptest::prelude::*;
use vcstat::status::{self, Status, StatusMap};

fn any_status() -> impl Strategy<Value = Status> {
    prop::sample::select(Status::ALL.to_vec())
}

fn any_map() -> impl Strategy<Value = StatusMap> {
    prop::collection::btree_map("[a-c]{1,2}(/[a-c]{1,2}){0,2}", any_status(), 0..24)
}

/// Directory status precedence, most severe first. `ignored` and `none`
/// never reach a directory.
const SEVERITY_ORDER: [Status; 7] = [
    Status::Conflict,
    Status::Untracked,
    Status::Deleted,
    Status::Changed,
    Status::Staged,
    Status::Sync,
    Status::Unknown,
];

#[test]
fn test_each_status_outranks_the_next() {
    for pair in SEVERITY_ORDER.windows(2) {
        let (higher, lower) = (pair[0], pair[1]);
        assert_eq!(status::aggregate([lower, higher]), higher, "{higher} over {lower}");
        assert_eq!(status::aggregate([higher, lower]), higher, "{higher} over {lower}");
    }
    assert_eq!(status::aggregate([Status::Ignored, Status::None]), Status::Sync);
    assert_eq!(status::aggregate([Status::Ignored, Status::Staged]), Status::Staged);
}

proptest! {
    #[test]
    fn test_root_status_is_most_severe(map in any_map()) {
        let expected = SEVERITY_ORDER
            .into_iter()
            .find(|status| map.values().any(|value| value == status))
            .unwrap_or(Status::Sync);
        prop_assert_eq!(status::root_status(&map), expected);
    }

    #[test]
    fn test_root_status_always_propagates(map in any_map()) {
        let root = status::root_status(&map);
        prop_assert!(root.severity().is_some());
        prop_assert!(!matches!(root, Status::Ignored) || map.values().any(|s| *s == Status::Ignored));
    }

    #[test]
    fn test_directory_status_bounded_by_root(map in any_map(), dir in "[a-c]{1,2}") {
        // A directory without an exact entry is never more severe than the root
        prop_assume!(!map.contains_key(&dir));
        let prefix = format!("{dir}/");
        let has_propagating_child = map
            .iter()
            .any(|(path, status)| path.starts_with(&prefix) && status.severity().is_some());
        let root = status::root_status(&map);
        let sub = status::status_of(&map, &dir, true);
        if !has_propagating_child {
            prop_assert_eq!(sub, Status::Sync);
        } else if let (Some(root_rank), Some(sub_rank)) = (root.severity(), sub.severity()) {
            prop_assert!(root_rank <= sub_rank);
        }
    }

    #[test]
    fn test_normalize_is_idempotent(path in "[./a-z\\\\]{0,20}") {
        let once = status::normalize_subpath(&path);
        prop_assert_eq!(status::normalize_subpath(&once), once.clone());
        prop_assert!(!once.starts_with('/'));
        prop_assert!(!once.ends_with('/'));
    }
}
