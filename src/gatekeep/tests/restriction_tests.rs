//! Revertible restrictions on elements and views

mod common;

use common::{button, fixture, page, Clearance, FakeNavigator};
use gatekeep::{perms, AuthzError, Element, ErrorKind, NavigationOutcome, Perm};

#[test]
fn test_restriction_hides_and_undo_restores() {
    let f = fixture();
    let launch = button("launch");

    let mut restriction = f.engine.open_restriction(&[launch.clone()]).unwrap();
    restriction.add_permissions(perms![Clearance::TopSecret]);
    let mut reverter = restriction.commit().unwrap();

    assert!(!launch.is_visible());
    assert!(f.engine.is_bound(&launch));

    reverter.undo().unwrap();
    assert!(launch.is_visible());
    assert!(f.engine.permissions_of(&launch).is_empty());
}

#[test]
fn test_undo_keeps_independent_bindings() {
    let f = fixture();
    let publish = button("publish");

    f.engine.bind(&[publish.clone()]).unwrap().to(perms!["admin"]).unwrap();

    let mut restriction = f.engine.open_restriction(&[publish.clone()]).unwrap();
    restriction.add_permissions(perms!["admin", Clearance::Secret]);
    let mut reverter = restriction.commit().unwrap();
    assert_eq!(f.engine.permissions_of(&publish).len(), 2);

    reverter.undo().unwrap();

    // "admin" was bound before the restriction and survives the undo
    let required = f.engine.permissions_of(&publish);
    assert_eq!(required.len(), 1);
    assert!(required.contains(&Perm::new("admin")));
    assert!(!publish.is_visible());

    f.user.set_admin(true);
    f.engine.rebind().unwrap();
    assert!(publish.is_visible());
}

#[test]
fn test_second_undo_is_a_usage_error() {
    let f = fixture();
    let launch = button("launch");

    let mut restriction = f.engine.open_restriction(&[launch.clone()]).unwrap();
    restriction.add_permissions(perms!["admin"]);
    let mut reverter = restriction.commit().unwrap();

    reverter.undo().unwrap();
    let err = reverter.undo().unwrap_err();
    assert!(matches!(err, AuthzError::ReverterUsed));
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[test]
fn test_overlapping_restrictions_undo_independently() {
    let f = fixture();
    let launch = button("launch");

    let mut first = f.engine.open_restriction(&[launch.clone()]).unwrap();
    first.add_permissions(perms!["admin"]);
    let mut first = first.commit().unwrap();

    let mut second = f.engine.open_restriction(&[launch.clone()]).unwrap();
    second.add_permissions(perms!["admin"]);
    let mut second = second.commit().unwrap();

    first.undo().unwrap();
    assert!(f.engine.permissions_of(&launch).contains(&Perm::new("admin")));
    assert!(!launch.is_visible());

    second.undo().unwrap();
    assert!(f.engine.permissions_of(&launch).is_empty());
    assert!(launch.is_visible());
}

#[test]
fn test_single_open_restriction_per_session() {
    let f = fixture();
    let a = button("a");
    let b = button("b");

    let open = f.engine.open_restriction(&[a]).unwrap();
    let err = f.engine.open_restriction(&[b.clone()]).unwrap_err();
    assert!(matches!(err, AuthzError::RestrictionOpen));

    drop(open);
    let reopened = f.engine.open_restriction(&[b]);
    assert!(reopened.is_ok());
}

#[test]
fn test_abandoned_restriction_changes_nothing() {
    let f = fixture();
    let launch = button("launch");

    {
        let mut restriction = f.engine.open_restriction(&[launch.clone()]).unwrap();
        restriction.add_permissions(perms!["admin"]);
    }

    assert!(!f.engine.is_restriction_open());
    assert!(!f.engine.is_bound(&launch));
    assert!(launch.is_visible());
}

#[test]
fn test_commit_with_unknown_type_fails_and_closes() {
    let f = fixture();
    let launch = button("launch");

    let mut restriction = f.engine.open_restriction(&[launch.clone()]).unwrap();
    restriction.add_permissions(perms![7i64]);
    let err = restriction.commit().unwrap_err();

    assert!(matches!(err, AuthzError::MissingAuthorizer(_)));
    assert!(!f.engine.is_restriction_open());
    assert!(!f.engine.is_bound(&launch));
}

#[test]
fn test_failed_apply_rolls_back_commit() {
    let f = fixture();
    let launch = button("launch");

    f.engine.bind(&[launch.clone()]).unwrap().to(perms!["user"]).unwrap();
    launch.set_visible(false);

    let mut restriction = f.engine.open_restriction(&[launch.clone()]).unwrap();
    restriction.add_permissions(perms!["admin"]);
    let err = restriction.commit().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Consistency);
    assert!(!f.engine.is_restriction_open());
    let required = f.engine.permissions_of(&launch);
    assert_eq!(required.len(), 1);
    assert!(required.contains(&Perm::new("user")));

    launch.set_visible(true);
    f.engine.rebind().unwrap();
    assert!(launch.is_visible());
}

#[test]
fn test_empty_target_list_is_rejected() {
    let f = fixture();
    let err = f.engine.open_restriction(&[]).unwrap_err();
    assert!(matches!(err, AuthzError::Empty(_)));
    assert!(!f.engine.is_restriction_open());
}

#[test]
fn test_view_restriction_reroutes_until_undone() {
    let f = fixture();
    let navigator = FakeNavigator::at("reports");
    f.engine.set_navigator(navigator.clone());
    let reports = page("reports");

    let mut restriction = f.engine.open_view_restriction(&[reports.clone()]).unwrap();
    restriction.add_permissions(perms!["admin"]);
    let mut reverter = restriction.commit().unwrap();

    // the default reroute target is the root destination
    assert_eq!(navigator.current(), "");
    assert_eq!(
        f.engine.check_navigation(Some(""), "reports").unwrap(),
        NavigationOutcome::Redirected {
            reason: "permissions required by view `reports` are not granted".to_string(),
            target: String::new(),
        }
    );

    reverter.undo().unwrap();
    assert!(f.engine.view_permissions_of(&reports).is_empty());
    assert!(f.engine.check_navigation(Some(""), "reports").unwrap().is_entered());
}
