use dialog_permission::{
    AcceptAll, AllPermission, Catalog, DeferredPermission, DialogPermissionError, FilePermission,
    NamedPermission, Permission, PermissionStore, Permissions, implies,
};
use testresult::TestResult;

#[test_log::test]
fn it_matches_exact_names() -> TestResult {
    let granted = Permissions::new();
    granted.add(NamedPermission::new("FileRead", "/tmp/a")?.into_shared())?;

    assert!(implies(&granted, &NamedPermission::new("FileRead", "/tmp/a")?));
    assert!(!implies(&granted, &NamedPermission::new("FileRead", "/tmp/b")?));
    Ok(())
}

#[test_log::test]
fn it_grants_everything_to_the_universal_permission() -> TestResult {
    let granted = Permissions::new();
    granted.add(AllPermission.into_shared())?;

    assert!(implies(&granted, &AllPermission));
    assert!(implies(&granted, &NamedPermission::new("runtime", "exit")?));
    assert!(implies(&granted, &FilePermission::new(FilePermission::ALL_FILES, "read,write")?));
    Ok(())
}

#[test_log::test]
fn it_keeps_contents_after_a_rejected_add() -> TestResult {
    let granted = Permissions::new();
    granted.add(FilePermission::new("/tmp/-", "read")?.into_shared())?;
    granted.freeze();

    let rejected = granted.add(FilePermission::new("/etc/passwd", "read")?.into_shared());
    assert_eq!(rejected, Err(DialogPermissionError::ReadOnly));

    assert_eq!(granted.len(), 1);
    assert!(implies(&granted, &FilePermission::new("/tmp/a/b", "read")?));
    assert!(!implies(&granted, &FilePermission::new("/etc/passwd", "read")?));
    Ok(())
}

#[test_log::test]
fn it_resolves_once_the_type_is_loaded() -> TestResult {
    let catalog = Catalog::new();
    let deferred = DeferredPermission::new("file", "/tmp/-", Some("read".into()), None)?;

    assert_eq!(
        deferred.resolve(&catalog, &AcceptAll).err(),
        Some(DialogPermissionError::TypeUnavailable("file".into()))
    );
    assert!(!deferred.implies(&FilePermission::new("/tmp/a", "read")?));

    catalog.register::<FilePermission>();
    deferred.resolve(&catalog, &AcceptAll)?;

    assert!(deferred.implies(&FilePermission::new("/tmp/a", "read")?));
    assert!(!deferred.implies(&FilePermission::new("/tmp/a", "write")?));
    assert!(!deferred.implies(&FilePermission::new("/var/a", "read")?));
    Ok(())
}

#[test_log::test]
fn it_resolves_deferred_grants_inside_a_set() -> TestResult {
    let granted = Permissions::new();
    granted.add(
        DeferredPermission::new("file", "/tmp/-", Some("read".into()), None)?.into_shared(),
    )?;
    let requested = FilePermission::new("/tmp/a", "read")?;

    let catalog = Catalog::new();
    assert_eq!(granted.resolve(&catalog, &AcceptAll).unavailable, 1);
    assert!(!implies(&granted, &requested));

    catalog.register::<FilePermission>();
    assert_eq!(granted.resolve(&catalog, &AcceptAll).resolved, 1);
    assert!(implies(&granted, &requested));
    assert!(granted.deferred().is_empty());
    Ok(())
}
