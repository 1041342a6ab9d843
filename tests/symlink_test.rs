//! Symlink policy and in-archive symlink resolution

mod common;

use common::{read_all, vfs_in, ZipBuilder};
use mountfs::{MountOrder, Vfs, VfsError};
use tempfile::TempDir;

fn mount_zip(builder: ZipBuilder) -> (TempDir, Vfs) {
    let temp = TempDir::new().unwrap();
    let zip = temp.path().join("links.zip");
    builder.write_to(&zip);
    let vfs = vfs_in(temp.path());
    vfs.mount(&zip, None, MountOrder::Append).unwrap();
    (temp, vfs)
}

#[test]
fn test_disallowed_symlink_then_permitted() {
    println!("\n🔗 Testing symlink permission toggle");

    let (_temp, vfs) = mount_zip(
        ZipBuilder::new()
            .file("real.txt", b"payload")
            .symlink("link.txt", "real.txt"),
    );

    assert!(!vfs.symlinks_permitted());
    assert!(matches!(
        vfs.open_read("link.txt"),
        Err(VfsError::SymlinkDisallowed(_))
    ));
    assert!(vfs.last_error().unwrap().contains("link.txt"));

    vfs.permit_symlinks(true);
    assert_eq!(read_all(&vfs, "link.txt"), b"payload");
    assert!(vfs.is_symlink("link.txt").unwrap());
    assert!(!vfs.is_symlink("real.txt").unwrap());

    println!("  ✅ Refused, then followed once permitted");
}

#[test]
fn test_is_symlink_requires_permission() {
    let (_temp, vfs) = mount_zip(ZipBuilder::new().file("real.txt", b"x"));
    assert!(matches!(
        vfs.is_symlink("real.txt"),
        Err(VfsError::SymlinkDisallowed(_))
    ));
}

#[test]
fn test_enumerate_hides_symlinks_unless_permitted() {
    let (_temp, vfs) = mount_zip(
        ZipBuilder::new()
            .file("real.txt", b"x")
            .symlink("link.txt", "real.txt"),
    );

    assert_eq!(vfs.enumerate("").unwrap(), vec!["real.txt"]);
    vfs.permit_symlinks(true);
    assert_eq!(vfs.enumerate("").unwrap(), vec!["link.txt", "real.txt"]);
}

#[test]
fn test_symlink_chain_resolves() {
    let (_temp, vfs) = mount_zip(
        ZipBuilder::new()
            .file("data/real.bin", b"end of chain")
            .symlink("l1", "l2")
            .symlink("l2", "sub/l3")
            .symlink("sub/l3", "../data/real.bin"),
    );
    vfs.permit_symlinks(true);

    assert_eq!(read_all(&vfs, "l1"), b"end of chain");
    assert_eq!(read_all(&vfs, "sub/l3"), b"end of chain");
    assert!(!vfs.is_directory("l1").unwrap());
}

#[test]
fn test_symlink_cycle_is_detected() {
    println!("\n🔗 Testing symlink loop detection");

    let (_temp, vfs) = mount_zip(
        ZipBuilder::new()
            .symlink("a", "b")
            .symlink("b", "c")
            .symlink("c", "a")
            .symlink("me", "me")
            .file("ok.txt", b"fine"),
    );
    vfs.permit_symlinks(true);

    assert!(matches!(vfs.open_read("a"), Err(VfsError::SymlinkLoop(_))));
    // Cached outcome, reached from another member of the cycle
    assert!(matches!(vfs.open_read("b"), Err(VfsError::SymlinkLoop(_))));
    assert!(matches!(vfs.open_read("me"), Err(VfsError::SymlinkLoop(_))));
    assert_eq!(read_all(&vfs, "ok.txt"), b"fine");

    println!("  ✅ Cycle fails with SymlinkLoop");
}

#[test]
fn test_symlink_to_directory() {
    let (_temp, vfs) = mount_zip(
        ZipBuilder::new()
            .dir("maps")
            .file("maps/e1m1.map", b"map")
            .symlink("levels", "maps"),
    );
    vfs.permit_symlinks(true);

    assert!(vfs.is_directory("levels").unwrap());
    assert!(matches!(vfs.open_read("levels"), Err(VfsError::NotAFile(_))));
}

#[test]
fn test_broken_symlinks() {
    let (_temp, vfs) = mount_zip(
        ZipBuilder::new()
            .symlink("dangling", "nowhere.txt")
            .symlink("escape", "../../etc/passwd"),
    );
    vfs.permit_symlinks(true);

    assert!(matches!(vfs.open_read("dangling"), Err(VfsError::Corrupted(_))));
    assert!(matches!(vfs.open_read("escape"), Err(VfsError::Corrupted(_))));
}

#[cfg(unix)]
#[test]
fn test_directory_symlinks_follow_policy() {
    use std::fs;

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    fs::create_dir_all(root.join("real")).unwrap();
    fs::write(root.join("real").join("f.txt"), b"through link").unwrap();
    std::os::unix::fs::symlink("real", root.join("alias")).unwrap();

    let vfs = vfs_in(temp.path());
    vfs.mount(&root, None, MountOrder::Append).unwrap();

    assert!(matches!(
        vfs.open_read("alias/f.txt"),
        Err(VfsError::SymlinkDisallowed(_))
    ));
    assert_eq!(vfs.enumerate("").unwrap(), vec!["real"]);

    vfs.permit_symlinks(true);
    assert_eq!(read_all(&vfs, "alias/f.txt"), b"through link");
    assert!(vfs.is_symlink("alias").unwrap());
    assert_eq!(vfs.enumerate("").unwrap(), vec!["alias", "real"]);
}
