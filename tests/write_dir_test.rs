//! Write directory: creation, deletion, and isolation from the search path

mod common;

use common::{read_all, vfs_in, ZipBuilder};
use mountfs::{MountOrder, VfsError};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_writes_land_in_write_dir_only() {
    println!("\n💾 Testing writes go to the write directory");

    let temp = TempDir::new().unwrap();
    let save = temp.path().join("save");
    fs::create_dir(&save).unwrap();
    let zip = temp.path().join("base.zip");
    ZipBuilder::new().file("config.cfg", b"defaults").write_to(&zip);

    let vfs = vfs_in(temp.path());
    vfs.set_write_dir(&save).unwrap();
    vfs.mount(&save, None, MountOrder::Prepend).unwrap();
    vfs.mount(&zip, None, MountOrder::Append).unwrap();
    assert_eq!(vfs.write_dir().unwrap(), save.display().to_string());

    assert_eq!(read_all(&vfs, "config.cfg"), b"defaults");

    let mut out = vfs.open_write("config.cfg").unwrap();
    out.write(b"custom").unwrap();
    out.close().unwrap();

    // The write dir now shadows the archive
    assert_eq!(read_all(&vfs, "config.cfg"), b"custom");
    assert_eq!(vfs.real_dir("config.cfg").unwrap(), save.display().to_string());
    assert_eq!(fs::read(save.join("config.cfg")).unwrap(), b"custom");

    println!("  ✅ Archive untouched, save copy shadows it");
}

#[test]
fn test_mkdir_and_delete() {
    let temp = TempDir::new().unwrap();
    let vfs = vfs_in(temp.path());
    vfs.set_write_dir(temp.path()).unwrap();
    vfs.mount(temp.path(), None, MountOrder::Append).unwrap();

    vfs.mkdir("saves/slot1").unwrap();
    vfs.mkdir("saves/slot1").unwrap();
    assert!(vfs.is_directory("saves/slot1").unwrap());

    let mut file = vfs.open_write("saves/slot1/game.sav").unwrap();
    file.write(b"state").unwrap();
    file.close().unwrap();
    assert!(vfs.exists("saves/slot1/game.sav"));

    // Non-empty directories stay
    assert!(vfs.delete("saves/slot1").is_err());

    vfs.delete("saves/slot1/game.sav").unwrap();
    vfs.delete("saves/slot1").unwrap();
    assert!(!vfs.exists("saves/slot1"));
    assert!(matches!(
        vfs.delete("saves/missing"),
        Err(VfsError::NoSuchFile(_))
    ));
    assert!(matches!(vfs.delete("/"), Err(VfsError::InvalidArgument(_))));
}

#[test]
fn test_open_write_needs_existing_parent() {
    let temp = TempDir::new().unwrap();
    let vfs = vfs_in(temp.path());
    vfs.set_write_dir(temp.path()).unwrap();

    assert!(vfs.open_write("no/such/dir/file.txt").is_err());
    vfs.mkdir("no/such/dir").unwrap();
    vfs.open_write("no/such/dir/file.txt").unwrap().close().unwrap();
    assert!(temp.path().join("no/such/dir/file.txt").is_file());
}

#[test]
fn test_archive_cannot_be_write_dir() {
    let temp = TempDir::new().unwrap();
    let zip = temp.path().join("base.zip");
    ZipBuilder::new().file("a", b"a").write_to(&zip);
    let vfs = vfs_in(temp.path());

    assert!(matches!(
        vfs.set_write_dir(&zip),
        Err(VfsError::NotAnArchive(_))
    ));
    assert!(vfs.write_dir().is_none());
}

#[test]
fn test_failed_set_write_dir_keeps_previous() {
    let temp = TempDir::new().unwrap();
    let vfs = vfs_in(temp.path());
    vfs.set_write_dir(temp.path()).unwrap();

    assert!(vfs.set_write_dir(&temp.path().join("missing")).is_err());
    assert_eq!(vfs.write_dir().unwrap(), temp.path().display().to_string());

    vfs.clear_write_dir().unwrap();
    assert!(vfs.write_dir().is_none());
    assert!(matches!(vfs.open_write("x"), Err(VfsError::NoWriteDir)));
}

#[test]
fn test_archives_are_read_only() {
    let temp = TempDir::new().unwrap();
    let zip = temp.path().join("base.zip");
    ZipBuilder::new().file("a.txt", b"a").write_to(&zip);
    let vfs = vfs_in(temp.path());
    vfs.mount(&zip, None, MountOrder::Append).unwrap();

    let mut file = vfs.open_read("a.txt").unwrap();
    assert!(matches!(file.write(b"x"), Err(VfsError::NotOpenForWriting)));
}
