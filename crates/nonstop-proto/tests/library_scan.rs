use nonstop_proto::library::{contains_playable, scan, PlayableExtensions};
use proptest::prelude::*;
use std::fs;
use std::path::Path;

fn exts() -> PlayableExtensions {
    PlayableExtensions::new(["avi", "mov", "mkv", "mp4"])
}

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"").unwrap();
}

#[test]
fn test_scan_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for name in ["Zoo", "Movies", "Cartoons", "Simpsons", "alpha"] {
        touch(&root.join(name).join("deep/er/clip.mp4"));
    }
    touch(&root.join("Photos/beach.jpg"));

    let first = scan(root, &exts());
    let second = scan(root, &exts());
    assert_eq!(first, second);
    assert_eq!(first, vec!["Cartoons", "Movies", "Simpsons", "Zoo", "alpha"]);
}

#[cfg(unix)]
#[test]
fn test_unreadable_folder_does_not_fail_scan() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("Good/a.mkv"));
    touch(&root.join("Locked/b.mkv"));
    fs::set_permissions(root.join("Locked"), fs::Permissions::from_mode(0o000)).unwrap();

    let folders = scan(root, &exts());
    fs::set_permissions(root.join("Locked"), fs::Permissions::from_mode(0o755)).unwrap();

    // root can still read the locked folder, so only require that the scan
    // survived and kept the good one
    assert!(folders.contains(&"Good".to_string()));
}

proptest! {
    #[test]
    fn prop_every_folder_has_a_playable_file(
        layout in proptest::collection::vec(
            (0usize..6, prop::sample::select(vec!["mp4", "MKV", "txt", "Avi", "jpg", "srt"])),
            0..24,
        )
    ) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for i in 0..6 {
            fs::create_dir_all(root.join(format!("folder{}", i))).unwrap();
        }
        for (n, (folder, ext)) in layout.iter().enumerate() {
            touch(&root.join(format!("folder{}", folder)).join(format!("sub{}/f{}.{}", n % 2, n, ext)));
        }

        let folders = scan(root, &exts());
        let mut sorted = folders.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(&folders, &sorted);

        for i in 0..6 {
            let name = format!("folder{}", i);
            let expected = layout.iter().any(|(f, ext)| {
                *f == i && ["mp4", "mkv", "avi"].contains(&ext.to_ascii_lowercase().as_str())
            });
            prop_assert_eq!(folders.contains(&name), expected);
            prop_assert_eq!(contains_playable(&root.join(&name), &exts()), expected);
        }
    }
}
