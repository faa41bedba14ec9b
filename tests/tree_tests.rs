//! tests/tree_tests.rs
//! Whole-tree encryption and decryption through the orchestrator

use chainvault::container::{BLOCK_SIZE, HEADER_SIZE};
use chainvault::{CredentialContext, Mode, Options, Orchestrator, Reporter};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PASSWORD: &str = "password";

fn run(mode: Mode, targets: Vec<PathBuf>) -> chainvault::RunSummary {
    let options = Options {
        jobs: 4,
        recursive: true,
    };
    let orchestrator = Orchestrator::new(mode, options, Reporter::hidden()).unwrap();
    orchestrator.process_targets(&CredentialContext::new(PASSWORD, targets))
}

/// Lay out a small tree and return (relative path, contents) pairs
fn populate(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let files = vec![
        (PathBuf::from("a.txt"), b"alpha".to_vec()),
        (PathBuf::from("b.bin"), (0..=255u8).collect()),
        (PathBuf::from("empty"), Vec::new()),
        (PathBuf::from("sub/c.md"), vec![b'c'; 32]),
        (PathBuf::from("sub/deeper/d.log"), vec![b'd'; 1000]),
        (PathBuf::from("other/e"), b"sibling directory".to_vec()),
    ];
    for (rel, data) in &files {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }
    files
}

fn remove_plaintexts(root: &Path, files: &[(PathBuf, Vec<u8>)]) {
    for (rel, _) in files {
        fs::remove_file(root.join(rel)).unwrap();
    }
}

#[test]
fn tree_roundtrip() {
    let dir = TempDir::new().unwrap();
    let files = populate(dir.path());

    let sealed = run(Mode::Encrypt, vec![dir.path().to_path_buf()]);
    assert_eq!(sealed.succeeded, files.len());
    assert!(sealed.is_success());

    remove_plaintexts(dir.path(), &files);

    let opened = run(Mode::Decrypt, vec![dir.path().to_path_buf()]);
    assert_eq!(opened.succeeded, files.len());
    for (rel, data) in &files {
        assert_eq!(&fs::read(dir.path().join(rel)).unwrap(), data, "{}", rel.display());
    }
}

#[test]
fn fan_out_drains_every_file_in_a_directory() {
    let dir = TempDir::new().unwrap();
    let k = 40;
    for i in 0..k {
        fs::write(dir.path().join(format!("file{i:02}")), vec![i as u8; i * 3]).unwrap();
    }

    let summary = run(Mode::Encrypt, vec![dir.path().to_path_buf()]);
    assert_eq!(summary.succeeded, k);

    // Every task has finished by the time the call returns
    for i in 0..k {
        let sealed = dir.path().join(format!("file{i:02}.cvlt"));
        let len = fs::metadata(&sealed).unwrap().len() as usize;
        assert_eq!(len, HEADER_SIZE + (i * 3).div_ceil(BLOCK_SIZE) * BLOCK_SIZE);
    }
}

#[test]
fn one_corrupt_sibling_does_not_stop_the_others() {
    let dir = TempDir::new().unwrap();
    let files = populate(dir.path());
    run(Mode::Encrypt, vec![dir.path().to_path_buf()]);
    remove_plaintexts(dir.path(), &files);

    let corrupt = dir.path().join("a.txt.cvlt");
    let mut bytes = fs::read(&corrupt).unwrap();
    bytes[0] ^= 0xFF;
    fs::write(&corrupt, bytes).unwrap();

    let summary = run(Mode::Decrypt, vec![dir.path().to_path_buf()]);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, files.len() - 1);
    assert!(!summary.is_success());

    assert!(!dir.path().join("a.txt").exists());
    for (rel, data) in files.iter().skip(1) {
        assert_eq!(&fs::read(dir.path().join(rel)).unwrap(), data);
    }
}

#[test]
fn forty_byte_file_scenario() {
    let dir = TempDir::new().unwrap();
    let plain = dir.path().join("forty");
    let data: Vec<u8> = (100..140).collect();
    fs::write(&plain, &data).unwrap();

    run(Mode::Encrypt, vec![plain.clone()]);
    let sealed = fs::read(dir.path().join("forty.cvlt")).unwrap();
    assert_eq!(sealed.len(), HEADER_SIZE + 3 * BLOCK_SIZE);
    assert_eq!(sealed[39], 8);

    fs::remove_file(&plain).unwrap();
    run(Mode::Decrypt, vec![dir.path().join("forty.cvlt")]);
    assert_eq!(fs::read(&plain).unwrap(), data);
}

#[test]
fn mixed_targets_and_missing_paths() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());

    let targets = vec![
        dir.path().join("a.txt"),
        dir.path().join("does-not-exist"),
        dir.path().join("sub"),
    ];
    let summary = run(Mode::Encrypt, targets);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.skipped, 1);
    assert!(!summary.is_success());

    assert!(dir.path().join("sub/deeper/d.log.cvlt").exists());
    assert!(!dir.path().join("b.bin.cvlt").exists());
    assert!(!dir.path().join("other/e.cvlt").exists());
}

#[test]
fn decrypt_ignores_plain_files_and_encrypt_ignores_containers() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("plain.txt"), b"left alone").unwrap();

    let summary = run(Mode::Decrypt, vec![dir.path().to_path_buf()]);
    assert_eq!(summary, chainvault::RunSummary::default());

    run(Mode::Encrypt, vec![dir.path().to_path_buf()]);
    let again = run(Mode::Encrypt, vec![dir.path().to_path_buf()]);
    // Only plain.txt is eligible again; plain.txt.cvlt is not re-encrypted
    assert_eq!(again.succeeded, 1);
    assert!(!dir.path().join("plain.txt.cvlt.cvlt").exists());
}

/// Build `root/a/a/.../a` `depth` levels deep, one directory at a time
fn nested_chain(root: &Path, depth: usize) -> Vec<PathBuf> {
    let mut dirs = Vec::with_capacity(depth);
    let mut current = root.to_path_buf();
    for _ in 0..depth {
        current.push("a");
        fs::create_dir(&current).unwrap();
        dirs.push(current.clone());
    }
    dirs
}

/// Tear the chain down deepest first so cleanup does not depend on depth
fn remove_chain(dirs: &[PathBuf]) {
    for dir in dirs.iter().rev() {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_file() {
                fs::remove_file(path).unwrap();
            }
        }
        fs::remove_dir(dir).unwrap();
    }
}

#[test]
fn very_deep_tree_roundtrip() {
    let dir = TempDir::new().unwrap();
    let depth = 1100;
    let dirs = nested_chain(dir.path(), depth);
    let leaf = dirs[depth - 1].join("leaf.txt");
    let shallow = dirs[0].join("near-top.txt");
    fs::write(&leaf, b"at the bottom of the tree").unwrap();
    fs::write(&shallow, b"just below the root").unwrap();

    let sealed = run(Mode::Encrypt, vec![dir.path().to_path_buf()]);
    assert_eq!(sealed.succeeded, 2);
    assert!(sealed.is_success());

    fs::remove_file(&leaf).unwrap();
    fs::remove_file(&shallow).unwrap();

    let opened = run(Mode::Decrypt, vec![dir.path().to_path_buf()]);
    assert_eq!(opened.succeeded, 2);
    assert_eq!(fs::read(&leaf).unwrap(), b"at the bottom of the tree");
    assert_eq!(fs::read(&shallow).unwrap(), b"just below the root");

    remove_chain(&dirs);
}
