//! End-to-end behaviour: YAML configuration in, extracted file tree out.

use std::fs;
use std::path::{Path, PathBuf};

use inspa::config::load_config;
use inspa_pack::format::{Footer, FOOTER_SIZE};
use inspa_pack::{Container, ContainerWriter};
use inspa_stub::extract::Extractor;
use inspa_stub::log::InstallLog;
use inspa_stub::{CancelFlag, ProgressSink};

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (path, content) in files {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
}

fn write_config(dir: &Path, input: &Path) -> PathBuf {
    let yaml = format!(
        concat!(
            "product:\n",
            "  name: E2EApp\n",
            "  version: 2.1.0\n",
            "install:\n",
            "  default_path: '%TEMP%/E2EApp'\n",
            "compression:\n",
            "  algo: zstd\n",
            "  level: 3\n",
            "inputs:\n",
            "  - path: {}\n",
            "    preserve_structure: false\n",
            "exclude:\n",
            "  - '*.tmp'\n",
        ),
        input.display()
    );
    let path = dir.join("config.yaml");
    fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn yaml_to_installed_tree_round_trip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input = temp_dir.path().join("payload");
    let files: &[(&str, &[u8])] = &[
        ("readme.txt", b"hello\n"),
        ("bin/app.dat", &[0u8, 1, 2, 3]),
        ("docs/guide.md", b"# Guide\n"),
    ];
    write_tree(&input, files);
    // Excluded by pattern; must not appear in the output.
    fs::write(input.join("scratch.tmp"), b"junk").unwrap();

    let config_path = write_config(temp_dir.path(), &input);
    let stub = temp_dir.path().join("stub.exe");
    fs::write(&stub, b"pretend this is a PE image").unwrap();

    let config = load_config(&config_path).unwrap();
    let out = temp_dir.path().join("E2ESetup.exe");
    let outcome = ContainerWriter::new().build(config, &stub, &out).unwrap();
    assert_eq!(outcome.file_count, 3);

    // Container invariants straight off the bytes.
    let data = fs::read(&out).unwrap();
    let footer_bytes: [u8; FOOTER_SIZE] = data[data.len() - FOOTER_SIZE..].try_into().unwrap();
    let footer = Footer::from_bytes(&footer_bytes).unwrap();
    assert_eq!(
        footer.payload_offset + footer.payload_size + 32 + FOOTER_SIZE as u64,
        data.len() as u64
    );

    // Header and footer agree on the digest.
    let container = Container::open(&out).unwrap();
    assert_eq!(
        container.header().hash.archive,
        hex::encode(footer.payload_sha256)
    );
    container.verify().unwrap();

    // Extract and compare the tree.
    let target = temp_dir.path().join("installed");
    let log = InstallLog::disabled();
    let cancel = CancelFlag::new();
    Extractor::new(container.header(), &log, &cancel)
        .extract(
            container.payload_reader().unwrap(),
            &target,
            &mut ProgressSink::disabled(),
        )
        .unwrap();

    for (path, content) in files {
        assert_eq!(&fs::read(target.join(path)).unwrap(), content, "{path}");
    }
    assert!(!target.join("scratch.tmp").exists());
    assert!(!target.join(".inspa_staging").exists());
}

#[test]
fn zip_fallback_configuration_round_trips() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input = temp_dir.path().join("payload");
    write_tree(&input, &[("readme.txt", b"hello\n")]);

    let yaml = format!(
        concat!(
            "product:\n",
            "  name: ZipApp\n",
            "  version: 1.0.0\n",
            "install:\n",
            "  default_path: '%TEMP%/ZipApp'\n",
            "compression:\n",
            "  algo: zip\n",
            "  level: 6\n",
            "inputs:\n",
            "  - path: {}\n",
            "    preserve_structure: false\n",
        ),
        input.display()
    );
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();
    let stub = temp_dir.path().join("stub.exe");
    fs::write(&stub, b"stub").unwrap();

    let config = load_config(&config_path).unwrap();
    let out = temp_dir.path().join("ZipSetup.exe");
    ContainerWriter::new().build(config, &stub, &out).unwrap();

    let container = Container::open(&out).unwrap();
    assert_eq!(container.header().compression.algo.as_str(), "zip");
    container.verify().unwrap();

    let target = temp_dir.path().join("installed");
    let log = InstallLog::disabled();
    let cancel = CancelFlag::new();
    Extractor::new(container.header(), &log, &cancel)
        .extract(
            container.payload_reader().unwrap(),
            &target,
            &mut ProgressSink::disabled(),
        )
        .unwrap();
    assert_eq!(fs::read(target.join("readme.txt")).unwrap(), b"hello\n");
}
