mod common;

use app_export::descriptor::ExportMode;
use app_export::{ExportError, Exporter, PackageFormat};
use bzip2::read::BzDecoder;
use common::{bundle_entries, config, descriptor, FakeImageClient};
use std::fs;
use std::io::Read;
use std::sync::Arc;
use tempfile::tempdir;

fn unit_entries(body: &[u8]) -> Vec<String> {
    let mut archive = tar::Archive::new(BzDecoder::new(body));
    archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_offline_cpk_embeds_images_per_component() {
    let dir = tempdir().unwrap();
    let client = Arc::new(FakeImageClient::default());
    let mut exporter = Exporter::new(
        descriptor(ExportMode::Offline),
        PackageFormat::Cpk,
        config(dir.path()),
        client.clone(),
    );

    let result = exporter.export().await.unwrap();
    assert_eq!(result.package_name, "shop-1.0-cpk.tar.gz");
    assert_eq!(result.package_path, dir.path().join("out/shop-1.0-cpk.tar.gz"));
    assert_eq!(
        client.pulled(),
        vec![
            "registry.local/plugins/logger:2".to_string(),
            "registry.local/shop/web:1.0".to_string()
        ]
    );
    assert_eq!(client.saved().len(), 2);

    let entries = bundle_entries(&result.package_path);
    let web = &entries["shop-1.0-cpk/cpk.rbd.web_v1.0_amd64.cpk"];
    let worker = &entries["shop-1.0-cpk/cpk.rbd.worker_v1.0_amd64.cpk"];
    assert!(entries.contains_key("shop-1.0-cpk/plugin-images.tar"));
    assert!(entries.contains_key("shop-1.0-cpk/metadata.json"));
    assert!(!entries
        .keys()
        .any(|k| k.starts_with("shop-1.0-cpk/cpk.rbd.web_v1.0_amd64/")
            || k.starts_with("shop-1.0-cpk/cpk.rbd.worker_v1.0_amd64/")));

    let web_files = unit_entries(web);
    assert!(web_files
        .iter()
        .any(|p| p.ends_with("files/image/cpk.rbd.web_1.0.tar")));
    assert!(web_files.iter().any(|p| p.ends_with("package.json")));
    assert!(web_files.iter().any(|p| p.ends_with("filelist")));

    let worker_files = unit_entries(worker);
    assert!(!worker_files.iter().any(|p| p.ends_with(".tar")));

    assert!(!dir.path().join("scratch").exists());
    assert_eq!(exporter.stats().units_packed, 2);
    assert_eq!(exporter.stats().image_archives, 2);
}

#[tokio::test]
async fn test_offline_metadata_is_redacted() {
    let dir = tempdir().unwrap();
    let mut exporter = Exporter::new(
        descriptor(ExportMode::Offline),
        PackageFormat::Cpk,
        config(dir.path()),
        Arc::new(FakeImageClient::default()),
    );
    let result = exporter.export().await.unwrap();

    let entries = bundle_entries(&result.package_path);
    let metadata = String::from_utf8(entries["shop-1.0-cpk/metadata.json"].clone()).unwrap();
    assert!(!metadata.contains("s3cret-pass"));
    assert!(!metadata.contains("deployer"));
    assert!(metadata.contains("\"app_version\": \"1.0\""));
}

#[tokio::test]
async fn test_online_cpk_pulls_nothing_and_keeps_credentials() {
    let dir = tempdir().unwrap();
    let client = Arc::new(FakeImageClient::default());
    let mut exporter = Exporter::new(
        descriptor(ExportMode::Online),
        PackageFormat::Cpk,
        config(dir.path()),
        client.clone(),
    );
    let result = exporter.export().await.unwrap();

    assert!(client.pulled().is_empty());
    let entries = bundle_entries(&result.package_path);
    assert!(!entries.contains_key("shop-1.0-cpk/plugin-images.tar"));
    let metadata = String::from_utf8(entries["shop-1.0-cpk/metadata.json"].clone()).unwrap();
    assert!(metadata.contains("deployer"));
}

#[tokio::test]
async fn test_repeated_export_is_byte_identical() {
    let dir = tempdir().unwrap();
    let mut first = Exporter::new(
        descriptor(ExportMode::Offline),
        PackageFormat::Cpk,
        config(dir.path()),
        Arc::new(FakeImageClient::default()),
    );
    let a = first.export().await.unwrap();
    let bytes_a = fs::read(&a.package_path).unwrap();

    let mut second = Exporter::new(
        descriptor(ExportMode::Offline),
        PackageFormat::Cpk,
        config(dir.path()),
        Arc::new(FakeImageClient::default()),
    );
    let b = second.export().await.unwrap();
    let bytes_b = fs::read(&b.package_path).unwrap();

    assert_eq!(a.sha256, b.sha256);
    assert_eq!(bytes_a, bytes_b);
}

#[tokio::test]
async fn test_pull_failure_publishes_nothing() {
    let dir = tempdir().unwrap();
    let mut exporter = Exporter::new(
        descriptor(ExportMode::Offline),
        PackageFormat::Cpk,
        config(dir.path()),
        Arc::new(FakeImageClient::failing_on("registry.local/plugins/logger:2")),
    );

    let err = exporter.export().await.unwrap_err();
    assert!(matches!(err, ExportError::Materialization { ref image, .. } if image == "registry.local/plugins/logger:2"));
    assert!(!dir.path().join("out/shop-1.0-cpk.tar.gz").exists());
}

#[tokio::test]
async fn test_invalid_descriptor_touches_nothing() {
    let dir = tempdir().unwrap();
    let mut d = descriptor(ExportMode::Online);
    d.app_version.clear();
    let mut exporter = Exporter::new(
        d,
        PackageFormat::Cpk,
        config(dir.path()),
        Arc::new(FakeImageClient::default()),
    );

    let err = exporter.export().await.unwrap_err();
    assert_eq!(err.stage(), "validation");
    assert!(!dir.path().join("scratch").exists());
}

#[tokio::test]
async fn test_filelist_lists_saved_image() {
    let dir = tempdir().unwrap();
    let mut exporter = Exporter::new(
        descriptor(ExportMode::Offline),
        PackageFormat::Cpk,
        config(dir.path()),
        Arc::new(FakeImageClient::default()),
    );
    let result = exporter.export().await.unwrap();
    let entries = bundle_entries(&result.package_path);
    let web = &entries["shop-1.0-cpk/cpk.rbd.web_v1.0_amd64.cpk"];

    let mut archive = tar::Archive::new(BzDecoder::new(web.as_slice()));
    let mut filelist = String::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path().unwrap().ends_with("filelist") {
            entry.read_to_string(&mut filelist).unwrap();
        }
    }
    let size = "registry.local/shop/web:1.0".len();
    assert!(filelist
        .lines()
        .any(|l| l.starts_with(&format!("F,/image/cpk.rbd.web_1.0.tar,{size},0666,"))));
    assert!(filelist.lines().any(|l| l == format!("D,/image,{size},0777")));
}

#[tokio::test]
async fn test_duplicate_component_units_are_rejected() {
    let dir = tempdir().unwrap();
    let mut d = descriptor(ExportMode::Offline);
    d.components = vec![
        common::component("web", "registry.local/shop/web:1.0"),
        common::component("web", "registry.local/shop/web-b:2.0"),
    ];
    let client = Arc::new(FakeImageClient::default());
    let mut exporter = Exporter::new(d, PackageFormat::Cpk, config(dir.path()), client.clone());

    let err = exporter.export().await.unwrap_err();
    assert!(matches!(err, ExportError::InvalidDescriptor { .. }));
    assert!(client.pulled().is_empty());
    assert!(!dir.path().join("out/shop-1.0-cpk.tar.gz").exists());
}
