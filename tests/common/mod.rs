#![allow(dead_code)]

use anyhow::{bail, Result};
use app_export::descriptor::{
    ApplicationDescriptor, Component, ExportMode, ImageInfo, K8sResource, Plugin,
};
use app_export::{ExportConfig, ImageClient, ReadinessPolicy, RegistryAuth};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Records every call; `save` writes the image list as the archive body
#[derive(Default)]
pub struct FakeImageClient {
    pub pulls: Mutex<Vec<String>>,
    pub saves: Mutex<Vec<Vec<String>>>,
    pub fail_pull: Option<String>,
}

impl FakeImageClient {
    pub fn failing_on(image: &str) -> Self {
        Self {
            fail_pull: Some(image.to_string()),
            ..Default::default()
        }
    }

    pub fn pulled(&self) -> Vec<String> {
        let mut pulls = self.pulls.lock().unwrap().clone();
        pulls.sort();
        pulls
    }

    pub fn saved(&self) -> Vec<Vec<String>> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageClient for FakeImageClient {
    async fn pull(&self, image: &str, _auth: Option<&RegistryAuth>, _timeout: Duration) -> Result<()> {
        if self.fail_pull.as_deref() == Some(image) {
            bail!("manifest for {image} not found");
        }
        self.pulls.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn save(&self, dest: &Path, images: &[String]) -> Result<()> {
        fs::write(dest, images.join("\n"))?;
        self.saves.lock().unwrap().push(images.to_vec());
        Ok(())
    }
}

pub fn component(name: &str, image: &str) -> Component {
    Component {
        name: name.to_string(),
        display_name: name.to_uppercase(),
        image: image.to_string(),
        image_info: ImageInfo {
            hub_url: "registry.local".to_string(),
            namespace: "shop".to_string(),
            hub_user: "deployer".to_string(),
            hub_password: "s3cret-pass".to_string(),
        },
        cpu: 250,
        memory: 256,
        ..Default::default()
    }
}

pub fn descriptor(mode: ExportMode) -> ApplicationDescriptor {
    ApplicationDescriptor {
        app_name: "shop".to_string(),
        app_version: "1.0".to_string(),
        mode,
        components: vec![
            component("web", "registry.local/shop/web:1.0"),
            component("worker", ""),
        ],
        plugins: vec![Plugin {
            name: "logger".to_string(),
            image: "registry.local/plugins/logger:2".to_string(),
            image_info: ImageInfo::default(),
        }],
        ..Default::default()
    }
}

pub fn k8s(kind: &str, name: &str) -> K8sResource {
    K8sResource {
        name: name.to_string(),
        kind: kind.to_string(),
        content: format!(
            "apiVersion: v1\nkind: {kind}\nmetadata:\n  name: {name}\n  namespace: prod\n  resourceVersion: \"42\"\n  uid: 0b1c-{name}\n  creationTimestamp: \"2024-01-01T00:00:00Z\"\n"
        ),
    }
}

pub fn config(root: &Path) -> ExportConfig {
    ExportConfig::new(root.join("scratch"), root.join("out")).with_readiness(ReadinessPolicy {
        interval_ms: 5,
        max_attempts: 3,
    })
}

/// Every entry of a gzip tar bundle, keyed by path, with file bodies
pub fn bundle_entries(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
    let mut entries = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();
        entries.insert(name, body);
    }
    entries
}
