use crate::image::{ImageClient, RegistryAuth};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Image client backed by the local `docker` CLI
pub struct DockerCliClient {
    binary: String,
}

impl DockerCliClient {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<()> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {} {}", self.binary, args[0]))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            drop(pipe);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            bail!(
                "{} {} exited with {}: {}",
                self.binary,
                args[0],
                output.status.code().unwrap_or(1),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl Default for DockerCliClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageClient for DockerCliClient {
    async fn pull(&self, image: &str, auth: Option<&RegistryAuth>, timeout: Duration) -> Result<()> {
        let work = async {
            if let Some(auth) = auth {
                let registry = registry_host(image);
                self.run(
                    &["login", registry, "-u", &auth.username, "--password-stdin"],
                    Some(&auth.password),
                )
                .await?;
            }
            self.run(&["pull", image], None).await
        };
        tokio::time::timeout(timeout, work)
            .await
            .with_context(|| format!("pull of {} timed out after {}s", image, timeout.as_secs()))?
    }

    async fn save(&self, dest: &Path, images: &[String]) -> Result<()> {
        let dest = dest.to_string_lossy();
        let mut args = vec!["save", "-o", dest.as_ref()];
        args.extend(images.iter().map(String::as_str));
        self.run(&args, None).await
    }
}

/// Registry host of an image reference; Docker Hub when the first path
/// segment does not look like a host.
pub fn registry_host(image: &str) -> &str {
    match image.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first
        }
        _ => "docker.io",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_host_detection() {
        assert_eq!(registry_host("nginx:1.25"), "docker.io");
        assert_eq!(registry_host("library/nginx"), "docker.io");
        assert_eq!(registry_host("ghcr.io/org/app:1"), "ghcr.io");
        assert_eq!(registry_host("localhost/app"), "localhost");
        assert_eq!(registry_host("10.0.0.5:5000/app"), "10.0.0.5:5000");
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let client = DockerCliClient::with_binary("definitely-not-a-docker-binary");
        let result = client
            .pull("nginx:1.25", None, Duration::from_secs(1))
            .await;
        assert!(result.is_err());
    }
}
