/// package.json and files/image.json documents consumed by the installer
use crate::constants::CPK_ID_PREFIX;
use crate::descriptor::Component;
use serde::Serialize;
use std::collections::BTreeMap;

/// CPU used when a component does not declare one
pub const DEFAULT_CPUS: f64 = 0.128;

const VENDOR_HOMEPAGE: &str = "rainbond.com";

const EXPORT_NOTE: &str = "Exported by app-export";

/// Sections the installer expects to exist, always empty in exports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmptySection {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Vendor {
    pub description: String,
    pub email: String,
    pub homepage: String,
    pub name: String,
    pub telephone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub struct PackageJson {
    pub architecture: String,
    pub browser: EmptySection,
    pub category: String,
    pub classification: String,
    pub count: u32,
    pub description: String,
    pub genericname: String,
    pub glibc: String,
    pub id: String,
    pub name: String,
    pub news: String,
    pub os: String,
    pub permission: EmptySection,
    pub runtime: String,
    pub scripts: EmptySection,
    pub search: String,
    pub secret: String,
    pub size: String,
    pub start: String,
    pub summary: String,
    pub todo: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub vendor: Vendor,
    pub version: String,
    pub web: EmptySection,
}

impl PackageJson {
    pub fn for_component(component: &Component) -> Self {
        Self {
            architecture: component.arch.clone(),
            browser: EmptySection::default(),
            category: "application".to_string(),
            classification: "L0".to_string(),
            count: 5,
            description: EXPORT_NOTE.to_string(),
            genericname: component.display_name.clone(),
            glibc: String::new(),
            id: format!("{CPK_ID_PREFIX}.{}", component.name),
            name: component.name.clone(),
            news: EXPORT_NOTE.to_string(),
            os: "all".to_string(),
            permission: EmptySection::default(),
            runtime: String::new(),
            scripts: EmptySection::default(),
            search: String::new(),
            secret: String::new(),
            size: String::new(),
            start: "/".to_string(),
            summary: EXPORT_NOTE.to_string(),
            todo: String::new(),
            kind: "web".to_string(),
            vendor: Vendor {
                homepage: VENDOR_HOMEPAGE.to_string(),
                name: "rbd".to_string(),
                ..Default::default()
            },
            version: component.deploy_version.clone(),
            web: EmptySection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageJson {
    pub apps: Vec<App>,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub cmd: String,
    pub constraints: Option<Vec<Vec<String>>>,
    pub container: Container,
    pub cpus: f64,
    pub dependencies: Option<Vec<String>>,
    pub disk: u32,
    pub health_checks: Vec<HealthCheck>,
    pub id: String,
    pub instances: u32,
    pub labels: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub mem: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub docker: Docker,
    #[serde(rename = "type")]
    pub kind: String,
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Docker {
    pub force_pull_image: bool,
    pub image: String,
    pub network: String,
    pub parameters: Option<Vec<String>>,
    pub port_mappings: Vec<PortMapping>,
    pub privileged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    pub labels: Option<BTreeMap<String, String>>,
    pub name: String,
    pub protocol: String,
    pub service_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub container_path: String,
    pub host_path: String,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub grace_period_seconds: u32,
    pub ignore_http1xx: bool,
    pub interval_seconds: u32,
    pub max_consecutive_failures: u32,
    pub path: String,
    pub port_index: u16,
    pub protocol: String,
    pub timeout_seconds: u32,
}

/// `/cpk.rbd.<component>-<version>`
pub fn cpk_id(component: &Component) -> String {
    format!(
        "/{CPK_ID_PREFIX}.{}-{}",
        component.name, component.deploy_version
    )
}

impl ImageJson {
    pub fn for_component(component: &Component) -> Self {
        let cpus = if component.cpu == 0 {
            DEFAULT_CPUS
        } else {
            f64::from(component.cpu) / 1000.0
        };

        let volumes = component
            .volumes
            .iter()
            .map(|v| Volume {
                container_path: v.mount_path.clone(),
                host_path: String::new(),
                mode: "RW".to_string(),
            })
            .collect();

        let port_mappings = component
            .ports
            .iter()
            .map(|p| PortMapping {
                container_port: p.container_port,
                host_port: 0,
                labels: None,
                name: p.name.clone(),
                protocol: p.protocol.clone(),
                service_port: 0,
            })
            .collect();

        let health_checks = component
            .probes
            .iter()
            .map(|probe| HealthCheck {
                grace_period_seconds: probe.initial_delay_seconds,
                ignore_http1xx: false,
                interval_seconds: probe.period_seconds,
                max_consecutive_failures: probe.failure_threshold,
                path: if probe.scheme == "cmd" {
                    probe.cmd.clone()
                } else {
                    probe.path.clone()
                },
                port_index: probe.port,
                protocol: probe.scheme.clone(),
                timeout_seconds: probe.timeout_seconds,
            })
            .collect();

        let env = component
            .envs
            .iter()
            .map(|e| (e.name.clone(), e.value.clone()))
            .collect();

        let id = cpk_id(component);
        let app = App {
            cmd: component.cmd.clone(),
            constraints: None,
            container: Container {
                docker: Docker {
                    force_pull_image: false,
                    image: component.image.clone(),
                    network: "BRIDGE".to_string(),
                    parameters: None,
                    port_mappings,
                    privileged: false,
                },
                kind: "DOCKER".to_string(),
                volumes,
            },
            cpus,
            dependencies: None,
            disk: 0,
            health_checks,
            id: format!("{id}{id}"),
            instances: component.scaling.step_node,
            labels: component.labels.clone(),
            env,
            mem: component.memory,
        };

        Self {
            apps: vec![app],
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{EnvVar, Port, Probe, VolumeMount};

    fn component() -> Component {
        Component {
            name: "web".to_string(),
            display_name: "Web Frontend".to_string(),
            image: "registry.local/shop/web:1.0".to_string(),
            deploy_version: "1.0".to_string(),
            cpu: 500,
            memory: 512,
            ports: vec![Port {
                container_port: 8080,
                protocol: "http".to_string(),
                name: "web".to_string(),
            }],
            envs: vec![
                EnvVar {
                    name: "MODE".to_string(),
                    value: "prod".to_string(),
                },
                EnvVar {
                    name: "A_FIRST".to_string(),
                    value: "1".to_string(),
                },
            ],
            probes: vec![
                Probe {
                    scheme: "http".to_string(),
                    path: "/healthz".to_string(),
                    port: 8080,
                    initial_delay_seconds: 5,
                    period_seconds: 10,
                    failure_threshold: 3,
                    timeout_seconds: 2,
                    ..Default::default()
                },
                Probe {
                    scheme: "cmd".to_string(),
                    path: "/ignored".to_string(),
                    cmd: "pgrep nginx".to_string(),
                    ..Default::default()
                },
            ],
            volumes: vec![VolumeMount {
                name: "data".to_string(),
                mount_path: "/data".to_string(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_resource_shape() {
        let json = ImageJson::for_component(&component());
        let app = &json.apps[0];
        assert!((app.cpus - 0.5).abs() < f64::EPSILON);
        assert_eq!(app.mem, 512);
        assert_eq!(app.instances, 1);
        assert_eq!(json.id, "/cpk.rbd.web-1.0");
        assert_eq!(app.id, "/cpk.rbd.web-1.0/cpk.rbd.web-1.0");
    }

    #[test]
    fn test_default_cpu() {
        let mut c = component();
        c.cpu = 0;
        let json = ImageJson::for_component(&c);
        assert!((json.apps[0].cpus - DEFAULT_CPUS).abs() < f64::EPSILON);
    }

    #[test]
    fn test_health_check_path_or_command() {
        let json = ImageJson::for_component(&component());
        let checks = &json.apps[0].health_checks;
        assert_eq!(checks[0].path, "/healthz");
        assert_eq!(checks[0].grace_period_seconds, 5);
        assert_eq!(checks[0].max_consecutive_failures, 3);
        assert_eq!(checks[1].path, "pgrep nginx");
        assert_eq!(checks[1].protocol, "cmd");
    }

    #[test]
    fn test_image_json_field_names() {
        let value = serde_json::to_value(ImageJson::for_component(&component())).unwrap();
        let app = &value["apps"][0];
        assert_eq!(app["container"]["type"], "DOCKER");
        assert_eq!(app["container"]["docker"]["network"], "BRIDGE");
        assert_eq!(app["container"]["docker"]["portMappings"][0]["containerPort"], 8080);
        assert_eq!(app["container"]["volumes"][0]["containerPath"], "/data");
        assert_eq!(app["healthChecks"][0]["intervalSeconds"], 10);
        assert_eq!(app["env"]["MODE"], "prod");
    }

    #[test]
    fn test_env_is_sorted() {
        let text = serde_json::to_string(&ImageJson::for_component(&component())).unwrap();
        let first = text.find("A_FIRST").unwrap();
        let second = text.find("MODE").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_package_json() {
        let value = serde_json::to_value(PackageJson::for_component(&component())).unwrap();
        assert_eq!(value["id"], "cpk.rbd.web");
        assert_eq!(value["genericname"], "Web Frontend");
        assert_eq!(value["type"], "web");
        assert_eq!(value["version"], "1.0");
        assert_eq!(value["architecture"], "amd64");
        assert!(value["browser"].as_object().unwrap().is_empty());
        assert_eq!(value["vendor"]["name"], "rbd");
        assert_eq!(value["vendor"]["homepage"], "rainbond.com");
    }
}
