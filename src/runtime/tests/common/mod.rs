//! Shared fixtures: signed local APK repositories holding chart packages.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};

pub const KEY_NAME: &str = "test.rsa.pub";

const PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/test.rsa.pk8");

pub fn public_key_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/test.rsa.pub")
}

fn tar(files: &[(&str, &[u8])], finish: bool) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    let mut bytes = builder.into_inner().unwrap();
    if !finish {
        bytes.truncate(bytes.len() - 1024);
    }
    bytes
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Signature member over `signed`, made with the fixture key.
fn signature_member(signed: &[u8]) -> Vec<u8> {
    let key = RsaKeyPair::from_pkcs8(PRIVATE_KEY).unwrap();
    let mut signature = vec![0u8; key.public().modulus_len()];
    key.sign(&RSA_PKCS1_SHA256, &SystemRandom::new(), signed, &mut signature)
        .unwrap();
    let entry = format!(".SIGN.RSA256.{}", KEY_NAME);
    gzip(&tar(&[(entry.as_str(), signature.as_slice())], false))
}

/// One package of a fixture repository.
pub struct Package {
    pub name: String,
    pub version: String,
    pub depends: Vec<String>,
    pub provides: Vec<String>,
    pub files: Vec<(String, Vec<u8>)>,
}

impl Package {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            depends: Vec::new(),
            provides: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn depends(mut self, atom: &str) -> Self {
        self.depends.push(atom.to_string());
        self
    }

    pub fn provides(mut self, atom: &str) -> Self {
        self.provides.push(atom.to_string());
        self
    }

    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.as_bytes().to_vec()));
        self
    }

    /// A Helm chart rooted at `root`.
    pub fn chart(self, root: &str, chart_yaml: &str, values_yaml: &str) -> Self {
        self.file(&format!("{}/Chart.yaml", root), chart_yaml)
            .file(&format!("{}/values.yaml", root), values_yaml)
            .file(
                &format!("{}/templates/crds.yaml", root),
                "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\n",
            )
            .file("var/lib/db/state", "ephemeral")
    }

    fn apk(&self) -> Vec<u8> {
        let pkginfo = format!("pkgname = {}\npkgver = {}\n", self.name, self.version);
        let control = gzip(&tar(&[(".PKGINFO", pkginfo.as_bytes())], false));
        let files: Vec<(&str, &[u8])> = self
            .files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_slice()))
            .collect();
        let data = gzip(&tar(&files, true));

        let mut apk = signature_member(&control);
        apk.extend_from_slice(&control);
        apk.extend_from_slice(&data);
        apk
    }

    fn index_record(&self, arch: &str) -> String {
        let mut out = format!(
            "P:{}\nV:{}\nA:{}\nS:4096\nI:16384\nT:{} Helm chart\no:{}\n",
            self.name, self.version, arch, self.name, self.name
        );
        if !self.depends.is_empty() {
            out.push_str(&format!("D:{}\n", self.depends.join(" ")));
        }
        if !self.provides.is_empty() {
            out.push_str(&format!("p:{}\n", self.provides.join(" ")));
        }
        out.push('\n');
        out
    }
}

/// Write a signed repository for `arch` under `root`.
pub fn write_repository(root: &Path, arch: &str, packages: &[Package]) {
    let dir = root.join(arch);
    std::fs::create_dir_all(&dir).unwrap();

    let index: String = packages.iter().map(|p| p.index_record(arch)).collect();
    let index_member = gzip(&tar(
        &[
            ("DESCRIPTION", b"fixture repository".as_slice()),
            ("APKINDEX", index.as_bytes()),
        ],
        true,
    ));
    let mut archive = signature_member(&index_member);
    archive.extend_from_slice(&index_member);
    std::fs::write(dir.join("APKINDEX.tar.gz"), archive).unwrap();

    for package in packages {
        let file = dir.join(format!("{}-{}.apk", package.name, package.version));
        std::fs::write(file, package.apk()).unwrap();
    }
}

pub const CHART_YAML: &str = "apiVersion: v2\nname: base\ndescription: Helm chart for deploying Istio cluster resources and CRDs\nversion: 1.20.3\nappVersion: 1.20.3\nsources:\n  - https://github.com/istio/istio\n";

pub const VALUES_YAML: &str = "# Istio base values\nimage:\n  repository: istio/pilot\n  tag: v1  # pinned by release\n  pullPolicy: IfNotPresent\nglobal:\n  istioNamespace: istio-system\n";

/// The standard fixture: three versions of `istio-charts-base` plus a
/// nested-chart package that has no top-level descriptor.
pub fn istio_repository(root: &Path) {
    write_repository(
        root,
        "aarch64",
        &[
            Package::new("istio-charts-base", "1.19.7-r0").chart("base", CHART_YAML, VALUES_YAML),
            Package::new("istio-charts-base", "1.20.3-r0")
                .depends("istio-crds")
                .chart("base", CHART_YAML, VALUES_YAML),
            Package::new("istio-charts-base", "1.20.2-r1").chart("base", CHART_YAML, VALUES_YAML),
            Package::new("istio-crds", "1.20.3-r0").file("usr/share/istio/crds.yaml", "kind: List\n"),
            Package::new("nested-chart", "1.0.0-r0")
                .file("usr/share/charts/nested/Chart.yaml", "name: nested\n"),
        ],
    );
}
