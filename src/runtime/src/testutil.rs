//! Fixture builders for unit tests: gzip'd tar members, `.apk` files and
//! APKINDEX archives laid out as a local repository.

use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

fn tar_bytes(files: &[(&str, &[u8])], finish: bool) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    if finish {
        builder.into_inner().unwrap()
    } else {
        // tar::Builder always appends the end-of-archive blocks on
        // into_inner(); strip them to mimic apk control fragments.
        let mut bytes = builder.into_inner().unwrap();
        bytes.truncate(bytes.len() - 1024);
        bytes
    }
}

fn gzip(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A complete tar archive in one gzip member.
pub fn gzip_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
    gzip(&tar_bytes(files, true))
}

/// A tar fragment (no end-of-archive marker) in one gzip member.
pub fn gzip_tar_fragment(files: &[(&str, &[u8])]) -> Vec<u8> {
    gzip(&tar_bytes(files, false))
}

/// An unsigned `.apk`: control member + data member.
///
/// A fake signature member is prepended so the data member is the third,
/// as in real packages.
pub fn build_apk(name: &str, version: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let signature = gzip_tar_fragment(&[(".SIGN.RSA.test.rsa.pub", b"not-a-signature".as_slice())]);
    let pkginfo = format!("pkgname = {}\npkgver = {}\n", name, version);
    let control = gzip_tar_fragment(&[(".PKGINFO", pkginfo.as_bytes())]);
    let data = gzip_tar(files);

    let mut apk = signature;
    apk.extend_from_slice(&control);
    apk.extend_from_slice(&data);
    apk
}

/// Description of one package in a fixture repository.
pub struct FixturePackage<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub depends: &'a [&'a str],
    pub provides: &'a [&'a str],
    pub files: Vec<(String, Vec<u8>)>,
}

impl<'a> FixturePackage<'a> {
    pub fn new(name: &'a str, version: &'a str) -> Self {
        Self {
            name,
            version,
            depends: &[],
            provides: &[],
            files: Vec::new(),
        }
    }

    pub fn depends(mut self, depends: &'a [&'a str]) -> Self {
        self.depends = depends;
        self
    }

    pub fn provides(mut self, provides: &'a [&'a str]) -> Self {
        self.provides = provides;
        self
    }

    pub fn file(mut self, path: &str, content: &[u8]) -> Self {
        self.files.push((path.to_string(), content.to_vec()));
        self
    }
}

/// APKINDEX text for the given packages.
pub fn index_text(arch: &str, packages: &[FixturePackage<'_>]) -> String {
    let mut out = String::new();
    for pkg in packages {
        out.push_str(&format!("P:{}\nV:{}\nA:{}\nS:1024\nI:4096\nT:{} chart\n", pkg.name, pkg.version, arch, pkg.name));
        if !pkg.depends.is_empty() {
            out.push_str(&format!("D:{}\n", pkg.depends.join(" ")));
        }
        if !pkg.provides.is_empty() {
            out.push_str(&format!("p:{}\n", pkg.provides.join(" ")));
        }
        out.push('\n');
    }
    out
}

/// Lay out an unsigned repository under `root/<arch>/`.
pub fn write_repo(root: &Path, arch: &str, packages: &[FixturePackage<'_>]) {
    let dir = root.join(arch);
    std::fs::create_dir_all(&dir).unwrap();

    let index = index_text(arch, packages);
    let archive = gzip_tar(&[
        ("DESCRIPTION", b"fixture".as_slice()),
        ("APKINDEX", index.as_bytes()),
    ]);
    std::fs::write(dir.join("APKINDEX.tar.gz"), archive).unwrap();

    for pkg in packages {
        let files: Vec<(&str, &[u8])> = pkg
            .files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_slice()))
            .collect();
        let apk = build_apk(pkg.name, pkg.version, &files);
        std::fs::write(dir.join(format!("{}-{}.apk", pkg.name, pkg.version)), apk).unwrap();
    }
}

/// A minimal chart package payload rooted at `root`.
pub fn chart_files(root: &str, chart_yaml: &str, values_yaml: &str) -> Vec<(String, Vec<u8>)> {
    vec![
        (format!("{}/Chart.yaml", root), chart_yaml.as_bytes().to_vec()),
        (format!("{}/values.yaml", root), values_yaml.as_bytes().to_vec()),
        (
            format!("{}/templates/deployment.yaml", root),
            b"kind: Deployment\n".to_vec(),
        ),
    ]
}
