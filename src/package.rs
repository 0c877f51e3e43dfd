//! Artifact packaging.
//!
//! Each successful build is gzipped into
//! `<output_root>/<version>/<platform-tag>/<artifact-name>.gz` with a
//! `.gz.sha256` sidecar next to it. Compression is deterministic (no mtime, no
//! embedded filename) so packaging the same binary twice yields identical bytes.

use anyhow::{bail, Context, Result};
use flate2::{Compression, GzBuilder};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::build::{chain_message, BuildError, BuildResult};
use crate::platform::PlatformIdentifier;

/// Separator between hash and filename in the sidecar (matches `sha256sum`).
const CHECKSUM_SEPARATOR: &str = "  ";

/// A compressed binary placed in the publish layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub platform: PlatformIdentifier,
    pub version: String,
    /// Absolute location of the `.gz` file.
    pub path: PathBuf,
    /// Location relative to the output root, e.g. `v0.1.0/linux_amd64/vss0.gz`.
    pub relative_path: PathBuf,
    /// Hex sha256 of the compressed file.
    pub sha256: String,
    pub source_bytes: u64,
    pub compressed_bytes: u64,
}

pub struct ArtifactPackager {
    output_root: PathBuf,
    version: String,
    artifact_name: String,
}

impl ArtifactPackager {
    pub fn new(
        output_root: impl Into<PathBuf>,
        version: impl Into<String>,
        artifact_name: impl Into<String>,
    ) -> Result<Self> {
        let version = version.into();
        let artifact_name = artifact_name.into();
        validate_segment("version tag", &version)?;
        validate_segment("artifact name", &artifact_name)?;
        Ok(Self {
            output_root: output_root.into(),
            version,
            artifact_name,
        })
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// `<output_root>/<version>`, where this run's artifacts and manifest live.
    pub fn version_dir(&self) -> PathBuf {
        self.output_root.join(&self.version)
    }

    /// Relative layout path for `platform`.
    pub fn relative_path_for(&self, platform: PlatformIdentifier) -> PathBuf {
        Path::new(&self.version)
            .join(platform.tag())
            .join(format!("{}.gz", self.artifact_name))
    }

    /// Package a build result.
    ///
    /// Failed results are skipped with `Ok(None)`. A success whose binary has
    /// gone missing is an `IoFailure`, never a skip.
    pub fn package(&self, result: &BuildResult) -> Result<Option<OutputArtifact>, BuildError> {
        let Some(binary) = result.binary() else {
            debug!(platform = %result.platform, "not packaging failed target");
            return Ok(None);
        };

        if !binary.is_file() {
            return Err(BuildError::IoFailure(format!(
                "{} reported success but {} does not exist",
                result.platform,
                binary.display()
            )));
        }

        self.write_artifact(result.platform, binary)
            .map(Some)
            .map_err(|e| BuildError::IoFailure(chain_message(&e)))
    }

    fn write_artifact(&self, platform: PlatformIdentifier, binary: &Path) -> Result<OutputArtifact> {
        let relative_path = self.relative_path_for(platform);
        let dest = self.output_root.join(&relative_path);
        let dir = dest
            .parent()
            .context("artifact destination has no parent directory")?;
        fs::create_dir_all(dir).with_context(|| format!("creating '{}'", dir.display()))?;

        let file_name = format!("{}.gz", self.artifact_name);
        let tmp = dir.join(tmp_name(&format!(".{file_name}")));
        let source_bytes = match gzip_file(binary, &tmp) {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        };
        fs::rename(&tmp, &dest).with_context(|| {
            format!("moving '{}' to '{}'", tmp.display(), dest.display())
        })?;

        let (sha256, compressed_bytes) = sha256_file(&dest)?;
        let sidecar = dir.join(format!("{file_name}.sha256"));
        fs::write(&sidecar, format!("{sha256}{CHECKSUM_SEPARATOR}{file_name}\n"))
            .with_context(|| format!("writing '{}'", sidecar.display()))?;

        info!(
            platform = %platform,
            artifact = %dest.display(),
            source_bytes,
            compressed_bytes,
            "packaged"
        );

        Ok(OutputArtifact {
            platform,
            version: self.version.clone(),
            path: dest,
            relative_path,
            sha256,
            source_bytes,
            compressed_bytes,
        })
    }
}

/// Reject values that would escape or flatten the output layout.
pub fn validate_segment(label: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        bail!("{label} must not be empty");
    }
    if value == "." || value == ".." {
        bail!("{label} '{value}' is not a valid path segment");
    }
    if value.contains('/') || value.contains('\\') || value.contains('\0') {
        bail!("{label} '{value}' must not contain path separators");
    }
    Ok(())
}

fn gzip_file(src: &Path, dst: &Path) -> Result<u64> {
    let input = File::open(src).with_context(|| format!("opening '{}'", src.display()))?;
    let output = File::create(dst).with_context(|| format!("creating '{}'", dst.display()))?;

    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(BufWriter::new(output), Compression::best());
    let n = io::copy(&mut BufReader::new(input), &mut encoder)
        .with_context(|| format!("compressing '{}'", src.display()))?;
    let mut writer = encoder
        .finish()
        .with_context(|| format!("finishing '{}'", dst.display()))?;
    writer.flush()?;
    writer
        .get_ref()
        .sync_all()
        .with_context(|| format!("syncing '{}'", dst.display()))?;
    Ok(n)
}

fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut BufReader::new(f), &mut hasher)
        .with_context(|| format!("hashing '{}'", path.display()))?;
    Ok((format!("{:x}", hasher.finalize()), size))
}

fn tmp_name(prefix: &str) -> String {
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{prefix}.tmp-{n}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::ErrorKind;
    use crate::registry::BuildStrategy;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn built(tmp: &TempDir, contents: &[u8]) -> BuildResult {
        let binary = tmp.path().join("build/vss0.so");
        fs::create_dir_all(binary.parent().unwrap()).unwrap();
        fs::write(&binary, contents).unwrap();
        BuildResult::success(PlatformIdentifier::LINUX_ARM64, BuildStrategy::Container, binary)
    }

    #[test]
    fn writes_versioned_layout_with_sidecar() {
        let tmp = TempDir::new().unwrap();
        let result = built(&tmp, b"\x7fELF extension bytes");
        let packager = ArtifactPackager::new(tmp.path().join("out"), "v0.1.2", "vss0").unwrap();

        let artifact = packager.package(&result).unwrap().unwrap();

        let expected = tmp.path().join("out/v0.1.2/linux_arm64/vss0.gz");
        assert_eq!(artifact.path, expected);
        assert_eq!(artifact.relative_path, Path::new("v0.1.2/linux_arm64/vss0.gz"));
        assert_eq!(artifact.source_bytes, 20);

        let mut decoded = Vec::new();
        GzDecoder::new(File::open(&expected).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, b"\x7fELF extension bytes");

        let sidecar = fs::read_to_string(expected.with_file_name("vss0.gz.sha256")).unwrap();
        assert_eq!(sidecar, format!("{}  vss0.gz\n", artifact.sha256));

        let leftovers: Vec<_> = fs::read_dir(expected.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn packaging_twice_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let result = built(&tmp, &vec![42u8; 64 * 1024]);
        let packager = ArtifactPackager::new(tmp.path().join("out"), "v1", "vss0").unwrap();

        let first = packager.package(&result).unwrap().unwrap();
        let first_bytes = fs::read(&first.path).unwrap();
        let second = packager.package(&result).unwrap().unwrap();
        let second_bytes = fs::read(&second.path).unwrap();

        assert_eq!(first_bytes, second_bytes);
        assert_eq!(first.sha256, second.sha256);
    }

    #[test]
    fn failed_results_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let packager = ArtifactPackager::new(tmp.path().join("out"), "v1", "vss0").unwrap();
        let failed = BuildResult::failure(
            PlatformIdentifier::OSX_ARM64,
            BuildStrategy::Unsupported,
            BuildError::Unsupported("linux host".into()),
        );

        assert_eq!(packager.package(&failed), Ok(None));
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn vanished_binary_is_io_failure() {
        let tmp = TempDir::new().unwrap();
        let packager = ArtifactPackager::new(tmp.path().join("out"), "v1", "vss0").unwrap();
        let ghost = BuildResult::success(
            PlatformIdentifier::LINUX_AMD64,
            BuildStrategy::Native,
            tmp.path().join("dist/vss0.so"),
        );

        let err = packager.package(&ghost).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(err.diagnostic().contains("reported success"));
    }

    #[test]
    fn unsafe_segments_are_rejected() {
        assert!(ArtifactPackager::new("out", "", "vss0").is_err());
        assert!(ArtifactPackager::new("out", "..", "vss0").is_err());
        assert!(ArtifactPackager::new("out", "v1/../../etc", "vss0").is_err());
        assert!(ArtifactPackager::new("out", "v1", "a\\b").is_err());
        assert!(validate_segment("version tag", "v0.4.1-alpha.2").is_ok());
    }
}
