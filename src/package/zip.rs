//! Zip file assembly.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use ::zip::write::FileOptions;
use ::zip::{CompressionMethod, ZipWriter};

use super::include::IncludeResolver;
use super::naming::{probe_write_permission, NameAllocator};
use super::ZipSpec;
use crate::build::progress::{ArchiveKind, ProgressEvent, ProgressReporter, Stage};
use crate::descriptor::schema::ZipCompression;
use crate::error::PyroError;

fn compression_method(compression: ZipCompression) -> CompressionMethod {
    match compression {
        ZipCompression::Store => CompressionMethod::Stored,
        ZipCompression::Deflate => CompressionMethod::Deflated,
    }
}

fn zip_error(output: &Path, err: ::zip::result::ZipError) -> PyroError {
    match err {
        ::zip::result::ZipError::Io(e) if e.kind() == ErrorKind::PermissionDenied => {
            PyroError::Permission(output.to_path_buf())
        }
        ::zip::result::ZipError::Io(e) => PyroError::Io(e),
        other => PyroError::Io(io::Error::new(ErrorKind::Other, other.to_string())),
    }
}

/// Writes every zip file of a project.
pub struct ZipBuilder<'a> {
    compression_override: Option<ZipCompression>,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> ZipBuilder<'a> {
    /// Create a builder. `compression_override` wins over each spec's own
    /// compression.
    pub fn new(compression_override: Option<ZipCompression>, reporter: &'a dyn ProgressReporter) -> Self {
        Self { compression_override, reporter }
    }

    /// Build all zip files in order, returning the written paths.
    pub fn build_all(&self, zips: &[ZipSpec]) -> Result<Vec<PathBuf>, PyroError> {
        let mut names = NameAllocator::for_zips();
        let mut written = Vec::with_capacity(zips.len());

        for (index, spec) in zips.iter().enumerate() {
            let output = spec.output_dir.join(names.allocate(&spec.name, index));
            fs::create_dir_all(&spec.output_dir)?;
            probe_write_permission(&output)?;
            self.build_one(spec, &output)?;
            written.push(output);
        }
        Ok(written)
    }

    fn build_one(&self, spec: &ZipSpec, output: &Path) -> Result<(), PyroError> {
        if !spec.root_dir.is_dir() {
            return Err(PyroError::Configuration(format!(
                "Cannot resolve RootDir path to existing folder: \"{}\"",
                spec.root_dir.display()
            )));
        }

        let compression = self.compression_override.unwrap_or(spec.compression);
        let options = FileOptions::default().compression_method(compression_method(compression));

        self.reporter.report(ProgressEvent::ArchiveStarted {
            kind: ArchiveKind::Zip,
            output: output.to_path_buf(),
        });

        let file = File::create(output).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => PyroError::Permission(output.to_path_buf()),
            _ => PyroError::Io(e),
        })?;
        let mut writer = ZipWriter::new(file);
        let mut seen = HashSet::new();

        for entry in IncludeResolver::new(&spec.root_dir, spec.rules.clone(), true) {
            let entry = entry?;
            let name = entry.archive_name();
            if !seen.insert(name.to_lowercase()) {
                self.reporter.report(ProgressEvent::warning(
                    Stage::Zip,
                    format!("Skipping duplicate entry \"{}\" from \"{}\"", name, entry.source.display()),
                ));
                continue;
            }

            writer.start_file(name.as_str(), options).map_err(|e| zip_error(output, e))?;
            let mut source = File::open(&entry.source)?;
            io::copy(&mut source, &mut writer)?;

            self.reporter.report(ProgressEvent::ArchiveEntry {
                kind: ArchiveKind::Zip,
                source: entry.source,
                destination: name,
            });
        }

        writer.finish().map_err(|e| zip_error(output, e))?;

        self.reporter.report(ProgressEvent::ArchiveCompleted {
            kind: ArchiveKind::Zip,
            output: output.to_path_buf(),
            entries: seen.len(),
        });
        Ok(())
    }
}
