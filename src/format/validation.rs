//! Structural validation of a whole file.
//!
//! The walk is depth-first from the file header and rejects on the first
//! structural violation. Forward-version notices are not failures: they
//! are collected as warnings and reading proceeds on the v1.0 field
//! prefix.

use crate::error::IrisError;
use crate::format::header::FileHeaderBlock;
use crate::io::Region;

/// Outcome of a structural validation pass.
///
/// A report is valid when no error was recorded; warnings never make a
/// report invalid. [`ValidationReport::into_result`] bridges to the
/// error-raising API boundary.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Structural violations; the walk stops at the first, so at most
    /// one is recorded
    pub errors: Vec<IrisError>,
    /// Non-fatal notices (e.g. the file was written by a newer extension
    /// version)
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Create a successful report.
    pub fn ok() -> Self {
        ValidationReport::default()
    }

    /// Create a failed report with a single error.
    pub fn error(error: IrisError) -> Self {
        ValidationReport {
            errors: vec![error],
            warnings: Vec::new(),
        }
    }

    /// Whether the file is structurally valid.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add a non-fatal warning.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Convert to a `Result`, surfacing the first error if invalid.
    pub fn into_result(mut self) -> Result<(), IrisError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors.remove(0))
        }
    }
}

/// Perform deep structural validation of the byte region.
///
/// Walks the offset tree from the file header through the tile table and
/// metadata, recursing into every present child block. The first
/// structural violation fails the report; a file written by a newer
/// extension version validates with a warning.
pub fn validate_file_structure(bytes: &[u8]) -> ValidationReport {
    validate_region(bytes)
}

/// Region-generic validation walk shared by the mapped and remote builds.
pub(crate) fn validate_region<R: Region + ?Sized>(region: &R) -> ValidationReport {
    let mut report = ValidationReport::ok();
    let header = FileHeaderBlock::new(region.file_size());

    let warning = match header.validate_full(region) {
        Ok(warning) => warning,
        Err(error) => return ValidationReport::error(error),
    };
    if let Some(warning) = warning {
        report.add_warning(warning);
    }

    let tile_table = match header.tile_table(region) {
        Ok(block) => block,
        Err(error) => return ValidationReport::error(error),
    };
    if let Err(error) = tile_table.validate_full(region) {
        return ValidationReport::error(error);
    }

    let metadata = match header.metadata(region) {
        Ok(block) => block,
        Err(error) => return ValidationReport::error(error),
    };
    if let Err(error) = metadata.validate_full(region) {
        return ValidationReport::error(error);
    }

    report
}
