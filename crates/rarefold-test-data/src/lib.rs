//! rarefold-test-data
//!
//! Fixture records embedded in the crate for use in tests.
//!
//! Records are represented as `TestFile` objects which package the raw bytes
//! and create temporary files for programs to operate on.
use std::fs;
use tempfile::{Builder, NamedTempFile};

#[derive(Debug)]
/// Test File
///
/// Example usage:
///
/// ```ignore
/// // returns (filepath, _tempfile_handle).
/// // _handle ensures the tempfile remains in scope
/// use rarefold_test_data::TestFile;
/// let (record_file, _temp) = TestFile::record_01().create_temp().unwrap();
/// ```
pub struct TestFile {
    filebinary: &'static [u8],
    suffix: &'static str,
}

impl TestFile {
    /// 8 residue query (MKTAYIAK), a 4 row MSA with float deletion counts
    /// and one template.
    pub fn record_01() -> Self {
        Self {
            filebinary: include_bytes!("../data/records/query_msa.json"),
            suffix: "json",
        }
    }

    /// Same example as `record_01`, with the deletion counts stored in the
    /// legacy integer `deletion_matrix_int` field.
    pub fn record_legacy_01() -> Self {
        Self {
            filebinary: include_bytes!("../data/records/legacy_deletions.json"),
            suffix: "json",
        }
    }

    pub fn bytes(&self) -> &'static [u8] {
        self.filebinary
    }

    pub fn create_temp(&self) -> std::io::Result<(String, NamedTempFile)> {
        let temp = Builder::new()
            .suffix(&format!(".{}", self.suffix))
            .tempfile()?;

        fs::write(&temp, self.filebinary)?;
        let path = temp.path().to_string_lossy().into_owned();

        Ok((path, temp))
    }
}
