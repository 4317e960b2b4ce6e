//! Result export: write a finished mesh under its job id.

use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use mesh_types::IndexedMesh;
use tracing::info;

use crate::error::{IoError, IoResult};
use crate::stl::write_stl_binary;

/// Outcome of [`export_stl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Absolute path of the written STL.
    pub path: PathBuf,
    /// Vertices in the exported mesh.
    pub vertex_count: usize,
    /// Triangles written.
    pub face_count: usize,
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} vertices, {} triangles)",
            self.path.display(),
            self.vertex_count,
            self.face_count
        )
    }
}

/// File name used for a job's result: `{prefix}{job_id}.stl`.
#[must_use]
pub fn result_file_name(prefix: &str, job_id: &str) -> String {
    format!("{prefix}{job_id}.stl")
}

/// Write `mesh` as binary STL to `{dir}/{prefix}{job_id}.stl`.
///
/// The file is first written to `*.stl.partial` and renamed into place, so the
/// final path either holds a complete STL or does not exist.
///
/// # Errors
///
/// Returns [`IoError::EmptyMesh`] for a mesh without faces, or an I/O error if
/// the directory or file cannot be written.
///
/// # Example
///
/// ```
/// use mesh_io::export_stl;
/// use mesh_types::{IndexedMesh, Vertex};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mesh = IndexedMesh::from_parts(
///     vec![
///         Vertex::from_coords(0.0, 0.0, 0.0),
///         Vertex::from_coords(1.0, 0.0, 0.0),
///         Vertex::from_coords(0.0, 1.0, 0.0),
///     ],
///     vec![[0, 1, 2]],
/// );
///
/// let summary = export_stl(&mesh, dir.path(), "mesh_", "job-1").unwrap();
/// assert!(summary.path.ends_with("mesh_job-1.stl"));
/// assert_eq!(summary.face_count, 1);
/// ```
pub fn export_stl(
    mesh: &IndexedMesh,
    dir: &Path,
    prefix: &str,
    job_id: &str,
) -> IoResult<ExportSummary> {
    if mesh.faces.is_empty() {
        return Err(IoError::EmptyMesh);
    }

    fs::create_dir_all(dir)?;
    let final_path = std::path::absolute(dir.join(result_file_name(prefix, job_id)))?;
    let partial_path = final_path.with_extension("stl.partial");

    let written = File::create(&partial_path)
        .map_err(IoError::from)
        .and_then(|file| write_stl_binary(mesh, BufWriter::new(file)));
    if let Err(e) = written {
        let _ = fs::remove_file(&partial_path);
        return Err(e);
    }
    fs::rename(&partial_path, &final_path)?;

    let summary = ExportSummary {
        path: final_path,
        vertex_count: mesh.vertices.len(),
        face_count: mesh.faces.len(),
    };
    info!(
        path = %summary.path.display(),
        vertices = summary.vertex_count,
        faces = summary.face_count,
        "Exported STL"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mesh_types::Vertex;

    fn triangle() -> IndexedMesh {
        IndexedMesh::from_parts(
            vec![
                Vertex::from_coords(0.0, 0.0, 0.0),
                Vertex::from_coords(2.0, 0.0, 0.0),
                Vertex::from_coords(0.0, 2.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn test_writes_named_file_without_partial() {
        let dir = tempfile::tempdir().unwrap();
        let summary = export_stl(&triangle(), dir.path(), "", "abc").unwrap();

        assert!(summary.path.is_absolute());
        assert_eq!(summary.path.file_name().unwrap(), "abc.stl");
        assert!(summary.path.exists());
        assert!(!dir.path().join("abc.stl.partial").exists());
        assert_eq!(summary.vertex_count, 3);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let summary = export_stl(&triangle(), &nested, "r_", "x").unwrap();
        assert!(summary.path.starts_with(std::path::absolute(&nested).unwrap()));
    }

    #[test]
    fn test_repeated_export_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let first = export_stl(&triangle(), dir.path(), "", "a").unwrap();
        let second = export_stl(&triangle(), dir.path(), "", "b").unwrap();
        assert_eq!(fs::read(first.path).unwrap(), fs::read(second.path).unwrap());
    }

    #[test]
    fn test_empty_mesh_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let err = export_stl(&IndexedMesh::new(), dir.path(), "", "e").unwrap_err();
        assert!(matches!(err, IoError::EmptyMesh));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_summary_display() {
        let summary = ExportSummary {
            path: PathBuf::from("/tmp/x.stl"),
            vertex_count: 3,
            face_count: 1,
        };
        assert_eq!(summary.to_string(), "/tmp/x.stl (3 vertices, 1 triangles)");
    }
}
