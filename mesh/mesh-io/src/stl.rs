//! STL (Stereolithography) file format support.
//!
//! Binary STL is the output format of the pipeline. ASCII STL is accepted on
//! load so externally produced files can be inspected with the same tools.
//!
//! # Binary Layout
//!
//! ```text
//! UINT8[80]    – Header
//! UINT32       – Number of triangles
//! foreach triangle
//!     REAL32[3] – Normal vector
//!     REAL32[3] – Vertex 1
//!     REAL32[3] – Vertex 2
//!     REAL32[3] – Vertex 3
//!     UINT16    – Attribute byte count (always 0 on write)
//! end
//! ```
//!
//! All numbers are little-endian. Writes are deterministic: the header is a
//! fixed string and every other byte is derived from the mesh.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use mesh_types::{IndexedMesh, Point3, Vector3, Vertex};
use tracing::debug;

use crate::error::{IoError, IoResult};

/// STL binary header size in bytes.
pub const HEADER_SIZE: usize = 80;

/// Size of one triangle in binary STL (normal + 3 vertices + attribute).
pub const TRIANGLE_SIZE: usize = 50;

/// Fixed header text written at the start of every binary STL.
const HEADER_TEXT: &[u8] = b"photomesh binary STL";

/// The fixed 80-byte header, zero padded.
#[must_use]
pub fn stl_header() -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..HEADER_TEXT.len()].copy_from_slice(HEADER_TEXT);
    header
}

/// Write `mesh` as binary STL to `writer`.
///
/// Facet normals are recomputed from the winding; zero-area faces get a zero
/// normal.
///
/// # Errors
///
/// Returns [`IoError::InvalidIndex`] if a face refers to a missing vertex,
/// [`IoError::TooManyFaces`] if the count does not fit in `u32`, or an I/O
/// error from the writer.
pub fn write_stl_binary<W: Write>(mesh: &IndexedMesh, mut writer: W) -> IoResult<()> {
    validate_indices(mesh)?;
    let count = u32::try_from(mesh.faces.len()).map_err(|_| IoError::TooManyFaces(mesh.faces.len()))?;

    writer.write_all(&stl_header())?;
    writer.write_all(&count.to_le_bytes())?;

    let mut record = [0u8; TRIANGLE_SIZE];
    for (index, face) in mesh.faces.iter().enumerate() {
        let normal = mesh.face_normal(index).unwrap_or_else(Vector3::zeros);
        write_vec3(&mut record[0..12], normal.x, normal.y, normal.z);
        for (slot, &vi) in face.iter().enumerate() {
            let p = mesh.vertices[vi as usize].position;
            let start = 12 + slot * 12;
            write_vec3(&mut record[start..start + 12], p.x, p.y, p.z);
        }
        record[48] = 0;
        record[49] = 0;
        writer.write_all(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Save `mesh` as binary STL at `path`.
///
/// # Errors
///
/// Returns an error if the mesh is malformed or the file cannot be written.
pub fn save_stl_binary<P: AsRef<Path>>(mesh: &IndexedMesh, path: P) -> IoResult<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_stl_binary(mesh, BufWriter::new(file))?;
    debug!(path = %path.display(), faces = mesh.faces.len(), "Wrote binary STL");
    Ok(())
}

/// Load a mesh from an STL file (binary or ASCII).
///
/// Vertices are not shared between faces: each triangle contributes three
/// vertices.
///
/// # Errors
///
/// Returns [`IoError::FileNotFound`] for a missing file, or a parse error if
/// the content is not valid STL.
pub fn load_stl<P: AsRef<Path>>(path: P) -> IoResult<IndexedMesh> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            IoError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            IoError::Io(e)
        }
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    parse_stl(&bytes)
}

/// Parse STL content held in memory.
///
/// A buffer whose length matches the size implied by its declared triangle
/// count is treated as binary, even if the header begins with `solid`.
///
/// # Errors
///
/// Returns a parse error if the content is not valid STL.
pub fn parse_stl(bytes: &[u8]) -> IoResult<IndexedMesh> {
    if bytes.len() < HEADER_SIZE + 4 {
        if looks_ascii(bytes) {
            return parse_ascii(bytes);
        }
        return Err(IoError::invalid_content("file too small to be valid STL"));
    }

    let declared = read_u32(&bytes[HEADER_SIZE..HEADER_SIZE + 4]);
    let expected_len = HEADER_SIZE + 4 + declared as usize * TRIANGLE_SIZE;
    if bytes.len() == expected_len || !looks_ascii(bytes) {
        parse_binary(bytes, declared)
    } else {
        parse_ascii(bytes)
    }
}

fn looks_ascii(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(HEADER_SIZE)];
    String::from_utf8_lossy(head).trim_start().starts_with("solid")
}

fn parse_binary(bytes: &[u8], declared: u32) -> IoResult<IndexedMesh> {
    let body = &bytes[HEADER_SIZE + 4..];
    #[allow(clippy::cast_possible_truncation)]
    let found = (body.len() / TRIANGLE_SIZE).min(u32::MAX as usize) as u32;
    if found < declared {
        return Err(IoError::InvalidFaceCount { declared, found });
    }

    let mut mesh = IndexedMesh::with_capacity(declared as usize * 3, declared as usize);
    for record in body.chunks_exact(TRIANGLE_SIZE).take(declared as usize) {
        push_triangle(
            &mut mesh,
            [
                read_point(&record[12..24]),
                read_point(&record[24..36]),
                read_point(&record[36..48]),
            ],
        );
    }
    Ok(mesh)
}

fn parse_ascii(bytes: &[u8]) -> IoResult<IndexedMesh> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| IoError::invalid_content(format!("ASCII STL is not UTF-8: {e}")))?;

    let mut mesh = IndexedMesh::new();
    let mut corners: Vec<Point3<f64>> = Vec::with_capacity(3);

    for line in text.lines() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some(kw) if kw.eq_ignore_ascii_case("vertex") => {
                let mut coord = [0.0; 3];
                for c in &mut coord {
                    *c = tokens
                        .next()
                        .ok_or_else(|| IoError::invalid_content("vertex with fewer than 3 coordinates"))?
                        .parse()?;
                }
                corners.push(Point3::new(coord[0], coord[1], coord[2]));
            }
            Some(kw) if kw.eq_ignore_ascii_case("endfacet") => {
                if corners.len() != 3 {
                    return Err(IoError::invalid_content(format!(
                        "facet with {} vertices",
                        corners.len()
                    )));
                }
                push_triangle(&mut mesh, [corners[0], corners[1], corners[2]]);
                corners.clear();
            }
            Some(kw) if kw.eq_ignore_ascii_case("endsolid") => break,
            _ => {}
        }
    }

    Ok(mesh)
}

#[allow(clippy::cast_possible_truncation)]
fn push_triangle(mesh: &mut IndexedMesh, corners: [Point3<f64>; 3]) {
    let base = mesh.vertices.len() as u32;
    mesh.vertices.extend(corners.into_iter().map(Vertex::new));
    mesh.faces.push([base, base + 1, base + 2]);
}

fn validate_indices(mesh: &IndexedMesh) -> IoResult<()> {
    let vertex_count = mesh.vertices.len();
    for (face, indices) in mesh.faces.iter().enumerate() {
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(IoError::InvalidIndex {
                face,
                index,
                vertex_count,
            });
        }
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn write_vec3(out: &mut [u8], x: f64, y: f64, z: f64) {
    out[0..4].copy_from_slice(&(x as f32).to_le_bytes());
    out[4..8].copy_from_slice(&(y as f32).to_le_bytes());
    out[8..12].copy_from_slice(&(z as f32).to_le_bytes());
}

fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

fn read_f32(buf: &[u8]) -> f64 {
    f64::from(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

fn read_point(buf: &[u8]) -> Point3<f64> {
    Point3::new(read_f32(&buf[0..4]), read_f32(&buf[4..8]), read_f32(&buf[8..12]))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> IndexedMesh {
        IndexedMesh::from_parts(
            vec![
                Vertex::from_coords(0.0, 0.0, 0.0),
                Vertex::from_coords(1.0, 0.0, 0.0),
                Vertex::from_coords(1.0, 1.0, 0.0),
                Vertex::from_coords(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_binary_layout() {
        let mut buf = Vec::new();
        write_stl_binary(&square(), &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + 4 + 2 * TRIANGLE_SIZE);
        assert_eq!(&buf[..HEADER_TEXT.len()], HEADER_TEXT);
        assert_eq!(read_u32(&buf[HEADER_SIZE..HEADER_SIZE + 4]), 2);

        // First facet normal is +z.
        let first = &buf[HEADER_SIZE + 4..];
        assert_eq!(read_f32(&first[8..12]), 1.0);
        assert_eq!(&first[48..50], &[0, 0]);
    }

    #[test]
    fn test_write_is_deterministic() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        write_stl_binary(&square(), &mut a).unwrap();
        write_stl_binary(&square(), &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_binary_recovers_positions() {
        let mut buf = Vec::new();
        write_stl_binary(&square(), &mut buf).unwrap();
        let mesh = parse_stl(&buf).unwrap();
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.vertex_count(), 6);
        assert_relative_eq!(mesh.vertices[2].position.x, 1.0);
        assert_relative_eq!(mesh.vertices[2].position.y, 1.0);
    }

    #[test]
    fn test_truncated_binary_rejected() {
        let mut buf = Vec::new();
        write_stl_binary(&square(), &mut buf).unwrap();
        buf.truncate(buf.len() - 10);
        assert!(matches!(
            parse_stl(&buf),
            Err(IoError::InvalidFaceCount {
                declared: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_parse_ascii_facets() {
        let text = "solid test\n\
            facet normal 0 0 1\n\
              outer loop\n\
                vertex 0 0 0\n\
                vertex 1 0 0\n\
                vertex 0 1 0\n\
              endloop\n\
            endfacet\n\
            endsolid test\n";
        let mesh = parse_stl(text.as_bytes()).unwrap();
        assert_eq!(mesh.face_count(), 1);
        assert_relative_eq!(mesh.vertices[1].position.x, 1.0);
    }

    #[test]
    fn test_invalid_index_rejected() {
        let mut mesh = square();
        mesh.faces.push([0, 1, 7]);
        let err = write_stl_binary(&mesh, Vec::new()).unwrap_err();
        assert!(matches!(err, IoError::InvalidIndex { face: 2, index: 7, .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_stl(dir.path().join("nope.stl")).unwrap_err();
        assert!(matches!(err, IoError::FileNotFound { .. }));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("square.stl");
        save_stl_binary(&square(), &path).unwrap();
        let mesh = load_stl(&path).unwrap();
        assert_eq!(mesh.face_count(), 2);
    }
}
