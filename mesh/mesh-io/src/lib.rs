//! STL file I/O for the photomesh pipeline.
//!
//! - [`write_stl_binary`] / [`save_stl_binary`] - deterministic binary STL
//! - [`load_stl`] / [`parse_stl`] - binary and ASCII STL reading
//! - [`export_stl`] - write a job result atomically under its job id
//!
//! # Example
//!
//! ```no_run
//! use mesh_io::{load_stl, save_stl_binary};
//!
//! let mesh = load_stl("model.stl").unwrap();
//! save_stl_binary(&mesh, "copy.stl").unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod error;
mod export;
mod stl;

pub use error::{IoError, IoResult};
pub use export::{ExportSummary, export_stl, result_file_name};
pub use stl::{
    HEADER_SIZE, TRIANGLE_SIZE, load_stl, parse_stl, save_stl_binary, stl_header,
    write_stl_binary,
};
