//! Row-count chunking for CSV exports
//!
//! The first line is the header. Remaining rows are grouped `chunk_size` at a
//! time and every chunk is written as `<stem>_chunk_<index>.csv` with the
//! header prepended.

use std::path::Path;

use courier_common::Result;

use super::{decode_utf8, DestinationTarget, RouteStrategy, RoutedObject};
use crate::config::DestinationSpec;

#[derive(Debug, Clone)]
pub struct CsvChunker {
    destination: DestinationSpec,
    chunk_size: usize,
}

impl CsvChunker {
    /// A `chunk_size` of zero is treated as one row per chunk
    pub fn new(destination: DestinationSpec, chunk_size: usize) -> Self {
        Self {
            destination,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl RouteStrategy for CsvChunker {
    fn transform(&self, filename: &str, bytes: &[u8]) -> Result<Vec<RoutedObject>> {
        let text = decode_utf8(filename, bytes)?;
        let mut lines = text.split_inclusive('\n');

        let Some(header) = lines.next() else {
            return Ok(Vec::new());
        };
        let rows: Vec<&str> = lines.collect();
        let stem = chunk_stem(filename);

        let objects = rows
            .chunks(self.chunk_size)
            .enumerate()
            .map(|(index, chunk)| {
                let mut data = String::with_capacity(
                    header.len() + chunk.iter().map(|row| row.len()).sum::<usize>() + 1,
                );
                data.push_str(header);
                if !header.ends_with('\n') {
                    data.push('\n');
                }
                chunk.iter().for_each(|row| data.push_str(row));

                RoutedObject::new(
                    DestinationTarget::in_directory(
                        &self.destination.container,
                        &self.destination.directory,
                        &format!("{}_chunk_{}.csv", stem, index),
                    ),
                    data.into_bytes(),
                )
            })
            .collect();

        Ok(objects)
    }
}

/// Filename without its final extension
fn chunk_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}
