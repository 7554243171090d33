//! # Cluster Output Assembly
//!
//! Owns the `<prefix>.ibdclust.gz` output stream. Windows of partition
//! lines are compressed to BGZF members in parallel by the pipeline and
//! handed over pre-framed; the writer appends them in order and finishes
//! the file with the canonical BGZF end-of-file block.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::io::bgzf::{self, BGZF_EOF};

/// Writer for the block-gzip cluster output file
pub struct ClusterWriter {
    out: BufWriter<File>,
}

impl ClusterWriter {
    /// Create (or overwrite) the output file
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Compress `text` into its own BGZF member(s) and write them
    pub fn write_text(&mut self, text: &[u8]) -> Result<()> {
        let mut framed = Vec::new();
        bgzf::write_bgzf_members(text, &mut framed)?;
        self.out.write_all(&framed)?;
        Ok(())
    }

    /// Write bytes that are already framed as BGZF members
    pub fn write_framed(&mut self, framed: &[u8]) -> Result<()> {
        self.out.write_all(framed)?;
        Ok(())
    }

    /// Write the end-of-file block and flush
    pub fn finish(mut self) -> Result<()> {
        self.out.write_all(&BGZF_EOF)?;
        self.out.flush()?;
        Ok(())
    }
}
