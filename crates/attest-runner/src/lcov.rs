//! LCOV tracefile output for coverage line hits.
//!
//! Only the `SF`/`DA`/`end_of_record` subset: one section per source
//! file, one `DA:line,hits` entry per declared line, ascending. Output
//! is appended so several runs can accumulate into one tracefile for
//! `genhtml` and friends.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Render a line hit map as an LCOV tracefile fragment.
pub fn render(lines: &BTreeMap<String, BTreeMap<u32, u32>>) -> String {
    let mut out = String::new();
    for (file, hits) in lines {
        out.push_str("SF:");
        out.push_str(file);
        out.push('\n');
        for (line, count) in hits {
            out.push_str(&format!("DA:{line},{count}\n"));
        }
        out.push_str("end_of_record\n");
    }
    out
}

/// Append a tracefile fragment to `path`, creating the file if needed.
pub fn append(path: &Path, lines: &BTreeMap<String, BTreeMap<u32, u32>>) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(render(lines).as_bytes())
}
