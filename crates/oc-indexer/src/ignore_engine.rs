//! Ignore Engine: on a project's first scan, if no custom ignore file
//! exists yet, looks for directories that smell like vendored or bulk
//! minified code and writes a `.ocignore` listing them — so a project
//! that never got a hand-written `.gitignore` entry for `static/libs/`
//! still skips it instead of indexing someone else's dependency tree.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::scanner::VENDOR_DIRS;

/// Name of the auto-generated ignore file, read by the scanner alongside
/// `.gitignore`.
pub const IGNORE_FILE_NAME: &str = ".ocignore";

const MINIFIED_SUFFIXES: &[&str] = &[".min.js", ".min.css", ".bundle.js"];

const VENDOR_LIBRARY_PREFIXES: &[&str] = &[
    "jquery", "bootstrap", "lodash", "moment", "angular", "react", "vue", "popper",
    "fontawesome", "normalize", "d3", "backbone",
];

const MINIFIED_MIN_COUNT: usize = 10;
const MINIFIED_RATIO: f64 = 0.5;
const VENDOR_NAMED_FILE_THRESHOLD: usize = 5;

fn is_minified(name: &str) -> bool {
    MINIFIED_SUFFIXES.iter().any(|s| name.ends_with(s))
}

fn is_vendor_named(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    VENDOR_LIBRARY_PREFIXES.iter().any(|p| lower.starts_with(p))
}

#[derive(Default)]
struct DirStats {
    total_files: usize,
    minified_files: usize,
    vendor_named_files: usize,
}

/// If `project_root` has no `.ocignore` yet, walk it looking for vendor or
/// bulk-minified directories and write one listing them. Returns `true` if
/// a file was generated, `false` if one already existed or nothing was
/// flagged.
pub fn ensure_ocignore(project_root: &Path) -> std::io::Result<bool> {
    let ignore_path = project_root.join(IGNORE_FILE_NAME);
    if ignore_path.exists() {
        return Ok(false);
    }

    let mut flagged = Vec::new();
    visit_dirs(project_root, project_root, &mut flagged)?;
    if flagged.is_empty() {
        return Ok(false);
    }

    let mut body = String::from(
        "# Auto-generated by the Ignore Engine on first scan: directories\n\
         # flagged as vendored or bulk-minified code.\n",
    );
    for dir in &flagged {
        body.push_str(dir);
        body.push_str("/\n");
    }

    let mut file = fs::File::create(&ignore_path)?;
    file.write_all(body.as_bytes())?;
    Ok(true)
}

/// Recursively tally per-directory file stats, flagging and pruning any
/// directory that matches a vendor heuristic rather than descending
/// further into it.
fn visit_dirs(project_root: &Path, dir: &Path, flagged: &mut Vec<String>) -> std::io::Result<()> {
    if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
        if name.starts_with('.') && dir != project_root {
            return Ok(());
        }
        if VENDOR_DIRS.contains(&name) {
            push_rel(project_root, dir, flagged);
            return Ok(());
        }
    }

    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };

    let mut stats = DirStats::default();
    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            subdirs.push(path);
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        stats.total_files += 1;
        if is_minified(&name) {
            stats.minified_files += 1;
        }
        if is_vendor_named(&name) {
            stats.vendor_named_files += 1;
        }
    }

    if dir != project_root {
        let minified_hit = stats.minified_files > MINIFIED_MIN_COUNT
            && (stats.minified_files as f64 / stats.total_files.max(1) as f64) > MINIFIED_RATIO;
        let vendor_named_hit = stats.vendor_named_files > VENDOR_NAMED_FILE_THRESHOLD;

        if minified_hit || vendor_named_hit {
            push_rel(project_root, dir, flagged);
            return Ok(());
        }
    }

    for sub in subdirs {
        visit_dirs(project_root, &sub, flagged)?;
    }
    Ok(())
}

fn push_rel(project_root: &Path, dir: &Path, flagged: &mut Vec<String>) {
    let rel = dir.strip_prefix(project_root).unwrap_or(dir);
    let rel_str = rel.to_string_lossy().replace('\\', "/");
    if !rel_str.is_empty() {
        flagged.push(rel_str);
    }
}
