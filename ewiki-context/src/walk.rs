//! Directory traversal for indexing.
//!
//! Finds the files under a collection root that the chunker should read. Only
//! files whose extension is on the allow-list below are returned; everything
//! else (build output, images, archives) is skipped silently.
//!
//! Results are sorted by path so that repeated builds over an unchanged tree
//! produce chunks in the same order.
use ignore::WalkBuilder;
use std::io;
use std::path::{Path, PathBuf};

/// Source code extensions.
pub const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "java", "cpp", "c", "h", "hpp", "go", "rs", "jsx", "tsx", "html", "css",
    "php", "swift", "cs",
];

/// Plain-text document extensions.
pub const DOC_EXTENSIONS: &[&str] = &["md", "txt", "rst", "json", "yaml", "yml", "xml", "csv"];

/// Binary document formats. These are chunked like any other file, with
/// undecodable bytes dropped.
pub const BINARY_DOC_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx"];

/// Returns `true` if the file's extension is on the allow-list (case-insensitive).
pub fn is_supported_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    CODE_EXTENSIONS
        .iter()
        .chain(DOC_EXTENSIONS)
        .chain(BINARY_DOC_EXTENSIONS)
        .any(|&allowed| allowed == ext)
}

/// Traversal switches left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalkOptions {
    /// Descend into and return dot-files and dot-directories.
    pub include_hidden: bool,
    /// Honour `.gitignore`, `.ignore` and `.git/info/exclude` files.
    pub respect_gitignore: bool,
}

impl WalkOptions {
    pub fn with_include_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    pub fn with_respect_gitignore(mut self, respect_gitignore: bool) -> Self {
        self.respect_gitignore = respect_gitignore;
        self
    }
}

/// Collects every supported file under `root`, sorted by path.
///
/// If `root` is itself a file it is returned as the only input, whatever its
/// extension.
///
/// # Errors
/// [`io::ErrorKind::NotFound`] if `root` does not exist. Entries that cannot be
/// read during the walk are logged and skipped.
pub fn collect_files(root: &Path, options: WalkOptions) -> io::Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(root)?;
    if metadata.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .hidden(!options.include_hidden)
        .git_ignore(options.respect_gitignore)
        .git_exclude(options.respect_gitignore)
        .ignore(options.respect_gitignore)
        .require_git(false)
        .follow_links(false);

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        if is_supported_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    tracing::debug!("Found {} indexable files under {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, relative: &str) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "content\n").unwrap();
    }

    fn relative_names(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_allow_list_is_case_insensitive() {
        assert!(is_supported_file(Path::new("src/main.rs")));
        assert!(is_supported_file(Path::new("README.MD")));
        assert!(is_supported_file(Path::new("report.Pdf")));
        assert!(!is_supported_file(Path::new("image.png")));
        assert!(!is_supported_file(Path::new("Makefile")));
    }

    #[test]
    fn test_collect_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.py");
        touch(dir.path(), "a/z.md");
        touch(dir.path(), "a/skip.bin");
        touch(dir.path(), "c.txt");

        let files = collect_files(dir.path(), WalkOptions::default()).unwrap();
        assert_eq!(
            relative_names(dir.path(), &files),
            vec!["a/z.md", "b.py", "c.txt"]
        );
    }

    #[test]
    fn test_hidden_files_are_opt_in() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "visible.rs");
        touch(dir.path(), ".hidden/secret.rs");
        touch(dir.path(), ".dotfile.md");

        let default = collect_files(dir.path(), WalkOptions::default()).unwrap();
        assert_eq!(relative_names(dir.path(), &default), vec!["visible.rs"]);

        let all =
            collect_files(dir.path(), WalkOptions::default().with_include_hidden(true)).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_gitignore_is_opt_in() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "generated/\n").unwrap();
        touch(dir.path(), "generated/out.json");
        touch(dir.path(), "kept.json");

        let everything = collect_files(dir.path(), WalkOptions::default()).unwrap();
        assert_eq!(everything.len(), 2);

        let filtered = collect_files(
            dir.path(),
            WalkOptions::default().with_respect_gitignore(true),
        )
        .unwrap();
        assert_eq!(relative_names(dir.path(), &filtered), vec!["kept.json"]);
    }

    #[test]
    fn test_file_root_is_sole_input() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.unknown");
        fs::write(&file, "x").unwrap();

        let files = collect_files(&file, WalkOptions::default()).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = collect_files(&dir.path().join("nope"), WalkOptions::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
