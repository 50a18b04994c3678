use crate::error::{PreprocessError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Extensions picked up when walking a directory
pub const DEFAULT_EXTENSIONS: &[&str] = &["js", "ts", "gjs", "gts"];

/// How directory inputs are expanded into source files
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Directory that exclude globs and relative paths are resolved against
    pub base_dir: PathBuf,
    /// File extensions (without the dot) to include
    pub extensions: Vec<String>,
    /// Paths matching this set are skipped
    pub exclude: Option<GlobSet>,
    /// Honour `.gitignore` and skip hidden files
    pub use_gitignore: bool,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            exclude: None,
            use_gitignore: true,
        }
    }
}

impl WalkConfig {
    fn accepts(&self, path: &Path) -> bool {
        let has_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext));

        let excluded = self.exclude.as_ref().is_some_and(|set| {
            set.is_match(path.strip_prefix(&self.base_dir).unwrap_or(path))
        });

        has_extension && !excluded
    }
}

/// Reads the contents of a file at the given path
///
/// # Errors
///
/// - `PreprocessError::FileNotFound` if the path doesn't exist or isn't a file.
/// - `PreprocessError::Io` if there's an error reading the file.
pub fn read_file_contents(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(PreprocessError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    fs::read_to_string(path).map_err(std::convert::Into::into)
}

/// Compiles exclude patterns into a single matcher
///
/// # Errors
///
/// Returns `PreprocessError::Glob` for an invalid pattern.
pub fn build_exclude_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

/// Expands files and directories into a sorted, de-duplicated list of
/// source files. Files named explicitly are kept regardless of extension.
///
/// # Errors
///
/// - `PreprocessError::FileNotFound` if an input doesn't exist.
/// - `PreprocessError::Walk` / `PreprocessError::WalkDir` on traversal errors.
pub fn collect_sources(inputs: &[PathBuf], config: &WalkConfig) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();

    for input in inputs {
        if input.is_file() {
            sources.push(input.clone());
        } else if input.is_dir() {
            if config.use_gitignore {
                let walker = ignore::WalkBuilder::new(input)
                    .hidden(true)
                    .git_ignore(true)
                    .require_git(false)
                    .build();
                for entry in walker {
                    let entry = entry?;
                    let path = entry.path();
                    if entry.file_type().is_some_and(|t| t.is_file()) && config.accepts(path) {
                        sources.push(path.to_path_buf());
                    }
                }
            } else {
                for entry in walkdir::WalkDir::new(input) {
                    let entry = entry?;
                    let path = entry.path();
                    if entry.file_type().is_file() && config.accepts(path) {
                        sources.push(path.to_path_buf());
                    }
                }
            }
        } else {
            return Err(PreprocessError::FileNotFound {
                path: input.clone(),
            });
        }
    }

    sources.sort();
    sources.dedup();
    Ok(sources)
}

/// Path of `path` relative to `base_dir` with `/` separators. Paths
/// outside `base_dir` keep their components without the root.
#[must_use]
pub fn relative_path(path: &Path, base_dir: &Path) -> String {
    let relative = path.strip_prefix(base_dir).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            Component::ParentDir => Some("..".into()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Where the output for `relative` goes under `out_dir`
#[must_use]
pub fn output_path(out_dir: &Path, relative: &str) -> PathBuf {
    out_dir.join(relative.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(dir: &Path) -> WalkConfig {
        WalkConfig {
            base_dir: dir.to_path_buf(),
            ..WalkConfig::default()
        }
    }

    #[test]
    fn test_read_file_contents() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("a.gjs");

        fs::write(&file_path, "<template>hi</template>").unwrap();
        assert_eq!(
            read_file_contents(&file_path).unwrap(),
            "<template>hi</template>"
        );

        let missing = temp_dir.path().join("missing.gjs");
        assert!(matches!(
            read_file_contents(&missing),
            Err(PreprocessError::FileNotFound { .. })
        ));

        let dir_path = temp_dir.path().join("dir");
        fs::create_dir(&dir_path).unwrap();
        assert!(matches!(
            read_file_contents(&dir_path),
            Err(PreprocessError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_collect_sources_filters_extensions() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::create_dir_all(base.join("app/components")).unwrap();
        fs::write(base.join("app/components/a.gjs"), "").unwrap();
        fs::write(base.join("app/components/b.gts"), "").unwrap();
        fs::write(base.join("app/components/c.hbs"), "").unwrap();
        fs::write(base.join("app/app.js"), "").unwrap();

        let sources = collect_sources(&[base.join("app")], &config_for(base)).unwrap();
        let names: Vec<String> = sources.iter().map(|p| relative_path(p, base)).collect();
        assert_eq!(
            names,
            vec!["app/app.js", "app/components/a.gjs", "app/components/b.gts"]
        );
    }

    #[test]
    fn test_collect_sources_respects_gitignore_and_excludes() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::create_dir_all(base.join("dist")).unwrap();
        fs::create_dir_all(base.join("src")).unwrap();
        fs::write(base.join(".gitignore"), "dist/\n").unwrap();
        fs::write(base.join("dist/out.js"), "").unwrap();
        fs::write(base.join("src/keep.gjs"), "").unwrap();
        fs::write(base.join("src/skip.test.gjs"), "").unwrap();

        let mut config = config_for(base);
        config.exclude = build_exclude_set(&["**/*.test.gjs".to_string()]).unwrap();

        let sources = collect_sources(&[base.to_path_buf()], &config).unwrap();
        let names: Vec<String> = sources.iter().map(|p| relative_path(p, base)).collect();
        assert_eq!(names, vec!["src/keep.gjs"]);

        config.use_gitignore = false;
        let sources = collect_sources(&[base.to_path_buf()], &config).unwrap();
        let names: Vec<String> = sources.iter().map(|p| relative_path(p, base)).collect();
        assert_eq!(names, vec!["dist/out.js", "src/keep.gjs"]);
    }

    #[test]
    fn test_collect_sources_explicit_file_and_missing() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let file = base.join("notes.txt");
        fs::write(&file, "").unwrap();

        let sources = collect_sources(&[file.clone(), file.clone()], &config_for(base)).unwrap();
        assert_eq!(sources, vec![file]);

        let result = collect_sources(&[base.join("nope")], &config_for(base));
        assert!(matches!(result, Err(PreprocessError::FileNotFound { .. })));
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        assert!(matches!(
            build_exclude_set(&["a[".to_string()]),
            Err(PreprocessError::Glob(_))
        ));
        assert!(build_exclude_set(&[]).unwrap().is_none());
    }

    #[test]
    fn test_relative_and_output_paths() {
        let base = Path::new("/project");
        assert_eq!(
            relative_path(Path::new("/project/app/a.gjs"), base),
            "app/a.gjs"
        );
        assert_eq!(
            output_path(Path::new("/out"), "app/a.gjs"),
            PathBuf::from("/out/app/a.gjs")
        );
    }
}
