use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for preprocessing operations
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// IO error when reading sources or writing output
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Input file not found
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// The template-locals extractor could not be resolved
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A match or a line/column lookup lacked an offset it must have
    #[error("BUG: missing offset: {context}")]
    MissingOffset { context: String },

    /// Two edits on the overwrite buffer address overlapping ranges
    #[error("Overlapping edit at {start}..{end}")]
    OverlappingEdit { start: usize, end: usize },

    /// An edit addresses a range outside the source or splits a character
    #[error("Invalid edit range {start}..{end} for source of {len} bytes")]
    InvalidRange { start: usize, end: usize, len: usize },

    /// Malformed embedded template found while scanning
    #[error("Template parsing error in {path} at {line}:{column}: {message}")]
    TemplateParse {
        path: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// Regex compilation error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Directory traversal error (gitignore-aware walker)
    #[error("Directory traversal error: {0}")]
    Walk(#[from] ignore::Error),

    /// Directory traversal error (plain walker)
    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Invalid exclude glob
    #[error("Glob error: {0}")]
    Glob(#[from] globset::Error),

    /// Source map generation error
    #[error("Source map error: {0}")]
    SourceMap(#[from] sourcemap::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PreprocessError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn missing_offset(context: impl Into<String>) -> Self {
        Self::MissingOffset {
            context: context.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PreprocessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PreprocessError::FileNotFound {
            path: PathBuf::from("/app/components/foo.gjs"),
        };
        assert_eq!(format!("{err}"), "File not found: /app/components/foo.gjs");

        let err = PreprocessError::configuration("no module named 'x'");
        assert_eq!(format!("{err}"), "Configuration error: no module named 'x'");

        let err = PreprocessError::missing_offset("expected match to have an index");
        assert_eq!(
            format!("{err}"),
            "BUG: missing offset: expected match to have an index"
        );

        let err = PreprocessError::OverlappingEdit { start: 3, end: 9 };
        assert_eq!(format!("{err}"), "Overlapping edit at 3..9");

        let err = PreprocessError::TemplateParse {
            path: "foo.gjs".to_string(),
            line: 2,
            column: 5,
            message: "unclosed <template>".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Template parsing error in foo.gjs at 2:5: unclosed <template>"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        let err: PreprocessError = io_err.into();
        assert!(matches!(err, PreprocessError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: PreprocessError = json_err.into();
        assert!(matches!(err, PreprocessError::Json(_)));
    }
}
