//! collection of parsed configuration files (syntax tree and path to source file)
//!
//! [ConfigFiles] keeps files in the order they were inserted. Directory loading walks the
//! tree in lexical file name order so the same project always yields the same sequence.
//!
//! Two syntaxes are recognized:
//! - `*.tf`: native syntax, parsed with [hcl_edit]
//! - `*.tf.json`: JSON syntax, kept as a [serde_json::Value] until the block model is built
use std::path::{Path, PathBuf};

/// Syntax tree of a single file
#[derive(Debug, Clone)]
pub enum Syntax {
    Native(hcl::Body),
    Json(serde_json::Value),
}

#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub source: Source,
    pub syntax: Syntax,
}

#[derive(Default, Debug)]
pub struct ConfigFiles {
    files: Vec<ConfigFile>,
}

impl ConfigFiles {
    /// Inserts a parsed file
    pub fn insert(&mut self, syntax: Syntax, path: impl Into<Option<PathBuf>>) {
        self.files.push(ConfigFile {
            source: path.into(),
            syntax,
        });
    }

    pub fn files(&self) -> impl Iterator<Item = &ConfigFile> {
        self.files.iter()
    }

    pub fn source_count(&self) -> usize {
        self.files.len()
    }
}

impl ConfigFiles {
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents =
            std::fs::read_to_string(file_path).map_err(|source| LoadError::Io {
                path: file_path.to_owned(),
                source,
            })?;

        let syntax = match SyntaxKind::of(file_path) {
            Some(SyntaxKind::Json) => {
                let value = serde_json::from_str(&file_contents).map_err(|source| {
                    LoadError::JsonParseFailed {
                        path: file_path.to_owned(),
                        source,
                    }
                })?;
                Syntax::Json(value)
            }
            _ => {
                let body = hcl_edit::parser::parse_body(&file_contents).map_err(|source| {
                    LoadError::HclParseFailed {
                        path: file_path.to_owned(),
                        source,
                    }
                })?;
                Syntax::Native(body.into())
            }
        };

        self.insert(syntax, Some(file_path.to_owned()));
        Ok(())
    }

    /// Recursively loads every recognized file below `dir_path`
    ///
    /// Hidden directories (such as `.terraform`) are skipped.
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<(), LoadError> {
        let mut any_files_loaded = false;

        let walker = walkdir::WalkDir::new(dir_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        for dir_entry in walker {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type().is_file() {
                continue;
            }

            if SyntaxKind::of(dir_entry.path()).is_none() {
                tracing::trace!(path=%dir_entry.path().display(), "skipping file");
                continue;
            }

            self.load_file(dir_entry.path())?;
            any_files_loaded = true;
        }

        if !any_files_loaded {
            return Err(LoadError::NoFilesFound(dir_path.to_owned()));
        }

        Ok(())
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SyntaxKind {
    Native,
    Json,
}

impl SyntaxKind {
    fn of(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_string_lossy();
        if file_name.ends_with(".tf.json") {
            Some(SyntaxKind::Json)
        } else if file_name.ends_with(".tf") {
            Some(SyntaxKind::Native)
        } else {
            None
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No configuration files found in {}", .0.display())]
    NoFilesFound(PathBuf),
    #[error("Unable to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to walk directory")]
    Walk(#[from] walkdir::Error),
    #[error("Unable to parse {}: {source}", path.display())]
    HclParseFailed {
        path: PathBuf,
        #[source]
        source: hcl_edit::parser::Error,
    },
    #[error("Unable to parse {}: {source}", path.display())]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<hcl::Body> for ConfigFiles {
    fn from(value: hcl::Body) -> Self {
        let mut files = ConfigFiles::default();
        files.insert(Syntax::Native(value), None);
        files
    }
}

/// Utility macro to create [ConfigFiles] from native syntax
///
/// Create from a single document
/// ```
/// # use pennywise::config_files;
/// config_files!(r#"variable "region" {}"#);
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use pennywise::config_files;
/// config_files! {
///   "one.tf" => "locals { one = 1 }",
///   "two.tf" => "locals { two = 2 }"
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use pennywise::config_files;
/// config_files!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! config_files {
    // single document without source
    { $expr:expr } => {
        $crate::config_files::ConfigFiles::from(
            hcl::Body::from(hcl_edit::parser::parse_body($expr).expect("body must parse"))
        )
    };
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {
        {
            let mut files = $crate::config_files::ConfigFiles::default();
            $(
                files.insert(
                    $crate::config_files::Syntax::Native(
                        hcl::Body::from(hcl_edit::parser::parse_body($expr).expect("body must parse"))
                    ),
                    Some(std::path::PathBuf::from($source)),
                );
            )+

            files
        }
    };
}

pub type Source = Option<PathBuf>;
