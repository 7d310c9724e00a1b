use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StorageError {
    #[error("Failed to access rules file `{path}`")]
    #[diagnostic(
        code(georules::storage::io),
        help("Check that the rules file and its directory are readable and writable")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(georules::storage::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    #[error("Invalid rules document: {0}")]
    #[diagnostic(
        code(georules::storage::invalid_document),
        help("Rule syntax: rule \"workspace\" layer=\"layer\" method=\"r|w|a\" {{ - \"ROLE\" }}")
    )]
    InvalidDocument(String),

    #[error("Rule storage unavailable: {0}")]
    #[diagnostic(code(georules::storage::unavailable))]
    Unavailable(String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(georules::rules::invalid_argument),
        help("A rule needs a non-empty workspace, a method in (r, w, a) and at least one role")
    )]
    InvalidArgument(String),

    #[error("Rule {path} already exists")]
    #[diagnostic(code(georules::rules::exists))]
    RuleExists { path: String },

    #[error("Rule {path} does not exist")]
    #[diagnostic(code(georules::rules::not_exists))]
    RuleNotExists { path: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(#[from] StorageError),
}
