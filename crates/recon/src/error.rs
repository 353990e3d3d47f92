use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// Unknown entity-kind tag.
    InvalidEntityKind(String),
    /// A record was handed to the entry point of another entity kind.
    EntityKindMismatch { expected: String, found: String },
    /// A required argument was empty.
    MissingArgument(&'static str),
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config or rules-file validation error.
    ConfigValidation(String),
    /// Rule store read or write failure.
    RuleStore(String),
    /// Record loading failure (CSV / JSON).
    RecordParse { line: usize, message: String },
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEntityKind(tag) => write!(f, "invalid entity kind: '{tag}'"),
            Self::EntityKindMismatch { expected, found } => {
                write!(f, "expected {expected} record, found {found}")
            }
            Self::MissingArgument(name) => write!(f, "missing required argument: {name}"),
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::RuleStore(msg) => write!(f, "rule store error: {msg}"),
            Self::RecordParse { line, message } => {
                write!(f, "record {line}: {message}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

impl From<std::io::Error> for ReconError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
