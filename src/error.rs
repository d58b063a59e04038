use core::fmt;

/// Result alias for `bico`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the BICO engine and its building blocks.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid engine configuration.
    InvalidConfig {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// Point dimension does not match the engine dimension.
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// A point component is NaN or infinite.
    NonFiniteInput {
        /// Index of the first offending component.
        index: usize,
    },

    /// Centroid requested on a clustering feature that summarizes no points.
    UndefinedCentroid,

    /// The bootstrap buffer has no strictly positive pairwise distance.
    DegenerateBuffer {
        /// Number of points in the buffer when the bootstrap was attempted.
        buffered: usize,
    },

    /// Internal bookkeeping is inconsistent. Indicates a bug.
    InternalInvariantViolation(String),

    /// A previous rebuild failed; the engine must not be reused.
    Poisoned,

    /// Input was empty.
    EmptyInput,

    /// Invalid number of clusters requested.
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of weighted points available.
        n_items: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig { name, message } => {
                write!(f, "invalid config '{name}': {message}")
            }
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::NonFiniteInput { index } => {
                write!(f, "non-finite component at index {index}")
            }
            Error::UndefinedCentroid => write!(f, "centroid of an empty clustering feature"),
            Error::DegenerateBuffer { buffered } => write!(
                f,
                "all {buffered} buffered points coincide; cannot derive an initial threshold"
            ),
            Error::InternalInvariantViolation(msg) => {
                write!(f, "internal invariant violated: {msg}")
            }
            Error::Poisoned => write!(f, "engine poisoned by a failed rebuild"),
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::InvalidClusterCount { requested, n_items } => {
                write!(f, "cannot create {requested} clusters from {n_items} items")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
