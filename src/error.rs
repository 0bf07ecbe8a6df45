use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! pdb_error {
    ($stream:expr, $msg:expr) => {
        crate::Error::Pdb {
            stream: $stream.to_string(),
            message: $msg.to_string(),
        }
    };

    ($stream:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Pdb {
            stream: $stream.to_string(),
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every codec layer returns on the first inconsistency it detects. Reading a PDB in lenient
/// mode is the exception: unknown symbol records, line subsections and OEM payloads are
/// skipped by their declared length and never surface here.
///
/// # Error Categories
///
/// ## Malformed input
/// - [`Error::Malformed`] - Structurally impossible byte sequence
/// - [`Error::OutOfBounds`] - Read beyond the end of a buffer
/// - [`Error::UnknownOpcode`] - IL stream contains an opcode with no definition
/// - [`Error::Pdb`] - Inconsistent PDB container, names the offending stream
///
/// ## Capacity
/// - [`Error::CapacityExceeded`] - A table outgrew the 24-bit row index space
///
/// ## Caller contract
/// - [`Error::TableKindCollision`] - Additional table registered over an existing kind
/// - [`Error::TablesPopulated`] - Registrations changed after rows were added
///
/// ## I/O and external errors
/// - [`Error::FileError`] - Filesystem or writer errors
/// - [`Error::GoblinErr`] - PE parsing errors from the goblin crate
///
/// # Examples
///
/// ```rust,no_run
/// use dotcodec::{Error, metadata::{read_module, ReadOptions}};
///
/// let data = std::fs::read("metadata.bin")?;
/// match read_module(&data, &ReadOptions::default()) {
///     Ok(module) => println!("{} tables", module.all_tables().count()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed metadata: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok::<(), dotcodec::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The data is damaged and could not be parsed or encoded.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading a buffer.
    ///
    /// All lengths are derived from header fields that were already read, so hitting this
    /// means the input is truncated.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// The IL stream contains an opcode that is not defined.
    ///
    /// Aborts the decode of the current method body only.
    #[error("Unknown opcode {prefix:#04x}:{opcode:#04x} at IL offset {offset:#x}")]
    UnknownOpcode {
        /// `0xFE` for two-byte opcodes, `0` otherwise
        prefix: u8,
        /// The opcode byte itself
        opcode: u8,
        /// Offset of the instruction within the code
        offset: usize,
    },

    /// A table holds more rows than a 24-bit row index can address.
    #[error("Table {table:#04x} has {rows} rows, more than the 0xFFFFFF that can be addressed")]
    CapacityExceeded {
        /// Table kind that overflowed
        table: u8,
        /// Number of rows present
        rows: usize,
    },

    /// An additional table was registered with a kind that is fixed or already taken.
    #[error("Table kind {0:#04x} is already in use")]
    TableKindCollision(u8),

    /// Additional table registrations can only change before any rows have been added.
    #[error("Tables already contain rows, registrations can no longer change")]
    TablesPopulated,

    /// The PDB container is structurally inconsistent.
    #[error("PDB stream '{stream}': {message}")]
    Pdb {
        /// Name (or number) of the stream that failed
        stream: String,
        /// What was wrong with it
        message: String,
    },

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),
}
