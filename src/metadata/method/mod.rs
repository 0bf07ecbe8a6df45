//! Method bodies: headers, instruction streams and exception handling sections.
//!
//! # Example
//!
//! ```rust
//! use dotcodec::metadata::{method::{EncodeOptions, MethodBody}, streams::UserStrings};
//!
//! let mut strings = UserStrings::new();
//! let body = MethodBody::read(&[0x0A, 0x02, 0x2A], &strings)?; // ldarg.0, ret
//! assert_eq!(body.max_stack, 8);
//! assert_eq!(body.write(&mut strings, &EncodeOptions::default())?, [0x0A, 0x02, 0x2A]);
//! # Ok::<(), dotcodec::Error>(())
//! ```

mod body;
mod exceptions;
mod types;

pub use body::{MethodBody, FAT_HEADER_SIZE, TINY_CODE_LIMIT, TINY_MAX_STACK};
pub use exceptions::{
    ExceptionClause, ExceptionClauseKind, ExceptionHandlerFlags, FAT_CLAUSE_SIZE,
    SMALL_CLAUSE_SIZE,
};
pub use types::{
    EncodeOptions, HeaderFormat, MethodBodyFlags, SectionFlags, UserStringEncoder,
    UserStringResolver,
};
