//! Core helpers: file name parsing, quiet stdout, tracing setup

pub mod filename;
pub mod quiet;
pub mod tracing;

pub use crate::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use filename::{
    DEFAULT_TRYOUT_MARKER, FileNameError, ParsedFileName, file_name_split, parse_date_and_kind,
    reformat_file_name, split_name_components,
};
pub use quiet::{QuietStdout, with_quiet_stdout};
