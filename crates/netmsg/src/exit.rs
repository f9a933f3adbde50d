use std::fmt;

use netmsg::demo::RoundTripError;
use netmsg::message::MessageError;
use netmsg::stream::StreamError;

// Process exit codes. 60 and 64 follow the sysexits data/usage meanings.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn message_error(context: &str, err: MessageError) -> CliError {
    let code = match err {
        MessageError::InvalidType(_) | MessageError::TypeOutOfRange { .. } => USAGE,
        MessageError::EmptyBlock | MessageError::BlockAlreadyAttached { .. } => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn stream_error(context: &str, err: StreamError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn round_trip_error(context: &str, err: RoundTripError) -> CliError {
    match err {
        RoundTripError::Message(err) => message_error(context, err),
        RoundTripError::Stream(err) => stream_error(context, err),
        RoundTripError::Release(err) => message_error(context, err.error),
    }
}
