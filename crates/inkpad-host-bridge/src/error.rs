use miette::Diagnostic;
use thiserror::Error;

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("could not reach host at {endpoint}")]
    #[diagnostic(
        code(inkpad::bridge::connect),
        help("set INKPAD_HOST_ENDPOINT to the address the host listens on")
    )]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("host channel i/o failed")]
    #[diagnostic(code(inkpad::bridge::io))]
    Io(#[from] std::io::Error),

    #[error("host channel closed")]
    #[diagnostic(code(inkpad::bridge::closed))]
    Closed,

    #[error("host sent no capabilities within {0} ms")]
    #[diagnostic(code(inkpad::bridge::handshake_timeout))]
    HandshakeTimeout(u64),

    #[error("malformed frame: {0}")]
    #[diagnostic(code(inkpad::bridge::codec))]
    Codec(#[from] serde_json::Error),
}
