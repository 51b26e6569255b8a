//! CLI-specific error types and exit code mapping

use authwatch_core::error::AuthWatchError;
use authwatch_rpc::RpcError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Cannot connect to the server.
    #[error("server not reachable: {0}")]
    ServerUnavailable(String),

    /// The server answered, but the call failed.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from authwatch-core.
    #[error("{0}")]
    Core(#[from] AuthWatchError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                  |
    /// |------|--------------------------|
    /// | 0    | Success                  |
    /// | 1    | General / command error  |
    /// | 2    | Configuration error      |
    /// | 3    | Server unreachable       |
    /// | 10   | IO error                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::ServerUnavailable(_) => 3,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Rpc(_) | Self::Core(_) => 1,
        }
    }
}

impl From<RpcError> for CliError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Config { .. } => Self::Config(e.to_string()),
            e if e.is_unreachable() => Self::ServerUnavailable(e.to_string()),
            e => Self::Rpc(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_server_unavailable() {
        let err = CliError::ServerUnavailable("connection refused".to_owned());
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        assert_eq!(CliError::Io(io_err).exit_code(), 10);
    }

    #[test]
    fn test_exit_code_command_and_rpc_errors() {
        assert_eq!(CliError::Command("failed".to_owned()).exit_code(), 1);
        assert_eq!(CliError::Rpc("remote error".to_owned()).exit_code(), 1);
    }

    #[test]
    fn test_from_rpc_transport_is_unavailable() {
        let err: CliError = RpcError::Transport("connection refused".to_owned()).into();
        assert!(matches!(err, CliError::ServerUnavailable(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_from_rpc_config_is_config() {
        let err: CliError = RpcError::Config {
            field: "client.server_url".to_owned(),
            reason: "must start with http://".to_owned(),
        }
        .into();
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains("client.server_url"));
    }

    #[test]
    fn test_from_rpc_remote_is_rpc() {
        let err: CliError = RpcError::Remote("invalid params".to_owned()).into();
        assert!(matches!(err, CliError::Rpc(_)));
    }

    #[test]
    fn test_error_display_command() {
        let err = CliError::Command("execution failed".to_owned());
        assert_eq!(err.to_string(), "execution failed");
    }
}
