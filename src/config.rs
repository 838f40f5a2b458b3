use std::net::SocketAddr;
use std::path::PathBuf;

use crate::backend::process::{BackendCommand, SpawnError};

/// Default websocket listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

/// Default route that accepts websocket upgrades.
pub const DEFAULT_ROUTE: &str = "/python";

/// Default backend command line.
pub const DEFAULT_BACKEND: &str = "pyls -v";

/// Runtime settings for the bridge server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the websocket listener binds to.
    pub listen: SocketAddr,
    /// Route that accepts websocket upgrades; all other paths are rejected.
    pub route: String,
    /// Command used to launch one backend process per connection.
    pub backend: BackendCommand,
    /// Origins allowed to connect. Empty means any origin is accepted.
    pub allowed_origins: Vec<String>,
}

/// Resolves the listen address from the CLI flag, the LSP_WS_LISTEN
/// environment variable, or the default, in that order.
pub fn resolve_listen(
    flag: Option<&str>,
    env: Option<&str>,
) -> Result<SocketAddr, std::net::AddrParseError> {
    flag.or(env).unwrap_or(DEFAULT_LISTEN).parse()
}

/// Resolves the backend command from the CLI flag, the LSP_WS_BACKEND
/// environment variable, or the default, in that order.
pub fn resolve_backend(flag: Option<&str>, env: Option<&str>) -> Result<BackendCommand, SpawnError> {
    BackendCommand::parse(flag.or(env).unwrap_or(DEFAULT_BACKEND))
}

/// Returns the path to the data directory for lsp-ws-bridge.
/// Uses $XDG_DATA_HOME/lsp-ws-bridge if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/lsp-ws-bridge,
/// or ./lsp-ws-bridge if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("lsp-ws-bridge.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("lsp-ws-bridge")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/lsp-ws-bridge"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.local/share/lsp-ws-bridge"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./lsp-ws-bridge"));
    }

    #[test]
    fn resolve_listen_prefers_flag_over_env() {
        let addr = resolve_listen(Some("0.0.0.0:4000"), Some("127.0.0.1:5000")).unwrap();
        assert_eq!(addr, "0.0.0.0:4000".parse().unwrap());
    }

    #[test]
    fn resolve_listen_falls_back_to_env_then_default() {
        let addr = resolve_listen(None, Some("127.0.0.1:5000")).unwrap();
        assert_eq!(addr, "127.0.0.1:5000".parse().unwrap());

        let addr = resolve_listen(None, None).unwrap();
        assert_eq!(addr, DEFAULT_LISTEN.parse().unwrap());
    }

    #[test]
    fn resolve_listen_rejects_garbage() {
        assert!(resolve_listen(Some("not-an-address"), None).is_err());
    }

    #[test]
    fn resolve_backend_splits_command_line() {
        let command = resolve_backend(Some("pylsp --check-parent-process"), None).unwrap();
        assert_eq!(command.program, "pylsp");
        assert_eq!(command.args, vec!["--check-parent-process"]);
    }

    #[test]
    fn resolve_backend_defaults_to_pyls() {
        let command = resolve_backend(None, None).unwrap();
        assert_eq!(command.program, "pyls");
        assert_eq!(command.args, vec!["-v"]);
    }
}
