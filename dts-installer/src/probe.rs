use std::net::{SocketAddr, TcpStream};
use std::process::Command;
use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::error::{io_err, InstallError};
use crate::paths::BINARY_NAME;

const PORT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const PKILL_SETTLE: Duration = Duration::from_secs(2);

/// Read-mostly view of the host: ports and server processes.
pub trait HostProbe {
    fn port_in_use(&self, port: u16) -> bool;

    /// `lsof` description of whatever holds `port`.
    fn port_owner(&self, port: u16) -> Option<String>;

    /// Running server processes, one `pid command` line each.
    fn server_processes(&self) -> Vec<String>;

    fn stop_server_processes(&self);

    /// Whether the server answers on `port` at the RPC level.
    fn server_responds(&self, port: u16) -> bool;
}

/// [`HostProbe`] backed by the real network stack and `lsof`/`pgrep`/`pkill`.
pub struct SystemProbe {
    runtime: Runtime,
}

impl SystemProbe {
    pub fn new() -> Result<Self, InstallError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| io_err("tokio runtime", e))?;
        Ok(Self { runtime })
    }
}

impl HostProbe for SystemProbe {
    fn port_in_use(&self, port: u16) -> bool {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        TcpStream::connect_timeout(&addr, PORT_CONNECT_TIMEOUT).is_ok()
    }

    fn port_owner(&self, port: u16) -> Option<String> {
        let output = Command::new("lsof")
            .args(["-nP", &format!("-iTCP:{port}"), "-sTCP:LISTEN"])
            .output()
            .ok()?;
        let text = String::from_utf8_lossy(&output.stdout);
        let owner = text.lines().skip(1).collect::<Vec<_>>().join("\n");
        (!owner.trim().is_empty()).then_some(owner)
    }

    fn server_processes(&self) -> Vec<String> {
        let Ok(output) = Command::new("pgrep").args(["-fl", BINARY_NAME]).output() else {
            return Vec::new();
        };
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn stop_server_processes(&self) {
        match Command::new("pkill").args(["-f", BINARY_NAME]).status() {
            Ok(status) if status.success() => {
                tracing::info!("stopped stray server processes");
                thread::sleep(PKILL_SETTLE);
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "pkill unavailable"),
        }
    }

    fn server_responds(&self, port: u16) -> bool {
        self.runtime.block_on(dts_grpc::is_server_running(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn listening_port_is_in_use() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let probe = SystemProbe::new().expect("probe");

        assert!(probe.port_in_use(port));
        drop(listener);
        assert!(!probe.port_in_use(port));
    }

    #[test]
    fn closed_port_does_not_respond() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let probe = SystemProbe::new().expect("probe");
        assert!(!probe.server_responds(port));
    }
}
