use std::ffi::OsStr;
use std::future::Future;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use loadtest::server::{ServerConfig, TargetServer};
use loadtest::shutdown::{ShutdownSender, shutdown_channel};

/// Upper bound for every wait in the end-to-end tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives `future` on a fresh multi-threaded runtime.
///
/// # Errors
///
/// Returns an error if the runtime cannot be built or the future fails.
pub fn run_async<F>(future: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|err| format!("build runtime failed: {}", err))?;
    runtime.block_on(future)
}

/// Reserves a loopback port and releases it for the caller to bind.
///
/// # Errors
///
/// Returns an error if no port can be reserved.
pub fn free_addr() -> Result<SocketAddr, String> {
    let listener =
        TcpListener::bind("127.0.0.1:0").map_err(|err| format!("reserve port failed: {}", err))?;
    listener
        .local_addr()
        .map_err(|err| format!("reserved addr failed: {}", err))
}

/// Starts an in-process target server on an ephemeral loopback port.
///
/// # Errors
///
/// Returns an error if the server cannot bind.
pub async fn start_target(ping_latency: Duration) -> Result<(SocketAddr, ShutdownSender), String> {
    let listen = "127.0.0.1:0"
        .parse()
        .map_err(|err| format!("bad listen addr: {}", err))?;
    let server = TargetServer::bind(ServerConfig::new(listen, ping_latency))
        .await
        .map_err(|err| format!("bind target failed: {}", err))?;
    let addr = server.local_addr();
    let (shutdown_tx, _) = shutdown_channel();
    tokio::spawn(server.serve(shutdown_tx.clone()));
    Ok((addr, shutdown_tx))
}

/// Child process killed when dropped.
pub struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        drop(self.0.kill());
        drop(self.0.wait());
    }
}

/// Starts `loadtest server` as a child process and waits until it accepts
/// connections.
///
/// # Errors
///
/// Returns an error if the binary cannot be spawned or never listens.
pub fn spawn_server_process(addr: SocketAddr) -> Result<ChildGuard, String> {
    let child = Command::new(loadtest_bin()?)
        .args(["server", "--listen", &addr.to_string(), "--ping-latency", "1ms"])
        .env("RUST_LOG", "error")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| format!("spawn server failed: {}", err))?;
    let guard = ChildGuard(child);

    let started = Instant::now();
    while TcpStream::connect(addr).is_err() {
        if started.elapsed() > TEST_TIMEOUT {
            return Err(format!("server never listened on {}", addr));
        }
        thread::sleep(Duration::from_millis(20));
    }
    Ok(guard)
}

/// Runs the `loadtest` binary and captures its output.
///
/// # Errors
///
/// Returns an error if the binary cannot be executed.
pub fn run_loadtest<I, S>(args: I, auth: &str) -> Result<Output, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(loadtest_bin()?)
        .args(args)
        .env("RUST_LOG", "error")
        .env("AUTH", auth)
        .output()
        .map_err(|err| format!("run loadtest failed: {}", err))
}

fn loadtest_bin() -> Result<String, String> {
    option_env!("CARGO_BIN_EXE_loadtest").map_or_else(
        || Err("CARGO_BIN_EXE_loadtest missing at compile time.".to_owned()),
        |path| Ok(path.to_owned()),
    )
}
