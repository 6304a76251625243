use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use wiremock::MockServer;

/// API base URL for a mock server.
pub fn api_url(server: &MockServer) -> String {
    format!("http://127.0.0.1:{}/api", server.address().port())
}

/// Credential store path inside an isolated directory.
pub fn store_path(dir: &Path) -> PathBuf {
    dir.join("credentials.json")
}

/// Run the CLI binary against `api` with an isolated credential store.
pub async fn run_cli(args: &[&str], dir: &Path, api: &str) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_campus"));
    cmd.args(args);
    cmd.env("CAMPUS_API_URL", api);
    cmd.env("CAMPUS_STORE", store_path(dir));
    cmd.env_remove("CAMPUS_PASSWORD");
    cmd.env_remove("RUST_LOG");
    cmd.output().await.expect("Failed to execute CLI")
}

/// Run the CLI and expect success.
pub async fn run_cli_success(args: &[&str], dir: &Path, api: &str) -> String {
    let output = run_cli(args, dir, api).await;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("CLI command failed: {:?}\nstderr: {}", args, stderr);
    }
    String::from_utf8_lossy(&output.stdout).to_string()
}
