//! Shared fixtures for unit tests: throwaway git repositories.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Run git in `dir`, panicking on failure, and return stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git").args(args).current_dir(dir).output().unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Create `<temp>/repo` with one commit on `main` containing README.md.
pub fn setup_test_repo() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let repo_path = temp.path().join("repo");
    std::fs::create_dir(&repo_path).unwrap();

    git(&repo_path, &["init"]);
    git(&repo_path, &["config", "user.email", "test@test.com"]);
    git(&repo_path, &["config", "user.name", "Test"]);

    std::fs::write(repo_path.join("README.md"), "# Test\n").unwrap();
    git(&repo_path, &["add", "."]);
    git(&repo_path, &["commit", "-m", "Initial commit"]);
    git(&repo_path, &["branch", "-M", "main"]);

    (temp, repo_path)
}

/// Attach a bare repository as remote `origin` and return its path.
pub fn add_bare_remote(temp: &TempDir, repo_path: &Path) -> PathBuf {
    let remote = temp.path().join("remote.git");
    git(temp.path(), &["init", "--bare", "remote.git"]);
    git(repo_path, &["remote", "add", "origin", remote.to_str().unwrap()]);
    remote
}

/// Accept one HTTP request on `listener`, answer with `status_line`, and
/// return the raw request text.
pub async fn serve_once(listener: tokio::net::TcpListener, status_line: &str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (mut socket, _) = listener.accept().await.unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let body_len = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .map(|v| v.trim().parse::<usize>().unwrap())
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + body_len {
            break;
        }
    }

    let response = format!("{}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status_line);
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.shutdown().await.ok();
    String::from_utf8_lossy(&buf).to_string()
}

/// JSON body of a raw HTTP request.
pub fn request_body(request: &str) -> serde_json::Value {
    let body = request.split("\r\n\r\n").nth(1).unwrap();
    serde_json::from_str(body).unwrap()
}
