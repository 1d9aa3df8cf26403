use std::path::Path;
use std::process::Output;
use std::time::Duration;

/// Upper bound for any single remote git operation.
const REMOTE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("repository does not exist")]
    RepositoryNotFound,

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("invalid repository url: {0}")]
    InvalidUrl(String),

    #[error("git {command} timed out")]
    Timeout { command: &'static str },

    #[error("git {command} failed: {stderr}")]
    Command {
        command: &'static str,
        stderr: String,
    },

    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Username / password pair for HTTP(S) remotes.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Remote operations
// ---------------------------------------------------------------------------

/// List branch names on a remote, sorted.
#[tracing::instrument(skip(credentials), err)]
pub async fn ls_remote_branches(url: &str, credentials: &Credentials) -> Result<Vec<String>, GitError> {
    let remote = authenticated_url(url, credentials)?;
    let output = run_remote(
        "ls-remote",
        tokio::process::Command::new("git")
            .arg("ls-remote")
            .arg("--heads")
            .arg(&remote),
        credentials,
    )
    .await?;

    Ok(parse_ls_remote_heads(&String::from_utf8_lossy(&output.stdout)))
}

/// Shallow-clone `branch` (or the default branch) of `url` into `dest`.
#[tracing::instrument(skip(credentials), fields(dest = %dest.display()), err)]
pub async fn clone_branch(
    url: &str,
    credentials: &Credentials,
    branch: Option<&str>,
    dest: &Path,
) -> Result<(), GitError> {
    let remote = authenticated_url(url, credentials)?;
    let mut cmd = tokio::process::Command::new("git");
    cmd.arg("clone").arg("--depth").arg("1");
    if let Some(branch) = branch {
        cmd.arg("--branch").arg(branch);
    }
    cmd.arg(&remote).arg(dest);

    run_remote("clone", &mut cmd, credentials).await?;
    Ok(())
}

async fn run_remote(
    command: &'static str,
    cmd: &mut tokio::process::Command,
    credentials: &Credentials,
) -> Result<Output, GitError> {
    cmd.env("GIT_TERMINAL_PROMPT", "0").kill_on_drop(true);

    let output = tokio::time::timeout(REMOTE_TIMEOUT, cmd.output())
        .await
        .map_err(|_| GitError::Timeout { command })??;

    if output.status.success() {
        return Ok(output);
    }

    let stderr = redact(&String::from_utf8_lossy(&output.stderr), credentials);
    Err(classify_failure(command, stderr.trim()))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Embed credentials into an HTTP(S) URL. Other schemes are passed through.
pub fn authenticated_url(url: &str, credentials: &Credentials) -> Result<String, GitError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(GitError::InvalidUrl("url is empty".into()));
    }
    if url.starts_with('-') {
        return Err(GitError::InvalidUrl("url must not start with '-'".into()));
    }

    let username = credentials.username.as_deref().filter(|u| !u.is_empty());
    if !(url.starts_with("http://") || url.starts_with("https://")) || username.is_none() {
        return Ok(url.to_owned());
    }

    let mut parsed = url::Url::parse(url).map_err(|e| GitError::InvalidUrl(e.to_string()))?;
    parsed
        .set_username(username.unwrap_or_default())
        .map_err(|()| GitError::InvalidUrl("cannot set username on url".into()))?;
    parsed
        .set_password(credentials.password.as_deref())
        .map_err(|()| GitError::InvalidUrl("cannot set password on url".into()))?;
    Ok(parsed.into())
}

/// Parse `git ls-remote --heads` output (`<sha>\trefs/heads/<name>`).
pub fn parse_ls_remote_heads(stdout: &str) -> Vec<String> {
    let mut branches: Vec<String> = stdout
        .lines()
        .filter_map(|line| {
            let (_, refname) = line.split_once('\t')?;
            refname.trim().strip_prefix("refs/heads/").map(str::to_owned)
        })
        .collect();
    branches.sort();
    branches.dedup();
    branches
}

/// Map git's stderr onto a typed error.
pub fn classify_failure(command: &'static str, stderr: &str) -> GitError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("could not read password")
        || lower.contains("terminal prompts disabled")
        || lower.contains("permission denied")
    {
        GitError::AuthenticationRequired
    } else if lower.contains("repository not found")
        || lower.contains("does not appear to be a git repository")
        || lower.contains("does not exist")
        || lower.contains("not found")
    {
        GitError::RepositoryNotFound
    } else {
        GitError::Command {
            command,
            stderr: stderr.to_owned(),
        }
    }
}

fn redact(text: &str, credentials: &Credentials) -> String {
    match credentials.password.as_deref() {
        Some(password) if !password.is_empty() => text.replace(password, "***"),
        _ => text.to_owned(),
    }
}
