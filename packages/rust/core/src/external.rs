//! External collaborators: source sync, press kit, site generator.
//!
//! Tool availability is probed once into a [`Toolchain`]; the orchestrator
//! decides per step whether a missing tool skips the step or fails the run.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use gregory_shared::{GregoryError, Result, SiteMode};

/// An external program found on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfo {
    pub program: String,
    pub version: String,
}

/// Tools detected at startup.
#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    pub git: Option<ToolInfo>,
    pub generator: Option<ToolInfo>,
}

impl Toolchain {
    /// Probe `git --version` and `<generator> version`.
    pub async fn probe(generator: &str) -> Self {
        let (git, generator) = tokio::join!(
            probe_tool("git", &["--version"]),
            probe_tool(generator, &["version"]),
        );
        let toolchain = Self { git, generator };
        debug!(?toolchain, "toolchain probed");
        toolchain
    }
}

async fn probe_tool(program: &str, args: &[&str]) -> Option<ToolInfo> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;
    match output {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            info!(program, %version, "tool found");
            Some(ToolInfo {
                program: program.to_string(),
                version,
            })
        }
        Ok(output) => {
            warn!(program, status = %output.status, "tool probe exited unsuccessfully");
            None
        }
        Err(e) => {
            warn!(program, error = %e, "tool not found");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Invocations
// ---------------------------------------------------------------------------

/// `git -C <dir> pull`.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub async fn git_pull(git: &ToolInfo, dir: &Path) -> Result<()> {
    let mut cmd = Command::new(&git.program);
    cmd.arg("-C").arg(dir).arg("pull");
    run_to_completion("git", cmd).await
}

/// Run the press-kit argv in the Gregory directory.
#[instrument(skip_all, fields(program = ?argv.first()))]
pub async fn run_presskit(argv: &[String], dir: &Path) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        return Err(GregoryError::external("presskit", "empty command"));
    };
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(dir);
    run_to_completion("presskit", cmd).await
}

/// Arguments for the site generator in `mode`.
pub fn generator_args(mode: SiteMode, website_path: &Path) -> Vec<PathBuf> {
    match mode {
        SiteMode::Build => vec!["-d".into(), website_path.to_path_buf()],
        SiteMode::Server => vec!["server".into()],
    }
}

/// `hugo -d <website_path>` or `hugo server`, run in the Gregory directory.
///
/// Server mode returns when the server exits.
#[instrument(skip_all, fields(program = %generator.program, mode = ?mode))]
pub async fn run_site_generator(
    generator: &ToolInfo,
    mode: SiteMode,
    website_path: &Path,
    dir: &Path,
) -> Result<()> {
    let mut cmd = Command::new(&generator.program);
    cmd.args(generator_args(mode, website_path)).current_dir(dir);
    match mode {
        SiteMode::Build => run_to_completion(&generator.program, cmd).await,
        SiteMode::Server => run_attached(&generator.program, cmd).await,
    }
}

/// Run a long-lived `cmd` with both output streams attached to ours.
async fn run_attached(tool: &str, mut cmd: Command) -> Result<()> {
    let status = cmd
        .status()
        .await
        .map_err(|e| GregoryError::external(tool, format!("failed to spawn: {e}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(GregoryError::external(tool, format!("exited with {status}")))
    }
}

/// Spawn `cmd` with inherited stdout, capturing stderr for the error message.
async fn run_to_completion(tool: &str, mut cmd: Command) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .map_err(|e| GregoryError::external(tool, format!("failed to spawn: {e}")))?;

    if output.status.success() {
        info!(tool, "completed");
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = stderr.trim();
    Err(GregoryError::external(
        tool,
        if detail.is_empty() {
            format!("exited with {}", output.status)
        } else {
            format!("exited with {}: {detail}", output.status)
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(program: &str) -> ToolInfo {
        ToolInfo {
            program: program.into(),
            version: String::new(),
        }
    }

    #[test]
    fn generator_args_per_mode() {
        let out = Path::new("/srv/site");
        assert_eq!(
            generator_args(SiteMode::Build, out),
            vec![PathBuf::from("-d"), PathBuf::from("/srv/site")]
        );
        assert_eq!(generator_args(SiteMode::Server, out), vec![PathBuf::from("server")]);
    }

    #[tokio::test]
    async fn probing_a_missing_tool_yields_none() {
        assert!(probe_tool("gregory-definitely-not-installed", &["--version"]).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_keeps_first_line_of_version_output() {
        let found = probe_tool("sh", &["-c", "echo 'v0.1.2 extended'; echo more"]).await.unwrap();
        assert_eq!(found.program, "sh");
        assert_eq!(found.version, "v0.1.2 extended");
    }

    #[tokio::test]
    async fn empty_presskit_command_is_rejected() {
        let err = run_presskit(&[], Path::new(".")).await.unwrap_err();
        assert!(matches!(err, GregoryError::ExternalTool { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let argv = vec!["sh".to_string(), "-c".into(), "echo boom >&2; exit 3".into()];
        let err = run_presskit(&argv, &std::env::temp_dir()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("presskit failed"));
        assert!(msg.contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_command() {
        let argv = vec!["sh".to_string(), "-c".into(), "exit 0".into()];
        run_presskit(&argv, &std::env::temp_dir()).await.unwrap();
    }

    #[tokio::test]
    async fn unspawnable_generator_is_external_error() {
        let err = run_site_generator(
            &tool("gregory-definitely-not-installed"),
            SiteMode::Build,
            Path::new("public"),
            &std::env::temp_dir(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
