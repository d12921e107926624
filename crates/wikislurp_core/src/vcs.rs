use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Result;
use tracing::info;

use crate::error::SlurpError;

/// Revision timestamps are naive UTC; git must not read them in the host's zone.
const UTC_OFFSET: &str = "+00:00";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    /// `Display Name <user@domain>`.
    pub author: String,
    /// Naive UTC ISO-8601 timestamp, used for both author and committer dates.
    pub date: String,
    pub message: String,
}

/// The version-control operations the replayer needs, bound to one working tree.
pub trait VcsEngine {
    fn work_tree(&self) -> &Path;
    fn is_initialized(&self) -> bool;
    fn init(&mut self) -> Result<()>;
    /// Changes to `relative_path` relative to the last commit; empty when it is unchanged.
    fn working_tree_status(&mut self, relative_path: &str) -> Result<Vec<String>>;
    fn add(&mut self, relative_path: &str) -> Result<()>;
    fn commit(&mut self, request: &CommitRequest) -> Result<()>;
}

/// `git` executable driven with an explicit working directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    work_tree: PathBuf,
    committer: Option<(String, String)>,
}

impl GitCli {
    pub fn new(work_tree: impl Into<PathBuf>) -> Self {
        Self {
            work_tree: work_tree.into(),
            committer: None,
        }
    }

    pub fn with_committer(mut self, committer: Option<(String, String)>) -> Self {
        self.committer = committer;
        self
    }

    /// Arguments and environment of `git commit` for `request`.
    fn commit_invocation(
        &self,
        request: &CommitRequest,
    ) -> (Vec<String>, Vec<(&'static str, String)>) {
        let date = format!("{}{UTC_OFFSET}", request.date);
        let args = vec![
            "commit".to_string(),
            format!("--author={}", request.author),
            format!("--date={date}"),
            format!("--message={}", request.message),
        ];
        let mut envs = vec![("GIT_COMMITTER_DATE", date)];
        if let Some((name, email)) = &self.committer {
            envs.push(("GIT_COMMITTER_NAME", name.clone()));
            envs.push(("GIT_COMMITTER_EMAIL", email.clone()));
        }
        (args, envs)
    }

    fn run(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<Output> {
        let mut command = Command::new("git");
        command.args(args).current_dir(&self.work_tree);
        for (key, value) in envs {
            command.env(key, value);
        }
        let rendered = format!("git {}", args.join(" "));
        let output = command.output().map_err(|error| SlurpError::Replay {
            command: rendered.clone(),
            message: error.to_string(),
        })?;
        if !output.status.success() {
            return Err(SlurpError::Replay {
                command: rendered,
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }
            .into());
        }
        Ok(output)
    }
}

impl VcsEngine for GitCli {
    fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    fn is_initialized(&self) -> bool {
        self.work_tree.join(".git").exists()
    }

    fn init(&mut self) -> Result<()> {
        info!(path = %self.work_tree.display(), "git init");
        self.run(&["init", "."], &[])?;
        Ok(())
    }

    fn working_tree_status(&mut self, relative_path: &str) -> Result<Vec<String>> {
        let output = self.run(&["status", "--porcelain", "--", relative_path], &[])?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ToString::to_string)
            .collect())
    }

    fn add(&mut self, relative_path: &str) -> Result<()> {
        self.run(&["add", "--", relative_path], &[])?;
        Ok(())
    }

    fn commit(&mut self, request: &CommitRequest) -> Result<()> {
        let (args, envs) = self.commit_invocation(request);
        let args = args.iter().map(String::as_str).collect::<Vec<_>>();
        let envs = envs
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect::<Vec<_>>();
        info!(author = %request.author, date = %request.date, message = %request.message, "git commit");
        self.run(&args, &envs)?;
        Ok(())
    }
}
