use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const DEFAULT_WORK_DIR: &str = "slurpwiki_work";
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub work_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub work_dir: PathBuf,
    pub html_dir: PathBuf,
    pub md_dir: PathBuf,
    pub history_dir: PathBuf,
    pub git_dir: PathBuf,
    pub config_path: PathBuf,
    pub work_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    /// Layout rooted at `work_dir` with every value taken from defaults.
    pub fn under(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            html_dir: work_dir.join("html"),
            md_dir: work_dir.join("md"),
            history_dir: work_dir.join("history"),
            git_dir: work_dir.join("git"),
            config_path: work_dir.join(CONFIG_FILENAME),
            work_source: ValueSource::Default,
            config_source: ValueSource::Default,
        }
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "work_dir={} ({})\nhtml_dir={}\nmd_dir={}\nhistory_dir={}\ngit_dir={}\nconfig_path={} ({})",
            normalize_for_display(&self.work_dir),
            self.work_source.as_str(),
            normalize_for_display(&self.html_dir),
            normalize_for_display(&self.md_dir),
            normalize_for_display(&self.history_dir),
            normalize_for_display(&self.git_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct LayoutStatus {
    pub html_files: usize,
    pub md_files: usize,
    pub history_files: usize,
    pub repository_initialized: bool,
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (work_dir, work_source) = if let Some(path) = overrides.work_dir.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = lookup_env("WIKISLURP_WORK_DIR").filter(|v| !v.trim().is_empty())
    {
        (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        )
    } else {
        (context.cwd.join(DEFAULT_WORK_DIR), ValueSource::Default)
    };

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = lookup_env("WIKISLURP_CONFIG").filter(|v| !v.trim().is_empty()) {
        (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        )
    } else {
        (work_dir.join(CONFIG_FILENAME), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        config_path,
        config_source,
        work_source,
        ..ResolvedPaths::under(&work_dir)
    })
}

/// Create the work directory layout. Returns the directories that did not exist before.
pub fn init_layout(paths: &ResolvedPaths) -> Result<Vec<PathBuf>> {
    let mut created_dirs = Vec::new();
    for dir in [
        &paths.work_dir,
        &paths.html_dir,
        &paths.md_dir,
        &paths.history_dir,
        &paths.git_dir,
    ] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.clone());
        }
    }
    Ok(created_dirs)
}

pub fn inspect_layout(paths: &ResolvedPaths) -> Result<LayoutStatus> {
    Ok(LayoutStatus {
        html_files: count_files(&paths.html_dir)?,
        md_files: count_files(&paths.md_dir)?,
        history_files: count_files(&paths.history_dir)?,
        repository_initialized: paths.git_dir.join(".git").exists(),
    })
}

fn count_files(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        if entry.path().is_file() {
            count += 1;
        }
    }
    Ok(count)
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
