//! Shared test utilities: a scripted git runner and real git fixtures.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use crate::git::{CommandOutput, CommandRunner};
use crate::types::Sha;

/// A 40-character hash made of one repeated hex digit.
pub fn sha(c: char) -> Sha {
    Sha::parse(c.to_string().repeat(40)).unwrap()
}

// ─── Scripted runner ──────────────────────────────────────────────────────────

/// A [`CommandRunner`] that answers from a script and records every call.
///
/// Commands are keyed by their space-joined arguments (`"checkout master"`).
/// Unscripted commands fail with exit code 1, so a test only passes if every
/// command it causes was expected.
#[derive(Clone, Default)]
pub struct ScriptedGit {
    inner: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    responses: HashMap<String, CommandOutput>,
    delays: HashMap<String, Duration>,
    calls: Vec<String>,
}

impl ScriptedGit {
    pub fn new() -> Self {
        ScriptedGit::default()
    }

    /// Sets (or replaces) the response for `command`.
    pub fn respond(&self, command: &str, output: CommandOutput) {
        let mut script = self.inner.lock().unwrap();
        script.responses.insert(command.to_string(), output);
    }

    /// Scripts `git rev-parse --verify <reference>` to print `hash`.
    pub fn respond_hash(&self, reference: &str, hash: &Sha) {
        self.respond(
            &format!("rev-parse --verify {reference}"),
            CommandOutput::ok(format!("{hash}\n")),
        );
    }

    /// Makes `command` take `delay` before answering.
    pub fn delay(&self, command: &str, delay: Duration) {
        let mut script = self.inner.lock().unwrap();
        script.delays.insert(command.to_string(), delay);
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| *c == command).count()
    }
}

impl CommandRunner for ScriptedGit {
    async fn run(&self, args: &[&str], _workdir: &Path) -> io::Result<CommandOutput> {
        let key = args.join(" ");
        let (output, delay) = {
            let mut script = self.inner.lock().unwrap();
            script.calls.push(key.clone());
            let output = script
                .responses
                .get(&key)
                .cloned()
                .unwrap_or_else(|| CommandOutput::failed(1, format!("unscripted: git {key}")));
            (output, script.delays.get(&key).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(output)
    }
}

// ─── Real git fixtures ────────────────────────────────────────────────────────

/// A bare "remote" repository plus a seed working copy that pushes to it.
///
/// The remote starts with one commit on `master`.
pub struct GitFixture {
    dir: TempDir,
    remote: PathBuf,
    seed: PathBuf,
}

impl GitFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote.git");
        let seed = dir.path().join("seed");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&seed).unwrap();

        run_git(&remote, &["init", "--bare"]);
        run_git(&seed, &["init"]);
        run_git(&seed, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        std::fs::write(seed.join("README.md"), "# Test").unwrap();
        run_git(&seed, &["add", "."]);
        run_git(&seed, &["commit", "-m", "Initial commit"]);
        run_git(
            &seed,
            &["remote", "add", "origin", remote.to_str().unwrap()],
        );
        run_git(&seed, &["push", "origin", "HEAD:master"]);
        run_git(&remote, &["symbolic-ref", "HEAD", "refs/heads/master"]);

        GitFixture { dir, remote, seed }
    }

    pub fn remote_url(&self) -> String {
        self.remote.to_string_lossy().into_owned()
    }

    /// A scratch directory that lives as long as the fixture.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Commits `file` with `contents` on `branch` and pushes it.
    ///
    /// A branch that does not exist yet is created from the seed's current
    /// HEAD.
    pub fn commit(&self, branch: &str, file: &str, contents: &str) -> Sha {
        if try_git(&self.seed, &["checkout", branch]).is_err() {
            run_git(&self.seed, &["checkout", "-b", branch]);
        }
        std::fs::write(self.seed.join(file), contents).unwrap();
        run_git(&self.seed, &["add", "."]);
        run_git(&self.seed, &["commit", "-m", &format!("Update {file}")]);
        run_git(&self.seed, &["push", "origin", &format!("HEAD:{branch}")]);
        self.head(branch)
    }

    pub fn delete_remote_branch(&self, branch: &str) {
        run_git(&self.seed, &["push", "origin", "--delete", branch]);
    }

    /// The remote's head commit for `branch`.
    pub fn head(&self, branch: &str) -> Sha {
        self.rev_parse_in(&self.remote, &format!("refs/heads/{branch}"))
    }

    pub fn rev_parse_in(&self, workdir: &Path, rev: &str) -> Sha {
        Sha::parse(run_git(workdir, &["rev-parse", rev])).unwrap()
    }

    /// A fresh clone of the remote in its own temporary directory.
    pub fn clone_repo(&self) -> TempDir {
        let dir = TempDir::new().unwrap();
        run_git(
            dir.path(),
            &["clone", &self.remote_url(), dir.path().to_str().unwrap()],
        );
        dir
    }
}

fn fixture_git(workdir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(workdir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_TERMINAL_PROMPT", "0")
        .args(["-c", "user.name=Test", "-c", "user.email=test@test.com"])
        .args(args);
    cmd
}

fn try_git(workdir: &Path, args: &[&str]) -> Result<String, String> {
    let output = fixture_git(workdir, args).output().unwrap();
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).into_owned())
    }
}

/// Runs a git command in a fixture repo, panicking on failure.
pub fn run_git(workdir: &Path, args: &[&str]) -> String {
    try_git(workdir, args)
        .unwrap_or_else(|stderr| panic!("git {} failed: {stderr}", args.join(" ")))
}
