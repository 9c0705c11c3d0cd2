//! Privileged group mutations: authorize, then run a fixed external tool.
//!
//! A [`PendingMutation`] owns everything the call touches (the group record,
//! the user, the caller identity) and is consumed by [`PendingMutation::execute`],
//! so it is released exactly once whichever way the call ends.
//!
//! Local state is never changed here. The effect shows up when the next
//! database rescan picks up what the tool wrote.

use crate::auth::Authority;
use crate::config::ToolPaths;
use crate::error::ServiceError;
use crate::group::{SharedGroup, UserLookup, UserRef};
use crate::sys::peer::Subject;
use accountsd_proto::ACTION_USER_ADMINISTRATION;
use std::process::{Command, Stdio};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("running '{tool}' failed: {message}")]
pub struct ToolError {
    pub tool: String,
    pub message: String,
}

/// Runs an external executable to completion. Blocking.
#[cfg_attr(test, mockall::automock)]
pub trait ToolRunner: Send + Sync {
    fn run(&self, argv: &[String], subject: &Subject) -> Result<(), ToolError>;
}

/// Spawns the tool directly (no shell) with the caller's audit login uid.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpawnRunner;

impl ToolRunner for SpawnRunner {
    fn run(&self, argv: &[String], subject: &Subject) -> Result<(), ToolError> {
        let (tool, args) = argv.split_first().ok_or_else(|| ToolError {
            tool: String::new(),
            message: "empty argument vector".into(),
        })?;

        let mut cmd = Command::new(tool);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if let Some(login_uid) = subject.login_uid {
            set_child_login_uid(&mut cmd, login_uid);
        }

        let output = cmd.output().map_err(|e| ToolError {
            tool: tool.clone(),
            message: e.to_string(),
        })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = match output.status.code() {
            Some(code) if stderr.is_empty() => format!("exited with status {code}"),
            Some(code) => format!("exited with status {code}: {stderr}"),
            None => "terminated by signal".to_string(),
        };
        Err(ToolError {
            tool: tool.clone(),
            message,
        })
    }
}

fn set_child_login_uid(cmd: &mut Command, login_uid: u32) {
    use std::os::unix::process::CommandExt;

    let value = login_uid.to_string();
    // SAFETY: the daemon runs on a single-threaded runtime, so no other thread
    // can hold the allocator lock across fork. Failure to write is ignored, the
    // tool then runs with the daemon's own login uid.
    unsafe {
        cmd.pre_exec(move || {
            let _ = std::fs::write("/proc/self/loginuid", value.as_bytes());
            Ok(())
        });
    }
}

#[derive(Debug)]
pub enum MutationKind {
    Rename { new_name: String },
    Membership { user: Arc<UserRef>, add: bool },
}

#[derive(Debug)]
pub struct PendingMutation {
    group: SharedGroup,
    subject: Subject,
    kind: MutationKind,
}

impl PendingMutation {
    pub fn rename(group: SharedGroup, subject: Subject, new_name: impl Into<String>) -> Self {
        Self {
            group,
            subject,
            kind: MutationKind::Rename {
                new_name: new_name.into(),
            },
        }
    }

    /// Fails with `UnknownTarget` before any authorization when the user path
    /// does not resolve.
    pub fn membership(
        group: SharedGroup,
        subject: Subject,
        user_path: &str,
        add: bool,
        users: &dyn UserLookup,
    ) -> Result<Self, ServiceError> {
        let user = users
            .user_by_path(user_path)
            .ok_or_else(|| ServiceError::UnknownTarget(user_path.to_string()))?;
        Ok(Self {
            group,
            subject,
            kind: MutationKind::Membership { user, add },
        })
    }

    pub async fn execute(
        self,
        authority: &dyn Authority,
        runner: &dyn ToolRunner,
        tools: &ToolPaths,
    ) -> Result<(), ServiceError> {
        authority
            .check(&self.subject, ACTION_USER_ADMINISTRATION, true)
            .await
            .map_err(|e| ServiceError::AuthorizationDenied(e.to_string()))?;

        // group name is read after the grant; a rescan may have moved it meanwhile
        let group_name = self.group.lock().group_name().to_string();
        self.log_action(&group_name);
        let argv = self.argv(tools, &group_name);

        runner.run(&argv, &self.subject).map_err(|e| {
            tracing::warn!(?argv, error = %e.message, "group tool failed");
            ServiceError::ToolFailure {
                tool: e.tool,
                message: e.message,
            }
        })
    }

    fn argv(&self, tools: &ToolPaths, group_name: &str) -> Vec<String> {
        match &self.kind {
            MutationKind::Rename { new_name } => vec![
                tools.groupmod.clone(),
                "-n".into(),
                new_name.clone(),
                "--".into(),
                group_name.to_string(),
            ],
            MutationKind::Membership { user, add } => vec![
                tools.groupmems.clone(),
                "-g".into(),
                group_name.to_string(),
                if *add { "-a" } else { "-d" }.into(),
                user.user_name.clone(),
            ],
        }
    }

    fn log_action(&self, group_name: &str) {
        let (uid, pid) = (self.subject.uid, self.subject.pid);
        match &self.kind {
            MutationKind::Rename { new_name } => {
                tracing::info!(uid, ?pid, "changing name of group '{}' to '{}'", group_name, new_name);
            }
            MutationKind::Membership { user, add } => {
                let (verb, prep) = if *add { ("add", "to") } else { ("remove", "from") };
                tracing::info!(uid, ?pid, "{} user '{}' {} group '{}'", verb, user.user_name, prep, group_name);
            }
        }
    }
}
