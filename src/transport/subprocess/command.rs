//! Building the agent process command

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::config::{BLOCKED_ENV_VARS, SubprocessConfig};

/// Command for `program` with piped stdio, confined to the session cwd
pub(super) fn build(program: &Path, config: &SubprocessConfig) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(&config.command.args);

    for (key, value) in &config.env {
        if BLOCKED_ENV_VARS.contains(&key.as_str()) {
            log::warn!("[{}] not forwarding {key} to the agent runtime", config.label);
            continue;
        }
        cmd.env(key, value);
    }

    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd).env("PWD", cwd);
    }

    // The bridge owns stdout of this process; the child must not share it.
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentCommand;

    #[test]
    fn blocked_env_is_not_forwarded() {
        let mut config = SubprocessConfig::new(AgentCommand::parse("agent --json").unwrap());
        config.env.insert("LD_PRELOAD".into(), "/evil.so".into());
        config.env.insert("AGENT_MODE".into(), "test".into());
        config.cwd = Some("/work".into());
        let cmd = build(Path::new("/bin/agent"), &config);

        let std_cmd = cmd.as_std();
        let envs: Vec<_> = std_cmd
            .get_envs()
            .map(|(k, _)| k.to_string_lossy().into_owned())
            .collect();
        assert!(envs.contains(&"AGENT_MODE".to_string()));
        assert!(envs.contains(&"PWD".to_string()));
        assert!(!envs.contains(&"LD_PRELOAD".to_string()));
        let args: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["--json"]);
        assert_eq!(std_cmd.get_current_dir(), Some(Path::new("/work")));
    }
}
