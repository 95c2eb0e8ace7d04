//! External command execution
//!
//! Every utility this tool drives (xrandr, glxinfo, modprobe, systemctl,
//! ...) is run through [`run`]. Arguments are passed as a vector, never
//! through a shell.

use std::ffi::OsStr;
use std::io;
use std::process::{Command, Output};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Run `program` with `args`; stdout on success.
pub fn run<I, S>(program: &str, args: I) -> Result<String, CommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    execute(program, command)
}

/// Like [`run`] with extra environment variables
pub fn run_with_env<I, S>(
    program: &str,
    args: I,
    env: &[(&str, &str)],
) -> Result<String, CommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    for (key, value) in env {
        command.env(key, value);
    }
    execute(program, command)
}

/// Exit status only; failure to spawn counts as failure
pub fn succeeds<I, S>(program: &str, args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run(program, args).is_ok()
}

fn execute(program: &str, mut command: Command) -> Result<String, CommandError> {
    debug!(command = ?command, "Running external command");

    let output = command.output().map_err(|source| CommandError::Spawn {
        program: program.to_string(),
        source,
    })?;

    check_output(program, output)
}

fn check_output(program: &str, output: Output) -> Result<String, CommandError> {
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    } else {
        Err(CommandError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        assert_eq!(run("echo", ["hello", "world"]).unwrap(), "hello world");
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let err = run("sh", ["-c", "echo oops >&2; exit 3"]).unwrap_err();
        match err {
            CommandError::Failed { program, stderr, .. } => {
                assert_eq!(program, "sh");
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        assert!(matches!(
            run("prime-switch-no-such-program", Vec::<&str>::new()),
            Err(CommandError::Spawn { .. })
        ));
        assert!(!succeeds("prime-switch-no-such-program", Vec::<&str>::new()));
    }

    #[test]
    fn test_env_is_passed() {
        let env = [("PRIME_SWITCH_TEST", "0")];
        let out = run_with_env("sh", ["-c", "echo $PRIME_SWITCH_TEST"], &env).unwrap();
        assert_eq!(out, "0");
    }
}
