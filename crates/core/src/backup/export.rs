//! Database export collaborator
//!
//! The pipeline only needs "write a full structured export, minus these
//! apps, into this writer". `CommandExporter` does that by running an
//! external dump command and streaming its stdout.

use std::io::{self, Read, Write};
use std::process::{Command, Stdio};

use crate::config::ExportSettings;
use crate::error::{Error, Result};

/// Produces a full structured export of the database
pub trait DatabaseExporter: Send + Sync {
    /// Write the export into `out`, leaving out the `exclude`d apps
    fn export(&self, exclude: &[String], out: &mut dyn Write) -> Result<()>;
}

/// Runs an external command and captures its stdout as the export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExporter {
    program: String,
    args: Vec<String>,
    exclude_flag: String,
}

impl CommandExporter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            exclude_flag: "--exclude".to_string(),
        }
    }

    pub fn with_exclude_flag(mut self, flag: impl Into<String>) -> Self {
        self.exclude_flag = flag.into();
        self
    }

    /// Full argument list, with `<flag> <app>` appended per exclusion
    pub fn command_args(&self, exclude: &[String]) -> Vec<String> {
        let mut args = self.args.clone();
        for app in exclude {
            args.push(self.exclude_flag.clone());
            args.push(app.clone());
        }
        args
    }
}

impl From<&ExportSettings> for CommandExporter {
    fn from(settings: &ExportSettings) -> Self {
        Self::new(&settings.program, settings.args.clone())
            .with_exclude_flag(&settings.exclude_flag)
    }
}

impl DatabaseExporter for CommandExporter {
    fn export(&self, exclude: &[String], out: &mut dyn Write) -> Result<()> {
        let args = self.command_args(exclude);
        tracing::info!(program = %self.program, ?args, "Running export command");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Export(format!("failed to start '{}': {e}", self.program)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Export("export command has no stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Export("export command has no stderr".to_string()))?;

        // Drain stderr concurrently so a chatty command cannot block on a full pipe
        let stderr_reader = std::thread::spawn(move || {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text);
            text
        });

        let copied = io::copy(&mut stdout, out);
        let status = child.wait()?;
        let stderr_text = stderr_reader.join().unwrap_or_default();
        let bytes = copied?;

        if !status.success() {
            return Err(Error::Export(format!(
                "'{}' exited with {status}: {}",
                self.program,
                stderr_text.trim()
            )));
        }

        tracing::info!(bytes, "Export command finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args_append_exclusions() {
        let exporter = CommandExporter::new("python", vec!["manage.py".into(), "dumpdata".into()]);
        let args = exporter.command_args(&["contenttypes".to_string(), "sessions".to_string()]);
        assert_eq!(
            args,
            vec![
                "manage.py",
                "dumpdata",
                "--exclude",
                "contenttypes",
                "--exclude",
                "sessions"
            ]
        );
    }

    #[test]
    fn test_from_settings() {
        let exporter = CommandExporter::from(&ExportSettings::default());
        let args = exporter.command_args(&[]);
        assert_eq!(args[0], "manage.py");
        assert_eq!(args[1], "dumpdata");
    }

    #[cfg(unix)]
    #[test]
    fn test_export_captures_stdout() {
        let exporter = CommandExporter::new(
            "sh",
            vec!["-c".into(), "printf '[{\"model\": \"app.client\"}]'".into()],
        );
        let mut out = Vec::new();
        exporter.export(&["sessions".to_string()], &mut out).unwrap();
        assert_eq!(out, br#"[{"model": "app.client"}]"#);
    }

    #[cfg(unix)]
    #[test]
    fn test_export_failure_reports_stderr() {
        let exporter = CommandExporter::new(
            "sh",
            vec!["-c".into(), "echo 'database unavailable' >&2; exit 3".into()],
        );
        let mut out = Vec::new();
        let err = exporter.export(&[], &mut out).unwrap_err();
        assert!(matches!(err, Error::Export(_)));
        assert!(err.to_string().contains("database unavailable"));
    }

    #[test]
    fn test_missing_program() {
        let exporter = CommandExporter::new("definitely-not-a-real-dump-tool", vec![]);
        let mut out = Vec::new();
        assert!(matches!(
            exporter.export(&[], &mut out),
            Err(Error::Export(_))
        ));
    }
}
