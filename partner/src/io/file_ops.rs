//! Human-approved project file mutations.
//!
//! Every create, modify and delete asks an [`Approver`] first and only then
//! touches the filesystem. This gate is independent of the conversational
//! confirmation gate: it protects the files themselves no matter how the
//! request reached the session. Failures are reported per operation and never
//! abort the session.

use std::fs;
use std::io::{BufRead, StdinLock, Stdout, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::types::{FileOperationKind, FileOperationOutcome, FileOperationRecord};

/// Synchronous yes/no approval from the human.
pub trait Approver {
    /// Ask `question`; `default_yes` decides what empty input means.
    fn approve(&self, question: &str, default_yes: bool) -> bool;
}

/// Interpret a typed answer. Unrecognized input counts as "no".
pub fn parse_answer(input: &str, default_yes: bool) -> bool {
    match input.trim().to_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    }
}

/// Approver that writes the question to `output` and reads one answer line
/// from `input`. End of input or an I/O error declines.
#[derive(Debug)]
pub struct PromptApprover<R, W> {
    io: Mutex<(R, W)>,
}

impl<R: BufRead, W: Write> PromptApprover<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PromptApprover<StdinLock<'static>, Stdout> {
    /// Prompt on the terminal.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Approver for PromptApprover<R, W> {
    fn approve(&self, question: &str, default_yes: bool) -> bool {
        let mut guard = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let (input, output) = &mut *guard;
        let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
        if write!(output, "{question} {hint}: ")
            .and_then(|()| output.flush())
            .is_err()
        {
            return false;
        }
        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => parse_answer(&line, default_yes),
        }
    }
}

/// A requested mutation, with paths relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOperation {
    Create { path: String, content: String },
    Modify { path: String, content: String },
    Delete { path: String },
}

impl FileOperation {
    pub fn kind(&self) -> FileOperationKind {
        match self {
            FileOperation::Create { .. } => FileOperationKind::Create,
            FileOperation::Modify { .. } => FileOperationKind::Modify,
            FileOperation::Delete { .. } => FileOperationKind::Delete,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FileOperation::Create { path, .. }
            | FileOperation::Modify { path, .. }
            | FileOperation::Delete { path } => path,
        }
    }
}

/// Resolve `relative` under `root`, refusing absolute paths and `..` escapes.
pub fn resolve_in_root(root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative.trim());
    if candidate.as_os_str().is_empty() {
        return Err(anyhow!("path must not be empty"));
    }
    let mut resolved = root.to_path_buf();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(anyhow!("path '{relative}' escapes the project directory"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(anyhow!("path '{relative}' must be relative to the project"));
            }
        }
    }
    if resolved == root {
        return Err(anyhow!("path '{relative}' does not name a file"));
    }
    Ok(resolved)
}

/// Applies [`FileOperation`]s inside one project root.
pub struct FileOperationGateway<'a, A: Approver + ?Sized> {
    root: &'a Path,
    approver: &'a A,
}

impl<'a, A: Approver + ?Sized> FileOperationGateway<'a, A> {
    pub fn new(root: &'a Path, approver: &'a A) -> Self {
        Self { root, approver }
    }

    /// Ask for approval, then perform `op`. Always returns a record.
    pub fn apply(&self, op: &FileOperation, now: DateTime<Utc>) -> FileOperationRecord {
        let path = op.path().to_string();
        let target = match resolve_in_root(self.root, &path) {
            Ok(target) => target,
            Err(err) => return failed(op.kind(), path, &err, now),
        };
        let record = match op {
            FileOperation::Create { content, .. } => self.create(&path, &target, content, now),
            FileOperation::Modify { content, .. } => self.modify(&path, &target, content, now),
            FileOperation::Delete { .. } => self.delete(&path, &target, now),
        };
        match record.outcome {
            FileOperationOutcome::Applied => {
                info!(kind = record.kind.as_str(), path = %record.path, "file operation applied");
            }
            FileOperationOutcome::Declined => {
                info!(kind = record.kind.as_str(), path = %record.path, "file operation declined");
            }
            FileOperationOutcome::Failed => {
                warn!(
                    kind = record.kind.as_str(),
                    path = %record.path,
                    detail = record.detail.as_deref().unwrap_or(""),
                    "file operation failed"
                );
            }
        }
        record
    }

    fn create(
        &self,
        path: &str,
        target: &Path,
        content: &str,
        now: DateTime<Utc>,
    ) -> FileOperationRecord {
        let kind = FileOperationKind::Create;
        if target.is_dir() {
            return failed(kind, path.to_string(), &anyhow!("'{path}' is a directory"), now);
        }
        let question = if target.exists() {
            format!("Overwrite existing file: {path}?")
        } else {
            format!("Create file: {path}?")
        };
        if !self.approver.approve(&question, true) {
            return declined(kind, path.to_string(), now);
        }
        match write_file(target, content) {
            Ok(()) => applied(kind, path.to_string(), None, now),
            Err(err) => failed(kind, path.to_string(), &err, now),
        }
    }

    fn modify(
        &self,
        path: &str,
        target: &Path,
        content: &str,
        now: DateTime<Utc>,
    ) -> FileOperationRecord {
        if !target.exists() {
            let mut record = self.create(path, target, content, now);
            if record.outcome == FileOperationOutcome::Applied {
                record.detail = Some("file did not exist; created instead".to_string());
            }
            return record;
        }
        let kind = FileOperationKind::Modify;
        if !target.is_file() {
            return failed(kind, path.to_string(), &anyhow!("'{path}' is not a file"), now);
        }
        if !self
            .approver
            .approve(&format!("Modify existing file: {path}?"), true)
        {
            return declined(kind, path.to_string(), now);
        }
        match write_file(target, content) {
            Ok(()) => applied(kind, path.to_string(), None, now),
            Err(err) => failed(kind, path.to_string(), &err, now),
        }
    }

    fn delete(&self, path: &str, target: &Path, now: DateTime<Utc>) -> FileOperationRecord {
        let kind = FileOperationKind::Delete;
        if !target.exists() {
            return failed(kind, path.to_string(), &anyhow!("'{path}' does not exist"), now);
        }
        if !target.is_file() {
            return failed(kind, path.to_string(), &anyhow!("'{path}' is not a file"), now);
        }
        if !self.approver.approve(&format!("DELETE file: {path}?"), true) {
            return declined(kind, path.to_string(), now);
        }
        match fs::remove_file(target).with_context(|| format!("delete {}", target.display())) {
            Ok(()) => applied(kind, path.to_string(), None, now),
            Err(err) => failed(kind, path.to_string(), &err, now),
        }
    }
}

fn write_file(target: &Path, content: &str) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(target, content).with_context(|| format!("write {}", target.display()))
}

fn applied(
    kind: FileOperationKind,
    path: String,
    detail: Option<String>,
    now: DateTime<Utc>,
) -> FileOperationRecord {
    FileOperationRecord {
        timestamp: now,
        kind,
        path,
        outcome: FileOperationOutcome::Applied,
        detail,
    }
}

fn declined(kind: FileOperationKind, path: String, now: DateTime<Utc>) -> FileOperationRecord {
    FileOperationRecord {
        timestamp: now,
        kind,
        path,
        outcome: FileOperationOutcome::Declined,
        detail: None,
    }
}

fn failed(
    kind: FileOperationKind,
    path: String,
    err: &anyhow::Error,
    now: DateTime<Utc>,
) -> FileOperationRecord {
    FileOperationRecord {
        timestamp: now,
        kind,
        path,
        outcome: FileOperationOutcome::Failed,
        detail: Some(format!("{err:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedApprover;

    fn create(path: &str, content: &str) -> FileOperation {
        FileOperation::Create {
            path: path.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn parse_answer_defaults_and_tokens() {
        assert!(parse_answer("", true));
        assert!(!parse_answer("  ", false));
        assert!(parse_answer("Y", false));
        assert!(parse_answer(" yes\n", false));
        assert!(!parse_answer("n", true));
        assert!(!parse_answer("sure", true));
    }

    #[test]
    fn resolve_rejects_escapes() {
        let root = Path::new("/work/app");
        assert_eq!(
            resolve_in_root(root, "./src/main.rs").expect("resolve"),
            Path::new("/work/app/src/main.rs")
        );
        assert!(resolve_in_root(root, "../secret").is_err());
        assert!(resolve_in_root(root, "src/../../x").is_err());
        assert!(resolve_in_root(root, "/etc/passwd").is_err());
        assert!(resolve_in_root(root, "").is_err());
        assert!(resolve_in_root(root, ".").is_err());
    }

    #[test]
    fn approved_create_writes_nested_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let approver = ScriptedApprover::new(vec![true]);
        let gateway = FileOperationGateway::new(temp.path(), &approver);

        let record = gateway.apply(&create("src/lib.rs", "pub fn f() {}\n"), Utc::now());

        assert_eq!(record.outcome, FileOperationOutcome::Applied);
        assert_eq!(
            fs::read_to_string(temp.path().join("src/lib.rs")).expect("read"),
            "pub fn f() {}\n"
        );
        let asked = approver.questions();
        assert_eq!(asked, vec![("Create file: src/lib.rs?".to_string(), true)]);
    }

    #[test]
    fn declined_overwrite_leaves_file_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("README.md"), "original").expect("write");
        let approver = ScriptedApprover::new(vec![false]);
        let gateway = FileOperationGateway::new(temp.path(), &approver);

        let record = gateway.apply(&create("README.md", "replaced"), Utc::now());

        assert_eq!(record.outcome, FileOperationOutcome::Declined);
        assert_eq!(
            fs::read_to_string(temp.path().join("README.md")).expect("read"),
            "original"
        );
        assert!(approver.questions()[0].0.starts_with("Overwrite existing file"));
    }

    #[test]
    fn modify_missing_file_falls_back_to_create() {
        let temp = tempfile::tempdir().expect("tempdir");
        let approver = ScriptedApprover::new(vec![true]);
        let gateway = FileOperationGateway::new(temp.path(), &approver);

        let record = gateway.apply(
            &FileOperation::Modify {
                path: "notes.txt".to_string(),
                content: "hello".to_string(),
            },
            Utc::now(),
        );

        assert_eq!(record.kind, FileOperationKind::Create);
        assert_eq!(record.outcome, FileOperationOutcome::Applied);
        assert!(record.detail.is_some());
        assert!(temp.path().join("notes.txt").is_file());
    }

    #[test]
    fn modify_existing_file_asks_first() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "v1").expect("write");
        let approver = ScriptedApprover::new(vec![true]);
        let gateway = FileOperationGateway::new(temp.path(), &approver);

        let record = gateway.apply(
            &FileOperation::Modify {
                path: "a.txt".to_string(),
                content: "v2".to_string(),
            },
            Utc::now(),
        );

        assert_eq!(record.kind, FileOperationKind::Modify);
        assert_eq!(record.outcome, FileOperationOutcome::Applied);
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).expect("read"), "v2");
    }

    #[test]
    fn delete_defaults_to_yes_and_requires_existing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("old.rs"), "").expect("write");
        let approver = ScriptedApprover::new(vec![true]);
        let gateway = FileOperationGateway::new(temp.path(), &approver);

        let missing = gateway.apply(
            &FileOperation::Delete {
                path: "nope.rs".to_string(),
            },
            Utc::now(),
        );
        assert_eq!(missing.outcome, FileOperationOutcome::Failed);

        let deleted = gateway.apply(
            &FileOperation::Delete {
                path: "old.rs".to_string(),
            },
            Utc::now(),
        );
        assert_eq!(deleted.outcome, FileOperationOutcome::Applied);
        assert!(!temp.path().join("old.rs").exists());
        assert_eq!(
            approver.questions(),
            vec![("DELETE file: old.rs?".to_string(), true)]
        );
    }

    #[test]
    fn empty_answer_to_delete_prompt_deletes() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("old.rs"), "").expect("write");
        let approver = PromptApprover::new(&b"\n"[..], Vec::new());
        let gateway = FileOperationGateway::new(temp.path(), &approver);

        let record = gateway.apply(
            &FileOperation::Delete {
                path: "old.rs".to_string(),
            },
            Utc::now(),
        );

        assert_eq!(record.outcome, FileOperationOutcome::Applied);
        assert!(!temp.path().join("old.rs").exists());
        let (_, output) = approver.into_inner();
        assert_eq!(
            String::from_utf8(output).expect("utf8"),
            "DELETE file: old.rs? [Y/n]: "
        );
    }

    #[test]
    fn prompt_approver_reads_one_line_per_question() {
        let approver = PromptApprover::new(&b"\n\nn\n"[..], Vec::new());

        assert!(approver.approve("Create file: a.txt?", true));
        assert!(!approver.approve("Keep going?", false));
        assert!(!approver.approve("Modify existing file: a.txt?", true));
        // Input is exhausted now.
        assert!(!approver.approve("Create file: b.txt?", true));

        let (_, output) = approver.into_inner();
        assert_eq!(
            String::from_utf8(output).expect("utf8"),
            "Create file: a.txt? [Y/n]: Keep going? [y/N]: \
             Modify existing file: a.txt? [Y/n]: Create file: b.txt? [Y/n]: "
        );
    }

    #[test]
    fn escaping_path_fails_without_asking() {
        let temp = tempfile::tempdir().expect("tempdir");
        let approver = ScriptedApprover::new(Vec::new());
        let gateway = FileOperationGateway::new(temp.path(), &approver);

        let record = gateway.apply(&create("../outside.txt", "x"), Utc::now());

        assert_eq!(record.outcome, FileOperationOutcome::Failed);
        assert!(approver.questions().is_empty());
    }
}
