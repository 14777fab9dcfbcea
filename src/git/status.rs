use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub changes: Vec<FileChange>,
    pub conflicts: Vec<String>,
}

fn is_conflict(code: &str) -> bool {
    matches!(code, "UU" | "AA" | "DD") || code.contains('U')
}

fn classify(code: &str) -> ChangeKind {
    if code == "??" || (code.contains('A') && code != "AA") {
        ChangeKind::Added
    } else if code == "D " || code == " D" {
        ChangeKind::Deleted
    } else {
        ChangeKind::Modified
    }
}

/// Parses `git status --porcelain` output (v1 format, one entry per line).
pub fn parse_porcelain(text: &str) -> StatusReport {
    let mut report = StatusReport::default();

    for line in text.lines() {
        let (Some(code), Some(rest)) = (line.get(..2), line.get(3..)) else {
            continue;
        };
        let raw_path = rest.trim();
        let path = match raw_path.split_once(" -> ") {
            Some((_, new_path)) => new_path,
            None => raw_path,
        };
        let path = path.trim_matches('"').to_string();
        if path.is_empty() {
            continue;
        }

        if is_conflict(code) {
            report.conflicts.push(path.clone());
            report.changes.push(FileChange {
                path,
                kind: ChangeKind::Modified,
            });
            continue;
        }

        report.changes.push(FileChange {
            kind: classify(code),
            path,
        });
    }

    report
}
