use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The part of a push event the worker needs: where to clone from and which commits to scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushJob {
    /// `owner/name`, used in logs and notifications.
    pub repository: String,
    pub clone_url: String,
    /// Commits in the order the webhook delivered them.
    pub commits: Vec<CommitRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub url: String,
    pub author_name: String,
    pub added: Vec<String>,
    pub modified: Vec<String>,
}

impl CommitRecord {
    /// Added and modified paths, deduplicated and sorted.
    pub fn changed_files(&self) -> Vec<String> {
        let files: BTreeSet<_> = self.added.iter().chain(&self.modified).cloned().collect();
        files.into_iter().collect()
    }
}

/// Aggregated checker output for one commit. Only constructed when there is something to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// ID of the scanned commit.
    pub commit: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(added: &[&str], modified: &[&str]) -> CommitRecord {
        CommitRecord {
            id: "abc123".to_string(),
            url: "https://github.com/octo/repo/commit/abc123".to_string(),
            author_name: "Mona".to_string(),
            added: added.iter().map(|s| s.to_string()).collect(),
            modified: modified.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn changed_files_is_a_deduplicated_union() {
        let commit = commit(&["b.txt", "a.txt"], &["a.txt", "c/d.txt"]);
        assert_eq!(commit.changed_files(), vec!["a.txt", "b.txt", "c/d.txt"]);
    }

    #[test]
    fn changed_files_empty() {
        assert!(commit(&[], &[]).changed_files().is_empty());
    }
}
