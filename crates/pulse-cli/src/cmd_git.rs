use pulse_core::{ChangeType, FileChange, StageState};
use pulse_supervisor::{PulseApi, SupervisorConfig};
use std::path::Path;

pub async fn branch(config: SupervisorConfig, path: &Path) -> anyhow::Result<()> {
    let api = PulseApi::new(config);
    let resp = api.get_git_branch(path).await;
    anyhow::ensure!(resp.success, "not a directory: {}", path.display());
    match resp.branch {
        Some(branch) => println!("{branch}"),
        None => println!("(no branch)"),
    }
    Ok(())
}

pub async fn changes(config: SupervisorConfig, path: &Path, json: bool) -> anyhow::Result<()> {
    let api = PulseApi::new(config);
    let resp = api.get_file_changes(path).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }
    if let Some(error) = resp.error {
        anyhow::bail!(error);
    }
    if resp.changes.is_empty() {
        println!("No changes");
        return Ok(());
    }
    for change in &resp.changes {
        println!("{}", format_change(change));
    }
    Ok(())
}

pub(crate) fn format_change(change: &FileChange) -> String {
    let stage = match change.status {
        StageState::Staged => "staged",
        StageState::Unstaged => "unstaged",
    };
    let kind = match change.change_type {
        ChangeType::Added => "A",
        ChangeType::Modified => "M",
        ChangeType::Deleted => "D",
    };
    format!("{kind} {stage:<8} {}", change.path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_line_layout() {
        let change = FileChange {
            path: "src/app.ts".into(),
            change_type: ChangeType::Modified,
            status: StageState::Staged,
        };
        assert_eq!(format_change(&change), "M staged   src/app.ts");

        let change = FileChange {
            path: "new.txt".into(),
            change_type: ChangeType::Added,
            status: StageState::Unstaged,
        };
        assert_eq!(format_change(&change), "A unstaged new.txt");
    }
}
