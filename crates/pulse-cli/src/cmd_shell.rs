//! Interactive loop: `:`-prefixed lines manage workspaces, everything else
//! goes to the selected workspace through the command router.

use crate::cmd_git::format_change;
use pulse_core::{SupervisorEvent, Workspace};
use pulse_supervisor::{PulseApi, SupervisorConfig};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

const HELP: &str = "\
:add PATH [NAME] [--provider P]   create a workspace and select it
:ls                               list workspaces
:use ID|NAME|N                    select a workspace
:rm ID|NAME|N                     remove a workspace (kills its session)
:stop                             stop the selected workspace's session
:git                              refresh branch and changes
:check P                          check a provider's CLI
:help                             this text
:quit                             exit
anything else                     run in the selected workspace";

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Meta {
    Add {
        path: PathBuf,
        name: Option<String>,
        provider: String,
    },
    List,
    Use(String),
    Remove(String),
    Stop,
    Git,
    Check(String),
    Help,
    Quit,
}

/// Parse a `:`-prefixed line. `None` if the line is not a meta command.
pub(crate) fn parse_meta(line: &str) -> Option<Result<Meta, String>> {
    let rest = line.trim().strip_prefix(':')?;
    let mut words = rest.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let one = |usage: &str| match args.as_slice() {
        [arg] => Ok(arg.to_string()),
        _ => Err(format!("usage: {usage}")),
    };
    let none = |meta: Meta| {
        if args.is_empty() {
            Ok(meta)
        } else {
            Err(format!(":{verb} takes no arguments"))
        }
    };

    let parsed = match verb {
        "add" => parse_add(&args),
        "ls" | "list" => none(Meta::List),
        "use" => one(":use ID").map(Meta::Use),
        "rm" => one(":rm ID").map(Meta::Remove),
        "stop" => none(Meta::Stop),
        "git" => none(Meta::Git),
        "check" => one(":check PROVIDER").map(Meta::Check),
        "help" | "h" | "?" => none(Meta::Help),
        "quit" | "q" | "exit" => none(Meta::Quit),
        other => Err(format!("unknown command :{other} (try :help)")),
    };
    Some(parsed)
}

fn parse_add(args: &[&str]) -> Result<Meta, String> {
    let usage = || "usage: :add PATH [NAME] [--provider P]".to_string();
    let mut positional = Vec::new();
    let mut provider = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if *arg == "--provider" || *arg == "-p" {
            provider = Some(iter.next().ok_or_else(usage)?.to_string());
        } else {
            positional.push(*arg);
        }
    }
    match positional.as_slice() {
        [path] => Ok(Meta::Add {
            path: PathBuf::from(path),
            name: None,
            provider: provider.unwrap_or_else(|| "claude".into()),
        }),
        [path, name @ ..] if !name.is_empty() => Ok(Meta::Add {
            path: PathBuf::from(path),
            name: Some(name.join(" ")),
            provider: provider.unwrap_or_else(|| "claude".into()),
        }),
        _ => Err(usage()),
    }
}

/// Find a workspace by id, exact name, or 1-based position in `:ls`.
pub(crate) fn resolve_workspace<'a>(workspaces: &'a [Workspace], token: &str) -> Option<&'a Workspace> {
    workspaces
        .iter()
        .find(|w| w.id == token)
        .or_else(|| workspaces.iter().find(|w| w.name == token))
        .or_else(|| {
            let index: usize = token.parse().ok()?;
            workspaces.get(index.checked_sub(1)?)
        })
}

/// Render one event as display lines, each tagged with whether it belongs
/// on stderr.
pub(crate) fn render_event(names: &mut HashMap<String, String>, event: &SupervisorEvent) -> Vec<(String, bool)> {
    match event {
        SupervisorEvent::WorkspaceUpdated { workspace } => {
            let previous = names.insert(workspace.id.clone(), workspace.name.clone());
            let line = match previous {
                None => format!("-- {} created ({})", workspace.name, workspace.status),
                Some(_) => format!("-- {}: {}", workspace.name, workspace.status),
            };
            vec![(line, false)]
        }
        SupervisorEvent::WorkspaceRemoved { workspace_id } => {
            let name = names.remove(workspace_id).unwrap_or_else(|| workspace_id.clone());
            vec![(format!("-- {name} removed"), false)]
        }
        SupervisorEvent::TerminalOutput {
            workspace_id,
            text,
            is_error,
        } => {
            let name = names.get(workspace_id).map(String::as_str).unwrap_or(workspace_id);
            let marker = if *is_error { '!' } else { '|' };
            text.lines()
                .map(|line| (format!("{name} {marker} {line}"), *is_error))
                .collect()
        }
        SupervisorEvent::SessionLaunched { workspace_id, pid } => {
            let name = names.get(workspace_id).map(String::as_str).unwrap_or(workspace_id);
            let pid = pid.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
            vec![(format!("-- {name}: launched (pid {pid})"), false)]
        }
    }
}

pub async fn execute(config: SupervisorConfig) -> anyhow::Result<()> {
    let api = PulseApi::new(config);
    let mut events = api.subscribe();
    let printer = tokio::spawn(async move {
        let mut names = HashMap::new();
        loop {
            match events.recv().await {
                Ok(event) => {
                    for (line, is_error) in render_event(&mut names, &event) {
                        if is_error {
                            eprintln!("{line}");
                        } else {
                            println!("{line}");
                        }
                    }
                }
                Err(RecvError::Lagged(n)) => eprintln!("-- ({n} events skipped)"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("pulse: :help for commands");
    let mut selected: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt(&api, selected.as_deref());

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            prompt(&api, selected.as_deref());
            continue;
        }
        match parse_meta(&line) {
            Some(Ok(Meta::Quit)) => break,
            Some(Ok(meta)) => run_meta(&api, meta, &mut selected).await,
            Some(Err(usage)) => eprintln!("{usage}"),
            None => match &selected {
                Some(id) => {
                    let resp = api.execute_command(id, &line).await;
                    if let Some(output) = resp.output.filter(|o| !o.is_empty()) {
                        print!("{output}");
                        if !output.ends_with('\n') {
                            println!();
                        }
                    }
                    if let Some(error) = resp.error {
                        eprintln!("{}", error.trim_end());
                    }
                }
                None => eprintln!("no workspace selected (:add PATH or :use ID)"),
            },
        }
        prompt(&api, selected.as_deref());
    }

    api.shutdown();
    printer.abort();
    Ok(())
}

async fn run_meta(api: &PulseApi, meta: Meta, selected: &mut Option<String>) {
    match meta {
        Meta::Add {
            path,
            name,
            provider,
        } => {
            let name = name.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            });
            let resp = api.create_workspace(&path, &name, &provider).await;
            match (resp.workspace, resp.error) {
                (Some(ws), _) => *selected = Some(ws.id),
                (None, error) => eprintln!("{}", error.unwrap_or_default()),
            }
        }
        Meta::List => {
            let workspaces = api.list_workspaces();
            if workspaces.is_empty() {
                println!("No workspaces");
            }
            for (i, ws) in workspaces.iter().enumerate() {
                let mark = if selected.as_deref() == Some(ws.id.as_str()) { '*' } else { ' ' };
                let branch = ws.git_branch.as_deref().map(|b| format!(" [{b}]")).unwrap_or_default();
                println!(
                    "{mark}{:>2} {:<9} {:<12} {} {}{branch}",
                    i + 1,
                    ws.status.as_str(),
                    ws.name,
                    ws.id,
                    ws.path.display()
                );
            }
        }
        Meta::Use(token) => match resolve_workspace(&api.list_workspaces(), &token) {
            Some(ws) => *selected = Some(ws.id.clone()),
            None => eprintln!("no workspace matches {token}"),
        },
        Meta::Remove(token) => {
            let Some(id) = resolve_workspace(&api.list_workspaces(), &token).map(|w| w.id.clone()) else {
                eprintln!("no workspace matches {token}");
                return;
            };
            let resp = api.remove_workspace(&id).await;
            if let Some(error) = resp.error {
                eprintln!("{error}");
            } else if selected.as_deref() == Some(id.as_str()) {
                *selected = None;
            }
        }
        Meta::Stop => match selected {
            Some(id) => {
                if let Some(error) = api.stop_session(id).await.error {
                    eprintln!("{error}");
                }
            }
            None => eprintln!("no workspace selected"),
        },
        Meta::Git => match selected {
            Some(id) => {
                let resp = api.refresh_workspace(id).await;
                match resp.workspace {
                    Some(ws) => {
                        println!("branch: {}", ws.git_branch.as_deref().unwrap_or("(none)"));
                        for change in ws.file_changes.unwrap_or_default() {
                            println!("  {}", format_change(&change));
                        }
                    }
                    None => eprintln!("{}", resp.error.unwrap_or_default()),
                }
            }
            None => eprintln!("no workspace selected"),
        },
        Meta::Check(provider) => {
            let result = api.check_tool_availability(&provider).await;
            let mark = if result.available { '✓' } else { '✗' };
            println!("{mark} {}", result.message);
        }
        Meta::Help => println!("{HELP}"),
        Meta::Quit => {}
    }
}

fn prompt(api: &PulseApi, selected: Option<&str>) {
    let label = selected
        .and_then(|id| api.registry().get(id).ok())
        .map(|ws| format!("{} ({})", ws.name, ws.status))
        .unwrap_or_else(|| "pulse".into());
    print!("{label}> ");
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{Provider, WorkspaceStatus};

    #[test]
    fn plain_lines_are_not_meta() {
        assert_eq!(parse_meta("ls -la"), None);
        assert_eq!(parse_meta("claude"), None);
    }

    #[test]
    fn add_variants() {
        assert_eq!(
            parse_meta(":add /proj"),
            Some(Ok(Meta::Add {
                path: "/proj".into(),
                name: None,
                provider: "claude".into()
            }))
        );
        assert_eq!(
            parse_meta(":add /proj My Proj --provider gemini"),
            Some(Ok(Meta::Add {
                path: "/proj".into(),
                name: Some("My Proj".into()),
                provider: "gemini".into()
            }))
        );
        assert!(matches!(parse_meta(":add"), Some(Err(_))));
        assert!(matches!(parse_meta(":add /proj --provider"), Some(Err(_))));
    }

    #[test]
    fn argument_counts_checked() {
        assert_eq!(parse_meta(":use ws_1"), Some(Ok(Meta::Use("ws_1".into()))));
        assert!(matches!(parse_meta(":use"), Some(Err(_))));
        assert!(matches!(parse_meta(":ls extra"), Some(Err(_))));
        assert!(matches!(parse_meta(":frobnicate"), Some(Err(_))));
        assert_eq!(parse_meta(" :q "), Some(Ok(Meta::Quit)));
    }

    #[test]
    fn resolve_by_id_name_or_index() {
        let a = Workspace::new("/a".into(), "alpha".into(), Provider::ClaudeCode);
        let b = Workspace::new("/b".into(), "beta".into(), Provider::Gemini);
        let all = vec![a.clone(), b.clone()];
        assert_eq!(resolve_workspace(&all, &b.id), Some(&b));
        assert_eq!(resolve_workspace(&all, "alpha"), Some(&a));
        assert_eq!(resolve_workspace(&all, "2"), Some(&b));
        assert_eq!(resolve_workspace(&all, "0"), None);
        assert_eq!(resolve_workspace(&all, "gamma"), None);
    }

    #[test]
    fn output_lines_tagged_with_workspace_name() {
        let mut names = HashMap::new();
        let mut ws = Workspace::new("/a".into(), "alpha".into(), Provider::ClaudeCode);
        let created = render_event(
            &mut names,
            &SupervisorEvent::WorkspaceUpdated {
                workspace: ws.clone(),
            },
        );
        assert_eq!(created, vec![("-- alpha created (idle)".to_string(), false)]);

        ws.status = WorkspaceStatus::Running;
        let updated = render_event(&mut names, &SupervisorEvent::WorkspaceUpdated { workspace: ws.clone() });
        assert_eq!(updated, vec![("-- alpha: running".to_string(), false)]);

        let lines = render_event(
            &mut names,
            &SupervisorEvent::TerminalOutput {
                workspace_id: ws.id.clone(),
                text: "one\ntwo\n".into(),
                is_error: true,
            },
        );
        assert_eq!(
            lines,
            vec![
                ("alpha ! one".to_string(), true),
                ("alpha ! two".to_string(), true)
            ]
        );
    }
}
