use std::collections::HashMap;
use std::io::IsTerminal;

use anyhow::{Context, Result};
use braid_cli::{render_shell_completion, BraidCommand, Cli, CliConversationSort, HeadCommand, LogArgs};
use braid_session::{
    BraidError, BraidResult, ConversationGraph, ConversationSort, HeadController, HeadState,
    NewTurn, SqliteTurnStore, TurnRecorder, TurnStore,
};
use serde_json::{Map, Value};

use crate::render::{
    format_conversation, format_conversation_list, format_head_move, format_head_turn, Theme,
};

/// Runs one parsed invocation and returns the text to print.
pub(crate) fn execute_cli(cli: &Cli) -> Result<String> {
    if let BraidCommand::Completions { shell } = &cli.command {
        let mut script = Vec::new();
        render_shell_completion(*shell, &mut script)?;
        return Ok(String::from_utf8(script)?.trim_end().to_string());
    }

    let store = SqliteTurnStore::open(&cli.db)
        .with_context(|| format!("failed to open log database {}", cli.db.display()))?;
    let theme = Theme::new(!cli.no_color && std::io::stdout().is_terminal());
    execute_command(&store, &cli.command, &theme)
}

pub(crate) fn execute_command<S: TurnStore + ?Sized>(
    store: &S,
    command: &BraidCommand,
    theme: &Theme,
) -> Result<String> {
    match command {
        BraidCommand::Log(args) => execute_log(store, args),
        BraidCommand::Head { command } => {
            execute_head(store, command.as_ref().unwrap_or(&HeadCommand::Show), theme)
        }
        BraidCommand::Export { identifier } => execute_export(store, identifier.as_deref()),
        BraidCommand::Completions { .. } => Ok(String::new()),
    }
}

fn execute_log<S: TurnStore + ?Sized>(store: &S, args: &LogArgs) -> Result<String> {
    let options = args
        .options
        .iter()
        .filter(|(_, value)| !value.is_null())
        .cloned()
        .collect::<Map<String, Value>>();
    let turn = TurnRecorder::new(store).record_turn(
        NewTurn {
            conversation_id: args.conversation.clone(),
            model: args.model.clone(),
            prompt: args.prompt.clone(),
            system: args.system.clone(),
            response: args.response.clone(),
            options,
            input_tokens: args.input_tokens,
            output_tokens: args.output_tokens,
            duration_ms: args.duration_ms,
            ..NewTurn::default()
        },
        args.parent.as_deref(),
    )?;
    Ok(turn.id)
}

fn execute_head<S: TurnStore + ?Sized>(
    store: &S,
    command: &HeadCommand,
    theme: &Theme,
) -> Result<String> {
    let head = HeadController::new(store);
    match command {
        HeadCommand::Show => Ok(match head.show()? {
            Some(turn) => format_head_turn(&turn, theme),
            None => "No head currently set".to_string(),
        }),
        HeadCommand::Set { response_id } => {
            let turn = head.set(response_id)?;
            Ok(format_head_move(
                &format!("Head is now at response {}", turn.id),
                &turn,
                theme,
            ))
        }
        HeadCommand::Back => {
            let parent_id = head.back()?;
            let parent = store.get_turn(&parent_id)?;
            Ok(format_head_move(
                &format!("Head moved back to response {parent_id}"),
                &parent,
                theme,
            ))
        }
        HeadCommand::Populate => {
            let report = ConversationGraph::new(store).backfill_parent_links()?;
            Ok(format!(
                "Linked {} of {} responses across {} conversations",
                report.turns_linked, report.turns_scanned, report.conversations
            ))
        }
        HeadCommand::Print { identifier } => match identifier {
            Some(identifier) => {
                let conversation_id = ConversationGraph::new(store).resolve_identifier(identifier)?;
                Ok(head.with_conversation_override(&conversation_id, |controller| {
                    render_head_conversation(store, controller, theme)
                })?)
            }
            None => Ok(render_head_conversation(store, &head, theme)?),
        },
        HeadCommand::List { sort } => list_conversations(store, *sort, theme),
    }
}

/// Renders the conversation holding the head, as reconstructed from it.
fn render_head_conversation<S: TurnStore + ?Sized>(
    store: &S,
    head: &HeadController<'_, S>,
    theme: &Theme,
) -> BraidResult<String> {
    let HeadState::At(head_id) = head.state()? else {
        return Err(BraidError::HeadUnset);
    };
    let turn = store
        .find_turn(&head_id)?
        .ok_or_else(|| BraidError::NotFound {
            kind: "Current head response",
            id: head_id.clone(),
        })?;
    let loaded = ConversationGraph::new(store)
        .load_conversation(Some(&turn.conversation_id))?
        .ok_or_else(|| BraidError::ConversationNotFound(turn.conversation_id.clone()))?;
    Ok(format_conversation(&loaded, Some(&head_id), theme))
}

fn list_conversations<S: TurnStore + ?Sized>(
    store: &S,
    sort: CliConversationSort,
    theme: &Theme,
) -> Result<String> {
    let graph = ConversationGraph::new(store);
    let rows = graph.list_conversations(sort.into())?;
    if rows.is_empty() {
        return Ok("No conversations logged yet".to_string());
    }

    let ordinals = graph
        .list_conversations(ConversationSort::Recency)?
        .into_iter()
        .enumerate()
        .map(|(index, row)| (row.id, index + 1))
        .collect::<HashMap<_, _>>();
    let head_conversation = match store.get_head()? {
        Some(head_id) => store.find_turn(&head_id)?.map(|turn| turn.conversation_id),
        None => None,
    };
    // Newest (or longest) at the bottom, next to the prompt.
    Ok(format_conversation_list(
        rows.iter().rev(),
        &ordinals,
        head_conversation.as_deref(),
        theme,
    ))
}

fn execute_export<S: TurnStore + ?Sized>(store: &S, identifier: Option<&str>) -> Result<String> {
    let graph = ConversationGraph::new(store);
    let loaded = match identifier {
        Some(identifier) => {
            let conversation_id = graph.resolve_identifier(identifier)?;
            graph.load_conversation(Some(&conversation_id))?
        }
        None => graph.load_conversation(None)?,
    };
    Ok(serde_json::to_string_pretty(&loaded)?)
}

#[cfg(test)]
mod tests {
    use braid_cli::Cli;
    use clap::Parser;
    use serde_json::Value;

    use super::*;

    fn run(store: &SqliteTurnStore, args: &[&str]) -> Result<String> {
        let mut argv = vec!["braid"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).expect("parse arguments");
        execute_command(store, &cli.command, &Theme::new(false))
    }

    fn log(store: &SqliteTurnStore, prompt: &str, extra: &[&str]) -> String {
        let mut args = vec![
            "log",
            "--model",
            "gpt-4o-mini",
            "--prompt",
            prompt,
            "--response",
            "ok",
        ];
        args.extend_from_slice(extra);
        run(store, &args).expect("log turn")
    }

    fn store() -> SqliteTurnStore {
        SqliteTurnStore::open_in_memory().expect("in-memory store")
    }

    #[test]
    fn head_show_reports_unset_then_current_turn() {
        let store = store();
        assert_eq!(run(&store, &["head"]).expect("show"), "No head currently set");

        let id = log(&store, "first question", &[]);
        let shown = run(&store, &["head", "show"]).expect("show");
        assert!(shown.starts_with(&format!("Current head is at response {id}")));
        assert!(shown.contains("Prompt:\nfirst question"));
        assert!(shown.contains("Response:\nok"));
    }

    #[test]
    fn log_records_options_and_drops_nulls() {
        let store = store();
        let id = log(
            &store,
            "tune",
            &["--option", "temperature=0.3", "--option", "seed=null", "--input-tokens", "7"],
        );
        let turn = store.get_turn(&id).expect("turn");
        assert_eq!(turn.options.get("temperature"), Some(&Value::from(0.3)));
        assert!(!turn.options.contains_key("seed"));
        assert_eq!(turn.input_tokens, Some(7));
    }

    #[test]
    fn head_back_and_set_report_new_position() {
        let store = store();
        let first = log(&store, "one", &[]);
        let conversation = store.get_turn(&first).expect("turn").conversation_id;
        let second = log(&store, "two", &["--conversation", &conversation]);

        let moved = run(&store, &["head", "back"]).expect("back");
        assert!(moved.starts_with(&format!("Head moved back to response {first}")));
        assert!(moved.contains("Prompt: one"));

        let error = run(&store, &["head", "back"]).expect_err("root has no parent");
        assert_eq!(error.to_string(), format!("No parent response found for {first}"));

        let set = run(&store, &["head", "set", &second]).expect("set");
        assert!(set.starts_with(&format!("Head is now at response {second}")));
    }

    #[test]
    fn head_print_renders_branch_at_head_and_restores_after_override() {
        let store = store();
        let root = log(&store, "root", &[]);
        let conversation = store.get_turn(&root).expect("turn").conversation_id;
        let main = log(&store, "main", &["--conversation", &conversation]);
        let branch = log(&store, "branch", &["--parent", &root]);
        let other = log(&store, "elsewhere", &[]);

        run(&store, &["head", "set", &main]).expect("set");
        let printed = run(&store, &["head", "print"]).expect("print");
        assert!(printed.contains(&format!("→ Exchange 2 -- {main}")));
        assert!(!printed.contains(&branch));

        run(&store, &["head", "set", &other]).expect("set");
        let printed = run(&store, &["head", "print", &conversation]).expect("print by id");
        assert!(printed.contains(&format!("→ Exchange 2 -- {branch}")));
        assert!(printed.contains(&format!("Exchange 1 -- {root}")));
        assert_eq!(
            store.get_head().expect("head").as_deref(),
            Some(other.as_str())
        );

        let printed = run(&store, &["head", "print", "2"]).expect("print by ordinal");
        assert!(printed.contains(&format!("Conversation: root ({conversation})")));
    }

    #[test]
    fn head_print_errors_without_head() {
        let store = store();
        let error = run(&store, &["head", "print"]).expect_err("no head");
        assert_eq!(error.to_string(), "No current head set");

        log(&store, "only", &[]);
        store.set_head("gone").expect("dangling head");
        let error = run(&store, &["head", "print"]).expect_err("dangling head");
        assert_eq!(error.to_string(), "Current head response gone not found");
    }

    #[test]
    fn head_list_orders_oldest_first_with_recency_ordinals() {
        let store = store();
        assert_eq!(
            run(&store, &["head", "list"]).expect("list"),
            "No conversations logged yet"
        );
        let old = log(&store, "old talk", &[]);
        let new = log(&store, "new talk", &[]);
        let old_conversation = store.get_turn(&old).expect("turn").conversation_id;
        let new_conversation = store.get_turn(&new).expect("turn").conversation_id;

        let listed = run(&store, &["head", "list"]).expect("list");
        let old_at = listed
            .find(&format!("  [2] old talk -- {old_conversation}"))
            .expect("old row");
        let new_at = listed
            .find(&format!("→ [1] new talk -- {new_conversation}"))
            .expect("new row");
        assert!(old_at < new_at);
    }

    #[test]
    fn populate_reports_backfill_counts() {
        let store = store();
        log(&store, "one", &[]);
        assert_eq!(
            run(&store, &["head", "populate"]).expect("populate"),
            "Linked 0 of 1 responses across 1 conversations"
        );
    }

    #[test]
    fn export_emits_chain_json_or_null() {
        let store = store();
        assert_eq!(run(&store, &["export"]).expect("export"), "null");

        let id = log(&store, "exported", &[]);
        let raw = run(&store, &["export", "1"]).expect("export");
        let value = serde_json::from_str::<Value>(&raw).expect("json");
        assert_eq!(value["conversation"]["name"], "exported");
        assert_eq!(value["turns"][0]["id"], id.as_str());

        let error = run(&store, &["export", "missing-id"]).expect_err("missing");
        assert_eq!(error.to_string(), "No conversation found with id=missing-id");
    }
}
