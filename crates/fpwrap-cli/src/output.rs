use atty::Stream;
use color_eyre::Result;
use fpwrap_core::{CommandInfo, CommandStatus, ExecutionOutcome};
use serde_json::Value;

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

/// Renders the outcome and returns the process exit code: 0 ok, 1 failure,
/// 2 invalid invocation (clap's own parse errors also exit 2).
pub fn emit_output(
    opts: &OutputOptions,
    info: CommandInfo,
    outcome: &ExecutionOutcome,
) -> Result<i32> {
    let code = match outcome.status {
        CommandStatus::Ok => 0,
        CommandStatus::Failure => 1,
        CommandStatus::UserError => 2,
    };

    if opts.json {
        let payload = fpwrap_core::to_json_response(info, outcome, code);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    if outcome.status == CommandStatus::Ok {
        if !opts.quiet {
            let style = Style::new(opts.no_color, atty::is(Stream::Stdout));
            if is_passthrough(&outcome.details) {
                print!("{}", outcome.details["stdout"].as_str().unwrap_or_default());
            } else {
                let message = fpwrap_core::format_status_message(info, &outcome.message);
                println!("{}", style.status(&outcome.status, &message));
                if let Some(table) = render_wrapper_table(&style, &outcome.details) {
                    println!("{table}");
                }
                if let Some(items) = render_item_list(&outcome.details) {
                    println!("{items}");
                }
                if let Some(hint) = hint_from_details(&outcome.details) {
                    println!("{}", style.info(&format!("Hint: {hint}")));
                }
            }
        }
    } else {
        // Errors go to stderr so scripts piping stdout stay clean.
        let style = Style::new(opts.no_color, atty::is(Stream::Stderr));
        let message = fpwrap_core::format_status_message(info, &outcome.message);
        eprintln!("{}", style.error(&format!("ERROR: {message}")));
        if let Some(hint) = hint_from_details(&outcome.details) {
            eprintln!("{}", style.warn(&format!("Hint: {hint}")));
        }
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn is_passthrough(details: &Value) -> bool {
    details
        .as_object()
        .and_then(|map| map.get("passthrough"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// The `list`/`search` commands carry a `wrappers` array; render it as the
/// aligned three-column table humans expect.
fn render_wrapper_table(style: &Style, details: &Value) -> Option<String> {
    let wrappers = details.get("wrappers")?.as_array()?;
    if wrappers.is_empty() {
        return None;
    }

    let mut rows = Vec::new();
    for wrapper in wrappers {
        let obj = wrapper.as_object()?;
        rows.push((
            obj.get("name")?.as_str()?.to_string(),
            obj.get("id")?.as_str()?.to_string(),
            obj.get("preference")?.as_str()?.to_string(),
        ));
    }

    let headers = ["Wrapper", "Application", "Preference"];
    let mut widths = [headers[0].len(), headers[1].len(), headers[2].len()];
    for (name, id, pref) in &rows {
        widths[0] = widths[0].max(name.len());
        widths[1] = widths[1].max(id.len());
        widths[2] = widths[2].max(pref.len());
    }

    let mut lines = Vec::new();
    lines.push(style.table_header(&format!(
        "{:<w0$}  {:<w1$}  {:<w2$}",
        headers[0],
        headers[1],
        headers[2],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
    )));
    lines.push(format!(
        "{:-<w0$}  {:-<w1$}  {:-<w2$}",
        "",
        "",
        "",
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
    ));
    for (name, id, pref) in &rows {
        lines.push(format!(
            "{name:<w0$}  {id:<w1$}  {pref:<w2$}",
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
        ));
    }
    Some(lines.join("\n"))
}

/// Cleanup reports its targets as plain labels; print them one per line.
fn render_item_list(details: &Value) -> Option<String> {
    let items = details.get("items")?.as_array()?;
    if items.is_empty() {
        return None;
    }
    let lines: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
    Some(
        lines
            .iter()
            .map(|line| format!("  {line}"))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}
