// ABOUTME: Read-only commands: status, show, show-tag, log and diff.
// ABOUTME: None of these take the lock or touch the working tree.

use rollout::error::Result;
use rollout::tags::TagRecord;
use serde_json::json;

use super::Invocation;
use crate::cli::ListArgs;

pub async fn status(inv: &mut Invocation) -> Result<()> {
    let report = inv.engine.status().await?;

    let mut text = format!("{}: {}\n", report.environment, report.state);
    match &report.lock {
        Some(lock) => {
            text.push_str(&format!("  locked by {}\n", lock.holder_info()));
            text.push_str(&format!("  started from {}\n", lock.start_commit.short()));
            if let Some(tag) = &lock.tag {
                text.push_str(&format!("  tag {tag}\n"));
            }
        }
        None => text.push_str("  not locked\n"),
    }
    text.push_str(&format!("  HEAD {}\n", report.head.short()));
    match report.record.as_ref().and_then(|r| r.tag()) {
        Some(tag) => text.push_str(&format!("  deployed as {tag}\n")),
        None => text.push_str("  deploy record does not describe HEAD\n"),
    }

    inv.output.data(&text, &report);
    Ok(())
}

pub async fn show(inv: &mut Invocation) -> Result<()> {
    match inv.engine.show().await? {
        Some(record) => inv.output.data(&record.render(), &record),
        None => inv.output.data(
            "deploy record missing or stale (its commit is not HEAD)",
            &json!(null),
        ),
    }
    Ok(())
}

pub async fn show_tag(inv: &mut Invocation, args: &ListArgs) -> Result<()> {
    let opts = inv.list_options(args)?;
    let mut tags = inv.engine.show_tag(&opts).await?;
    if let Some(limit) = args.limit {
        tags.truncate(limit);
    }
    print_listing(inv, &tags);
    Ok(())
}

pub async fn log(inv: &mut Invocation, args: &ListArgs) -> Result<()> {
    let opts = inv.list_options(args)?;
    let tags = inv.engine.log(&opts, args.limit).await?;
    print_listing(inv, &tags);
    Ok(())
}

pub async fn diff(inv: &mut Invocation, tag: Option<&str>) -> Result<()> {
    let outcome = inv.engine.diff(tag).await?;
    inv.output.progress(&format!(
        "diff {}..{}",
        outcome.from,
        outcome.to.short()
    ));
    inv.output.data(
        &outcome.diff,
        &json!({ "from": outcome.from, "to": outcome.to, "diff": outcome.diff }),
    );
    Ok(())
}

fn print_listing(inv: &Invocation, tags: &[TagRecord]) {
    let text: String = tags.iter().map(|t| format!("{t}\n")).collect();
    inv.output.data(&text, &tags);
}
