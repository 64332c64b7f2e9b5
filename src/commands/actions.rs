// ABOUTME: Handlers for the mutating rollout actions.
// ABOUTME: Each handler calls the engine and reports the outcome through Output.

use rollout::error::Result;
use serde_json::json;

use super::Invocation;

pub async fn start(inv: &mut Invocation, hotfix: bool) -> Result<()> {
    let env = inv.engine.settings().environment.clone();
    inv.output
        .progress(&format!("Starting {} of {}...", if hotfix { "hotfix" } else { "rollout" }, env));

    let outcome = inv.engine.start(hotfix).await?;

    if outcome.pulled {
        inv.output
            .progress(&format!("  → Updated to {}", outcome.head.short()));
    }
    inv.output.success(&format!(
        "Locked {} at {}; run `rollout sync` when ready",
        env,
        outcome.head.short()
    ));
    Ok(())
}

pub async fn sync(inv: &mut Invocation) -> Result<()> {
    inv.output.progress("Syncing...");
    let outcome = inv.engine.sync().await?;
    inv.output
        .success(&format!("Rolled out {} ({})", outcome.tag.name, outcome.tag.digest));
    Ok(())
}

pub async fn manual_sync(inv: &mut Invocation) -> Result<()> {
    let outcome = inv.engine.manual_sync().await?;
    inv.output.success(&format!(
        "Tagged {}; sync by hand, then run `rollout finish`",
        outcome.tag.name
    ));
    Ok(())
}

pub async fn finish(inv: &mut Invocation) -> Result<()> {
    let outcome = inv.engine.finish().await?;
    let message = match outcome.tag {
        Some(tag) => format!("Finished rollout {tag}"),
        None => "Finished rollout".to_string(),
    };
    inv.output.success(&message);
    Ok(())
}

pub async fn abort(inv: &mut Invocation) -> Result<()> {
    let outcome = inv.engine.abort().await?;
    if let Some(commit) = &outcome.restored_to {
        inv.output
            .progress(&format!("  → Working tree reset to {}", commit.short()));
    }
    if !outcome.hook_failures.is_empty() {
        inv.output.progress(&format!(
            "  → {} hook(s) failed while restoring the tree",
            outcome.hook_failures.len()
        ));
    }
    inv.output.success("Rollout aborted, lock released");
    Ok(())
}

pub async fn release(inv: &mut Invocation) -> Result<()> {
    let outcome = inv.engine.release().await?;
    let message = match outcome.tag {
        Some(tag) => format!("Released {tag}"),
        None => "Released".to_string(),
    };
    inv.output.success(&message);
    Ok(())
}

pub async fn tag(inv: &mut Invocation, push: bool) -> Result<()> {
    let outcome = inv.engine.tag(push).await?;
    let text = if outcome.pushed {
        format!("{} (pushed)", outcome.tag.name)
    } else {
        format!("{} (local only)", outcome.tag.name)
    };
    inv.output.data(
        &text,
        &json!({ "tag": outcome.tag, "pushed": outcome.pushed }),
    );
    Ok(())
}
