// ABOUTME: Revert command: pick an earlier rollout tag and roll back to it.
// ABOUTME: Without --to, offers an interactive menu of recent tags.

use std::io::IsTerminal;

use dialoguer::{Select, theme::ColorfulTheme};
use rollout::error::{Error, Result};
use rollout::tags::TagRecord;

use super::Invocation;

pub async fn revert(inv: &mut Invocation, to: Option<&str>, limit: usize) -> Result<()> {
    let target = match to {
        Some(name) => name.to_string(),
        None => {
            let candidates = inv.engine.revert_candidates(limit).await?;
            choose(&candidates)?
        }
    };

    inv.output.progress(&format!("Reverting to {target}..."));
    let outcome = inv.engine.revert(&target).await?;
    inv.output.success(&format!(
        "Reverted to {} as {} ({})",
        target, outcome.tag.name, outcome.tag.digest
    ));
    Ok(())
}

fn choose(candidates: &[TagRecord]) -> Result<String> {
    if candidates.is_empty() {
        return Err(Error::NoSelection);
    }
    if !std::io::stdin().is_terminal() {
        return Err(Error::NoSelection);
    }

    let items: Vec<String> = candidates.iter().map(menu_label).collect();
    let theme = ColorfulTheme::default();
    let picked = Select::with_theme(&theme)
        .with_prompt("Revert to")
        .items(&items)
        .default(0)
        .interact_opt()
        .map_err(|e| Error::Prompt(e.to_string()))?;

    picked
        .and_then(|idx| candidates.get(idx))
        .map(|tag| tag.name.to_string())
        .ok_or(Error::NoSelection)
}

fn menu_label(tag: &TagRecord) -> String {
    let marker = if tag.is_head { " (current)" } else { "" };
    let subject = tag.subject();
    if subject.is_empty() {
        format!("{} {}{}", tag.name, tag.digest, marker)
    } else {
        format!("{} {} {}{}", tag.name, tag.digest, subject, marker)
    }
}
