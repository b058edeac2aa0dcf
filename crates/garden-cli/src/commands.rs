//! Command execution against an open garden.

use std::io::Write;

use anyhow::{Context, Result, anyhow, bail};
use garden_store::{Classification, Garden, Identifier, LeafKind, Session};

use crate::Command;

/// Run one command, writing human-readable output to `out`.
pub(crate) fn run(garden: &mut Garden, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::List { bin, order, topic } => {
            let sessions = match topic.as_deref() {
                Some(topic) => garden.sorted_sessions_by_topic(bin, Some(topic), order),
                None => garden.sorted_sessions(bin, order),
            };
            for session in sessions {
                writeln!(out, "{}", summary(session))?;
            }
        }
        Command::Topics { bin } => {
            for topic in garden.topics(bin) {
                writeln!(out, "{}", topic.as_deref().unwrap_or("(untagged)"))?;
            }
        }
        Command::Show { id } => show(garden, id, out)?,
        Command::New {
            title,
            topic,
            model,
            archive,
        } => {
            let classification = if archive {
                Classification::Archive
            } else {
                Classification::Home
            };
            let mut session = Session::new(classification);
            let _ = session.set_title(title.as_deref());
            let _ = session.set_topic(topic.as_deref());
            let _ = session.set_model(model.as_deref());
            let id = garden.insert(session).context("Failed to insert session")?;
            writeln!(out, "{id}")?;
        }
        Command::Say {
            id,
            text,
            assistant,
        } => {
            let kind = if assistant {
                LeafKind::Assistant
            } else {
                LeafKind::User
            };
            let leaf = handle(garden, id)?
                .append(kind, &text)
                .context("Failed to append leaf")?;
            writeln!(out, "{leaf}")?;
        }
        Command::RenameTopic { bin, old, new } => {
            let changed = garden.rename_topic(bin, &old, &new)?;
            report(out, changed, &format!("renamed {old:?} to {new:?} in {bin}"))?;
        }
        Command::DeleteTopic { bin, topic } => {
            let changed = garden.delete_topic(bin, &topic)?;
            report(out, changed, &format!("cleared {topic:?} in {bin}"))?;
        }
        Command::Prune => {
            let changed = garden.prune().context("Prune failed")?;
            report(out, changed, "pruned")?;
        }
        Command::Purge { yes } => {
            if !yes {
                bail!("refusing to purge without --yes");
            }
            let changed = garden.purge().context("Purge failed")?;
            report(out, changed, "purged")?;
        }
        Command::Restore { id } => {
            let changed = garden.restore(id)?;
            report(out, changed, &format!("restored {id}"))?;
        }
        Command::Delete { id } => {
            let deleted = handle(garden, id)?.delete()?;
            report(out, deleted, &format!("deleted {id}"))?;
        }
        Command::Stats => {
            let stats = serde_json::to_string_pretty(&garden.stats())?;
            writeln!(out, "{stats}")?;
        }
    }
    Ok(())
}

fn handle(garden: &mut Garden, id: Identifier) -> Result<garden_store::SessionMut<'_>> {
    garden
        .session_mut(id)
        .ok_or_else(|| anyhow!("no session {id}"))
}

fn show(garden: &mut Garden, id: Identifier, out: &mut impl Write) -> Result<()> {
    let _ = handle(garden, id)?.open().context("Failed to load leaves")?;
    let session = garden
        .session(id)
        .ok_or_else(|| anyhow!("no session {id}"))?;
    writeln!(out, "{}", summary(session))?;
    for leaf in session.leaves() {
        let model = leaf.model().map(|m| format!(" [{m}]")).unwrap_or_default();
        writeln!(out, "  {} {}{model}: {}", leaf.id(), leaf.kind(), leaf.content())?;
    }
    Ok(())
}

fn summary(session: &Session) -> String {
    let mut line = format!(
        "{} {:<7} {} {}",
        session.id(),
        session.bin_kind(),
        session.update_time().format("%Y-%m-%d %H:%M"),
        session.title().unwrap_or("(untitled)"),
    );
    if let Some(topic) = session.topic() {
        line.push_str(&format!(" #{topic}"));
    }
    if session.is_selected() {
        line.push_str(" *");
    }
    line
}

fn report(out: &mut impl Write, changed: bool, what: &str) -> Result<()> {
    if changed {
        writeln!(out, "{what}")?;
    } else {
        writeln!(out, "nothing to do")?;
    }
    Ok(())
}
