//! `murmur history`: print the stored chat log.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use murmur_core::repository::message::MessageStore;

use crate::state::AppState;

/// Print stored messages, oldest first. `limit` keeps only the most recent N.
pub async fn show_history(state: &AppState, limit: Option<u32>, json: bool) -> Result<()> {
    let store = state.engine.store();
    let messages = match limit {
        Some(n) => store.read_recent(n).await?,
        None => store.read_all().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!();
        println!("  {}", style("No messages yet.").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Time").fg(Color::White),
        Cell::new("Author").fg(Color::White),
        Cell::new("Message").fg(Color::White),
    ]);

    for message in &messages {
        table.add_row(vec![
            Cell::new(message.created_at.format("%Y-%m-%d %H:%M:%S")).fg(Color::DarkGrey),
            Cell::new(&message.author).fg(Color::Cyan),
            Cell::new(&message.body),
        ]);
    }

    println!("{table}");
    println!(
        "  {}",
        style(format!("{} message(s)", messages.len())).dim()
    );
    Ok(())
}
