//! System status command.

use anyhow::Result;
use console::style;

use murmur_core::repository::message::MessageStore;

use crate::state::AppState;

/// Display storage and configuration status.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let message_count = state.engine.store().count().await?;
    let config = &state.config;
    let durable = state.engine.store().is_durable();
    let db_path = state.data_dir.join("murmur.db");

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "durable": durable,
            "database": durable.then(|| db_path.display().to_string()),
            "messages": message_count,
            "listen": format!("{}:{}", config.host, config.port),
            "max_body_chars": config.max_body_chars,
            "outbound_buffer": config.outbound_buffer,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} murmur v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Storage ──").dim());
    println!("  Data dir:  {}", style(state.data_dir.display()).cyan());
    if durable {
        println!("  Database:  {}", style(db_path.display()).cyan());
    } else {
        println!("  Database:  {}", style("in-memory").yellow());
    }
    println!("  Messages:  {}", style(message_count).bold());
    println!();

    println!("  {}", style("── Server ──").dim());
    println!("  Listen:    {}:{}", config.host, config.port);
    println!("  Max body:  {} chars", config.max_body_chars);
    println!("  Queue:     {} events per client", config.outbound_buffer);
    if !config.cors_origins.is_empty() {
        println!("  CORS:      {}", config.cors_origins.join(", "));
    }
    println!();

    Ok(())
}
