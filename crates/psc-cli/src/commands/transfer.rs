//! `psc transfer` handlers.

use anyhow::{bail, Result};

use super::parse_transfer_id;

pub async fn show(id: &str) -> Result<()> {
    let transfer_id = parse_transfer_id(id)?;
    let pool = psc_db::connect_from_env().await?;

    let Some(t) = psc_db::fetch_transfer(&pool, transfer_id).await? else {
        bail!("transfer not found: {}", transfer_id);
    };

    println!("transfer_id={}", t.transfer_id);
    println!("category={}", t.category);
    println!("order_id={}", t.order_id);
    println!("status={}", t.status);
    println!("status_reason={}", t.status_reason.as_deref().unwrap_or("NONE"));
    println!("retry_count={}", t.retry_count);
    println!("order_created_at_utc={}", t.order_created_at_utc.to_rfc3339());
    println!("created_at_utc={}", t.created_at_utc.to_rfc3339());
    println!("updated_at_utc={}", t.updated_at_utc.to_rfc3339());
    Ok(())
}

/// Manual downstream-failure report: the transfer re-enters the backlog and
/// its next dispatch carries a new attempt number.
pub async fn mark_retriable(id: &str, reason: &str) -> Result<()> {
    let transfer_id = parse_transfer_id(id)?;
    if reason.trim().is_empty() {
        bail!("--reason must not be empty");
    }
    let pool = psc_db::connect_from_env().await?;

    if !psc_db::mark_transfer_retriable(&pool, transfer_id, reason.trim()).await? {
        bail!(
            "transfer {} was not marked retriable (unknown, or not PENDING/DISPATCHED)",
            transfer_id
        );
    }
    println!("marked_retriable=true transfer_id={}", transfer_id);
    Ok(())
}

pub async fn counts() -> Result<()> {
    let pool = psc_db::connect_from_env().await?;
    let rows = psc_db::transfer_counts(&pool).await?;
    if rows.is_empty() {
        println!("transfers=0");
    }
    for (category, status, n) in rows {
        println!("category={} status={} count={}", category, status, n);
    }
    Ok(())
}
