//! `psc db` handlers.

use anyhow::Result;

pub async fn status() -> Result<()> {
    let pool = psc_db::connect_from_env().await?;
    let s = psc_db::status(&pool).await?;
    println!(
        "db_ok={} has_transfers_table={} has_outbox_table={} has_config_table={}",
        s.ok, s.has_transfers_table, s.has_outbox_table, s.has_config_table
    );
    if s.is_migrated() {
        println!("outbox_pending={}", psc_db::outbox_count_pending(&pool).await?);
    }
    Ok(())
}

pub async fn migrate() -> Result<()> {
    let pool = psc_db::connect_from_env().await?;
    psc_db::migrate(&pool).await?;
    println!("migrations_applied=true");
    Ok(())
}
