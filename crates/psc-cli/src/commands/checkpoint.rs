//! `psc checkpoint` handlers.
//!
//! Operator overrides of the per-category poll lower bound. Values are
//! validated before anything is written, so `set` can never store a value
//! the engine would later reject.

use anyhow::Result;
use psc_schemas::Checkpoint;

use super::parse_category;

pub async fn show(category: &str) -> Result<()> {
    let category = parse_category(category)?;
    let pool = psc_db::connect_from_env().await?;
    let key = category.checkpoint_key();

    println!("category={}", category);
    println!("key={}", key);
    match psc_db::config_get(&pool, key).await? {
        None => println!("checkpoint=NONE"),
        Some(raw) => {
            println!("checkpoint={}", raw);
            println!("valid={}", Checkpoint::parse(&raw).is_ok());
        }
    }
    Ok(())
}

pub async fn set(category: &str, value: &str) -> Result<()> {
    let category = parse_category(category)?;
    let cp = Checkpoint::parse(value)?;

    let pool = psc_db::connect_from_env().await?;
    psc_db::config_set(&pool, category.checkpoint_key(), &cp.to_rfc3339()).await?;
    println!("checkpoint_set=true category={} checkpoint={}", category, cp);
    Ok(())
}

pub async fn clear(category: &str) -> Result<()> {
    let category = parse_category(category)?;
    let pool = psc_db::connect_from_env().await?;
    let removed = psc_db::config_delete(&pool, category.checkpoint_key()).await?;
    println!("checkpoint_cleared={} category={}", removed, category);
    Ok(())
}
