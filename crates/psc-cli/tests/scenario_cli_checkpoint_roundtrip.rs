//! Scenario: `psc checkpoint set/show/clear` against Postgres.
//!
//! This test is DB-backed and is skipped if PSC_DATABASE_URL is not set.

use predicates::prelude::*;

#[allow(deprecated)]
fn psc() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("psc").expect("psc binary")
}

#[tokio::test]
async fn checkpoint_set_show_clear_roundtrip() -> anyhow::Result<()> {
    let url = match std::env::var(psc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: PSC_DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = psc_db::connect_from_env().await?;
    psc_db::migrate(&pool).await?;

    // Keep whatever a local run left behind.
    let key = psc_schemas::OrderCategory::Service.checkpoint_key();
    let prior = psc_db::config_get(&pool, key).await?;

    psc()
        .env(psc_db::ENV_DB_URL, &url)
        .args([
            "checkpoint",
            "set",
            "--category",
            "service",
            "--value",
            "2024-05-01T10:30:00+02:00",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("checkpoint=2024-05-01T08:30:00Z"));

    psc()
        .env(psc_db::ENV_DB_URL, &url)
        .args(["checkpoint", "show", "--category", "SERVICE"])
        .assert()
        .success()
        .stdout(predicate::str::contains("checkpoint=2024-05-01T08:30:00Z"))
        .stdout(predicate::str::contains("valid=true"));

    psc()
        .env(psc_db::ENV_DB_URL, &url)
        .args(["checkpoint", "clear", "--category", "SERVICE"])
        .assert()
        .success()
        .stdout(predicate::str::contains("checkpoint_cleared=true"));

    psc()
        .env(psc_db::ENV_DB_URL, &url)
        .args(["checkpoint", "show", "--category", "SERVICE"])
        .assert()
        .success()
        .stdout(predicate::str::contains("checkpoint=NONE"));

    if let Some(raw) = prior {
        psc_db::config_set(&pool, key, &raw).await?;
    }
    Ok(())
}
