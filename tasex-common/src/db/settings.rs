//! Runtime settings stored in the `settings` table

use crate::Result;
use rand::Rng;
use sqlx::SqlitePool;
use tracing::info;

/// Settings key holding the owner shared secret
pub const OWNER_SECRET_KEY: &str = "owner_shared_secret";

/// Read a setting value, `None` when missing or NULL
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value.flatten())
}

/// Insert or replace a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load the owner shared secret, generating one on first start
///
/// A stored value of `0` disables the owner check entirely. A value that does
/// not parse as i64 is replaced by a fresh secret.
pub async fn load_or_init_owner_secret(pool: &SqlitePool) -> Result<i64> {
    if let Some(value) = get_setting(pool, OWNER_SECRET_KEY).await? {
        if let Ok(secret) = value.trim().parse::<i64>() {
            return Ok(secret);
        }
        info!("Stored owner secret is not a number, regenerating");
    }

    let secret: i64 = {
        let mut rng = rand::thread_rng();
        loop {
            let val = rng.gen::<i64>();
            if val != 0 {
                break val;
            }
        }
    };

    set_setting(pool, OWNER_SECRET_KEY, &secret.to_string()).await?;
    info!("Generated new owner shared secret");

    Ok(secret)
}
