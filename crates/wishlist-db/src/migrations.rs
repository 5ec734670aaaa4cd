use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, wishlists, items)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              INTEGER PRIMARY KEY,
                first_name      TEXT NOT NULL,
                last_name       TEXT,
                username        TEXT,
                language_code   TEXT,
                is_premium      INTEGER NOT NULL DEFAULT 0,
                photo_url       TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE wishlists (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                share_id    TEXT NOT NULL UNIQUE,
                title       TEXT NOT NULL,
                created_by  INTEGER NOT NULL UNIQUE REFERENCES users(id),
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE items (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                text         TEXT NOT NULL,
                links        TEXT NOT NULL DEFAULT '[]',
                photos       TEXT NOT NULL DEFAULT '[]',
                created_by   INTEGER NOT NULL REFERENCES users(id),
                wishlist_id  INTEGER NOT NULL REFERENCES wishlists(id) ON DELETE CASCADE,
                reserved_by  INTEGER REFERENCES users(id),
                reserved_at  TEXT,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL,
                CHECK ((reserved_by IS NULL) = (reserved_at IS NULL))
            );

            CREATE INDEX idx_items_wishlist ON items(wishlist_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
