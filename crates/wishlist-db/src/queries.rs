use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use wishlist_types::models::TelegramUser;

use crate::Database;
use crate::models::{ItemOwnership, ItemRow, ProfileRow, UserRow, WishlistRow};

impl Database {
    // -- Users --

    /// Insert or refresh the user identified by `user.id`, returning the stored row.
    pub fn upsert_user(&self, user: &TelegramUser, now: &str) -> Result<UserRow> {
        self.with_conn(|conn| {
            upsert_user(conn, user, now)?;
            user_by_id(conn, user.id)?
                .ok_or_else(|| anyhow::anyhow!("User {} vanished after upsert", user.id))
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| user_by_id(conn, id))
    }

    // -- Wishlists --

    pub fn wishlist_by_owner(&self, owner_id: i64) -> Result<Option<WishlistRow>> {
        self.with_conn(|conn| wishlist_by_owner(conn, owner_id))
    }

    pub fn wishlist_by_share_id(&self, share_id: &str) -> Result<Option<WishlistRow>> {
        self.with_conn(|conn| wishlist_by_share_id(conn, share_id))
    }

    // -- Items --

    pub fn items_for_wishlist(&self, wishlist_id: i64) -> Result<Vec<ItemRow>> {
        self.with_conn(|conn| items_for_wishlist(conn, wishlist_id))
    }
}

// The free functions below take a plain connection so they compose inside
// `Database::with_tx` as well as `Database::with_conn`.

pub fn upsert_user(conn: &Connection, user: &TelegramUser, now: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, first_name, last_name, username, language_code, is_premium, photo_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(id) DO UPDATE SET
             first_name = excluded.first_name,
             last_name = excluded.last_name,
             username = excluded.username,
             language_code = excluded.language_code,
             is_premium = excluded.is_premium,
             photo_url = excluded.photo_url,
             updated_at = excluded.updated_at",
        rusqlite::params![
            user.id,
            user.first_name,
            user.last_name,
            user.username,
            user.language_code,
            user.is_premium.unwrap_or(false),
            user.photo_url,
            now,
        ],
    )?;
    Ok(())
}

pub fn user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, first_name, last_name, username, language_code, is_premium, photo_url, created_at, updated_at
             FROM users WHERE id = ?1",
            [id],
            |row| {
                Ok(UserRow {
                    id: row.get(0)?,
                    first_name: row.get(1)?,
                    last_name: row.get(2)?,
                    username: row.get(3)?,
                    language_code: row.get(4)?,
                    is_premium: row.get(5)?,
                    photo_url: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            },
        )
        .optional()?;

    Ok(row)
}

const WISHLIST_COLUMNS: &str = "id, share_id, title, created_by, created_at, updated_at";

fn wishlist_from_row(row: &Row<'_>) -> rusqlite::Result<WishlistRow> {
    Ok(WishlistRow {
        id: row.get(0)?,
        share_id: row.get(1)?,
        title: row.get(2)?,
        created_by: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn wishlist_by_owner(conn: &Connection, owner_id: i64) -> Result<Option<WishlistRow>> {
    let sql = format!("SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE created_by = ?1");
    Ok(conn.query_row(&sql, [owner_id], wishlist_from_row).optional()?)
}

pub fn wishlist_by_share_id(conn: &Connection, share_id: &str) -> Result<Option<WishlistRow>> {
    let sql = format!("SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE share_id = ?1");
    Ok(conn.query_row(&sql, [share_id], wishlist_from_row).optional()?)
}

pub fn wishlist_by_id(conn: &Connection, id: i64) -> Result<Option<WishlistRow>> {
    let sql = format!("SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], wishlist_from_row).optional()?)
}

/// Create the owner's list unless one already exists. Returns `false` when
/// another request created it first.
pub fn insert_wishlist(
    conn: &Connection,
    owner_id: i64,
    title: &str,
    share_id: &str,
    now: &str,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO wishlists (share_id, title, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(created_by) DO NOTHING",
        rusqlite::params![share_id, title, owner_id, now],
    )?;
    Ok(inserted == 1)
}

pub fn touch_wishlist(conn: &Connection, wishlist_id: i64, now: &str) -> Result<()> {
    conn.execute(
        "UPDATE wishlists SET updated_at = ?2 WHERE id = ?1",
        rusqlite::params![wishlist_id, now],
    )?;
    Ok(())
}

pub fn items_for_wishlist(conn: &Connection, wishlist_id: i64) -> Result<Vec<ItemRow>> {
    // JOIN the reserver's public columns in the same query
    let mut stmt = conn.prepare(
        "SELECT i.id, i.text, i.links, i.photos, i.created_by, i.wishlist_id,
                i.reserved_by, i.reserved_at, i.created_at, i.updated_at,
                u.id, u.first_name, u.last_name, u.username, u.photo_url
         FROM items i
         LEFT JOIN users u ON i.reserved_by = u.id
         WHERE i.wishlist_id = ?1
         ORDER BY i.id",
    )?;

    let rows = stmt
        .query_map([wishlist_id], |row| {
            let reserver = match row.get::<_, Option<i64>>(10)? {
                Some(id) => Some(ProfileRow {
                    id,
                    first_name: row.get(11)?,
                    last_name: row.get(12)?,
                    username: row.get(13)?,
                    photo_url: row.get(14)?,
                }),
                None => None,
            };
            Ok(ItemRow {
                id: row.get(0)?,
                text: row.get(1)?,
                links: row.get(2)?,
                photos: row.get(3)?,
                created_by: row.get(4)?,
                wishlist_id: row.get(5)?,
                reserved_by: row.get(6)?,
                reserved_at: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
                reserver,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn item_ids_for_wishlist(conn: &Connection, wishlist_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM items WHERE wishlist_id = ?1")?;
    let ids = stmt
        .query_map([wishlist_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn item_ownership(conn: &Connection, item_id: i64) -> Result<Option<ItemOwnership>> {
    let row = conn
        .query_row(
            "SELECT i.id, i.wishlist_id, w.share_id, w.created_by, i.reserved_by
             FROM items i
             JOIN wishlists w ON i.wishlist_id = w.id
             WHERE i.id = ?1",
            [item_id],
            |row| {
                Ok(ItemOwnership {
                    item_id: row.get(0)?,
                    wishlist_id: row.get(1)?,
                    share_id: row.get(2)?,
                    owner_id: row.get(3)?,
                    reserved_by: row.get(4)?,
                })
            },
        )
        .optional()?;

    Ok(row)
}

/// Reserve `item_id` for `user_id` only if nobody holds it. Returns whether
/// this call took the reservation.
pub fn claim_item(conn: &Connection, item_id: i64, user_id: i64, now: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE items SET reserved_by = ?2, reserved_at = ?3, updated_at = ?3
         WHERE id = ?1 AND reserved_by IS NULL",
        rusqlite::params![item_id, user_id, now],
    )?;
    Ok(changed == 1)
}

/// Clear the reservation on `item_id` only if `user_id` holds it.
pub fn release_item(conn: &Connection, item_id: i64, user_id: i64, now: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE items SET reserved_by = NULL, reserved_at = NULL, updated_at = ?3
         WHERE id = ?1 AND reserved_by = ?2",
        rusqlite::params![item_id, user_id, now],
    )?;
    Ok(changed == 1)
}

pub fn insert_item(
    conn: &Connection,
    wishlist_id: i64,
    owner_id: i64,
    text: &str,
    links: &[String],
    photos: &[String],
    now: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO items (text, links, photos, created_by, wishlist_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        rusqlite::params![
            text,
            serde_json::to_string(links)?,
            serde_json::to_string(photos)?,
            owner_id,
            wishlist_id,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Update an item's editable fields. Reservation columns are left alone.
pub fn update_item(
    conn: &Connection,
    item_id: i64,
    text: &str,
    links: &[String],
    photos: &[String],
    now: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE items SET text = ?2, links = ?3, photos = ?4, updated_at = ?5 WHERE id = ?1",
        rusqlite::params![
            item_id,
            text,
            serde_json::to_string(links)?,
            serde_json::to_string(photos)?,
            now,
        ],
    )?;
    Ok(())
}

pub fn delete_items(conn: &Connection, item_ids: &[i64]) -> Result<usize> {
    let mut stmt = conn.prepare("DELETE FROM items WHERE id = ?1")?;
    let mut deleted = 0;
    for id in item_ids {
        deleted += stmt.execute([id])?;
    }
    Ok(deleted)
}
