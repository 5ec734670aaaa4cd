use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

use wishlist_db::Database;
use wishlist_db::models::{ItemRow, ProfileRow, UserRow, WishlistRow};
use wishlist_db::queries;
use wishlist_gateway::SnapshotSource;
use wishlist_types::models::{ItemView, PublicProfile, User, WishlistSnapshot};

/// Build the view of `wishlist` that `viewer_id` is allowed to see.
///
/// The owner never learns who reserved an item: for them `reserved_by` is
/// always `None`, while `is_reserved` and `reserved_at` still show that
/// someone did. Everyone else sees the reserver's public profile.
pub fn assemble(
    wishlist: &WishlistRow,
    owner: &UserRow,
    items: Vec<ItemRow>,
    viewer_id: i64,
) -> WishlistSnapshot {
    let viewer_is_owner = viewer_id == wishlist.created_by;

    let items = items
        .into_iter()
        .map(|item| {
            let is_reserved = item.reserved_by.is_some();
            let reserved_by = if viewer_is_owner {
                None
            } else {
                item.reserver.map(public_profile)
            };

            ItemView {
                id: item.id,
                links: decode_list(&item.links, item.id, "links"),
                photos: decode_list(&item.photos, item.id, "photos"),
                text: item.text,
                created_by: item.created_by,
                created_at: parse_timestamp(&item.created_at),
                updated_at: parse_timestamp(&item.updated_at),
                reserved_at: item.reserved_at.as_deref().map(parse_timestamp),
                is_reserved,
                reserved_by,
            }
        })
        .collect();

    WishlistSnapshot {
        id: wishlist.id,
        share_id: wishlist.share_id.clone(),
        title: wishlist.title.clone(),
        created_by: PublicProfile {
            id: owner.id,
            first_name: owner.first_name.clone(),
            last_name: owner.last_name.clone(),
            username: owner.username.clone(),
            photo_url: owner.photo_url.clone(),
        },
        created_at: parse_timestamp(&wishlist.created_at),
        updated_at: parse_timestamp(&wishlist.updated_at),
        items,
    }
}

/// Load everything `assemble` needs for `wishlist` and build the view.
pub fn load_for(
    conn: &Connection,
    wishlist: &WishlistRow,
    viewer_id: i64,
) -> anyhow::Result<WishlistSnapshot> {
    let owner = queries::user_by_id(conn, wishlist.created_by)?.ok_or_else(|| {
        anyhow::anyhow!("Owner {} of wishlist {} is missing", wishlist.created_by, wishlist.id)
    })?;
    let items = queries::items_for_wishlist(conn, wishlist.id)?;
    Ok(assemble(wishlist, &owner, items, viewer_id))
}

/// `Ok(None)` when no list has `share_id`.
pub fn load(
    conn: &Connection,
    share_id: &str,
    viewer_id: i64,
) -> anyhow::Result<Option<WishlistSnapshot>> {
    match queries::wishlist_by_share_id(conn, share_id)? {
        Some(wishlist) => load_for(conn, &wishlist, viewer_id).map(Some),
        None => Ok(None),
    }
}

/// Snapshot source backed by the database, used by the live-view hub.
pub struct DbSnapshots {
    db: Arc<Database>,
}

impl DbSnapshots {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl SnapshotSource for DbSnapshots {
    fn snapshot(&self, share_id: &str, viewer_id: i64) -> anyhow::Result<Option<WishlistSnapshot>> {
        self.db.with_conn(|conn| load(conn, share_id, viewer_id))
    }
}

pub fn user_from_row(row: UserRow) -> User {
    User {
        id: row.id,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
        first_name: row.first_name,
        last_name: row.last_name,
        username: row.username,
        language_code: row.language_code,
        is_premium: row.is_premium,
        photo_url: row.photo_url,
    }
}

fn public_profile(row: ProfileRow) -> PublicProfile {
    PublicProfile {
        id: row.id,
        first_name: row.first_name,
        last_name: row.last_name,
        username: row.username,
        photo_url: row.photo_url,
    }
}

fn decode_list(raw: &str, item_id: i64, column: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Corrupt {} on item {}: {}", column, item_id, e);
        Vec::new()
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone. Parse as naive UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
