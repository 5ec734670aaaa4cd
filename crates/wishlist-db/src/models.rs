//! Database row types: these map directly to SQLite rows.
//! Distinct from wishlist-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
    pub is_premium: bool,
    pub photo_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Public columns of a user, as joined onto wishlists and items.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WishlistRow {
    pub id: i64,
    pub share_id: String,
    pub title: String,
    pub created_by: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ItemRow {
    pub id: i64,
    pub text: String,
    /// JSON-encoded array of strings.
    pub links: String,
    /// JSON-encoded array of strings.
    pub photos: String,
    pub created_by: i64,
    pub wishlist_id: i64,
    pub reserved_by: Option<i64>,
    pub reserved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub reserver: Option<ProfileRow>,
}

/// An item's reservation state together with the list it belongs to.
#[derive(Debug, Clone)]
pub struct ItemOwnership {
    pub item_id: i64,
    pub wishlist_id: i64,
    pub share_id: String,
    pub owner_id: i64,
    pub reserved_by: Option<i64>,
}
