use std::collections::HashSet;

use tracing::{debug, info};

use wishlist_db::{Database, queries};
use wishlist_gateway::Publisher;
use wishlist_types::api::IncomingItem;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    /// The requester already held the reservation; nothing changed.
    AlreadyReservedByYou,
}

/// Applies item and reservation changes. Each change runs in one storage
/// transaction and, once committed, is published for the list's share id.
pub struct ReservationEngine<'a> {
    db: &'a Database,
    publisher: &'a dyn Publisher,
}

impl<'a> ReservationEngine<'a> {
    pub fn new(db: &'a Database, publisher: &'a dyn Publisher) -> Self {
        Self { db, publisher }
    }

    pub fn reserve(&self, item_id: i64, requester: i64) -> Result<ReserveOutcome, ApiError> {
        let (outcome, share_id) = self.db.with_tx(|tx| -> Result<_, ApiError> {
            let item = queries::item_ownership(tx, item_id)?
                .ok_or(ApiError::NotFound("Item not found"))?;

            if item.owner_id == requester {
                return Err(ApiError::Forbidden("You cannot reserve items on your own wishlist"));
            }

            match item.reserved_by {
                Some(holder) if holder == requester => {
                    return Ok((ReserveOutcome::AlreadyReservedByYou, item.share_id));
                }
                Some(_) => return Err(ApiError::Conflict("Item is already reserved")),
                None => {}
            }

            // Only succeeds while the row is still unreserved
            if !queries::claim_item(tx, item_id, requester, &wishlist_db::now())? {
                return Err(ApiError::Conflict("Item is already reserved"));
            }

            Ok((ReserveOutcome::Reserved, item.share_id))
        })?;

        if outcome == ReserveOutcome::Reserved {
            debug!("User {} reserved item {}", requester, item_id);
            self.publisher.publish(&share_id, requester);
        }
        Ok(outcome)
    }

    pub fn cancel(&self, item_id: i64, requester: i64) -> Result<(), ApiError> {
        let share_id = self.db.with_tx(|tx| -> Result<_, ApiError> {
            let item = queries::item_ownership(tx, item_id)?
                .ok_or(ApiError::NotFound("Item not found"))?;

            if item.owner_id == requester {
                return Err(ApiError::Forbidden(
                    "You cannot manage reservations on your own wishlist",
                ));
            }

            match item.reserved_by {
                None => return Err(ApiError::Conflict("Item is not reserved")),
                Some(holder) if holder != requester => {
                    return Err(ApiError::Forbidden("Item is reserved by someone else"));
                }
                Some(_) => {}
            }

            if !queries::release_item(tx, item_id, requester, &wishlist_db::now())? {
                return Err(ApiError::Conflict("Item is not reserved"));
            }

            Ok(item.share_id)
        })?;

        debug!("User {} cancelled reservation of item {}", requester, item_id);
        self.publisher.publish(&share_id, requester);
        Ok(())
    }

    /// Make the list's items match `incoming`: unknown entries become new
    /// items, entries whose id belongs to this list are updated, and every
    /// existing item left out is deleted. Blank entries are dropped first.
    pub fn replace_items(
        &self,
        wishlist_id: i64,
        requester: i64,
        incoming: &[IncomingItem],
    ) -> Result<(), ApiError> {
        let share_id = self.db.with_tx(|tx| -> Result<_, ApiError> {
            let wishlist = queries::wishlist_by_id(tx, wishlist_id)?
                .ok_or(ApiError::NotFound("Wishlist not found"))?;

            if wishlist.created_by != requester {
                return Err(ApiError::Forbidden("Only the owner can edit this wishlist"));
            }

            let entries: Vec<&IncomingItem> =
                incoming.iter().filter(|item| !item.is_blank()).collect();

            let existing: HashSet<i64> = queries::item_ids_for_wishlist(tx, wishlist.id)?
                .into_iter()
                .collect();
            let kept: HashSet<i64> = entries
                .iter()
                .filter_map(|item| item.id)
                .filter(|id| existing.contains(id))
                .collect();
            let to_delete: Vec<i64> = existing.difference(&kept).copied().collect();

            let now = wishlist_db::now();
            queries::delete_items(tx, &to_delete)?;

            let mut created = 0usize;
            for item in &entries {
                match item.id.filter(|id| kept.contains(id)) {
                    Some(id) => {
                        queries::update_item(tx, id, item.text(), item.links(), item.photos(), &now)?
                    }
                    None => {
                        queries::insert_item(
                            tx,
                            wishlist.id,
                            requester,
                            item.text(),
                            item.links(),
                            item.photos(),
                            &now,
                        )?;
                        created += 1;
                    }
                }
            }

            queries::touch_wishlist(tx, wishlist.id, &now)?;

            info!(
                "Wishlist {}: {} kept, {} created, {} deleted",
                wishlist.id,
                kept.len(),
                created,
                to_delete.len()
            );
            Ok(wishlist.share_id)
        })?;

        self.publisher.publish(&share_id, requester);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use wishlist_db::models::ItemRow;
    use wishlist_types::models::TelegramUser;

    const OWNER: i64 = 100;
    const ALICE: i64 = 200;
    const BOB: i64 = 300;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, i64)>>,
    }

    impl RecordingPublisher {
        fn calls(&self) -> Vec<(String, i64)> {
            self.published.lock().unwrap().clone()
        }
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, share_id: &str, origin_id: i64) {
            self.published.lock().unwrap().push((share_id.to_string(), origin_id));
        }
    }

    struct Fixture {
        db: Database,
        publisher: RecordingPublisher,
        wishlist_id: i64,
        share_id: String,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            for (id, name) in [(OWNER, "Owner"), (ALICE, "Alice"), (BOB, "Bob")] {
                let user = TelegramUser {
                    id,
                    first_name: name.into(),
                    last_name: None,
                    username: None,
                    language_code: None,
                    is_premium: None,
                    photo_url: None,
                };
                db.upsert_user(&user, "2024-01-01T00:00:00.000Z").unwrap();
            }
            let wishlist = db
                .with_conn(|conn| {
                    queries::insert_wishlist(conn, OWNER, "My Wishlist", "a1b2c3d4e5f60718", "2024-01-01T00:00:00.000Z")?;
                    Ok(queries::wishlist_by_owner(conn, OWNER)?.unwrap())
                })
                .unwrap();

            Self {
                db,
                publisher: RecordingPublisher::default(),
                wishlist_id: wishlist.id,
                share_id: wishlist.share_id,
            }
        }

        fn engine(&self) -> ReservationEngine<'_> {
            ReservationEngine::new(&self.db, &self.publisher)
        }

        fn add_item(&self, text: &str) -> i64 {
            self.db
                .with_conn(|conn| queries::insert_item(conn, self.wishlist_id, OWNER, text, &[], &[], "2024-01-01T00:00:00.000Z"))
                .unwrap()
        }

        fn items(&self) -> Vec<ItemRow> {
            self.db.items_for_wishlist(self.wishlist_id).unwrap()
        }

        fn item(&self, id: i64) -> ItemRow {
            self.items().into_iter().find(|item| item.id == id).unwrap()
        }
    }

    fn entry(id: Option<i64>, text: &str) -> IncomingItem {
        IncomingItem {
            id,
            text: Some(text.into()),
            ..Default::default()
        }
    }

    #[test]
    fn reserving_a_free_item_publishes_once() {
        let fx = Fixture::new();
        let item = fx.add_item("Kettle");

        assert_eq!(fx.engine().reserve(item, ALICE).unwrap(), ReserveOutcome::Reserved);

        let row = fx.item(item);
        assert_eq!(row.reserved_by, Some(ALICE));
        assert!(row.reserved_at.is_some());
        assert_eq!(fx.publisher.calls(), vec![(fx.share_id.clone(), ALICE)]);
    }

    #[test]
    fn owner_can_never_reserve_or_cancel() {
        let fx = Fixture::new();
        let free = fx.add_item("Free");
        let taken = fx.add_item("Taken");
        fx.engine().reserve(taken, ALICE).unwrap();

        for item in [free, taken] {
            assert!(matches!(fx.engine().reserve(item, OWNER), Err(ApiError::Forbidden(_))));
            assert!(matches!(fx.engine().cancel(item, OWNER), Err(ApiError::Forbidden(_))));
        }
        assert_eq!(fx.item(taken).reserved_by, Some(ALICE));
        assert!(fx.item(free).reserved_by.is_none());
        assert_eq!(fx.publisher.calls().len(), 1);
    }

    #[test]
    fn reserving_again_is_idempotent() {
        let fx = Fixture::new();
        let item = fx.add_item("Kettle");
        fx.engine().reserve(item, ALICE).unwrap();
        let before = fx.item(item);

        assert_eq!(
            fx.engine().reserve(item, ALICE).unwrap(),
            ReserveOutcome::AlreadyReservedByYou
        );

        let after = fx.item(item);
        assert_eq!(after.reserved_by, before.reserved_by);
        assert_eq!(after.reserved_at, before.reserved_at);
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(fx.publisher.calls().len(), 1);
    }

    #[test]
    fn someone_elses_reservation_conflicts() {
        let fx = Fixture::new();
        let item = fx.add_item("Kettle");
        fx.engine().reserve(item, ALICE).unwrap();

        assert!(matches!(fx.engine().reserve(item, BOB), Err(ApiError::Conflict(_))));
        assert_eq!(fx.item(item).reserved_by, Some(ALICE));
    }

    #[test]
    fn unknown_items_are_not_found() {
        let fx = Fixture::new();
        assert!(matches!(fx.engine().reserve(9999, ALICE), Err(ApiError::NotFound(_))));
        assert!(matches!(fx.engine().cancel(9999, ALICE), Err(ApiError::NotFound(_))));
        assert!(fx.publisher.calls().is_empty());
    }

    #[test]
    fn cancel_follows_the_holder() {
        let fx = Fixture::new();
        let item = fx.add_item("Kettle");

        assert!(matches!(fx.engine().cancel(item, ALICE), Err(ApiError::Conflict(_))));

        fx.engine().reserve(item, ALICE).unwrap();
        assert!(matches!(fx.engine().cancel(item, BOB), Err(ApiError::Forbidden(_))));

        fx.engine().cancel(item, ALICE).unwrap();
        let row = fx.item(item);
        assert!(row.reserved_by.is_none());
        assert!(row.reserved_at.is_none());
        assert_eq!(fx.publisher.calls().len(), 2);

        // Free again for anyone else
        assert_eq!(fx.engine().reserve(item, BOB).unwrap(), ReserveOutcome::Reserved);
    }

    #[test]
    fn concurrent_reservations_have_exactly_one_winner() {
        let fx = Fixture::new();
        let item = fx.add_item("Kettle");
        let start = Arc::new(std::sync::Barrier::new(2));

        let results: Vec<(i64, Result<ReserveOutcome, ApiError>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = [ALICE, BOB]
                .into_iter()
                .map(|user| {
                    let start = start.clone();
                    let fx = &fx;
                    scope.spawn(move || {
                        start.wait();
                        (user, fx.engine().reserve(item, user))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<i64> = results
            .iter()
            .filter(|(_, result)| matches!(result, Ok(ReserveOutcome::Reserved)))
            .map(|(user, _)| *user)
            .collect();
        let conflicts = results
            .iter()
            .filter(|(_, result)| matches!(result, Err(ApiError::Conflict(_))))
            .count();

        assert_eq!(winners.len(), 1);
        assert_eq!(conflicts, 1);
        assert_eq!(fx.item(item).reserved_by, Some(winners[0]));
        assert_eq!(fx.publisher.calls().len(), 1);
    }

    #[test]
    fn replace_keeps_updates_creates_and_deletes() {
        let fx = Fixture::new();
        let a = fx.add_item("A");
        fx.add_item("B");
        fx.add_item("C");
        fx.engine().reserve(a, ALICE).unwrap();

        let mut updated_a = entry(Some(a), "A, but blue");
        updated_a.links = Some(vec!["https://shop.example/a".into()]);
        let batch = vec![updated_a, entry(None, "D"), IncomingItem::default()];

        fx.engine().replace_items(fx.wishlist_id, OWNER, &batch).unwrap();

        let items = fx.items();
        let texts: Vec<&str> = items.iter().map(|item| item.text.as_str()).collect();
        assert_eq!(texts, vec!["A, but blue", "D"]);
        assert_eq!(items[0].id, a);
        assert_eq!(items[0].links, r#"["https://shop.example/a"]"#);
        // Editing an item does not drop its reservation
        assert_eq!(items[0].reserved_by, Some(ALICE));
        assert_eq!(items[1].created_by, OWNER);
        assert_eq!(fx.publisher.calls().last().unwrap(), &(fx.share_id.clone(), OWNER));
    }

    #[test]
    fn ids_from_other_lists_are_treated_as_new_items() {
        let fx = Fixture::new();
        let a = fx.add_item("A");

        fx.engine()
            .replace_items(fx.wishlist_id, OWNER, &[entry(Some(a), "A"), entry(Some(424242), "Z")])
            .unwrap();

        let items = fx.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, a);
        assert_ne!(items[1].id, 424242);
        assert_eq!(items[1].text, "Z");
    }

    #[test]
    fn only_the_owner_may_replace_items() {
        let fx = Fixture::new();
        fx.add_item("A");

        let result = fx.engine().replace_items(fx.wishlist_id, ALICE, &[entry(None, "Spam")]);

        assert!(matches!(result, Err(ApiError::Forbidden(_))));
        assert_eq!(fx.items().len(), 1);
        assert!(fx.publisher.calls().is_empty());
    }

    #[test]
    fn failure_mid_batch_leaves_items_untouched() {
        let fx = Fixture::new();
        let a = fx.add_item("A");
        fx.add_item("B");
        fx.add_item("C");
        fx.db
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_boom BEFORE INSERT ON items
                     WHEN NEW.text = 'boom'
                     BEGIN SELECT RAISE(ABORT, 'boom'); END;",
                )?;
                Ok(())
            })
            .unwrap();

        let batch = vec![entry(Some(a), "A2"), entry(None, "D"), entry(None, "boom")];
        let result = fx.engine().replace_items(fx.wishlist_id, OWNER, &batch);

        assert!(matches!(result, Err(ApiError::Internal(_))));
        let texts: Vec<String> = fx.items().into_iter().map(|item| item.text).collect();
        assert_eq!(texts, vec!["A", "B", "C"]);
        assert!(fx.publisher.calls().is_empty());
    }
}
