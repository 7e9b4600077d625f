//! Per-cart mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use domain::CartOwner;
use tokio::sync::OwnedMutexGuard;

type Slots = HashMap<CartOwner, Arc<tokio::sync::Mutex<()>>>;

/// Keyed locks serializing work on one cart.
///
/// Checkout, cart mutations and consolidation all take the lock of every
/// cart they touch. Acquisition never waits: a held lock means another
/// operation is in flight and the caller gets `CartBusy`.
#[derive(Debug, Clone, Default)]
pub struct CartLocks {
    slots: Arc<Mutex<Slots>>,
}

impl CartLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the lock for `owner`'s cart, or returns `None` if it is held.
    pub fn try_acquire(&self, owner: CartOwner) -> Option<CartGuard> {
        let slot = {
            let mut slots = self.slots();
            Arc::clone(
                slots
                    .entry(owner)
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };

        let guard = slot.try_lock_owned().ok()?;
        Some(CartGuard {
            owner,
            guard: Some(guard),
            locks: self.clone(),
        })
    }

    /// Takes the locks for two carts, releasing the first if the second is held.
    pub fn try_acquire_pair(
        &self,
        first: CartOwner,
        second: CartOwner,
    ) -> Option<(CartGuard, CartGuard)> {
        let first = self.try_acquire(first)?;
        let second = self.try_acquire(second)?;
        Some((first, second))
    }

    /// Returns true if `owner`'s cart is locked right now.
    pub fn is_held(&self, owner: CartOwner) -> bool {
        self.slots()
            .get(&owner)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Returns how many carts have a lock slot.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, owner: CartOwner) {
        let mut slots = self.slots();
        // Only the map holds the slot once every guard is gone.
        if slots
            .get(&owner)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&owner);
        }
    }
}

/// Holds one cart's lock until dropped.
#[derive(Debug)]
pub struct CartGuard {
    owner: CartOwner,
    guard: Option<OwnedMutexGuard<()>>,
    locks: CartLocks,
}

impl CartGuard {
    pub fn owner(&self) -> CartOwner {
        self.owner
    }
}

impl Drop for CartGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(self.owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{GuestId, UserId};

    #[test]
    fn test_second_acquire_fails_while_held() {
        let locks = CartLocks::new();
        let owner = CartOwner::User(UserId::new());

        let guard = locks.try_acquire(owner).unwrap();
        assert!(locks.is_held(owner));
        assert!(locks.try_acquire(owner).is_none());

        drop(guard);
        assert!(!locks.is_held(owner));
        assert!(locks.try_acquire(owner).is_some());
    }

    #[test]
    fn test_distinct_carts_do_not_contend() {
        let locks = CartLocks::new();
        let a = locks.try_acquire(CartOwner::User(UserId::new()));
        let b = locks.try_acquire(CartOwner::Guest(GuestId::new()));
        assert!(a.is_some());
        assert!(b.is_some());
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_released_slots_are_pruned() {
        let locks = CartLocks::new();
        let owner = CartOwner::Guest(GuestId::new());
        drop(locks.try_acquire(owner).unwrap());
        assert!(locks.is_empty());
    }

    #[test]
    fn test_pair_releases_first_when_second_is_held() {
        let locks = CartLocks::new();
        let guest = CartOwner::Guest(GuestId::new());
        let user = CartOwner::User(UserId::new());

        let held = locks.try_acquire(user).unwrap();
        assert!(locks.try_acquire_pair(guest, user).is_none());
        assert!(!locks.is_held(guest));

        drop(held);
        let (g, u) = locks.try_acquire_pair(guest, user).unwrap();
        assert_eq!(g.owner(), guest);
        assert_eq!(u.owner(), user);
    }

    #[tokio::test]
    async fn test_guard_can_move_into_a_task() {
        let locks = CartLocks::new();
        let owner = CartOwner::User(UserId::new());
        let guard = locks.try_acquire(owner).unwrap();

        let handle = tokio::spawn(async move {
            let _guard = guard;
        });
        handle.await.unwrap();
        assert!(!locks.is_held(owner));
    }
}
