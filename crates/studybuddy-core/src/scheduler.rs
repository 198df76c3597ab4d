//! SM-2 spaced-repetition scheduler.
//!
//! [`sm2`] is the pure state transition. [`Scheduler`] wraps it with card
//! persistence: each review reads the card, computes the next state, and
//! writes it back with [`CardStore::compare_and_swap`]. A lost race re-reads
//! and recomputes, so a due date is never derived from a stale state.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::{debug, info};

use crate::error::{ReviewError, StoreError};
use crate::models::{Card, ReviewOutcome, ReviewState};
use crate::store::CardStore;

/// Lower bound of the easiness factor.
pub const MIN_EASINESS: f64 = 1.3;

/// Highest accepted review quality.
pub const MAX_QUALITY: u8 = 5;

/// Longest interval a review can schedule, about a century.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Attempts at the read-compute-swap cycle before giving up.
const MAX_CAS_ATTEMPTS: usize = 16;

/// Length of a card id in hex characters.
const CARD_ID_LEN: usize = 8;

/// Apply one SM-2 review with `quality` (0..=5) on `today`.
///
/// A lapse (`quality < 3`) resets repetitions and the interval to 1. A
/// success steps the interval 1 → 6 → `round(I × E)` using the easiness from
/// before this review. Easiness is updated on every review and floored at
/// [`MIN_EASINESS`]. The interval is capped at [`MAX_INTERVAL_DAYS`] and at
/// the days left in the calendar, so `due` is always `today + interval`.
pub fn sm2(state: &ReviewState, quality: u8, today: NaiveDate) -> ReviewState {
    let (interval, repetitions) = if quality < 3 {
        (1, 0)
    } else {
        let interval = match state.repetitions {
            0 => 1,
            1 => 6,
            _ => (state.interval as f64 * state.easiness).round_ties_even() as u32,
        };
        (interval, state.repetitions + 1)
    };
    let room = u32::try_from((NaiveDate::MAX - today).num_days()).unwrap_or(u32::MAX);
    let interval = interval.clamp(1, MAX_INTERVAL_DAYS).min(room);

    let miss = (MAX_QUALITY - quality.min(MAX_QUALITY)) as f64;
    let easiness = (state.easiness + 0.1 - miss * (0.08 + miss * 0.02)).max(MIN_EASINESS);

    ReviewState {
        easiness,
        interval,
        repetitions,
        due: today
            .checked_add_days(Days::new(interval as u64))
            .unwrap_or(NaiveDate::MAX),
    }
}

/// Source of "today" for scheduling.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local calendar date.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// A clock pinned to one date.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

pub struct Scheduler {
    store: Arc<dyn CardStore>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn CardStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CardStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a card that is due immediately. Returns the card id.
    pub async fn create_card(
        &self,
        owner: &str,
        front: &str,
        back: &str,
        source: &str,
    ) -> Result<String, StoreError> {
        let mut card = Card {
            id: new_card_id(),
            owner: owner.to_string(),
            front: front.to_string(),
            back: back.to_string(),
            source: source.to_string(),
            state: ReviewState::new(self.clock.today()),
            version: 0,
        };
        while !self.store.insert_card(&card).await? {
            debug!(card_id = %card.id, "card id taken, drawing another");
            card.id = new_card_id();
        }
        info!(card_id = %card.id, owner, "created card");
        Ok(card.id)
    }

    /// Cards of `owner` due today or earlier, oldest due date first.
    pub async fn get_due(&self, owner: &str) -> Result<Vec<Card>, StoreError> {
        self.store.due_cards(owner, self.clock.today()).await
    }

    /// Review a card of `owner` and persist the next SM-2 state.
    pub async fn review(
        &self,
        owner: &str,
        card_id: &str,
        quality: u8,
    ) -> Result<ReviewOutcome, ReviewError> {
        if quality > MAX_QUALITY {
            return Err(ReviewError::InvalidQuality(quality));
        }

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let card = self
                .store
                .get_card(card_id)
                .await?
                .ok_or_else(|| ReviewError::NotFound(card_id.to_string()))?;
            if card.owner != owner {
                return Err(ReviewError::OwnershipViolation {
                    card_id: card_id.to_string(),
                    owner: owner.to_string(),
                });
            }

            let next = sm2(&card.state, quality, self.clock.today());
            if self
                .store
                .compare_and_swap(card_id, card.version, &next)
                .await?
            {
                info!(
                    card_id,
                    quality,
                    interval = next.interval,
                    due = %next.due,
                    "reviewed card"
                );
                return Ok(ReviewOutcome {
                    card_id: card_id.to_string(),
                    next_due: next.due,
                    interval_days: next.interval,
                    quality,
                });
            }
            debug!(card_id, attempt, "card changed during review, retrying");
        }

        Err(ReviewError::Contention(card_id.to_string()))
    }
}

fn new_card_id() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(CARD_ID_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn scheduler(store: Arc<dyn CardStore>, today: &str) -> Scheduler {
        Scheduler::with_clock(store, Arc::new(FixedClock(date(today))))
    }

    #[test]
    fn test_sm2_perfect_trace() {
        let today = date("2026-10-19");
        let s0 = ReviewState::new(today);

        let s1 = sm2(&s0, 5, today);
        assert_eq!(s1.interval, 1);
        assert_eq!(s1.repetitions, 1);
        assert!((s1.easiness - 2.6).abs() < 1e-9);

        let s2 = sm2(&s1, 5, today);
        assert_eq!(s2.interval, 6);
        assert_eq!(s2.repetitions, 2);

        let s3 = sm2(&s2, 5, today);
        assert_eq!(s3.interval, 16);
        assert_eq!(s3.repetitions, 3);
        assert_eq!(s3.due, date("2026-11-04"));
    }

    #[test]
    fn test_sm2_easiness_floor() {
        let today = date("2026-10-19");
        let mut state = ReviewState::new(today);
        for _ in 0..10 {
            state = sm2(&state, 0, today);
            assert!(state.easiness >= MIN_EASINESS);
        }
        assert_eq!(state.easiness, MIN_EASINESS);
        assert_eq!(state.interval, 1);
    }

    #[test]
    fn test_sm2_lapse_resets() {
        let today = date("2026-10-19");
        let state = ReviewState {
            easiness: 2.3,
            interval: 40,
            repetitions: 7,
            due: today,
        };
        let next = sm2(&state, 2, today);
        assert_eq!(next.repetitions, 0);
        assert_eq!(next.interval, 1);
        assert_eq!(next.due, date("2026-10-20"));
        // 2.3 + 0.1 - 3 * (0.08 + 3 * 0.02)
        assert!((next.easiness - 1.98).abs() < 1e-9);
    }

    #[test]
    fn test_sm2_quality_three_keeps_progress() {
        let today = date("2026-10-19");
        let state = ReviewState {
            easiness: 2.5,
            interval: 6,
            repetitions: 2,
            due: today,
        };
        let next = sm2(&state, 3, today);
        assert_eq!(next.interval, 15);
        assert_eq!(next.repetitions, 3);
        assert!((next.easiness - 2.36).abs() < 1e-9);
    }

    #[test]
    fn test_sm2_interval_capped_and_due_exact() {
        let today = date("2026-10-19");
        let mut state = ReviewState::new(today);
        for _ in 0..40 {
            state = sm2(&state, 5, today);
            assert!(state.interval <= MAX_INTERVAL_DAYS);
            assert_eq!(
                state.due,
                today + chrono::Duration::days(state.interval as i64)
            );
        }
        assert_eq!(state.interval, MAX_INTERVAL_DAYS);

        let capped = sm2(&state, 5, today);
        assert_eq!(capped.interval, MAX_INTERVAL_DAYS);
    }

    #[test]
    fn test_sm2_interval_fits_calendar_end() {
        let today = NaiveDate::MAX - chrono::Duration::days(10);
        let state = ReviewState {
            easiness: 2.5,
            interval: 100,
            repetitions: 5,
            due: today,
        };
        let next = sm2(&state, 5, today);
        assert_eq!(next.interval, 10);
        assert_eq!(next.due, NaiveDate::MAX);
    }

    #[tokio::test]
    async fn test_create_card_is_due_immediately() {
        let store = Arc::new(InMemoryStore::new(4));
        let sched = scheduler(store.clone(), "2026-10-19");
        let id = sched
            .create_card("alice", "What is ATP?", "Energy currency", "Quiz 3f2a91c0")
            .await
            .unwrap();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let due = sched.get_due("alice").await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].state, ReviewState::new(date("2026-10-19")));
        assert!(sched.get_due("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_review_outcome_and_due_list() {
        let store = Arc::new(InMemoryStore::new(4));
        let sched = scheduler(store.clone(), "2026-10-19");
        let id = sched.create_card("alice", "Q", "A", "").await.unwrap();

        let outcome = sched.review("alice", &id, 4).await.unwrap();
        assert_eq!(outcome.card_id, id);
        assert_eq!(outcome.interval_days, 1);
        assert_eq!(outcome.next_due, date("2026-10-20"));
        assert_eq!(outcome.quality, 4);
        assert!(sched.get_due("alice").await.unwrap().is_empty());

        let tomorrow = scheduler(store, "2026-10-20");
        assert_eq!(tomorrow.get_due("alice").await.unwrap().len(), 1);
    }

    /// Reports the first insert as an id collision.
    struct CollidingStore {
        inner: InMemoryStore,
        collided: AtomicBool,
    }

    #[async_trait]
    impl CardStore for CollidingStore {
        async fn insert_card(&self, card: &Card) -> Result<bool, StoreError> {
            if !self.collided.swap(true, Ordering::SeqCst) {
                return Ok(false);
            }
            self.inner.insert_card(card).await
        }

        async fn get_card(&self, id: &str) -> Result<Option<Card>, StoreError> {
            self.inner.get_card(id).await
        }

        async fn due_cards(
            &self,
            owner: &str,
            today: NaiveDate,
        ) -> Result<Vec<Card>, StoreError> {
            self.inner.due_cards(owner, today).await
        }

        async fn compare_and_swap(
            &self,
            card_id: &str,
            expected_version: u64,
            state: &ReviewState,
        ) -> Result<bool, StoreError> {
            self.inner
                .compare_and_swap(card_id, expected_version, state)
                .await
        }
    }

    #[tokio::test]
    async fn test_create_card_redraws_id_on_collision() {
        let store = Arc::new(CollidingStore {
            inner: InMemoryStore::new(4),
            collided: AtomicBool::new(false),
        });
        let sched = scheduler(store.clone(), "2026-10-19");
        let id = sched.create_card("alice", "Q", "A", "").await.unwrap();

        assert!(store.collided.load(Ordering::SeqCst));
        let card = store.get_card(&id).await.unwrap().unwrap();
        assert_eq!(card.owner, "alice");
        assert_eq!(sched.get_due("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_review_rejections() {
        let store = Arc::new(InMemoryStore::new(4));
        let sched = scheduler(store, "2026-10-19");
        let id = sched.create_card("alice", "Q", "A", "").await.unwrap();

        assert!(matches!(
            sched.review("alice", "deadbeef", 3).await,
            Err(ReviewError::NotFound(_))
        ));
        assert!(matches!(
            sched.review("mallory", &id, 3).await,
            Err(ReviewError::OwnershipViolation { .. })
        ));
        assert!(matches!(
            sched.review("alice", &id, 6).await,
            Err(ReviewError::InvalidQuality(6))
        ));
    }

    /// Applies a competing quality-5 review right before the first
    /// compare-and-swap it sees.
    struct InterleavingStore {
        inner: InMemoryStore,
        today: NaiveDate,
        fired: AtomicBool,
    }

    #[async_trait]
    impl CardStore for InterleavingStore {
        async fn insert_card(&self, card: &Card) -> Result<bool, StoreError> {
            self.inner.insert_card(card).await
        }

        async fn get_card(&self, id: &str) -> Result<Option<Card>, StoreError> {
            self.inner.get_card(id).await
        }

        async fn due_cards(
            &self,
            owner: &str,
            today: NaiveDate,
        ) -> Result<Vec<Card>, StoreError> {
            self.inner.due_cards(owner, today).await
        }

        async fn compare_and_swap(
            &self,
            card_id: &str,
            expected_version: u64,
            state: &ReviewState,
        ) -> Result<bool, StoreError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                let card = self.inner.get_card(card_id).await?.unwrap();
                let competing = sm2(&card.state, 5, self.today);
                assert!(
                    self.inner
                        .compare_and_swap(card_id, card.version, &competing)
                        .await?
                );
            }
            self.inner
                .compare_and_swap(card_id, expected_version, state)
                .await
        }
    }

    #[tokio::test]
    async fn test_interleaved_review_uses_fresh_state() {
        let today = date("2026-10-19");
        let store = Arc::new(InterleavingStore {
            inner: InMemoryStore::new(4),
            today,
            fired: AtomicBool::new(false),
        });
        let sched = Scheduler::with_clock(store.clone(), Arc::new(FixedClock(today)));
        let id = sched.create_card("alice", "Q", "A", "").await.unwrap();

        // The competing review lands first (R 0 → 1), so this one must see
        // R = 1 and step the interval to 6 rather than recompute from R = 0.
        let outcome = sched.review("alice", &id, 5).await.unwrap();
        assert_eq!(outcome.interval_days, 6);

        let card = store.get_card(&id).await.unwrap().unwrap();
        assert_eq!(card.state.repetitions, 2);
        assert_eq!(card.version, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reviews_never_drop_updates() {
        let store = Arc::new(InMemoryStore::new(4));
        let sched = Arc::new(scheduler(store.clone(), "2026-10-19"));
        let id = sched.create_card("alice", "Q", "A", "").await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sched = sched.clone();
                let id = id.clone();
                tokio::spawn(async move { sched.review("alice", &id, 4).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let card = store.get_card(&id).await.unwrap().unwrap();
        assert_eq!(card.state.repetitions, 8);
        assert_eq!(card.version, 8);
    }

    struct AlwaysStaleStore(InMemoryStore);

    #[async_trait]
    impl CardStore for AlwaysStaleStore {
        async fn insert_card(&self, card: &Card) -> Result<bool, StoreError> {
            self.0.insert_card(card).await
        }

        async fn get_card(&self, id: &str) -> Result<Option<Card>, StoreError> {
            self.0.get_card(id).await
        }

        async fn due_cards(
            &self,
            owner: &str,
            today: NaiveDate,
        ) -> Result<Vec<Card>, StoreError> {
            self.0.due_cards(owner, today).await
        }

        async fn compare_and_swap(
            &self,
            _card_id: &str,
            _expected_version: u64,
            _state: &ReviewState,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_review_gives_up_under_contention() {
        let store = Arc::new(AlwaysStaleStore(InMemoryStore::new(4)));
        let sched = scheduler(store, "2026-10-19");
        let id = sched.create_card("alice", "Q", "A", "").await.unwrap();
        assert!(matches!(
            sched.review("alice", &id, 5).await,
            Err(ReviewError::Contention(_))
        ));
    }
}
