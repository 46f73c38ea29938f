//! Seeded random streams, one per hostile surface.
//!
//! A session seed is expanded into independent streams so that adding draws
//! to one surface never shifts the sequence another surface observes.
use hmac::{Hmac, Mac};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use sha2::Sha256;
use std::cell::{RefCell, RefMut};

/// Independent RNG streams derived from one session seed.
#[derive(Debug)]
pub struct RngBundle {
    seed: u64,
    cursor: RefCell<CountingRng<SmallRng>>,
    zone: RefCell<CountingRng<SmallRng>>,
    focus: RefCell<CountingRng<SmallRng>>,
    clipboard: RefCell<CountingRng<SmallRng>>,
    drag: RefCell<CountingRng<SmallRng>>,
    chrome: RefCell<CountingRng<SmallRng>>,
    tour: RefCell<CountingRng<SmallRng>>,
    gate: RefCell<CountingRng<SmallRng>>,
    audio: RefCell<CountingRng<SmallRng>>,
}

impl RngBundle {
    /// Construct the bundle from a session seed.
    #[must_use]
    pub fn from_user_seed(seed: u64) -> Self {
        let stream = |tag: &[u8]| RefCell::new(CountingRng::new(derive_stream_seed(seed, tag)));
        Self {
            seed,
            cursor: stream(b"cursor"),
            zone: stream(b"zone"),
            focus: stream(b"focus"),
            clipboard: stream(b"clipboard"),
            drag: stream(b"drag"),
            chrome: stream(b"chrome"),
            tour: stream(b"tour"),
            gate: stream(b"gate"),
            audio: stream(b"audio"),
        }
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn cursor(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.cursor.borrow_mut()
    }

    #[must_use]
    pub fn zone(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.zone.borrow_mut()
    }

    #[must_use]
    pub fn focus(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.focus.borrow_mut()
    }

    #[must_use]
    pub fn clipboard(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.clipboard.borrow_mut()
    }

    #[must_use]
    pub fn drag(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.drag.borrow_mut()
    }

    #[must_use]
    pub fn chrome(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.chrome.borrow_mut()
    }

    /// Stream used by the narrative event scheduler.
    #[must_use]
    pub fn tour(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.tour.borrow_mut()
    }

    /// Stream used by the loading gate's progress simulation.
    #[must_use]
    pub fn gate(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.gate.borrow_mut()
    }

    /// Stream used for track shuffling.
    #[must_use]
    pub fn audio(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.audio.borrow_mut()
    }
}

/// Counting wrapper for RNG streams providing instrumentation.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

impl CountingRng<SmallRng> {
    fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            draws: 0,
        }
    }
}

impl<R: rand::RngCore> CountingRng<R> {
    /// Number of draw calls performed against this stream.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: rand::RngCore> rand::RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}

fn derive_stream_seed(session_seed: u64, domain_tag: &[u8]) -> u64 {
    // HMAC accepts keys of any length, so construction cannot fail for an 8-byte key.
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&session_seed.to_le_bytes()) else {
        return session_seed ^ u64::from(domain_tag.iter().fold(0_u8, |acc, b| acc ^ b));
    };
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0_u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}
