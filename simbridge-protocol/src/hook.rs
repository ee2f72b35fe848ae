//! The contract between the simulation clock and an adapter.
use std::num::NonZeroU32;

/// An adapter driven once per simulation tick.
///
/// The clock calls [`CycleHook::cycle`] on every tick with the current tick count and the
/// pins the adapter owns. Implementations check their own [`RateDivider`] and return
/// immediately when they are not due. Hooks of server adapters never block.
pub trait CycleHook {
    /// The pin values exchanged with the hardware model.
    type Pins;
    /// Server adapters use [`std::convert::Infallible`]. Client adapters report I/O
    /// failures, which the caller is expected to treat as fatal.
    type Error;

    fn cycle(&mut self, tick: u64, pins: &mut Self::Pins) -> Result<(), Self::Error>;
}

/// Run an adapter once every N ticks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RateDivider(NonZeroU32);

impl RateDivider {
    /// Act on every tick.
    pub const EVERY_TICK: RateDivider = RateDivider(NonZeroU32::MIN);

    /// Returns `None` for a zero divider.
    pub fn new(period: u32) -> Option<RateDivider> {
        NonZeroU32::new(period).map(RateDivider)
    }

    pub fn period(self) -> u32 {
        self.0.get()
    }

    /// Whether an adapter with this divider acts on `tick`, i.e. `tick % N == 0`.
    pub fn is_due(self, tick: u64) -> bool {
        tick % u64::from(self.0.get()) == 0
    }
}

impl Default for RateDivider {
    fn default() -> Self {
        Self::EVERY_TICK
    }
}

impl From<NonZeroU32> for RateDivider {
    fn from(value: NonZeroU32) -> Self {
        RateDivider(value)
    }
}

#[test]
fn divider_gates_ticks() {
    let divider = RateDivider::new(8).unwrap();
    let due: Vec<u64> = (0..20).filter(|t| divider.is_due(*t)).collect();
    assert_eq!(due, vec![0, 8, 16]);
    assert!(RateDivider::new(0).is_none());
    assert!((0..5).all(|t| RateDivider::EVERY_TICK.is_due(t)));
}
