//! Definitions excluded from automatic typechecking after repeated timeouts.

use crate::store::DefId;
use fnv::FnvHashMap;
use parking_lot::Mutex;

/// Count of timeouts per definition.
///
/// A definition is blacklisted once it has timed out `budget` times;
/// a budget of zero disables blacklisting.
pub struct Blacklist {
    budget: u32,
    strikes: Mutex<FnvHashMap<DefId, u32>>,
}

impl Blacklist {
    pub fn new(budget: u32) -> Self {
        let strikes = Default::default();
        Self { budget, strikes }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Count a timeout, returning true if this blacklisted the definition.
    pub fn strike(&self, def: DefId) -> bool {
        let mut strikes = self.strikes.lock();
        let n = strikes.entry(def).or_default();
        *n += 1;
        self.budget > 0 && *n == self.budget
    }

    pub fn strikes(&self, def: DefId) -> u32 {
        self.strikes.lock().get(&def).copied().unwrap_or_default()
    }

    pub fn contains(&self, def: DefId) -> bool {
        self.blacklisted(&self.strikes.lock(), def)
    }

    /// Forget the timeouts of a definition that was typechecked in time.
    ///
    /// This has no effect on blacklisted definitions.
    pub fn forgive(&self, def: DefId) {
        let mut strikes = self.strikes.lock();
        if strikes.get(&def).map_or(false, |n| self.budget == 0 || *n < self.budget) {
            strikes.remove(&def);
        }
    }

    /// Remove a definition from the blacklist.
    pub fn clear(&self, def: DefId) -> bool {
        self.strikes.lock().remove(&def).is_some()
    }

    /// Remove all definitions from the blacklist.
    pub fn clear_all(&self) {
        self.strikes.lock().clear()
    }

    /// Blacklisted definitions.
    pub fn entries(&self) -> Vec<DefId> {
        let strikes = self.strikes.lock();
        let keys = strikes.keys().copied();
        let mut entries: Vec<_> = keys.filter(|d| self.blacklisted(&strikes, *d)).collect();
        entries.sort_unstable();
        entries
    }

    fn blacklisted(&self, strikes: &FnvHashMap<DefId, u32>, def: DefId) -> bool {
        self.budget > 0 && strikes.get(&def).map_or(false, |n| *n >= self.budget)
    }
}

#[test]
fn strikes() {
    let store = crate::Store::new();
    let h = store.declare(crate::FullName::parse("h"), crate::Kind::Function, false);
    let blacklist = Blacklist::new(3);
    assert!(!blacklist.strike(h));
    assert!(!blacklist.strike(h));
    assert!(!blacklist.contains(h));
    assert!(blacklist.strike(h));
    assert!(blacklist.contains(h));
    assert_eq!(blacklist.entries(), [h]);

    blacklist.forgive(h);
    assert!(blacklist.contains(h));
    assert!(blacklist.clear(h));
    assert!(!blacklist.contains(h));

    blacklist.strike(h);
    blacklist.forgive(h);
    assert_eq!(blacklist.strikes(h), 0);

    let disabled = Blacklist::new(0);
    (0..5).for_each(|_| assert!(!disabled.strike(h)));
    assert!(!disabled.contains(h));
}
