// Hero draft negotiation.
//
// `HeroDraftCoordinator` is the draft state (`DraftState` in the design
// docs): per-player selections and readiness, the draft clock, the optional
// early-completion countdown, and the hero pool captured at draft entry. It
// exists only while the session is in `Draft`; the session creates it on
// entry and drops it on exit, keeping only `final_selections()`.
//
// Per-player sub-states: Unselected → Selected → ReadyLocked. Re-picking is
// free until the player readies; un-readying unlocks the pick again.
//
// Selection never fails with a user-visible error for a bad hero id: an
// unknown id, or one already held by another player under unique picks, is
// replaced by a random available hero. The random pick shuffles the pool and
// takes the first id nobody else holds, or the first pool entry when the
// pool is exhausted, so the draft always completes.
//
// Readiness and selections are mirrored onto `PlayerRecord` by the session;
// this module does not touch the registry.

use std::collections::BTreeMap;

use skirmish_prng::SessionRng;
use skirmish_protocol::{DraftView, HeroId, PlayerId};
use tracing::{debug, warn};

use crate::catalog::HeroCatalog;
use crate::error::SessionError;

#[derive(Clone, Debug, PartialEq)]
pub struct DraftPolicy {
    pub enforce_unique_picks: bool,
    pub completion_grace_secs: f64,
    pub fallback_hero: HeroId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PickState {
    Unselected,
    Selected,
    ReadyLocked,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectOutcome {
    pub hero: HeroId,
    /// The requested id was unusable and `hero` was picked instead.
    pub substituted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CountdownChange {
    Started(f64),
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DraftTick {
    Running,
    /// Everyone stayed ready through the completion countdown.
    CountdownElapsed,
    /// The draft clock ran out.
    TimedOut,
}

/// What happened to a player's draft entries when they disconnected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectDisposition {
    /// Ready pick kept for the final assignment.
    Retained,
    /// Not ready; entries dropped.
    Purged,
}

#[derive(Clone, Debug)]
pub struct HeroDraftCoordinator {
    selections: BTreeMap<PlayerId, HeroId>,
    readiness: BTreeMap<PlayerId, bool>,
    remaining: f64,
    countdown: Option<f64>,
    pool: Vec<HeroId>,
    policy: DraftPolicy,
}

impl HeroDraftCoordinator {
    /// Fresh draft state with the given clock and hero pool (catalog order).
    pub fn begin(duration_secs: f64, pool: Vec<HeroId>, policy: DraftPolicy) -> Self {
        Self {
            selections: BTreeMap::new(),
            readiness: BTreeMap::new(),
            remaining: duration_secs.max(0.0),
            countdown: None,
            pool,
            policy,
        }
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn countdown(&self) -> Option<f64> {
        self.countdown
    }

    pub fn pool(&self) -> &[HeroId] {
        &self.pool
    }

    pub fn selection(&self, player: PlayerId) -> Option<&HeroId> {
        self.selections.get(&player)
    }

    pub fn is_ready(&self, player: PlayerId) -> bool {
        self.readiness.get(&player).copied().unwrap_or(false)
    }

    pub fn pick_state(&self, player: PlayerId) -> PickState {
        match (self.selections.contains_key(&player), self.is_ready(player)) {
            (true, true) => PickState::ReadyLocked,
            (true, false) => PickState::Selected,
            (false, _) => PickState::Unselected,
        }
    }

    /// True if some player other than `player` currently holds `hero`.
    fn taken_by_other(&self, hero: &HeroId, player: PlayerId) -> bool {
        self.selections
            .iter()
            .any(|(p, h)| *p != player && h == hero)
    }

    fn hero_exists(&self, hero: &HeroId, catalog: Option<&dyn HeroCatalog>) -> bool {
        match catalog.map(|c| c.exists(hero)) {
            Some(Ok(exists)) => exists,
            Some(Err(err)) => {
                warn!(%err, %hero, "catalog lookup failed; checking draft pool instead");
                self.pool.contains(hero)
            }
            None => self.pool.contains(hero),
        }
    }

    /// A random hero nobody else holds; the first pool entry if none is
    /// free; the configured fallback if the pool is empty.
    pub fn random_available(&self, player: PlayerId, rng: &mut SessionRng) -> HeroId {
        let mut shuffled = self.pool.clone();
        rng.shuffle(&mut shuffled);
        let free = if self.policy.enforce_unique_picks {
            shuffled
                .into_iter()
                .find(|h| !self.taken_by_other(h, player))
        } else {
            shuffled.into_iter().next()
        };
        free.or_else(|| self.pool.first().cloned())
            .unwrap_or_else(|| self.policy.fallback_hero.clone())
    }

    /// Select `hero` for `player`, substituting a random available hero if
    /// the id is unknown or already taken. Locked (ready) players must
    /// un-ready first.
    pub fn select_hero(
        &mut self,
        player: PlayerId,
        hero: HeroId,
        catalog: Option<&dyn HeroCatalog>,
        rng: &mut SessionRng,
    ) -> Result<SelectOutcome, SessionError> {
        if self.is_ready(player) {
            return Err(SessionError::invalid(format!(
                "{player} is ready; un-ready before picking again"
            )));
        }
        let usable = self.hero_exists(&hero, catalog)
            && !(self.policy.enforce_unique_picks && self.taken_by_other(&hero, player));
        let outcome = if usable {
            SelectOutcome {
                hero,
                substituted: false,
            }
        } else {
            let substitute = self.random_available(player, rng);
            debug!(%player, requested = %hero, %substitute, "hero substituted");
            SelectOutcome {
                hero: substitute,
                substituted: true,
            }
        };
        self.selections.insert(player, outcome.hero.clone());
        self.readiness.entry(player).or_insert(false);
        Ok(outcome)
    }

    /// Toggle readiness. Readying needs a selection. Returns false if the
    /// flag already had that value.
    pub fn set_ready(&mut self, player: PlayerId, ready: bool) -> Result<bool, SessionError> {
        if ready && !self.selections.contains_key(&player) {
            return Err(SessionError::invalid(format!(
                "{player} has no hero selected"
            )));
        }
        if self.is_ready(player) == ready {
            return Ok(false);
        }
        self.readiness.insert(player, ready);
        Ok(true)
    }

    /// Every eligible player is ready with a selection.
    pub fn all_ready(&self, eligible: &[PlayerId]) -> bool {
        !eligible.is_empty()
            && eligible
                .iter()
                .all(|p| self.is_ready(*p) && self.selections.contains_key(p))
    }

    /// Start or cancel the completion countdown to match readiness.
    pub fn evaluate_countdown(&mut self, eligible: &[PlayerId]) -> Option<CountdownChange> {
        let all_ready = self.all_ready(eligible);
        match (all_ready, self.countdown) {
            (true, None) => {
                let secs = self.policy.completion_grace_secs.min(self.remaining);
                self.countdown = Some(secs);
                Some(CountdownChange::Started(secs))
            }
            (false, Some(_)) => {
                self.countdown = None;
                Some(CountdownChange::Cancelled)
            }
            _ => None,
        }
    }

    /// Advance the clocks by `dt` seconds.
    pub fn tick(&mut self, dt: f64) -> DraftTick {
        self.remaining = (self.remaining - dt).max(0.0);
        if let Some(left) = self.countdown.as_mut() {
            *left -= dt;
            if *left <= 0.0 {
                *left = 0.0;
                return DraftTick::CountdownElapsed;
            }
        }
        if self.remaining <= 0.0 {
            DraftTick::TimedOut
        } else {
            DraftTick::Running
        }
    }

    /// Zero the draft clock; the next tick times out.
    pub fn expire(&mut self) {
        self.remaining = 0.0;
    }

    /// Give every listed player who is not ready, or has no pick, a random
    /// available hero and lock it. Returns the players that were completed.
    pub fn force_complete(&mut self, players: &[PlayerId], rng: &mut SessionRng) -> Vec<PlayerId> {
        let mut completed = Vec::new();
        for &player in players {
            if self.is_ready(player) && self.selections.contains_key(&player) {
                continue;
            }
            // Release any unlocked pick first so the random draw treats it as
            // free and the player can land back on it.
            self.selections.remove(&player);
            let hero = self.random_available(player, rng);
            debug!(%player, %hero, "auto-completed draft pick");
            self.selections.insert(player, hero);
            self.readiness.insert(player, true);
            completed.push(player);
        }
        completed
    }

    /// Apply the disconnect policy: ready picks stay, the rest are dropped.
    pub fn on_disconnect(&mut self, player: PlayerId) -> DisconnectDisposition {
        if self.is_ready(player) {
            DisconnectDisposition::Retained
        } else {
            self.remove_player(player);
            DisconnectDisposition::Purged
        }
    }

    pub fn remove_player(&mut self, player: PlayerId) {
        self.selections.remove(&player);
        self.readiness.remove(&player);
    }

    /// Ready picks: the committed hero assignment.
    pub fn final_selections(&self) -> BTreeMap<PlayerId, HeroId> {
        self.selections
            .iter()
            .filter(|(p, _)| self.is_ready(**p))
            .map(|(p, h)| (*p, h.clone()))
            .collect()
    }

    pub fn view(&self) -> DraftView {
        DraftView {
            selections: self.selections.clone(),
            readiness: self.readiness.clone(),
            remaining_secs: self.remaining,
            completion_countdown: self.countdown,
            phase_active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::catalog::{CatalogError, StaticCatalog};

    fn policy(unique: bool) -> DraftPolicy {
        DraftPolicy {
            enforce_unique_picks: unique,
            completion_grace_secs: 3.0,
            fallback_hero: HeroId::from("fallback"),
        }
    }

    fn heroes(ids: &[&str]) -> Vec<HeroId> {
        ids.iter().map(|s| HeroId::from(*s)).collect()
    }

    fn draft(unique: bool, ids: &[&str]) -> (HeroDraftCoordinator, StaticCatalog) {
        let catalog = StaticCatalog::new(ids.iter().copied());
        (
            HeroDraftCoordinator::begin(30.0, heroes(ids), policy(unique)),
            catalog,
        )
    }

    struct DownCatalog;

    impl HeroCatalog for DownCatalog {
        fn exists(&self, _hero: &HeroId) -> Result<bool, CatalogError> {
            Err(CatalogError::Unavailable("timeout".into()))
        }

        fn all_ids(&self) -> Result<Vec<HeroId>, CatalogError> {
            Err(CatalogError::Unavailable("timeout".into()))
        }
    }

    const A: PlayerId = PlayerId(0);
    const B: PlayerId = PlayerId(1);
    const C: PlayerId = PlayerId(2);

    #[test]
    fn valid_pick_is_stored() {
        let (mut d, cat) = draft(true, &["hero_x", "hero_y"]);
        let mut rng = SessionRng::new(1);
        let out = d
            .select_hero(A, HeroId::from("hero_x"), Some(&cat), &mut rng)
            .unwrap();
        assert_eq!(out.hero, HeroId::from("hero_x"));
        assert!(!out.substituted);
        assert_eq!(d.pick_state(A), PickState::Selected);
    }

    #[test]
    fn duplicate_pick_is_remapped_under_uniqueness() {
        let (mut d, cat) = draft(true, &["hero_x", "hero_y", "hero_z"]);
        let mut rng = SessionRng::new(2);
        d.select_hero(A, HeroId::from("hero_x"), Some(&cat), &mut rng)
            .unwrap();
        for _ in 0..20 {
            let out = d
                .select_hero(B, HeroId::from("hero_x"), Some(&cat), &mut rng)
                .unwrap();
            assert!(out.substituted);
            assert_ne!(out.hero, HeroId::from("hero_x"));
        }
    }

    #[test]
    fn duplicate_pick_allowed_without_uniqueness() {
        let (mut d, cat) = draft(false, &["hero_x", "hero_y"]);
        let mut rng = SessionRng::new(3);
        d.select_hero(A, HeroId::from("hero_x"), Some(&cat), &mut rng)
            .unwrap();
        let out = d
            .select_hero(B, HeroId::from("hero_x"), Some(&cat), &mut rng)
            .unwrap();
        assert_eq!(out.hero, HeroId::from("hero_x"));
        assert!(!out.substituted);
    }

    #[test]
    fn unknown_hero_is_replaced_from_catalog() {
        let (mut d, cat) = draft(true, &["hero_x", "hero_y"]);
        let mut rng = SessionRng::new(4);
        let out = d
            .select_hero(A, HeroId::from("nope"), Some(&cat), &mut rng)
            .unwrap();
        assert!(out.substituted);
        assert!(d.pool().contains(&out.hero));
    }

    #[test]
    fn catalog_outage_falls_back_to_pool_membership() {
        let (mut d, _) = draft(true, &["hero_x"]);
        let mut rng = SessionRng::new(5);
        let out = d
            .select_hero(A, HeroId::from("hero_x"), Some(&DownCatalog), &mut rng)
            .unwrap();
        assert!(!out.substituted);
    }

    #[test]
    fn ready_locks_pick_until_unready() {
        let (mut d, cat) = draft(true, &["hero_x", "hero_y"]);
        let mut rng = SessionRng::new(6);
        d.select_hero(A, HeroId::from("hero_x"), Some(&cat), &mut rng)
            .unwrap();
        assert!(d.set_ready(A, true).unwrap());
        assert_eq!(d.pick_state(A), PickState::ReadyLocked);
        assert!(
            d.select_hero(A, HeroId::from("hero_y"), Some(&cat), &mut rng)
                .is_err()
        );

        assert!(d.set_ready(A, false).unwrap());
        assert_eq!(d.pick_state(A), PickState::Selected);
        let out = d
            .select_hero(A, HeroId::from("hero_y"), Some(&cat), &mut rng)
            .unwrap();
        assert_eq!(out.hero, HeroId::from("hero_y"));
    }

    #[test]
    fn ready_without_pick_rejected() {
        let (mut d, _) = draft(true, &["hero_x"]);
        assert!(matches!(
            d.set_ready(A, true),
            Err(SessionError::InvalidRequest(_))
        ));
        assert!(!d.is_ready(A));
    }

    #[test]
    fn countdown_is_capped_by_remaining_time() {
        let (mut d, cat) = draft(true, &["hero_x"]);
        let mut rng = SessionRng::new(7);
        d.select_hero(A, HeroId::from("hero_x"), Some(&cat), &mut rng)
            .unwrap();
        d.set_ready(A, true).unwrap();
        d.tick(28.5);
        assert_eq!(
            d.evaluate_countdown(&[A]),
            Some(CountdownChange::Started(1.5))
        );
        assert_eq!(d.evaluate_countdown(&[A]), None, "already running");
    }

    #[test]
    fn unready_cancels_countdown() {
        let (mut d, cat) = draft(true, &["hero_x", "hero_y"]);
        let mut rng = SessionRng::new(8);
        d.select_hero(A, HeroId::from("hero_x"), Some(&cat), &mut rng)
            .unwrap();
        d.select_hero(B, HeroId::from("hero_y"), Some(&cat), &mut rng)
            .unwrap();
        d.set_ready(A, true).unwrap();
        d.set_ready(B, true).unwrap();
        assert_eq!(
            d.evaluate_countdown(&[A, B]),
            Some(CountdownChange::Started(3.0))
        );
        d.set_ready(B, false).unwrap();
        assert_eq!(
            d.evaluate_countdown(&[A, B]),
            Some(CountdownChange::Cancelled)
        );
        assert_eq!(d.tick(5.0), DraftTick::Running);
    }

    #[test]
    fn countdown_elapses_before_clock() {
        let (mut d, cat) = draft(true, &["hero_x"]);
        let mut rng = SessionRng::new(9);
        d.select_hero(A, HeroId::from("hero_x"), Some(&cat), &mut rng)
            .unwrap();
        d.set_ready(A, true).unwrap();
        d.evaluate_countdown(&[A]);
        assert_eq!(d.tick(2.0), DraftTick::Running);
        assert_eq!(d.tick(1.0), DraftTick::CountdownElapsed);
    }

    #[test]
    fn clock_times_out() {
        let (mut d, _) = draft(true, &["hero_x"]);
        assert_eq!(d.tick(29.9), DraftTick::Running);
        assert_eq!(d.tick(0.2), DraftTick::TimedOut);
        assert_eq!(d.remaining(), 0.0);
    }

    #[test]
    fn force_complete_covers_everyone_uniquely() {
        let (mut d, cat) = draft(true, &["a", "b", "c", "d"]);
        let mut rng = SessionRng::new(10);
        d.select_hero(A, HeroId::from("a"), Some(&cat), &mut rng)
            .unwrap();
        d.set_ready(A, true).unwrap();
        d.select_hero(B, HeroId::from("b"), Some(&cat), &mut rng)
            .unwrap();

        let completed = d.force_complete(&[A, B, C], &mut rng);
        assert_eq!(completed, vec![B, C]);

        let finals = d.final_selections();
        assert_eq!(finals.len(), 3);
        assert_eq!(finals[&A], HeroId::from("a"));
        let unique: BTreeSet<&HeroId> = finals.values().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn exhausted_pool_accepts_duplicate() {
        let (mut d, _) = draft(true, &["only"]);
        let mut rng = SessionRng::new(11);
        d.force_complete(&[A, B], &mut rng);
        let finals = d.final_selections();
        assert_eq!(finals[&A], HeroId::from("only"));
        assert_eq!(finals[&B], HeroId::from("only"));
    }

    #[test]
    fn empty_pool_uses_fallback_hero() {
        let mut d = HeroDraftCoordinator::begin(10.0, Vec::new(), policy(true));
        let mut rng = SessionRng::new(12);
        d.force_complete(&[A], &mut rng);
        assert_eq!(d.final_selections()[&A], HeroId::from("fallback"));
    }

    #[test]
    fn disconnect_keeps_ready_and_drops_unready() {
        let (mut d, cat) = draft(true, &["a", "b"]);
        let mut rng = SessionRng::new(13);
        d.select_hero(A, HeroId::from("a"), Some(&cat), &mut rng)
            .unwrap();
        d.set_ready(A, true).unwrap();
        d.select_hero(B, HeroId::from("b"), Some(&cat), &mut rng)
            .unwrap();

        assert_eq!(d.on_disconnect(A), DisconnectDisposition::Retained);
        assert_eq!(d.on_disconnect(B), DisconnectDisposition::Purged);
        let finals = d.final_selections();
        assert_eq!(finals.len(), 1);
        assert!(finals.contains_key(&A));
        assert_eq!(d.pick_state(B), PickState::Unselected);
    }

    #[test]
    fn view_reflects_state() {
        let (mut d, cat) = draft(true, &["a"]);
        let mut rng = SessionRng::new(14);
        d.select_hero(A, HeroId::from("a"), Some(&cat), &mut rng)
            .unwrap();
        let view = d.view();
        assert!(view.phase_active);
        assert_eq!(view.selections[&A], HeroId::from("a"));
        assert!(!view.readiness[&A]);
        assert_eq!(view.completion_countdown, None);
    }
}
