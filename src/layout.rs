/// Raid layout solver seam.
///
/// Working out whether a Chambers raid is challenge mode is done by a separate
/// layout solver that watches the same ticks, varbits and game-state changes
/// as the tracker. The tracker only asks it one question, once per raid.
use crate::world::Var;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    LoginScreen,
    Loading,
    LoggedIn,
    Hopping,
    #[serde(other)]
    Unknown,
}

pub trait LayoutSolver: Send {
    fn is_challenge_mode(&self) -> bool;

    fn on_tick(&mut self, _tick: u32) {}
    fn on_varbit_changed(&mut self, _var: Var, _value: i32) {}
    fn on_game_state_changed(&mut self, _state: GameState) {}
    /// The solver's own result arriving through the event feed.
    fn on_layout_reported(&mut self, _challenge_mode: bool) {}
}

/// Solver whose answer is pushed in from outside (a `raid_layout` feed event),
/// falling back to a configured default until the first report.
#[derive(Debug, Clone)]
pub struct ReportedLayout {
    fallback: bool,
    reported: Option<bool>,
}

impl ReportedLayout {
    pub fn new(fallback: bool) -> Self {
        Self { fallback, reported: None }
    }

    pub fn report(&mut self, challenge_mode: bool) {
        tracing::info!("Raid layout reported: challenge_mode={}", challenge_mode);
        self.reported = Some(challenge_mode);
    }
}

impl LayoutSolver for ReportedLayout {
    fn is_challenge_mode(&self) -> bool {
        self.reported.unwrap_or(self.fallback)
    }

    fn on_game_state_changed(&mut self, state: GameState) {
        // A new raid instance needs a fresh answer
        if state == GameState::LoginScreen || state == GameState::Hopping {
            self.reported = None;
        }
    }

    fn on_layout_reported(&mut self, challenge_mode: bool) {
        self.report(challenge_mode);
    }
}
